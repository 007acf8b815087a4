use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::client::ClientError;

/// Role attached to an account. Unknown role strings are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    #[default]
    User,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Other(role) => role,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.trim().to_lowercase().as_str() {
            "admin" => Self::Admin,
            "user" => Self::User,
            _ => Self::Other(role),
        }
    }
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        Self::from(role.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the client knows about the logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub role: Role,
}

/// Holds the current session and, when file-backed, keeps it on disk
/// between runs.
///
/// The store is passed explicitly to whoever needs it (the
/// [`ApiClient`](crate::ApiClient) shares it behind a mutex) instead of
/// living in ambient global state.
#[derive(Debug, Default)]
pub struct SessionStore {
    path: Option<PathBuf>,
    session: Option<Session>,
}

impl SessionStore {
    /// A store that forgets everything when dropped
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a store backed by `path`, loading the session saved there.
    ///
    /// An unreadable session file is logged and treated as logged out.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();
        let session = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str::<Session>(&contents) {
                Ok(session) => {
                    debug!("Loaded session for {} from {:?}", session.username, path);
                    Some(session)
                }
                Err(e) => {
                    warn!("Ignoring unreadable session file {:?}: {}", path, e);
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            path: Some(path),
            session,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    pub fn role(&self) -> Option<&Role> {
        self.session.as_ref().map(|s| &s.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role().map(Role::is_admin).unwrap_or(false)
    }

    pub fn set(&mut self, session: Session) -> Result<(), ClientError> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            write_private(path, serde_json::to_string_pretty(&session)?.as_bytes())?;
            info!("Session for {} saved to {:?}", session.username, path);
        }
        self.session = Some(session);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), ClientError> {
        self.session = None;
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)?;
                info!("Session file {:?} removed", path);
            }
        }
        Ok(())
    }
}

/// Writes `contents` to `path`, readable by the owner only on Unix since the
/// file holds a bearer token.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // The mode only applies to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)?;
    file.flush()
}
