use serde::{Deserialize, Serialize};

/// One entry of a marketplace category taxonomy.
///
/// Nodes reference their parent by name only. Children are never stored on
/// the node; they are derived by grouping the whole set on `parent` when a
/// [`CategoryTree`](super::CategoryTree) is built. A `children` field sent by
/// the server is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Display label, unique among siblings
    pub name: String,
    /// Depth in the hierarchy, 0 for roots
    #[serde(default)]
    pub level: usize,
    /// Name of the parent node, `None` for roots
    #[serde(default)]
    pub parent: Option<String>,
    /// Precomputed slash-joined path from the root down to this node
    #[serde(default, alias = "fullPath")]
    pub full_path: Option<String>,
    /// Backend identifier, only present on categories that carry products
    #[serde(default)]
    pub id: Option<String>,
}

impl CategoryNode {
    /// Creates a root node (level 0, no parent)
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: 0,
            parent: None,
            full_path: None,
            id: None,
        }
    }

    /// Creates a node under `parent` at the given level
    pub fn child(name: impl Into<String>, parent: impl Into<String>, level: usize) -> Self {
        Self {
            name: name.into(),
            level,
            parent: Some(parent.into()),
            full_path: None,
            id: None,
        }
    }

    /// Attaches a precomputed full path
    pub fn with_full_path(mut self, full_path: impl Into<String>) -> Self {
        self.full_path = Some(full_path.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// The parent name, treating an empty string the same as no parent
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref().filter(|p| !p.is_empty())
    }
}

/// Body returned by the category tree endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxonomyResponse {
    #[serde(default)]
    pub marketplace: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategoryNode>,
}
