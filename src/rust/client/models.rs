use serde::{Deserialize, Serialize};

use super::error::ClientError;
use crate::session::Role;
use crate::Marketplace;

/// Shortest username accepted when creating an account
pub const MIN_USERNAME_LEN: usize = 3;
/// Shortest password accepted when creating an account
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsersResponse {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Error body shapes the server uses (`error` from handlers, `msg` from the
/// JWT layer)
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
    pub msg: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.error.or(self.message).or(self.msg)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PredictRequest<'a> {
    pub product_name: &'a str,
    pub marketplace: Marketplace,
}

/// An account as listed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Form for creating an account
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(skip)]
    pub confirm_password: String,
    pub role: Role,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            confirm_password: password.clone(),
            password,
            role,
        }
    }

    pub fn with_confirmation(mut self, confirm_password: impl Into<String>) -> Self {
        self.confirm_password = confirm_password.into();
        self
    }

    /// Checks the form the same way before anything is sent
    pub fn validate(&self) -> Result<(), ClientError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(ClientError::Validation("Username cannot be empty".into()));
        }
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(ClientError::Validation(format!(
                "Username must be at least {} characters",
                MIN_USERNAME_LEN
            )));
        }
        if self.password.is_empty() {
            return Err(ClientError::Validation("Password cannot be empty".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.password != self.confirm_password {
            return Err(ClientError::Validation("Passwords do not match".into()));
        }
        Ok(())
    }
}

/// One of the most likely categories for a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCategory {
    pub category: String,
    /// Fraction between 0 and 1
    pub confidence: f64,
}

/// The predicted category of one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub product_name: String,
    #[serde(default)]
    pub marketplace: Option<Marketplace>,
    /// Last segment of the category path
    #[serde(default, alias = "category_name")]
    pub category: String,
    #[serde(default)]
    pub category_path: Option<String>,
    #[serde(default)]
    pub hierarchy: Vec<String>,
    /// Fraction between 0 and 1
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub top_3: Vec<TopCategory>,
    /// Set by the server when this product could not be classified
    #[serde(default)]
    pub error: Option<String>,
    /// Set locally once a correction for this product has been submitted
    #[serde(default)]
    pub corrected: bool,
}

impl Prediction {
    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Category path for people, e.g. `Electronics / Phones`
    pub fn display_path(&self) -> String {
        if !self.hierarchy.is_empty() {
            self.hierarchy.join(" / ")
        } else {
            self.category_path.clone().unwrap_or_else(|| "-".to_string())
        }
    }

    /// Records a submitted correction on this result
    pub fn apply_correction(&mut self, category: &str) {
        self.category = category.to_string();
        self.corrected = true;
    }
}

/// Results of classifying an uploaded CSV
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchPrediction {
    #[serde(default)]
    pub marketplace: Option<Marketplace>,
    #[serde(default)]
    pub results: Vec<Prediction>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub success: usize,
}

/// A user-supplied override of a predicted category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionRequest {
    pub product_name: String,
    pub marketplace: Marketplace,
    pub predicted_category: String,
    pub corrected_category: String,
    pub confidence: f64,
}

impl CorrectionRequest {
    pub fn from_prediction(
        prediction: &Prediction,
        marketplace: Marketplace,
        corrected_category: &str,
    ) -> Self {
        Self {
            product_name: prediction.product_name.clone(),
            marketplace: prediction.marketplace.unwrap_or(marketplace),
            predicted_category: prediction.category.clone(),
            corrected_category: corrected_category.to_string(),
            confidence: prediction.confidence,
        }
    }
}

/// Server acknowledgement of a stored correction
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorrectionReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub correction_id: Option<u64>,
    /// Retraining progress reported by the server
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    #[serde(default)]
    pub id: u64,
    pub product_name: String,
    pub marketplace: String,
    pub predicted_category: String,
    pub corrected_category: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub used_for_training: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackList {
    #[serde(default)]
    pub feedback: Vec<FeedbackEntry>,
    #[serde(default)]
    pub total: usize,
}
