//! HTTP client for the classification service.
//!
//! Every request carries `Authorization: Bearer <token>` when the shared
//! [`SessionStore`] holds a session. A `401 Unauthorized` on any
//! authenticated call clears the store and surfaces as
//! [`ClientError::Unauthorized`], so callers send the user back to login.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

mod error;
pub mod models;

pub use error::ClientError;
pub use models::{
    BatchPrediction, CorrectionReceipt, CorrectionRequest, FeedbackEntry, FeedbackList, NewUser,
    Prediction, TopCategory, User,
};

use models::{
    ErrorBody, LoginRequest, LoginResponse, MessageResponse, PredictRequest, UsersResponse,
};

use crate::config::ClientConfig;
use crate::session::{Session, SessionStore};
use crate::taxonomy::{CategoryNode, TaxonomyResponse, TaxonomySource};
use crate::Marketplace;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Arc<Mutex<SessionStore>>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        session: Arc<Mutex<SessionStore>>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        debug!("API client targeting {}", config.api_url);
        Ok(Self {
            http,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session store shared with this client
    pub fn session(&self) -> Arc<Mutex<SessionStore>> {
        Arc::clone(&self.session)
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.lock().await.get().is_some()
    }

    /// Logs in and stores the returned session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "Username and password are required".into(),
            ));
        }

        let response = self
            .http
            .post(self.config.endpoint("auth/login"))
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let message = error_message(response).await;
            warn!("Login rejected for {}: {}", username, message);
            return Err(ClientError::InvalidCredentials(message));
        }

        let body: LoginResponse = check_status(response).await?.json().await?;
        let session = Session {
            token: body.token,
            username: body.user.username,
            role: body.user.role,
        };
        self.session.lock().await.set(session.clone())?;
        info!("Logged in as {} ({})", session.username, session.role);
        Ok(session)
    }

    /// Forgets the stored session. Nothing is sent to the server.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session.lock().await.clear()
    }

    /// Creates an account (admin only).
    pub async fn register(&self, user: &NewUser) -> Result<String, ClientError> {
        user.validate()?;
        self.require_admin().await?;
        let request = self.http.post(self.config.endpoint("auth/register")).json(user);
        let body: MessageResponse = self.fetch_json(request).await?;
        info!("Created user {} with role {}", user.username, user.role);
        Ok(body.message)
    }

    /// Lists every account (admin only).
    pub async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        self.require_admin().await?;
        let request = self.http.get(self.config.endpoint("users"));
        let body: UsersResponse = self.fetch_json(request).await?;
        Ok(body.users)
    }

    /// Deletes an account (admin only). The server refuses to delete the
    /// caller's own account.
    pub async fn delete_user(&self, user_id: i64) -> Result<String, ClientError> {
        self.require_admin().await?;
        let request = self
            .http
            .delete(self.config.endpoint(&format!("users/{}", user_id)));
        let body: MessageResponse = self.fetch_json(request).await?;
        info!("Deleted user {}", user_id);
        Ok(body.message)
    }

    pub async fn current_user(&self) -> Result<User, ClientError> {
        self.require_login().await?;
        self.fetch_json(self.http.get(self.config.endpoint("me"))).await
    }

    /// Classifies a single product name.
    pub async fn predict(
        &self,
        product_name: &str,
        marketplace: Marketplace,
    ) -> Result<Prediction, ClientError> {
        let product_name = product_name.trim();
        if product_name.is_empty() {
            return Err(ClientError::Validation("Enter a product name".into()));
        }
        self.require_login().await?;

        let request = self
            .http
            .post(self.config.endpoint("predict_category"))
            .json(&PredictRequest {
                product_name,
                marketplace,
            });
        let mut prediction: Prediction = self.fetch_json(request).await?;
        prediction.marketplace.get_or_insert(marketplace);
        debug!(
            "{:?} -> {} ({:.1}%)",
            prediction.product_name,
            prediction.category,
            prediction.confidence_percent()
        );
        Ok(prediction)
    }

    /// Uploads a CSV with a `product_name` column and classifies every row.
    ///
    /// The batch endpoint reports confidences in percent; they are converted
    /// to fractions so every [`Prediction`] uses the same scale.
    pub async fn predict_file(
        &self,
        path: &Path,
        marketplace: Marketplace,
    ) -> Result<BatchPrediction, ClientError> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return Err(ClientError::Validation(format!(
                "{} is not a CSV file",
                path.display()
            )));
        }
        self.require_login().await?;

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("products.csv")
            .to_string();
        info!("Uploading {} ({} bytes) for {}", file_name, bytes.len(), marketplace);

        let part = Part::bytes(bytes).file_name(file_name).mime_str("text/csv")?;
        let form = Form::new()
            .part("file", part)
            .text("marketplace", marketplace.as_str());
        let request = self
            .http
            .post(self.config.endpoint("predict_category_from_file"))
            .multipart(form);

        let mut batch: BatchPrediction = self.fetch_json(request).await?;
        for prediction in &mut batch.results {
            prediction.confidence /= 100.0;
            prediction.marketplace.get_or_insert(marketplace);
        }
        info!("Classified {}/{} products", batch.success, batch.total);
        Ok(batch)
    }

    /// Fetches the category taxonomy of a marketplace.
    pub async fn category_tree(
        &self,
        marketplace: Marketplace,
    ) -> Result<TaxonomyResponse, ClientError> {
        self.require_login().await?;
        let request = self
            .http
            .get(self.config.endpoint("categories/tree"))
            .query(&[("marketplace", marketplace.as_str())]);
        let taxonomy: TaxonomyResponse = self.fetch_json(request).await?;
        debug!("Fetched {} categories for {}", taxonomy.categories.len(), marketplace);
        Ok(taxonomy)
    }

    /// Sends a category correction for retraining.
    pub async fn submit_correction(
        &self,
        correction: &CorrectionRequest,
    ) -> Result<CorrectionReceipt, ClientError> {
        if correction.corrected_category.trim().is_empty() {
            return Err(ClientError::Validation("Corrected category cannot be empty".into()));
        }
        self.require_login().await?;
        let request = self
            .http
            .post(self.config.endpoint("feedback/correct"))
            .json(correction);
        let receipt: CorrectionReceipt = self.fetch_json(request).await?;
        info!(
            "Correction {:?} stored for {:?}",
            receipt.correction_id, correction.product_name
        );
        Ok(receipt)
    }

    /// Lists submitted corrections, optionally for one marketplace.
    pub async fn list_feedback(
        &self,
        marketplace: Option<Marketplace>,
    ) -> Result<FeedbackList, ClientError> {
        self.require_login().await?;
        let mut request = self.http.get(self.config.endpoint("feedback/list"));
        if let Some(marketplace) = marketplace {
            request = request.query(&[("marketplace", marketplace.as_str())]);
        }
        self.fetch_json(request).await
    }

    async fn require_login(&self) -> Result<(), ClientError> {
        if self.session.lock().await.get().is_none() {
            return Err(ClientError::NotLoggedIn);
        }
        Ok(())
    }

    async fn require_admin(&self) -> Result<(), ClientError> {
        let store = self.session.lock().await;
        match store.get() {
            None => Err(ClientError::NotLoggedIn),
            Some(session) if session.role.is_admin() => Ok(()),
            Some(session) => {
                warn!("{} is not an admin", session.username);
                Err(ClientError::Forbidden)
            }
        }
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let token = self.session.lock().await.token().map(str::to_owned);
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let message = error_message(response).await;
            warn!("Request rejected as unauthorized ({}), clearing session", message);
            self.session.lock().await.clear()?;
            return Err(ClientError::Unauthorized);
        }
        check_status(response).await
    }
}

#[async_trait]
impl TaxonomySource for ApiClient {
    async fn fetch_taxonomy(
        &self,
        marketplace: Marketplace,
    ) -> Result<Vec<CategoryNode>, ClientError> {
        Ok(self.category_tree(marketplace).await?.categories)
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = error_message(response).await;
    debug!("Server returned {}: {}", status, message);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Pulls the server's error message out of a failed response, falling back
/// to the status reason.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string();
    match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::into_message)
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
            .unwrap_or(fallback),
        Err(_) => fallback,
    }
}
