//! Client library for a marketplace product classification service.
//!
//! Products are classified into marketplace categories by the server; this
//! crate logs in, asks for predictions, manages accounts and lets users
//! correct a prediction by picking the right category from the
//! marketplace's category tree.
//!
//! # Picking a category
//!
//! The category tree arrives as a flat list of nodes that name their parent.
//! [`CategorySelector`] rebuilds the hierarchy and handles selection:
//!
//! ```rust
//! use mpclassify::{CategoryNode, CategorySelector, Marketplace};
//!
//! let mut selector = CategorySelector::new(Marketplace::Wildberries, "galaxy s23");
//! let ticket = selector.begin_load().unwrap();
//! selector.finish_load(ticket, Ok::<_, String>(vec![
//!     CategoryNode::root("Electronics"),
//!     CategoryNode::child("Phones", "Electronics", 1),
//!     CategoryNode::child("Smartphones", "Phones", 2),
//! ]));
//!
//! selector.select_category("Electronics/Phones/Smartphones").unwrap();
//! let category = selector.save(|_, category| category.to_string()).unwrap();
//! assert_eq!(category, "Electronics/Phones/Smartphones");
//! ```
//!
//! # Talking to the server
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use mpclassify::{ApiClient, ClientConfig, Marketplace, SessionStore};
//!
//! let config = ClientConfig::from_env();
//! let session = Arc::new(Mutex::new(SessionStore::open(&config.session_path)?));
//! let client = ApiClient::new(config, session)?;
//!
//! client.login("alice", "secret").await?;
//! let prediction = client.predict("iPhone 14 Pro 256GB", Marketplace::Ozon).await?;
//! println!("{} ({:.1}%)", prediction.category, prediction.confidence_percent());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod export;
mod marketplace;
pub mod session;
pub mod taxonomy;

pub use client::{
    ApiClient, BatchPrediction, ClientError, CorrectionReceipt, CorrectionRequest, FeedbackEntry,
    FeedbackList, NewUser, Prediction, TopCategory, User,
};
pub use config::ClientConfig;
pub use marketplace::Marketplace;
pub use session::{Role, Session, SessionStore};
pub use taxonomy::{
    CategoryNode, CategorySelector, CategoryTree, SelectionState, SelectorError, SelectorState,
    TaxonomySource, TreeRow,
};

pub fn init_logger() {
    env_logger::init();
}
