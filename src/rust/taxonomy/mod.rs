use async_trait::async_trait;

mod error;
mod node;
mod selection;
mod selector;
pub mod tree;

pub use error::SelectorError;
pub use node::{CategoryNode, TaxonomyResponse};
pub use selection::SelectionState;
pub use selector::{CategorySelector, LoadTicket, SelectorState};
pub use tree::{CategoryTree, TreeRow, INDENT_UNIT, PATH_SEPARATOR};

use crate::{ClientError, Marketplace};

/// Anything that can provide the category set of a marketplace.
///
/// [`ApiClient`](crate::ApiClient) implements this against the backend;
/// tests and offline tools can supply their own.
#[async_trait]
pub trait TaxonomySource: Send + Sync {
    async fn fetch_taxonomy(
        &self,
        marketplace: Marketplace,
    ) -> Result<Vec<CategoryNode>, ClientError>;
}
