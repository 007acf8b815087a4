use std::fmt;

use log::{debug, info, warn};

use super::error::SelectorError;
use super::node::CategoryNode;
use super::selection::SelectionState;
use super::tree::{CategoryTree, TreeRow};
use super::TaxonomySource;
use crate::Marketplace;

/// Lifecycle of one selector activation.
///
/// `Idle -> Loading -> Ready | LoadFailed -> Closed`. `Ready` stays `Ready`
/// on every selection change. Nothing goes back to `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Idle,
    Loading,
    Ready,
    LoadFailed,
    Closed,
}

impl fmt::Display for SelectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::LoadFailed => "in manual entry mode",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Handed out by [`CategorySelector::begin_load`]. A result is only applied
/// if its ticket still matches the selector's current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

/// Lets a user pick one category of a marketplace taxonomy as the
/// correction for `record`.
///
/// If the taxonomy cannot be fetched the selector switches to manual entry
/// so a correction can still be typed in, unless the fetch failed because
/// the user is no longer logged in.
///
/// ```
/// use mpclassify::{CategoryNode, CategorySelector, Marketplace, SelectorState};
///
/// let mut selector = CategorySelector::new(Marketplace::Ozon, "iphone 14");
/// let ticket = selector.begin_load().unwrap();
/// selector.finish_load(ticket, Ok::<_, String>(vec![
///     CategoryNode::root("Electronics"),
///     CategoryNode::child("Phones", "Electronics", 1),
/// ]));
/// assert_eq!(selector.state(), SelectorState::Ready);
///
/// selector.select_row(1).unwrap();
/// let saved = selector.save(|product, category| format!("{product} -> {category}")).unwrap();
/// assert_eq!(saved, "iphone 14 -> Electronics/Phones");
/// assert_eq!(selector.state(), SelectorState::Closed);
/// ```
#[derive(Debug)]
pub struct CategorySelector<R> {
    marketplace: Marketplace,
    record: R,
    state: SelectorState,
    generation: u64,
    tree: Option<CategoryTree>,
    selection: SelectionState,
    manual_text: String,
    load_error: Option<String>,
}

impl<R> CategorySelector<R> {
    pub fn new(marketplace: Marketplace, record: R) -> Self {
        Self {
            marketplace,
            record,
            state: SelectorState::Idle,
            generation: 0,
            tree: None,
            selection: SelectionState::new(),
            manual_text: String::new(),
            load_error: None,
        }
    }

    pub fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn into_record(self) -> R {
        self.record
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn tree(&self) -> Option<&CategoryTree> {
        self.tree.as_ref()
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// User-facing message explaining why manual entry is active
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn manual_text(&self) -> &str {
        &self.manual_text
    }

    pub fn is_manual_mode(&self) -> bool {
        self.state == SelectorState::LoadFailed
    }

    /// Rows available for selection; empty unless the tree is loaded
    pub fn rows(&self) -> &[TreeRow] {
        match (&self.state, &self.tree) {
            (SelectorState::Ready, Some(tree)) => tree.rows(),
            _ => &[],
        }
    }

    /// Moves `Idle -> Loading`. Only one load is allowed per activation.
    pub fn begin_load(&mut self) -> Result<LoadTicket, SelectorError> {
        self.expect_state("load the category tree", &[SelectorState::Idle])?;
        self.state = SelectorState::Loading;
        debug!(
            "Loading category tree for {} (generation {})",
            self.marketplace, self.generation
        );
        Ok(LoadTicket {
            generation: self.generation,
        })
    }

    /// Applies the outcome of a fetch started with `ticket`.
    ///
    /// Returns `false` and leaves the selector untouched when the ticket is
    /// stale, i.e. the selector was closed while the fetch was in flight.
    pub fn finish_load<E: fmt::Display>(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<CategoryNode>, E>,
    ) -> bool {
        if ticket.generation != self.generation || self.state != SelectorState::Loading {
            debug!(
                "Discarding category tree response for {} (ticket {}, current {}, state {})",
                self.marketplace, ticket.generation, self.generation, self.state
            );
            return false;
        }

        match result {
            Ok(nodes) => {
                let tree = CategoryTree::build(nodes);
                info!(
                    "Loaded {} categories ({} shown) for {}",
                    tree.len(),
                    tree.rows().len(),
                    self.marketplace
                );
                self.tree = Some(tree);
                self.state = SelectorState::Ready;
            }
            Err(e) => {
                warn!("Failed to load category tree for {}: {}", self.marketplace, e);
                self.load_error = Some(format!(
                    "Could not load the category tree ({e}); enter the category manually"
                ));
                self.state = SelectorState::LoadFailed;
            }
        }
        true
    }

    /// Fetches the taxonomy from `source` and applies it.
    ///
    /// A fetch rejected for lack of a session does not fall back to manual
    /// entry: nothing typed there could be submitted. The selector closes and
    /// [`SelectorError::LoginRequired`] is returned instead.
    pub async fn activate<S>(&mut self, source: &S) -> Result<SelectorState, SelectorError>
    where
        S: TaxonomySource + ?Sized,
    {
        let ticket = self.begin_load()?;
        let result = source.fetch_taxonomy(self.marketplace).await;
        if let Err(e) = &result {
            if e.requires_login() {
                warn!("Category tree for {} needs a new login: {}", self.marketplace, e);
                self.close();
                return Err(SelectorError::LoginRequired);
            }
        }
        self.finish_load(ticket, result);
        Ok(self.state)
    }

    /// Selects the row at `index` (0-based, render order), replacing any
    /// earlier selection.
    pub fn select_row(&mut self, index: usize) -> Result<(), SelectorError> {
        self.expect_state("select a category", &[SelectorState::Ready])?;
        let Some(tree) = self.tree.as_ref() else {
            return Err(self.invalid_state("select a category"));
        };
        let row = tree.rows().get(index).ok_or(SelectorError::RowOutOfRange(index))?;
        self.selection.select_row(tree, row);
        debug!("Selected {}", self.selection.label());
        Ok(())
    }

    /// Selects the row whose category value or joined path equals `value`
    pub fn select_category(&mut self, value: &str) -> Result<(), SelectorError> {
        self.expect_state("select a category", &[SelectorState::Ready])?;
        let Some(tree) = self.tree.as_ref() else {
            return Err(self.invalid_state("select a category"));
        };
        let row = tree
            .find_row(value)
            .ok_or_else(|| SelectorError::UnknownCategory(value.to_string()))?;
        self.selection.select_row(tree, row);
        debug!("Selected {}", self.selection.label());
        Ok(())
    }

    /// Sets the free-text correction. Only available in manual entry mode.
    pub fn set_manual_text(&mut self, text: impl Into<String>) -> Result<(), SelectorError> {
        self.expect_state("enter a category manually", &[SelectorState::LoadFailed])?;
        self.manual_text = text.into();
        Ok(())
    }

    /// The category string that saving would submit, if any
    pub fn chosen_category(&self) -> Option<String> {
        match self.state {
            SelectorState::Ready if !self.selection.is_empty() => {
                Some(self.selection.label().to_string())
            }
            SelectorState::LoadFailed => {
                let text = self.manual_text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            _ => None,
        }
    }

    pub fn can_save(&self) -> bool {
        self.chosen_category().is_some()
    }

    /// Invokes `on_save` once with the record and the chosen category, then
    /// closes the selector. Whatever `on_save` returns is handed back as is.
    pub fn save<F, T>(&mut self, on_save: F) -> Result<T, SelectorError>
    where
        F: FnOnce(&R, &str) -> T,
    {
        self.expect_state("save", &[SelectorState::Ready, SelectorState::LoadFailed])?;
        let category = self.chosen_category().ok_or(SelectorError::NothingSelected)?;
        info!("Saving corrected category {} for {}", category, self.marketplace);
        let outcome = on_save(&self.record, &category);
        self.close();
        Ok(outcome)
    }

    /// Closes without saving and calls `on_close`.
    pub fn cancel<F: FnOnce()>(&mut self, on_close: F) -> Result<(), SelectorError> {
        if self.state == SelectorState::Closed {
            return Err(self.invalid_state("cancel"));
        }
        debug!("Selector for {} cancelled in state {}", self.marketplace, self.state);
        self.close();
        on_close();
        Ok(())
    }

    fn close(&mut self) {
        self.state = SelectorState::Closed;
        self.generation = self.generation.wrapping_add(1);
        self.tree = None;
        self.selection.clear();
        self.manual_text.clear();
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SelectorState],
    ) -> Result<(), SelectorError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SelectorError {
        SelectorError::InvalidState {
            operation,
            state: self.state,
        }
    }
}
