use super::selector::SelectorState;

/// Errors returned when a [`CategorySelector`](super::CategorySelector) is
/// driven out of order or asked for something it does not have.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Cannot {operation} while the selector is {state}")]
    InvalidState {
        operation: &'static str,
        state: SelectorState,
    },
    #[error("Not logged in or session expired; log in again")]
    LoginRequired,
    #[error("Nothing selected: pick a category or enter one manually")]
    NothingSelected,
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Row {0} is out of range")]
    RowOutOfRange(usize),
}
