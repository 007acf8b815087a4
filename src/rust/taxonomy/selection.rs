use super::tree::{CategoryTree, TreeRow};

/// The single category currently picked in a selector.
///
/// Selecting always replaces what was there before; there is no
/// multi-select and picking the same row again does not deselect it.
/// `selected_label` is the system of record: a row is selected exactly when
/// its [`category value`](CategoryTree::category_value) equals it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected_path: Vec<String>,
    selected_label: String,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, path: Vec<String>, label: impl Into<String>) {
        self.selected_path = path;
        self.selected_label = label.into();
    }

    pub fn select_row(&mut self, tree: &CategoryTree, row: &TreeRow) {
        self.select(row.path.clone(), tree.category_value(row));
    }

    pub fn clear(&mut self) {
        self.selected_path.clear();
        self.selected_label.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.selected_label.trim().is_empty()
    }

    pub fn label(&self) -> &str {
        &self.selected_label
    }

    pub fn path(&self) -> &[String] {
        &self.selected_path
    }

    /// Path formatted for people, e.g. `Electronics / Phones`
    pub fn display_path(&self) -> String {
        self.selected_path.join(" / ")
    }

    pub fn is_selected(&self, category_value: &str) -> bool {
        !self.is_empty() && self.selected_label == category_value
    }
}
