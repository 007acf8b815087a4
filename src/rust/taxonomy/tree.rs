use std::collections::HashMap;
use std::fmt::Write as _;

use log::{debug, warn};

use super::node::CategoryNode;
use super::selection::SelectionState;

/// Separator used when a node's path has to be derived from its ancestors
pub const PATH_SEPARATOR: &str = "/";

/// Number of spaces each hierarchy level is indented by when rendering
pub const INDENT_UNIT: usize = 2;

/// One visible entry of a walked tree, in render order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    /// Index of the node in [`CategoryTree::nodes`]
    pub node: usize,
    /// Distance from the root this row was reached from
    pub depth: usize,
    /// Names from the root down to this node
    pub path: Vec<String>,
    /// Whether any row is shown directly under this one
    pub has_children: bool,
}

impl TreeRow {
    /// Root-to-node names joined with [`PATH_SEPARATOR`]
    pub fn joined_path(&self) -> String {
        self.path.join(PATH_SEPARATOR)
    }
}

/// A category hierarchy rebuilt from a flat list of parent-referencing nodes.
///
/// The adjacency map (`parent name -> children`) is built once, keeping the
/// input order of siblings. Walking starts from every node with `level == 0`
/// and visits each node at most once, so malformed input with parent cycles
/// or repeated names still terminates. Nodes whose parent is missing from
/// the set are never reached and simply do not appear in [`rows`](Self::rows).
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    roots: Vec<usize>,
    children: HashMap<String, Vec<usize>>,
    rows: Vec<TreeRow>,
    cyclic: Vec<usize>,
}

impl CategoryTree {
    pub fn build(nodes: Vec<CategoryNode>) -> Self {
        let roots: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_root())
            .map(|(i, _)| i)
            .collect();

        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if node.is_root() {
                continue;
            }
            if let Some(parent) = node.parent_name() {
                children.entry(parent.to_string()).or_default().push(i);
            }
        }

        let cyclic = detect_cycles(&nodes);
        if !cyclic.is_empty() {
            warn!(
                "Category set contains a parent cycle through {} node(s): {:?}",
                cyclic.len(),
                cyclic.iter().map(|&i| nodes[i].name.as_str()).collect::<Vec<_>>()
            );
        }

        let rows = walk(&nodes, &roots, &children);
        if rows.len() < nodes.len() {
            debug!(
                "{} of {} categories are not reachable from a root and will not be shown",
                nodes.len() - rows.len(),
                nodes.len()
            );
        }

        Self { nodes, roots, children, rows, cyclic }
    }

    pub fn nodes(&self) -> &[CategoryNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&CategoryNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &CategoryNode> {
        self.roots.iter().map(move |&i| &self.nodes[i])
    }

    /// Children of the node called `name`, in input order
    pub fn children_of(&self, name: &str) -> Vec<&CategoryNode> {
        self.children
            .get(name)
            .map(|indices| indices.iter().map(|&i| &self.nodes[i]).collect())
            .unwrap_or_default()
    }

    /// Depth-first rows: roots first, each followed by its subtree
    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    /// Nodes sitting on a parent cycle
    pub fn cyclic(&self) -> Vec<&CategoryNode> {
        self.cyclic.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Nodes that never show up in [`rows`](Self::rows)
    pub fn orphans(&self) -> Vec<&CategoryNode> {
        let mut shown = vec![false; self.nodes.len()];
        for row in &self.rows {
            shown[row.node] = true;
        }
        self.nodes
            .iter()
            .zip(shown)
            .filter(|(_, shown)| !shown)
            .map(|(node, _)| node)
            .collect()
    }

    /// The string a row stands for when it is picked: the node's precomputed
    /// full path if it has one, otherwise the joined root-to-node names.
    pub fn category_value(&self, row: &TreeRow) -> String {
        match self.nodes.get(row.node).and_then(|n| n.full_path.as_deref()) {
            Some(full_path) if !full_path.is_empty() => full_path.to_string(),
            _ => row.joined_path(),
        }
    }

    /// Finds the row whose category value (or joined path) equals `value`
    pub fn find_row(&self, value: &str) -> Option<&TreeRow> {
        let value = value.trim();
        self.rows
            .iter()
            .find(|row| self.category_value(row) == value)
            .or_else(|| self.rows.iter().find(|row| row.joined_path() == value))
    }

    /// Renders the tree as indented text, one line per row.
    ///
    /// Branches are marked with `+`, leaves with `-`, and the selected row
    /// (if any) gets a trailing `[x]`.
    pub fn render(&self, selection: Option<&SelectionState>) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let _ = writeln!(out, "{}", self.render_row(row, selection));
        }
        out
    }

    /// Same as [`render`](Self::render) with a 1-based row number in front
    /// of every line, for picking rows by number.
    pub fn render_numbered(&self, selection: Option<&SelectionState>) -> String {
        let width = self.rows.len().to_string().len();
        let mut out = String::new();
        for (i, row) in self.rows.iter().enumerate() {
            let _ = writeln!(out, "{:>width$}) {}", i + 1, self.render_row(row, selection));
        }
        out
    }

    fn render_row(&self, row: &TreeRow, selection: Option<&SelectionState>) -> String {
        let node = &self.nodes[row.node];
        let marker = if row.has_children { '+' } else { '-' };
        let selected = selection
            .map(|s| s.is_selected(&self.category_value(row)))
            .unwrap_or(false);
        format!(
            "{}{} {}{}",
            " ".repeat(node.level * INDENT_UNIT),
            marker,
            node.name,
            if selected { " [x]" } else { "" }
        )
    }
}

fn walk(
    nodes: &[CategoryNode],
    roots: &[usize],
    children: &HashMap<String, Vec<usize>>,
) -> Vec<TreeRow> {
    let mut rows: Vec<TreeRow> = Vec::with_capacity(nodes.len());
    let mut visited = vec![false; nodes.len()];
    // (node, depth, path to parent, row of the parent)
    let mut stack: Vec<(usize, usize, Vec<String>, Option<usize>)> =
        roots.iter().rev().map(|&i| (i, 0, Vec::new(), None)).collect();

    while let Some((index, depth, mut path, parent_row)) = stack.pop() {
        if visited[index] {
            continue;
        }
        visited[index] = true;

        // A branch is only a branch if something is actually shown under it
        if let Some(parent_row) = parent_row {
            rows[parent_row].has_children = true;
        }

        let node = &nodes[index];
        path.push(node.name.clone());
        let row_index = rows.len();
        let kids = children.get(&node.name).map(Vec::as_slice).unwrap_or(&[]);
        for &child in kids.iter().rev() {
            if !visited[child] {
                stack.push((child, depth + 1, path.clone(), Some(row_index)));
            }
        }

        rows.push(TreeRow {
            node: index,
            depth,
            path,
            has_children: false,
        });
    }

    rows
}

/// Follows every node's parent chain and returns the indices on a cycle.
fn detect_cycles(nodes: &[CategoryNode]) -> Vec<usize> {
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        by_name.entry(node.name.as_str()).or_insert(i);
    }

    let mut settled = vec![false; nodes.len()];
    let mut on_cycle = Vec::new();

    for start in 0..nodes.len() {
        if settled[start] {
            continue;
        }
        let mut chain: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = Some(start);

        while let Some(i) = current {
            if settled[i] {
                break;
            }
            if let Some(&pos) = position.get(&i) {
                on_cycle.extend_from_slice(&chain[pos..]);
                break;
            }
            position.insert(i, chain.len());
            chain.push(i);
            current = nodes[i].parent_name().and_then(|p| by_name.get(p).copied());
        }

        for i in chain {
            settled[i] = true;
        }
    }

    on_cycle.sort_unstable();
    on_cycle
}
