//! In-memory canvas
//!
//! A [`Canvas`] backed by a node list. It records every mutation so callers
//! can assert what reached the screen and in which order.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use vitrine_store::{Canvas, Node};

/// One recorded canvas mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasMutation {
    /// Children replaced
    Replaced(Vec<Node>),
    /// Canvas cleared
    Cleared,
}

/// Headless canvas
#[derive(Debug, Default)]
pub struct MemoryCanvas {
    id: String,
    children: RwLock<Vec<Node>>,
    log: RwLock<Vec<CanvasMutation>>,
    mutations: AtomicU64,
}

impl MemoryCanvas {
    /// Create canvas
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Number of mutations so far
    #[inline]
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Recorded mutations
    #[must_use]
    pub fn mutations(&self) -> Vec<CanvasMutation> {
        self.log.read().clone()
    }

    /// HTML of the mounted tree
    #[must_use]
    pub fn html(&self) -> String {
        self.children.read().iter().map(Node::to_html).collect()
    }

    /// Whether nothing is mounted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    fn record(&self, mutation: CanvasMutation) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.log.write().push(mutation);
    }
}

impl Canvas for MemoryCanvas {
    fn id(&self) -> &str {
        &self.id
    }

    fn replace_children(&self, nodes: Vec<Node>) {
        *self.children.write() = nodes.clone();
        self.record(CanvasMutation::Replaced(nodes));
    }

    fn clear(&self) {
        self.children.write().clear();
        self.record(CanvasMutation::Cleared);
    }

    fn children(&self) -> Vec<Node> {
        self.children.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_mutations_in_order() {
        let canvas = MemoryCanvas::new("root");
        canvas.replace_children(vec![Node::element("a")]);
        canvas.clear();

        assert_eq!(canvas.mutation_count(), 2);
        assert_eq!(
            canvas.mutations(),
            vec![
                CanvasMutation::Replaced(vec![Node::element("a")]),
                CanvasMutation::Cleared
            ]
        );
        assert!(canvas.is_empty());
    }

    #[test]
    fn html_of_mounted_tree() {
        let canvas = MemoryCanvas::new("root");
        canvas.replace_children(vec![Node::element("b").with_text("hi")]);
        assert_eq!(canvas.html(), "<b>hi</b>");
    }
}
