//! Deferred graph-validation callbacks.
//!
//! Hooks may register checks that only make sense once the entire graph
//! is in memory, typically cross-object consistency that a half-read
//! cycle cannot satisfy. The decoder collects them during the walk and
//! runs them after the top-level entity completes, highest priority
//! first; the first failure abandons the rest.

use object_graph_core::{StreamResult, ValidationCallback};

struct Node {
    cb: Box<dyn ValidationCallback>,
    priority: i32,
    next: Option<Box<Node>>,
}

/// Priority-ordered callback queue, drained once per top-level decode.
#[derive(Default)]
pub(crate) struct ValidationList {
    head: Option<Box<Node>>,
}

impl ValidationList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert in descending priority order. Equal priorities keep their
    /// registration order.
    pub(crate) fn register(&mut self, cb: Box<dyn ValidationCallback>, priority: i32) {
        let mut cursor = &mut self.head;
        while cursor.as_ref().is_some_and(|n| n.priority >= priority) {
            cursor = &mut cursor.as_mut().unwrap().next;
        }
        let next = cursor.take();
        *cursor = Some(Box::new(Node { cb, priority, next }));
    }

    /// Run and drop every callback. The first failure drops the rest and
    /// surfaces.
    pub(crate) fn run(&mut self) -> StreamResult<()> {
        while let Some(node) = self.head.take() {
            self.head = node.next;
            if let Err(e) = node.cb.validate() {
                self.head = None;
                return Err(e);
            }
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.head = None;
    }
}

impl std::fmt::Debug for ValidationList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut len = 0;
        let mut cursor = &self.head;
        while let Some(node) = cursor {
            len += 1;
            cursor = &node.next;
        }
        f.debug_struct("ValidationList").field("pending", &len).finish()
    }
}
