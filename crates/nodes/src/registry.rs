//! Node kind → handler lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::{
    ClickNode, CloseNode, ConditionNode, InputNode, LoopNode, ScreenshotNode, ScrollNode,
    StartNode, SwipeNode, WaitNode,
};
use crate::{NodeHandler, NodeKind};

/// The built-in handler for `kind`.
///
/// Adding a [`NodeKind`] variant without a handler fails to compile here.
pub fn builtin_handler(kind: NodeKind) -> Arc<dyn NodeHandler> {
    match kind {
        NodeKind::Start => Arc::new(StartNode),
        NodeKind::Click => Arc::new(ClickNode),
        NodeKind::Input => Arc::new(InputNode),
        NodeKind::Close => Arc::new(CloseNode),
        NodeKind::Wait => Arc::new(WaitNode),
        NodeKind::Scroll => Arc::new(ScrollNode),
        NodeKind::Screenshot => Arc::new(ScreenshotNode),
        NodeKind::Condition => Arc::new(ConditionNode),
        NodeKind::Loop => Arc::new(LoopNode),
        NodeKind::Swipe => Arc::new(SwipeNode),
    }
}

/// Maps each [`NodeKind`] to the handler that executes it.
#[derive(Clone)]
pub struct NodeRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// A registry with no handlers; every lookup misses.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry holding the built-in handler for every kind.
    pub fn builtin() -> Self {
        let handlers = NodeKind::ALL
            .into_iter()
            .map(|kind| (kind, builtin_handler(kind)))
            .collect();
        Self { handlers }
    }

    /// Install `handler` for its kind, returning the one it replaces.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.insert(handler.kind(), handler)
    }

    pub fn get(&self, kind: NodeKind) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
