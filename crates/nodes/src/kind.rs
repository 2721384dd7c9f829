//! The closed set of node kinds the editor can produce.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Workflow entry point; optionally launches an application.
    Start,
    Click,
    Input,
    /// Stops an application.
    Close,
    Wait,
    Scroll,
    Screenshot,
    /// Boolean branch on an on-screen check (`true` / `false` handles).
    Condition,
    /// Counted loop (`loop` / `end` handles).
    Loop,
    Swipe,
}

impl NodeKind {
    /// Every kind, in declaration order.
    pub const ALL: [NodeKind; 10] = [
        NodeKind::Start,
        NodeKind::Click,
        NodeKind::Input,
        NodeKind::Close,
        NodeKind::Wait,
        NodeKind::Scroll,
        NodeKind::Screenshot,
        NodeKind::Condition,
        NodeKind::Loop,
        NodeKind::Swipe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Click => "click",
            NodeKind::Input => "input",
            NodeKind::Close => "close",
            NodeKind::Wait => "wait",
            NodeKind::Scroll => "scroll",
            NodeKind::Screenshot => "screenshot",
            NodeKind::Condition => "condition",
            NodeKind::Loop => "loop",
            NodeKind::Swipe => "swipe",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
