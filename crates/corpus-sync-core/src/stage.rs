//! Grouping of ordered operations into sequential stages.
//!
//! A stage is a maximal run of consecutive operations sharing the same
//! phase and depth. Operations inside a stage have no dependencies on one
//! another and may run concurrently; stages must run one after the other.

use crate::models::{Phase, SyncOperation};

/// A batch of operations at one dependency level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub phase: Phase,
    pub depth: usize,
    pub operations: Vec<SyncOperation>,
}

impl Stage {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Label for logs, e.g. `"upsert@1"` or `"delete@2"`.
    pub fn label(&self) -> String {
        let phase = match self.phase {
            Phase::Upsert => "upsert",
            Phase::Delete => "delete",
        };
        format!("{}@{}", phase, self.depth)
    }
}

/// Split a diff-ordered operation list into stages, preserving order.
pub fn plan_stages(operations: Vec<SyncOperation>) -> Vec<Stage> {
    let mut stages: Vec<Stage> = Vec::new();
    for op in operations {
        let (phase, depth) = (op.phase(), op.depth());
        match stages.last_mut() {
            Some(stage) if stage.phase == phase && stage.depth == depth => {
                stage.operations.push(op);
            }
            _ => stages.push(Stage {
                phase,
                depth,
                operations: vec![op],
            }),
        }
    }
    stages
}
