use anyhow::Result;
use serde::Serialize;

pub mod jsonl;

pub use self::jsonl::JsonlSink;

use crate::transform::{FilterDecision, RelationFilterDecision};

/// One line of output: a decision and the entity it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputRecord {
    Node {
        id: i64,
        #[serde(flatten)]
        decision: FilterDecision,
    },
    Way {
        id: i64,
        #[serde(flatten)]
        decision: FilterDecision,
    },
    Relation {
        id: i64,
        #[serde(flatten)]
        decision: FilterDecision,
    },
    RelationMembers {
        id: i64,
        /// Way ids, parallel to `member_superseded`.
        members: Vec<i64>,
        #[serde(flatten)]
        decision: RelationFilterDecision,
    },
}

pub trait DecisionSink: Send {
    fn write(&mut self, record: &OutputRecord) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}
