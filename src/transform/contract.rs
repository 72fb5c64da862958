//! The four entry points every rule set provides.
//!
//! Replies use named fields. The positional order a script returns its values
//! in is documented on each reply type; that order is part of the contract.

use super::error::TransformError;
use crate::tags::TagList;

pub const DEFAULT_NODE_FUNCTION: &str = "filter_tags_node";
pub const DEFAULT_WAY_FUNCTION: &str = "filter_tags_way";
pub const DEFAULT_RELATION_FUNCTION: &str = "filter_basic_tags_rel";
pub const DEFAULT_RELATION_MEMBER_FUNCTION: &str = "filter_tags_relation_member";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Node,
    Way,
    Relation,
    RelationMember,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 4] = [
        EntryPoint::Node,
        EntryPoint::Way,
        EntryPoint::Relation,
        EntryPoint::RelationMember,
    ];

    /// Number of arguments the entry point is called with.
    pub fn arity(&self) -> usize {
        match self {
            EntryPoint::RelationMember => 4,
            _ => 2,
        }
    }
}

/// Names the entry points are looked up under, so several rule sets can
/// share one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionNames {
    pub node: String,
    pub way: String,
    pub relation: String,
    pub relation_member: String,
}

impl FunctionNames {
    pub fn get(&self, entry: EntryPoint) -> &str {
        match entry {
            EntryPoint::Node => &self.node,
            EntryPoint::Way => &self.way,
            EntryPoint::Relation => &self.relation,
            EntryPoint::RelationMember => &self.relation_member,
        }
    }
}

impl Default for FunctionNames {
    fn default() -> Self {
        Self {
            node: DEFAULT_NODE_FUNCTION.to_string(),
            way: DEFAULT_WAY_FUNCTION.to_string(),
            relation: DEFAULT_RELATION_FUNCTION.to_string(),
            relation_member: DEFAULT_RELATION_MEMBER_FUNCTION.to_string(),
        }
    }
}

/// Reply of the node and relation entry points: `[drop, tags]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReply {
    pub drop: bool,
    pub tags: TagList,
}

/// Reply of the way entry point: `[drop, tags, polygon, roads]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WayReply {
    pub drop: bool,
    pub tags: TagList,
    pub polygon: i32,
    pub roads: i32,
}

/// Arguments of the relation member entry point.
#[derive(Debug, Clone, Copy)]
pub struct MemberRequest<'a> {
    pub relation_tags: &'a TagList,
    pub member_tags: &'a [TagList],
    pub roles: &'a [String],
}

impl MemberRequest<'_> {
    pub fn member_count(&self) -> usize {
        self.roles.len()
    }
}

/// Reply of the relation member entry point:
/// `[drop, tags, member_superseded, make_boundary, make_polygon, roads]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReply {
    pub drop: bool,
    pub tags: TagList,
    pub member_superseded: Vec<i32>,
    pub make_boundary: i32,
    pub make_polygon: i32,
    pub roads: i32,
}

/// Pluggable tag transformation logic.
///
/// Calls take `&mut self`: an instance carries interpreter state that a call
/// mutates, so one instance serves one worker at a time. Parallel callers
/// load one instance each.
pub trait RuleSet {
    fn filter_node(&mut self, tags: &TagList, count: usize) -> Result<TagReply, TransformError>;

    fn filter_way(&mut self, tags: &TagList, count: usize) -> Result<WayReply, TransformError>;

    fn filter_relation(
        &mut self,
        tags: &TagList,
        count: usize,
    ) -> Result<TagReply, TransformError>;

    fn filter_relation_member(
        &mut self,
        request: &MemberRequest<'_>,
    ) -> Result<MemberReply, TransformError>;
}
