//! Tag transformation through a pluggable rule set.
//!
//! A rule set exposes four entry points (node, way, relation, relation
//! member). [`filter_object`] and [`filter_members`] marshal one entity's tags
//! into a call, validate what comes back and return a decision. Nothing is
//! kept between calls except the rule set's own state.
//!
//! Style scripts are written in Rhai. Each entry point returns its values as
//! an array in a fixed order:
//!
//! ```text
//! filter_tags_node(tags, num_tags)                  -> [drop, tags]
//! filter_tags_way(tags, num_tags)                   -> [drop, tags, polygon, roads]
//! filter_basic_tags_rel(tags, num_tags)             -> [drop, tags]
//! filter_tags_relation_member(tags, member_tags,
//!                             member_roles, count)  -> [drop, tags, member_superseded,
//!                                                       make_boundary, make_polygon, roads]
//! ```
//!
//! Returned tag tables are object maps or arrays of `[key, value]` pairs.

mod contract;
mod error;
mod filter;
mod marshal;
mod script;
#[cfg(test)]
pub(crate) mod testing;

pub use contract::{
    DEFAULT_NODE_FUNCTION, DEFAULT_RELATION_FUNCTION, DEFAULT_RELATION_MEMBER_FUNCTION,
    DEFAULT_WAY_FUNCTION, FunctionNames, RuleSet,
};
pub use error::TransformError;
pub use filter::{FilterDecision, RelationFilterDecision, filter_members, filter_object};
pub use script::ScriptRuleSet;
