//! Per-entity filter calls.

use serde::Serialize;

use super::contract::{MemberRequest, RuleSet};
use super::error::TransformError;
use crate::entity::{Entity, EntityKind};
use crate::tags::TagList;

/// Outcome of the object filter. `polygon` and `roads` are set for ways only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterDecision {
    pub drop: bool,
    #[serde(rename = "tags")]
    pub output_tags: TagList,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roads: Option<i32>,
}

/// Outcome of the relation member filter. `member_superseded` has one entry
/// per member, in member order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationFilterDecision {
    pub drop: bool,
    #[serde(rename = "tags")]
    pub output_tags: TagList,
    pub make_boundary: i32,
    pub make_polygon: i32,
    pub roads: i32,
    pub member_superseded: Vec<i32>,
}

/// Run the entry point matching the entity's kind.
///
/// With `extra_attributes` set, provenance tags are appended to the input
/// and counted in the tag count handed to the rule set.
pub fn filter_object<R>(
    rules: &mut R,
    entity: &Entity,
    extra_attributes: bool,
) -> Result<FilterDecision, TransformError>
where
    R: RuleSet + ?Sized,
{
    let input = entity.input_tags(extra_attributes);
    let count = input.len();

    let decision = match entity.kind {
        EntityKind::Node => {
            let reply = rules.filter_node(&input, count)?;
            FilterDecision {
                drop: reply.drop,
                output_tags: reply.tags,
                polygon: None,
                roads: None,
            }
        }
        EntityKind::Way => {
            let reply = rules.filter_way(&input, count)?;
            FilterDecision {
                drop: reply.drop,
                output_tags: reply.tags,
                polygon: Some(reply.polygon),
                roads: Some(reply.roads),
            }
        }
        EntityKind::Relation => {
            let reply = rules.filter_relation(&input, count)?;
            FilterDecision {
                drop: reply.drop,
                output_tags: reply.tags,
                polygon: None,
                roads: None,
            }
        }
    };

    Ok(decision)
}

/// Run the relation member entry point.
///
/// `members` and `roles` are parallel; the member count is `roles.len()`.
pub fn filter_members<R>(
    rules: &mut R,
    relation_tags: &TagList,
    members: &[TagList],
    roles: &[String],
) -> Result<RelationFilterDecision, TransformError>
where
    R: RuleSet + ?Sized,
{
    debug_assert_eq!(
        members.len(),
        roles.len(),
        "member tag lists and roles must be parallel"
    );

    let request = MemberRequest {
        relation_tags,
        member_tags: members,
        roles,
    };
    let count = request.member_count();
    let reply = rules.filter_relation_member(&request)?;

    if reply.member_superseded.len() != count {
        return Err(TransformError::Malformed {
            function: "relation member filter".to_string(),
            reason: format!(
                "failed to read member_superseded: expected {count} entries, got {}",
                reply.member_superseded.len()
            ),
        });
    }

    Ok(RelationFilterDecision {
        drop: reply.drop,
        output_tags: reply.tags,
        make_boundary: reply.make_boundary,
        make_polygon: reply.make_polygon,
        roads: reply.roads,
        member_superseded: reply.member_superseded,
    })
}
