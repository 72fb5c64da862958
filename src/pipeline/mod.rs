use anyhow::{Context, Result};
use osmpbf::{DenseNode, Element, Node, PrimitiveBlock, RelMemberType, Relation, Way};
use std::collections::{HashMap, HashSet};

use crate::config::RuntimeConfig;
use crate::entity::{Entity, EntityKind, Member};
use crate::metadata::Attributes;
use crate::sinks::{DecisionSink, OutputRecord};
use crate::tags::TagList;
use crate::transform::{RuleSet, TransformError, filter_members, filter_object};

/// Settings shared by every block of a pass.
pub struct BlockContext<'a> {
    pub extra_attributes: bool,
    pub runtime: &'a RuntimeConfig,
    /// Ways referenced by some relation; their tags are kept for the member pass.
    pub member_ways: &'a HashSet<i64>,
}

/// A relation kept by the basic filter, waiting for its member ways.
#[derive(Debug, Clone)]
pub struct PendingRelation {
    pub id: i64,
    /// Output tags of the basic relation filter.
    pub tags: TagList,
    /// Way members as `(way id, role)` in member order.
    pub ways: Vec<(i64, String)>,
}

#[derive(Debug, Default)]
pub struct BlockOutput {
    pub records: Vec<OutputRecord>,
    pub member_way_tags: Vec<(i64, TagList)>,
    pub relations: Vec<PendingRelation>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KindStats {
    pub processed: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl KindStats {
    fn merge(&mut self, other: &KindStats) {
        self.processed += other.processed;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    pub nodes: KindStats,
    pub ways: KindStats,
    pub relations: KindStats,
    pub relation_members: KindStats,
}

impl FilterStats {
    pub fn merge(&mut self, other: &FilterStats) {
        self.nodes.merge(&other.nodes);
        self.ways.merge(&other.ways);
        self.relations.merge(&other.relations);
        self.relation_members.merge(&other.relation_members);
    }

    fn kind_mut(&mut self, kind: EntityKind) -> &mut KindStats {
        match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Way => &mut self.ways,
            EntityKind::Relation => &mut self.relations,
        }
    }

    pub fn failed(&self) -> u64 {
        self.nodes.failed + self.ways.failed + self.relations.failed + self.relation_members.failed
    }

    pub fn log_summary(&self) {
        for (label, counts) in [
            ("nodes", &self.nodes),
            ("ways", &self.ways),
            ("relations", &self.relations),
            ("relation members", &self.relation_members),
        ] {
            tracing::info!(
                "{}: {} processed, {} dropped, {} failed",
                label,
                counts.processed,
                counts.dropped,
                counts.failed
            );
        }
    }
}

pub fn node_entity(node: &Node) -> Entity {
    Entity::new(EntityKind::Node, node.id(), node.tags().collect())
        .with_attributes(Attributes::from_info(&node.info()))
}

pub fn dense_node_entity(node: &DenseNode) -> Entity {
    let attributes = node
        .info()
        .map(Attributes::from_dense_info)
        .unwrap_or_default();
    Entity::new(EntityKind::Node, node.id(), node.tags().collect()).with_attributes(attributes)
}

pub fn way_entity(way: &Way) -> Entity {
    Entity::new(EntityKind::Way, way.id(), way.tags().collect())
        .with_attributes(Attributes::from_info(&way.info()))
}

pub fn relation_entity(relation: &Relation) -> Entity {
    let members = relation
        .members()
        .map(|member| Member {
            kind: match member.member_type {
                RelMemberType::Node => EntityKind::Node,
                RelMemberType::Way => EntityKind::Way,
                RelMemberType::Relation => EntityKind::Relation,
            },
            id: member.member_id,
            role: member.role().map(|r| r.to_string()).unwrap_or_default(),
        })
        .collect();
    Entity::new(EntityKind::Relation, relation.id(), relation.tags().collect())
        .with_attributes(Attributes::from_info(&relation.info()))
        .with_members(members)
}

/// Way ids referenced by the relations of one block.
pub fn relation_way_members(block: &PrimitiveBlock) -> HashSet<i64> {
    let mut ids = HashSet::new();
    for element in block.elements() {
        if let Element::Relation(relation) = element {
            ids.extend(
                relation
                    .members()
                    .filter(|member| matches!(member.member_type, RelMemberType::Way))
                    .map(|member| member.member_id),
            );
        }
    }
    ids
}

/// Run every element of a block through the object filter.
pub fn filter_block<R>(
    rules: &mut R,
    block: &PrimitiveBlock,
    ctx: &BlockContext,
    stats: &mut FilterStats,
) -> Result<BlockOutput>
where
    R: RuleSet + ?Sized,
{
    let mut output = BlockOutput::default();
    for element in block.elements() {
        let entity = match element {
            Element::Node(node) => node_entity(&node),
            Element::DenseNode(node) => dense_node_entity(&node),
            Element::Way(way) => way_entity(&way),
            Element::Relation(relation) => relation_entity(&relation),
        };
        filter_entity(rules, entity, ctx, stats, &mut output)?;
    }
    Ok(output)
}

/// Filter one entity and file the result into `output`.
///
/// Per-entity rule set failures skip the entity unless the run is strict.
/// Tags of relation member ways are kept even when their own filter call
/// fails or drops them.
pub fn filter_entity<R>(
    rules: &mut R,
    entity: Entity,
    ctx: &BlockContext,
    stats: &mut FilterStats,
    output: &mut BlockOutput,
) -> Result<()>
where
    R: RuleSet + ?Sized,
{
    // The member pass reads a way's input tags, whatever its own decision.
    if entity.kind == EntityKind::Way && ctx.member_ways.contains(&entity.id) {
        output
            .member_way_tags
            .push((entity.id, entity.tags.clone()));
    }

    let counts = stats.kind_mut(entity.kind);
    counts.processed += 1;

    let decision = match filter_object(rules, &entity, ctx.extra_attributes) {
        Ok(decision) => decision,
        Err(err) => {
            counts.failed += 1;
            return skip_or_fail(err, ctx.runtime, entity.kind.label(), entity.id);
        }
    };

    if decision.drop {
        counts.dropped += 1;
    }

    match entity.kind {
        EntityKind::Relation if !decision.drop => {
            let ways: Vec<(i64, String)> = entity
                .members
                .into_iter()
                .filter(|member| member.kind == EntityKind::Way)
                .map(|member| (member.id, member.role))
                .collect();
            if !ways.is_empty() {
                output.relations.push(PendingRelation {
                    id: entity.id,
                    tags: decision.output_tags.clone(),
                    ways,
                });
            }
        }
        _ => {}
    }

    if decision.drop && !ctx.runtime.include_dropped {
        return Ok(());
    }

    let id = entity.id;
    output.records.push(match entity.kind {
        EntityKind::Node => OutputRecord::Node { id, decision },
        EntityKind::Way => OutputRecord::Way { id, decision },
        EntityKind::Relation => OutputRecord::Relation { id, decision },
    });
    Ok(())
}

/// Run deferred relations through the relation member filter.
///
/// Members whose way tags were not seen in the input are left out; a
/// relation with no remaining members is skipped.
pub fn filter_relations<R>(
    rules: &mut R,
    pending: &[PendingRelation],
    way_tags: &HashMap<i64, TagList>,
    runtime: &RuntimeConfig,
    sink: &mut dyn DecisionSink,
    stats: &mut FilterStats,
) -> Result<()>
where
    R: RuleSet + ?Sized,
{
    for relation in pending {
        let mut way_ids = Vec::with_capacity(relation.ways.len());
        let mut members = Vec::with_capacity(relation.ways.len());
        let mut roles = Vec::with_capacity(relation.ways.len());
        for (way_id, role) in &relation.ways {
            if let Some(tags) = way_tags.get(way_id) {
                way_ids.push(*way_id);
                members.push(tags.clone());
                roles.push(role.clone());
            }
        }

        if way_ids.is_empty() {
            tracing::debug!("Relation {} has no way members in the input", relation.id);
            continue;
        }

        stats.relation_members.processed += 1;
        let decision = match filter_members(rules, &relation.tags, &members, &roles) {
            Ok(decision) => decision,
            Err(err) => {
                stats.relation_members.failed += 1;
                skip_or_fail(err, runtime, "relation", relation.id)?;
                continue;
            }
        };

        if decision.drop {
            stats.relation_members.dropped += 1;
            if !runtime.include_dropped {
                continue;
            }
        }

        sink.write(&OutputRecord::RelationMembers {
            id: relation.id,
            members: way_ids,
            decision,
        })
        .with_context(|| format!("Pipeline: Failed writing relation {}", relation.id))?;
    }
    Ok(())
}

fn skip_or_fail(err: TransformError, runtime: &RuntimeConfig, kind: &str, id: i64) -> Result<()> {
    if err.is_per_entity() && !runtime.strict {
        tracing::warn!("Skipping {} {}: {}", kind, id, err);
        return Ok(());
    }
    Err(anyhow::Error::new(err).context(format!("Pipeline: Failed to filter {} {}", kind, id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::testing::script_with;
    use crate::transform::{FunctionNames, ScriptRuleSet};

    fn tags(pairs: &[(&str, &str)]) -> TagList {
        pairs.iter().copied().collect()
    }

    fn rules_with(overrides: &[(&str, &str)]) -> ScriptRuleSet {
        ScriptRuleSet::from_source(&script_with(overrides), FunctionNames::default()).unwrap()
    }

    const DROP_UNTAGGED: (&str, &str) = (
        "filter_tags_node",
        r#"fn filter_tags_node(tags, num_tags) {
            if "fail" in tags { throw "rule set failure"; }
            [num_tags == 0, tags]
        }"#,
    );

    struct Harness {
        runtime: RuntimeConfig,
        member_ways: HashSet<i64>,
    }

    impl Harness {
        fn new(runtime: RuntimeConfig) -> Self {
            Self {
                runtime,
                member_ways: HashSet::from([20]),
            }
        }

        fn ctx(&self) -> BlockContext<'_> {
            BlockContext {
                extra_attributes: false,
                runtime: &self.runtime,
                member_ways: &self.member_ways,
            }
        }
    }

    #[test]
    fn dropped_entities_are_counted_not_written() {
        let harness = Harness::new(RuntimeConfig::default());
        let mut rules = rules_with(&[DROP_UNTAGGED]);
        let mut stats = FilterStats::default();
        let mut output = BlockOutput::default();

        for (id, pairs) in [(1, vec![]), (2, vec![("amenity", "cafe")])] {
            let entity = Entity::new(EntityKind::Node, id, tags(&pairs));
            filter_entity(&mut rules, entity, &harness.ctx(), &mut stats, &mut output).unwrap();
        }

        assert_eq!(stats.nodes.processed, 2);
        assert_eq!(stats.nodes.dropped, 1);
        assert_eq!(output.records.len(), 1);
        assert!(matches!(output.records[0], OutputRecord::Node { id: 2, .. }));
    }

    #[test]
    fn include_dropped_writes_everything() {
        let harness = Harness::new(RuntimeConfig {
            include_dropped: true,
            ..RuntimeConfig::default()
        });
        let mut rules = rules_with(&[DROP_UNTAGGED]);
        let mut stats = FilterStats::default();
        let mut output = BlockOutput::default();

        let entity = Entity::new(EntityKind::Node, 1, TagList::new());
        filter_entity(&mut rules, entity, &harness.ctx(), &mut stats, &mut output).unwrap();
        assert_eq!(output.records.len(), 1);
    }

    #[test]
    fn per_entity_failure_is_skipped_unless_strict() {
        let mut rules = rules_with(&[DROP_UNTAGGED]);
        let failing = Entity::new(EntityKind::Node, 5, tags(&[("fail", "yes")]));

        let lenient = Harness::new(RuntimeConfig::default());
        let mut stats = FilterStats::default();
        let mut output = BlockOutput::default();
        filter_entity(
            &mut rules,
            failing.clone(),
            &lenient.ctx(),
            &mut stats,
            &mut output,
        )
        .unwrap();
        assert_eq!(stats.failed(), 1);
        assert!(output.records.is_empty());

        let strict = Harness::new(RuntimeConfig {
            strict: true,
            ..RuntimeConfig::default()
        });
        let err = filter_entity(&mut rules, failing, &strict.ctx(), &mut stats, &mut output)
            .unwrap_err();
        assert!(err.to_string().contains("node 5"), "{err}");
    }

    #[test]
    fn member_ways_and_relations_are_collected() {
        let harness = Harness::new(RuntimeConfig::default());
        let mut rules = rules_with(&[]);
        let mut stats = FilterStats::default();
        let mut output = BlockOutput::default();

        let way = Entity::new(EntityKind::Way, 20, tags(&[("natural", "water")]));
        let other_way = Entity::new(EntityKind::Way, 21, tags(&[("highway", "path")]));
        let relation = Entity::new(EntityKind::Relation, 30, tags(&[("type", "multipolygon")]))
            .with_members(vec![
                Member {
                    kind: EntityKind::Node,
                    id: 1,
                    role: "label".into(),
                },
                Member {
                    kind: EntityKind::Way,
                    id: 20,
                    role: "outer".into(),
                },
            ]);
        for entity in [way, other_way, relation] {
            filter_entity(&mut rules, entity, &harness.ctx(), &mut stats, &mut output).unwrap();
        }

        assert_eq!(output.member_way_tags, vec![(20, tags(&[("natural", "water")]))]);
        assert_eq!(output.relations.len(), 1);
        assert_eq!(output.relations[0].ways, vec![(20, "outer".to_string())]);
        assert_eq!(output.records.len(), 3);
    }

    #[test]
    fn failing_member_way_still_reaches_the_member_pass() {
        let harness = Harness::new(RuntimeConfig::default());
        let mut rules = rules_with(&[(
            "filter_tags_way",
            r#"fn filter_tags_way(tags, num_tags) { throw "way filter failed"; }"#,
        )]);
        let mut stats = FilterStats::default();
        let mut output = BlockOutput::default();

        let way = Entity::new(EntityKind::Way, 20, tags(&[("natural", "water")]));
        let relation = Entity::new(EntityKind::Relation, 30, tags(&[("type", "multipolygon")]))
            .with_members(vec![Member {
                kind: EntityKind::Way,
                id: 20,
                role: "outer".into(),
            }]);
        for entity in [way, relation] {
            filter_entity(&mut rules, entity, &harness.ctx(), &mut stats, &mut output).unwrap();
        }

        assert_eq!(stats.ways.failed, 1);
        assert_eq!(output.member_way_tags, vec![(20, tags(&[("natural", "water")]))]);

        let way_tags: HashMap<i64, TagList> = output.member_way_tags.into_iter().collect();
        let mut sink = VecSink(Vec::new());
        filter_relations(
            &mut rules,
            &output.relations,
            &way_tags,
            &RuntimeConfig::default(),
            &mut sink,
            &mut stats,
        )
        .unwrap();

        assert_eq!(sink.0.len(), 1);
        match &sink.0[0] {
            OutputRecord::RelationMembers {
                members, decision, ..
            } => {
                assert_eq!(members, &vec![20]);
                assert_eq!(decision.member_superseded, vec![0]);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    struct VecSink(Vec<OutputRecord>);

    impl DecisionSink for VecSink {
        fn write(&mut self, record: &OutputRecord) -> Result<()> {
            self.0.push(record.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn relation_pass_uses_known_members_only() {
        let mut rules = rules_with(&[(
            "filter_tags_relation_member",
            r#"fn filter_tags_relation_member(tags, member_tags, roles, membercount) {
                let superseded = [];
                for m in member_tags { superseded.push(if m.natural == "water" { 1 } else { 0 }); }
                [false, tags, superseded, 0, 1, 0]
            }"#,
        )]);
        let pending = vec![
            PendingRelation {
                id: 30,
                tags: tags(&[("type", "multipolygon")]),
                ways: vec![(20, "outer".into()), (99, "inner".into())],
            },
            PendingRelation {
                id: 31,
                tags: tags(&[("type", "multipolygon")]),
                ways: vec![(98, "outer".into())],
            },
        ];
        let way_tags = HashMap::from([(20, tags(&[("natural", "water")]))]);
        let mut sink = VecSink(Vec::new());
        let mut stats = FilterStats::default();

        filter_relations(
            &mut rules,
            &pending,
            &way_tags,
            &RuntimeConfig::default(),
            &mut sink,
            &mut stats,
        )
        .unwrap();

        assert_eq!(stats.relation_members.processed, 1);
        assert_eq!(sink.0.len(), 1);
        match &sink.0[0] {
            OutputRecord::RelationMembers {
                id,
                members,
                decision,
            } => {
                assert_eq!(*id, 30);
                assert_eq!(members, &vec![20]);
                assert_eq!(decision.member_superseded, vec![1]);
                assert_eq!(decision.make_polygon, 1);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
}
