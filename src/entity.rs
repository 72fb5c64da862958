use crate::metadata::Attributes;
use crate::tags::TagList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    Way,
    Relation,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Way => "way",
            EntityKind::Relation => "relation",
        }
    }
}

/// A reference from a relation to another entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub kind: EntityKind,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: i64,
    pub tags: TagList,
    pub attributes: Attributes,
    /// Empty for nodes and ways.
    pub members: Vec<Member>,
}

impl Entity {
    pub fn new(kind: EntityKind, id: i64, tags: TagList) -> Self {
        Self {
            kind,
            id,
            tags,
            attributes: Attributes::default(),
            members: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = members;
        self
    }

    /// Tags handed to a rule set: the entity's own tags, followed by the
    /// provenance tags when `extra_attributes` is set.
    pub fn input_tags(&self, extra_attributes: bool) -> TagList {
        let mut tags = self.tags.clone();
        if extra_attributes {
            tags.extend(self.attributes.provenance_tags());
        }
        tags
    }
}
