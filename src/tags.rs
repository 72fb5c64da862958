//! Ordered key/value tag lists.
//!
//! A [`TagList`] is a sequence, not a mapping: the same key may appear more
//! than once and insertion order is kept end to end.

use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList(Vec<Tag>);

impl TagList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push(Tag::new(key, value));
    }

    pub fn extend(&mut self, other: TagList) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    /// Position of the first tag with `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.0.iter().position(|tag| tag.key == key)
    }

    /// Stable reorder so keys follow their first position in `reference`.
    /// Keys absent from `reference` keep their relative order at the end.
    pub fn order_like(&mut self, reference: &TagList) {
        self.0
            .sort_by_cached_key(|tag| reference.position(&tag.key).unwrap_or(usize::MAX));
    }
}

impl<K, V> FromIterator<(K, V)> for TagList
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| Tag::new(k, v)).collect())
    }
}

impl IntoIterator for TagList {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for TagList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for tag in &self.0 {
            map.serialize_entry(&tag.key, &tag.value)?;
        }
        map.end()
    }
}
