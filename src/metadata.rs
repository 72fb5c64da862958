use osmpbf::{DenseNodeInfo, Info};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::tags::TagList;

/// Object metadata used for the `osm_*` provenance tags.
///
/// A `version` of 0 means the input carried no metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub version: u32,
    pub changeset: i64,
    pub timestamp: Option<String>,
    pub uid: i64,
    pub user: String,
}

impl Attributes {
    pub fn from_info(info: &Info) -> Self {
        Self {
            version: info
                .version()
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0),
            changeset: info.changeset().unwrap_or(0),
            timestamp: info.milli_timestamp().and_then(format_timestamp_millis),
            uid: info.uid().map(i64::from).unwrap_or(0),
            user: info
                .user()
                .and_then(|user| user.ok())
                .map(|s| s.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn from_dense_info(info: &DenseNodeInfo) -> Self {
        Self {
            version: u32::try_from(info.version()).unwrap_or(0),
            changeset: info.changeset(),
            timestamp: format_timestamp_millis(info.milli_timestamp()),
            uid: i64::from(info.uid()),
            user: info.user().map(|s| s.to_string()).unwrap_or_default(),
        }
    }

    /// Provenance tags appended to an entity's own tags when extra attributes
    /// are enabled. Empty when no version is known.
    pub fn provenance_tags(&self) -> TagList {
        if self.version == 0 {
            return TagList::new();
        }

        let mut tags = TagList::with_capacity(5);
        tags.push("osm_user", self.user.as_str());
        tags.push("osm_uid", self.uid.to_string());
        tags.push("osm_version", self.version.to_string());
        tags.push("osm_timestamp", self.timestamp.clone().unwrap_or_default());
        tags.push("osm_changeset", self.changeset.to_string());
        tags
    }
}

pub fn format_timestamp_millis(millis: i64) -> Option<String> {
    if millis <= 0 {
        return None;
    }
    let nanos = i128::from(millis) * 1_000_000;
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    dt.format(&Rfc3339).ok()
}
