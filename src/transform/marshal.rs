//! Conversion between host tag lists and script values.

use rhai::{Array, Dynamic, INT, Map};

use super::error::TransformError;
use crate::tags::TagList;

/// Encode tags as an object map. Duplicate keys collapse, last write wins.
pub(crate) fn encode_tags(tags: &TagList) -> Map {
    let mut map = Map::new();
    for tag in tags {
        map.insert(tag.key.as_str().into(), Dynamic::from(tag.value.clone()));
    }
    map
}

pub(crate) fn encode_members(members: &[TagList]) -> Array {
    members
        .iter()
        .map(|tags| Dynamic::from_map(encode_tags(tags)))
        .collect()
}

pub(crate) fn encode_roles(roles: &[String]) -> Array {
    roles.iter().map(|role| Dynamic::from(role.clone())).collect()
}

pub(crate) fn encode_count(count: usize) -> INT {
    INT::try_from(count).unwrap_or(INT::MAX)
}

/// Spread a script return value over `N` positions. Arrays fill positions in
/// order, anything else is the first position. Missing positions are unit.
pub(crate) fn split_reply<const N: usize>(value: Dynamic) -> [Dynamic; N] {
    let mut values = if value.is_array() {
        value.into_array().unwrap_or_default()
    } else {
        vec![value]
    };
    values.resize(N, Dynamic::UNIT);
    std::array::from_fn(|i| std::mem::replace(&mut values[i], Dynamic::UNIT))
}

/// Decode a returned tag table.
///
/// Object maps come back ordered like `input`; arrays of `[key, value]`
/// pairs come back exactly in array order.
pub(crate) fn decode_tags(
    function: &str,
    value: Dynamic,
    input: &TagList,
) -> Result<TagList, TransformError> {
    let observed = value.type_name();

    if value.is_array() {
        let pairs = value.into_array().unwrap_or_default();
        return decode_pairs(function, pairs);
    }

    let map = value.try_cast::<Map>().ok_or_else(|| {
        TransformError::malformed(
            function,
            format!("expected a tag table, found data type '{observed}'"),
        )
    })?;

    let mut tags = TagList::with_capacity(map.len());
    for (key, value) in map {
        let value = expect_string(function, "value", value)?;
        tags.push(key.to_string(), value);
    }
    tags.order_like(input);
    Ok(tags)
}

fn decode_pairs(function: &str, pairs: Array) -> Result<TagList, TransformError> {
    let mut tags = TagList::with_capacity(pairs.len());
    for (index, pair) in pairs.into_iter().enumerate() {
        let observed = pair.type_name();
        let [key, value]: [Dynamic; 2] = pair
            .into_array()
            .ok()
            .and_then(|entry: Array| <[Dynamic; 2]>::try_from(entry).ok())
            .ok_or_else(|| {
                TransformError::malformed(
                    function,
                    format!("tag entry {index} is not a [key, value] pair (data type '{observed}')"),
                )
            })?;
        let key = expect_string(function, "key", key)?;
        let value = expect_string(function, "value", value)?;
        tags.push(key, value);
    }
    Ok(tags)
}

fn expect_string(function: &str, what: &str, value: Dynamic) -> Result<String, TransformError> {
    let observed = value.type_name();
    value.into_string().map_err(|_| {
        TransformError::malformed(
            function,
            format!(
                "returned a non-string tag {what}. Possibly this is due to an incorrect data type '{observed}'"
            ),
        )
    })
}

/// Integer reading of a flag. Non-numeric values read as 0.
pub(crate) fn decode_int(value: &Dynamic) -> i32 {
    if let Ok(v) = value.as_int() {
        return v as i32;
    }
    if let Ok(v) = value.as_float() {
        return v as i32;
    }
    if let Ok(v) = value.as_bool() {
        return i32::from(v);
    }
    if value.is_string() {
        return value
            .clone()
            .into_string()
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map_or(0, |n| n as i32);
    }
    0
}

pub(crate) fn decode_flag(value: &Dynamic) -> bool {
    decode_int(value) != 0
}

/// Read exactly `count` superseded flags. Fewer entries is an error, never
/// padded.
pub(crate) fn decode_superseded(
    function: &str,
    value: Dynamic,
    count: usize,
) -> Result<Vec<i32>, TransformError> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let observed = value.type_name();
    let entries = value.into_array().map_err(|_| {
        TransformError::malformed(
            function,
            format!("failed to read member_superseded: expected an array, found data type '{observed}'"),
        )
    })?;

    if entries.len() < count {
        return Err(TransformError::malformed(
            function,
            format!(
                "failed to read member_superseded: expected {count} entries, found {}",
                entries.len()
            ),
        ));
    }

    Ok(entries.iter().take(count).map(decode_int).collect())
}
