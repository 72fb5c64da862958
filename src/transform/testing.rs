//! Script fixtures shared by the transform tests.

/// A style that keeps every entity and returns its tags untouched.
pub(crate) const PASSTHROUGH: [(&str, &str); 4] = [
    (
        "filter_tags_node",
        "fn filter_tags_node(tags, num_tags) { [false, tags] }",
    ),
    (
        "filter_tags_way",
        "fn filter_tags_way(tags, num_tags) { [false, tags, 0, 0] }",
    ),
    (
        "filter_basic_tags_rel",
        "fn filter_basic_tags_rel(tags, num_tags) { [false, tags] }",
    ),
    (
        "filter_tags_relation_member",
        r#"fn filter_tags_relation_member(tags, member_tags, roles, membercount) {
            let superseded = [];
            for i in 0..membercount { superseded.push(0); }
            [false, tags, superseded, 0, 0, 0]
        }"#,
    ),
];

/// The passthrough style with some entry points replaced by `overrides`,
/// given as `(function name, full definition)`.
pub(crate) fn script_with(overrides: &[(&str, &str)]) -> String {
    PASSTHROUGH
        .iter()
        .map(|(name, body)| {
            overrides
                .iter()
                .find(|(replaced, _)| replaced == name)
                .map_or(*body, |(_, replacement)| *replacement)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
