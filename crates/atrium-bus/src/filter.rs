/// Match a topic against a subscription filter. `+` matches exactly one
/// level; `#` matches the remainder and is only honored in terminal
/// position. Matching is exact otherwise; no partial-segment wildcards.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/').peekable();
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return filter_parts.peek().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(expected), Some(actual)) if expected == actual => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
