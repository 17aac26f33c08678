use std::cmp::Ordering;

/// Compare hierarchical ids segment by segment on `.`.
///
/// Numeric segments compare numerically so `"2.10"` sorts after `"2.9"`;
/// other segments fall back to string order. A shorter id that is a prefix of
/// a longer one sorts first.
pub fn hierarchical_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Parent id implied by a hierarchical id (`"2.1"` → `"2"`).
pub fn parent_of(id: &str) -> Option<&str> {
    id.rsplit_once('.').map(|(parent, _)| parent)
}

/// Leading segment of a hierarchical id (`"2.1.3"` → `"2"`).
pub fn top_level_prefix(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}
