//! Which primary-store files belong to an entity group
//!
//! Files carry no explicit group key; association is by file-name prefix.
//! A file belongs to a group when its name starts with the group slug, or with
//! the slug with `-` folded to `_`, and the prefix ends at a boundary: the
//! next character is `_`, `.` or the end of the name. The boundary keeps
//! `champions` from claiming `champions-2025_stats.json`.

/// Name prefixes accepted for `slug`, raw form first
pub fn group_prefixes(slug: &str) -> Vec<String> {
    let mut prefixes = vec![slug.to_string()];
    let folded = slug.replace('-', "_");
    if folded != slug {
        prefixes.push(folded);
    }
    prefixes
}

pub fn belongs_to_group(file_name: &str, slug: &str) -> bool {
    if slug.is_empty() {
        return false;
    }

    group_prefixes(slug).iter().any(|prefix| {
        file_name
            .strip_prefix(prefix.as_str())
            .map(|rest| rest.is_empty() || rest.starts_with('_') || rest.starts_with('.'))
            .unwrap_or(false)
    })
}
