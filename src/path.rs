use std::collections::BTreeSet;

/// The virtual tag carrying an object's own id. It exists for every object
/// and has no tag row.
pub const OBJECT_ID_TAG: &str = "fluiddb/id";

const PATH_SEPARATOR: char = '/';
const MAX_PATH_LEN: usize = 233;

/// Returns the path one level up, or `None` for a root-level path.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once(PATH_SEPARATOR).map(|(parent, _)| parent)
}

pub fn parent_paths<'a, I>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    paths
        .into_iter()
        .filter_map(parent_path)
        .filter(|parent| !parent.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns `paths` plus every ancestor of each path up to its root segment.
pub fn path_hierarchy<'a, I>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hierarchy = BTreeSet::new();
    for path in paths {
        hierarchy.insert(path.to_string());
        let mut parent = parent_path(path);
        while let Some(p) = parent {
            hierarchy.insert(p.to_string());
            parent = parent_path(p);
        }
    }
    hierarchy
}

/// A valid path is at most 233 bytes and every segment is non-empty and
/// made of letters, digits, `:`, `.`, `-` or `_`.
pub fn is_valid_path(path: &str) -> bool {
    if path.is_empty() || path.len() > MAX_PATH_LEN {
        return false;
    }
    path.split(PATH_SEPARATOR).all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, ':' | '.' | '-' | '_'))
    })
}
