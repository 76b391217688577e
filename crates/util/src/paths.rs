//! Node-path normalization and relative dependency path resolution.

/// Normalize a node path: collapse repeated slashes, force a leading slash,
/// strip any trailing slash.
pub fn normalize_node_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if normalized.len() > 1 {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }
    normalized
}

/// Leaf component of a node path.
pub fn path_leaf(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Resolve a dependency name to an absolute node path.
///
/// Absolute names (leading `/`) are normalized as-is. `./` and `../` names
/// are evaluated against `base`, the path of the declaring node's container;
/// a bare name is treated as `./name`.
pub fn resolve_relative_path(name: &str, base: &str) -> String {
    let name = name.trim();
    if name.starts_with('/') {
        return normalize_node_path(name);
    }
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in name.split('/').filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut resolved = String::from("/");
    resolved.push_str(&segments.join("/"));
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_slashes() {
        assert_eq!(normalize_node_path("suite//fam/task/"), "/suite/fam/task");
        assert_eq!(normalize_node_path("/suite"), "/suite");
        assert_eq!(normalize_node_path(""), "/");
    }

    #[test]
    fn leaf_of_path() {
        assert_eq!(path_leaf("/suite/fam/task"), "task");
        assert_eq!(path_leaf("/suite/"), "suite");
    }

    #[test]
    fn absolute_names_pass_through() {
        assert_eq!(
            resolve_relative_path("/other/task", "/suite/fam"),
            "/other/task"
        );
    }

    #[test]
    fn relative_names_resolve_against_base() {
        assert_eq!(
            resolve_relative_path("./peer", "/suite/fam"),
            "/suite/fam/peer"
        );
        assert_eq!(
            resolve_relative_path("../uncle/task", "/suite/fam"),
            "/suite/uncle/task"
        );
        assert_eq!(resolve_relative_path("peer", "/suite/fam"), "/suite/fam/peer");
    }
}
