//! Matching of hierarchy unit patterns against materialized row paths.
//!
//! A materialized path lists a node's ancestors root first, joined by `.`
//! (`"10.42.7"` is node `7` under `42` under `10`). A pattern names one node
//! and may end with `*` to also cover every descendant of that node.
//!
//! The same predicates back the SQL row filter and the in-memory column
//! rules, see [`PathPredicate`].

/// Trailing marker extending a pattern to descendants.
pub const DESCENDANTS_MARKER: char = '*';

/// Separator between nodes of a materialized path.
pub const PATH_SEPARATOR: char = '.';

#[must_use]
pub fn has_descendants_marker(pattern: &str) -> bool {
    pattern.ends_with(DESCENDANTS_MARKER)
}

/// One string test on a row path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathPredicate {
    Equals(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
}

impl PathPredicate {
    #[must_use]
    pub fn holds(&self, path: &str) -> bool {
        match self {
            Self::Equals(s) => path == s,
            Self::StartsWith(s) => path.starts_with(s.as_str()),
            Self::EndsWith(s) => path.ends_with(s.as_str()),
            Self::Contains(s) => path.contains(s.as_str()),
        }
    }
}

/// A single hierarchy node, optionally with its descendants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeAnchor {
    node: String,
    descendants: bool,
}

impl TreeAnchor {
    /// Reads a user's recorded path pattern.
    ///
    /// Every `*` and every `.` is removed from the pattern, so a multi-segment
    /// path such as `"10.42"` collapses into the single token `"1042"`.
    /// Returns `None` when nothing is left, which never matches anything.
    #[must_use]
    pub fn parse(pattern: &str) -> Option<Self> {
        let node: String = pattern
            .chars()
            .filter(|c| *c != DESCENDANTS_MARKER && *c != PATH_SEPARATOR)
            .collect();
        if node.is_empty() {
            return None;
        }
        Some(Self {
            node,
            descendants: has_descendants_marker(pattern),
        })
    }

    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    #[must_use]
    pub fn includes_descendants(&self) -> bool {
        self.descendants
    }

    #[must_use]
    pub fn with_descendants(mut self, descendants: bool) -> Self {
        self.descendants = descendants;
        self
    }

    /// Predicates a row path must satisfy (any of) to be covered.
    ///
    /// Without descendants only the node itself matches: the path equals the
    /// node or ends with it. With descendants the node may sit anywhere in the
    /// path.
    #[must_use]
    pub fn predicates(&self) -> Vec<PathPredicate> {
        let node = &self.node;
        let mut predicates = vec![
            PathPredicate::Equals(node.clone()),
            PathPredicate::EndsWith(format!("{PATH_SEPARATOR}{node}")),
        ];
        if self.descendants {
            predicates.push(PathPredicate::StartsWith(format!("{node}{PATH_SEPARATOR}")));
            predicates.push(PathPredicate::Contains(format!(
                "{PATH_SEPARATOR}{node}{PATH_SEPARATOR}"
            )));
        }
        predicates
    }

    #[must_use]
    pub fn covers(&self, row_path: &str) -> bool {
        self.predicates().iter().any(|p| p.holds(row_path))
    }
}

/// Whether a row whose hierarchy path is `row_path` falls under `user_pattern`
/// for a rule declared with unit pattern `rule_pattern`.
///
/// The user's recorded pattern provides the anchor node. Descendants are
/// covered when either pattern carries the trailing marker.
#[must_use]
pub fn matches(rule_pattern: &str, row_path: &str, user_pattern: &str) -> bool {
    let Some(anchor) = TreeAnchor::parse(user_pattern) else {
        return false;
    };
    let descendants = anchor.includes_descendants() || has_descendants_marker(rule_pattern);
    anchor.with_descendants(descendants).covers(row_path)
}
