//! Path representation for addressing nodes of the state tree.
//!
//! A [`Path`] is a sequence of segments from the root of the tree. Each
//! segment is either an object key or an array index. Paths can be written
//! as dot-delimited strings (`"todos.0.title"`), which is also the form
//! observers and update groups accept.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Path component that matches any single component in an observed path.
pub const WILDCARD: &str = "@each";

/// A single segment in a path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Object key access: `{"key": value}`
    Key(String),
    /// Array index access: `[index]`
    Index(usize),
}

impl Seg {
    /// Create a key segment.
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: usize) -> Self {
        Seg::Index(i)
    }

    /// Interpret this segment as an array index.
    ///
    /// Key segments that parse as an unsigned integer count as indices, so
    /// `"todos.0"` addresses the first element of `todos`.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Key(k) => k.parse().ok(),
            Seg::Index(i) => Some(*i),
        }
    }

    /// The string form of this segment, as used in dotted paths and events.
    pub fn component(&self) -> Cow<'_, str> {
        match self {
            Seg::Key(k) => Cow::Borrowed(k),
            Seg::Index(i) => Cow::Owned(i.to_string()),
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, ".{}", k),
            Seg::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A path from the root of the state tree.
///
/// # Examples
///
/// ```
/// use keel_store::Path;
///
/// let path = Path::root().key("todos").index(0).key("title");
/// assert_eq!(path.len(), 3);
/// assert_eq!(path.to_dotted(), "todos.0.title");
/// assert_eq!(Path::parse("todos.0.title").to_dotted(), path.to_dotted());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create an empty path (alias for `new`).
    #[inline]
    pub fn root() -> Self {
        Self::new()
    }

    /// Parse a dot-delimited path. The empty string is the root.
    pub fn parse(dotted: &str) -> Self {
        dotted
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(Seg::from)
            .collect()
    }

    /// Append a key segment and return self (builder pattern).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment and return self (builder pattern).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment onto the path (mutating).
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Pop the last segment from the path.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// Get the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Check if this path is empty (root).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the last segment.
    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// Append a segment and return a new path (non-mutating builder).
    #[inline]
    pub fn with_segment(&self, seg: Seg) -> Path {
        let mut result = self.clone();
        result.0.push(seg);
        result
    }

    /// Check whether `self` addresses `other` or one of its ancestors.
    ///
    /// Segments are compared by their string component, so `todos.0` built
    /// from a dotted string is a prefix of `todos[0].title` built from indices.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.len() <= other.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.component() == b.component())
    }

    /// The path's components as strings.
    pub fn components(&self) -> Vec<String> {
        self.0.iter().map(|seg| seg.component().into_owned()).collect()
    }

    /// The dot-joined form of this path (`""` for root).
    pub fn to_dotted(&self) -> String {
        self.components().join(".")
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<&str> for Path {
    fn from(dotted: &str) -> Self {
        Path::parse(dotted)
    }
}

impl From<String> for Path {
    fn from(dotted: String) -> Self {
        Path::parse(&dotted)
    }
}

impl From<&[&str]> for Path {
    fn from(segments: &[&str]) -> Self {
        segments.iter().copied().map(Seg::from).collect()
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(segments: [&str; N]) -> Self {
        segments.into_iter().map(Seg::from).collect()
    }
}

impl From<Vec<Seg>> for Path {
    fn from(segments: Vec<Seg>) -> Self {
        Path(segments)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

/// Construct a `Path` from a sequence of segments.
///
/// ```
/// use keel_store::path;
///
/// let p = path!("todos", 0, "title");
/// assert_eq!(p.to_dotted(), "todos.0.title");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::path!(@seg $seg));
        )+
        p
    }};
    (@seg $seg:expr) => {
        $crate::Seg::from($seg)
    };
}

/// An observed path: components compared against changed paths, with
/// [`WILDCARD`] matching any single component.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathPattern(Vec<String>);

impl PathPattern {
    /// Parse a dot-delimited pattern such as `"todos.@each.done"`.
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|component| !component.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// The pattern's components.
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Whether a change at `changed` concerns this pattern.
    ///
    /// Every component of the pattern must equal the changed component at the
    /// same position. The wildcard matches anything, including a component
    /// missing from a shorter changed path. A pattern shorter than the changed
    /// path therefore matches every change beneath it.
    pub fn matches(&self, changed: &Path) -> bool {
        self.0.iter().enumerate().all(|(i, expected)| {
            expected == WILDCARD
                || changed
                    .segments()
                    .get(i)
                    .is_some_and(|seg| seg.component() == expected.as_str())
        })
    }
}

impl From<&str> for PathPattern {
    fn from(dotted: &str) -> Self {
        PathPattern::parse(dotted)
    }
}

impl From<&Path> for PathPattern {
    fn from(path: &Path) -> Self {
        Self(path.components())
    }
}

impl From<Path> for PathPattern {
    fn from(path: Path) -> Self {
        Self(path.components())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// One or more observed paths. A change matches if any pattern matches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathPatterns(Vec<PathPattern>);

impl PathPatterns {
    /// Whether any pattern matches a change at `changed`.
    ///
    /// A change at the root matches every observer.
    pub fn matches(&self, changed: &Path) -> bool {
        changed.is_empty() || self.0.iter().any(|pattern| pattern.matches(changed))
    }

    /// The individual patterns.
    pub fn patterns(&self) -> &[PathPattern] {
        &self.0
    }
}

impl From<&str> for PathPatterns {
    fn from(dotted: &str) -> Self {
        Self(vec![PathPattern::parse(dotted)])
    }
}

impl From<PathPattern> for PathPatterns {
    fn from(pattern: PathPattern) -> Self {
        Self(vec![pattern])
    }
}

impl From<Path> for PathPatterns {
    fn from(path: Path) -> Self {
        Self(vec![path.into()])
    }
}

impl From<&Path> for PathPatterns {
    fn from(path: &Path) -> Self {
        Self(vec![path.into()])
    }
}

impl From<&[&str]> for PathPatterns {
    fn from(paths: &[&str]) -> Self {
        Self(paths.iter().map(|p| PathPattern::parse(p)).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PathPatterns {
    fn from(paths: [&str; N]) -> Self {
        Self(paths.iter().map(|p| PathPattern::parse(p)).collect())
    }
}

impl From<Vec<PathPattern>> for PathPatterns {
    fn from(patterns: Vec<PathPattern>) -> Self {
        Self(patterns)
    }
}
