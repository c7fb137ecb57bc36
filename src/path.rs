//! Response and deferred-result paths.

use std::{fmt, sync::Arc};

use arcstr::ArcStr;
use serde::ser::{Serialize, Serializer};

/// One step of a [`Path`] or of a deferred path.
///
/// [`ListPlaceholder`](PathSegment::ListPlaceholder) marks a list position
/// whose index is not known yet: it appears in deferred paths (and in the
/// in-flight paths of fields below an unmaterialized list) and fans out to
/// one concrete index per materialized element. Completed response paths
/// never contain it.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PathSegment {
    /// An object field, addressed by response key.
    Key(ArcStr),
    /// A list element, addressed by index.
    Index(usize),
    /// A list element whose index is not yet known.
    ListPlaceholder,
}

impl PathSegment {
    /// Indicates whether two segments address the same position, treating a
    /// concrete index and a list placeholder as equivalent.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Key(a), Self::Key(b)) => a == b,
            (Self::Key(_), _) | (_, Self::Key(_)) => false,
            // Index/Index, Index/Placeholder, Placeholder/Placeholder.
            _ => true,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "{i}"),
            Self::ListPlaceholder => write!(f, "[]"),
        }
    }
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Key(k) => serializer.serialize_str(k),
            Self::Index(i) => serializer.serialize_u64(*i as u64),
            Self::ListPlaceholder => serializer.serialize_str("[]"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Key(s.into())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// An immutable linked list of segments from the response root to a field
/// position.
///
/// Extending a path shares the prefix with the parent, so the scheduler can
/// hand the same parent path to every child task cheaply.
#[derive(Clone, Debug, Default)]
pub struct Path(Option<Arc<PathNode>>);

#[derive(Debug)]
struct PathNode {
    prev: Path,
    segment: PathSegment,
}

impl Path {
    /// The empty path, addressing the response root.
    pub fn root() -> Self {
        Self(None)
    }

    /// Returns a new path extending this one by `segment`.
    #[must_use]
    pub fn child(&self, segment: PathSegment) -> Self {
        Self(Some(Arc::new(PathNode {
            prev: self.clone(),
            segment,
        })))
    }

    /// The last segment of this path, or `None` for the root.
    pub fn key(&self) -> Option<&PathSegment> {
        self.0.as_ref().map(|n| &n.segment)
    }

    /// The path of the enclosing position, or `None` for the root.
    pub fn prev(&self) -> Option<&Path> {
        self.0.as_ref().map(|n| &n.prev)
    }

    /// Indicates whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self;
        while let Some(node) = &cur.0 {
            n += 1;
            cur = &node.prev;
        }
        n
    }

    /// Indicates whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Yields the forward sequence of segments, root first.
    pub fn to_vec(&self) -> Vec<PathSegment> {
        let mut acc = Vec::with_capacity(self.len());
        self.collect_into(&mut acc);
        acc
    }

    fn collect_into(&self, acc: &mut Vec<PathSegment>) {
        if let Some(node) = &self.0 {
            node.prev.collect_into(acc);
            acc.push(node.segment.clone());
        }
    }

    /// Builds a path from forward segments.
    pub fn from_segments<I>(segments: I) -> Self
    where
        I: IntoIterator<Item = PathSegment>,
    {
        segments
            .into_iter()
            .fold(Self::root(), |path, seg| path.child(seg))
    }

    /// Counts [`PathSegment::ListPlaceholder`] segments.
    pub fn placeholder_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self;
        while let Some(node) = &cur.0 {
            if node.segment == PathSegment::ListPlaceholder {
                n += 1;
            }
            cur = &node.prev;
        }
        n
    }

    /// Indicates whether `prefix`'s forward sequence is a prefix of this
    /// path's.
    pub fn starts_with(&self, prefix: &[PathSegment]) -> bool {
        let own = self.to_vec();
        own.len() >= prefix.len() && own[..prefix.len()] == *prefix
    }

    /// The longest leading portion of this path free of list placeholders.
    pub fn placeholder_free_prefix(&self) -> Path {
        let segments = self.to_vec();
        let cut = segments
            .iter()
            .position(|s| *s == PathSegment::ListPlaceholder)
            .unwrap_or(segments.len());
        Self::from_segments(segments.into_iter().take(cut))
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            match (&a.0, &b.0) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if Arc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.segment != y.segment {
                        return false;
                    }
                    a = &x.prev;
                    b = &y.prev;
                }
                _ => return false,
            }
        }
    }
}

impl Eq for Path {}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use itertools::Itertools as _;
        write!(f, "{}", self.to_vec().iter().format("."))
    }
}

/// A forward path into the combined batch result.
///
/// The first segment is the batch slot; the remaining segments address
/// within that slot's materialized value. The number of list placeholders
/// must equal the number in the matching response path.
pub type DeferredPath = Vec<PathSegment>;

/// Extends a deferred path by the given segments.
#[must_use]
pub fn extend_deferred(path: &DeferredPath, segments: &[PathSegment]) -> DeferredPath {
    let mut out = Vec::with_capacity(path.len() + segments.len());
    out.extend(path.iter().cloned());
    out.extend(segments.iter().cloned());
    out
}
