//! Dotted-name addressing for the test forest.
//!
//! Every tree operation walks from a build target down to a suite by the
//! prefixes of the suite's fully qualified class name. `TestItemPath` yields
//! those prefixes lazily so that add, remove and update all address the tree
//! the same way.

/// One step of a [`TestItemPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSegment<'a> {
    /// The full dotted prefix up to and including this segment (`a.b`).
    pub id: &'a str,
    /// The last component of the prefix (`b`).
    pub label: &'a str,
    rest: &'a str,
    include_self: bool,
}

impl<'a> PathSegment<'a> {
    /// The following segment, or `None` once the path is exhausted.
    pub fn next(&self) -> Option<PathSegment<'a>> {
        TestItemPath::segment_after(self.rest, self.id.len(), self.include_self)
    }

    /// Whether this segment is the item itself rather than an enclosing package.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.id.len() == self.rest.len()
    }
}

/// Lazy, restartable sequence of the package prefixes of a dotted name.
///
/// `a.b.Suite` with `include_self = false` yields `a`, `a.b`; with
/// `include_self = true` it also yields `a.b.Suite`. A name without dots and
/// `include_self = false` yields nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestItemPath<'a> {
    name: &'a str,
    include_self: bool,
}

impl<'a> TestItemPath<'a> {
    pub fn new(name: &'a str, include_self: bool) -> Self {
        Self { name, include_self }
    }

    /// The first segment of the path, if any.
    pub fn first(&self) -> Option<PathSegment<'a>> {
        Self::segment_after(self.name, 0, self.include_self)
    }

    /// Iterate over every segment from the outermost package inwards.
    ///
    /// The path is `Copy`, so calling this again restarts from the top.
    pub fn iter(&self) -> Segments<'a> {
        Segments {
            current: self.first(),
        }
    }

    /// Number of segments the path yields.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }

    /// The segment starting right after `consumed` bytes of `name`.
    fn segment_after(name: &'a str, consumed: usize, include_self: bool) -> Option<PathSegment<'a>> {
        // Skip the separating dot unless this is the very first segment.
        let start = if consumed == 0 { 0 } else { consumed + 1 };
        if start >= name.len() {
            return None;
        }

        match name[start..].find('.') {
            Some(offset) => {
                let end = start + offset;
                Some(PathSegment {
                    id: &name[..end],
                    label: &name[start..end],
                    rest: name,
                    include_self,
                })
            }
            None if include_self => Some(PathSegment {
                id: name,
                label: &name[start..],
                rest: name,
                include_self,
            }),
            None => None,
        }
    }
}

impl<'a> IntoIterator for TestItemPath<'a> {
    type Item = PathSegment<'a>;
    type IntoIter = Segments<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &TestItemPath<'a> {
    type Item = PathSegment<'a>;
    type IntoIter = Segments<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the segments of a [`TestItemPath`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    current: Option<PathSegment<'a>>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = PathSegment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.current.take()?;
        self.current = segment.next();
        Some(segment)
    }
}

/// Last dotted component of a name (`a.b.Suite` -> `Suite`).
pub fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(path: TestItemPath<'_>) -> Vec<(&str, &str)> {
        path.iter().map(|s| (s.id, s.label)).collect()
    }

    #[test]
    fn test_packages_only() {
        let path = TestItemPath::new("a.b.c.Suite", false);
        assert_eq!(ids(path), vec![("a", "a"), ("a.b", "b"), ("a.b.c", "c")]);
    }

    #[test]
    fn test_include_self() {
        let path = TestItemPath::new("a.b.Suite", true);
        assert_eq!(
            ids(path),
            vec![("a", "a"), ("a.b", "b"), ("a.b.Suite", "Suite")]
        );
        assert!(path.iter().last().unwrap().is_leaf());
        assert!(!path.first().unwrap().is_leaf());
    }

    #[test]
    fn test_no_dots() {
        assert!(TestItemPath::new("Suite", false).is_empty());
        assert_eq!(ids(TestItemPath::new("Suite", true)), vec![("Suite", "Suite")]);
    }

    #[test]
    fn test_empty_name() {
        assert!(TestItemPath::new("", true).is_empty());
        assert!(TestItemPath::new("", false).is_empty());
    }

    #[test]
    fn test_restartable() {
        let path = TestItemPath::new("x.y.Z", true);
        let mut first_pass = path.iter();
        first_pass.next();
        assert_eq!(path.len(), 3);
        assert_eq!(first_pass.count(), 2);
        assert_eq!(path.iter().count(), 3);
    }

    #[test]
    fn test_manual_next() {
        let path = TestItemPath::new("a.b.C", false);
        let first = path.first().unwrap();
        let second = first.next().unwrap();
        assert_eq!(second.id, "a.b");
        assert_eq!(second.label, "b");
        assert!(second.next().is_none());
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("a.b.Suite"), "Suite");
        assert_eq!(last_segment("Suite"), "Suite");
    }
}
