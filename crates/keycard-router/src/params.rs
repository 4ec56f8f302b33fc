//! Named path segment values.
//!
//! Values captured by `{name}` segments are stored inline for the common
//! case of a handful of parameters.

use std::str::FromStr;

use smallvec::SmallVec;

/// Number of parameters stored without a heap allocation.
const INLINE_PARAMS: usize = 4;

/// Path parameters bound while matching a route.
///
/// # Example
///
/// ```rust
/// use keycard_router::Params;
///
/// let mut params = Params::new();
/// params.push("id", "42");
///
/// assert_eq!(params.get("id"), Some("42"));
/// assert_eq!(params.parse::<u64>("id"), Some(Ok(42)));
/// assert_eq!(params.get("missing"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value to a name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parses the value bound to `name`.
    ///
    /// Returns `None` when the name is unbound.
    pub fn parse<V: FromStr>(&self, name: &str) -> Option<Result<V, V::Err>> {
        self.get(name).map(str::parse)
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of bound parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates over (name, value) pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Drops bindings past `len`. Used to undo a failed branch while matching.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }
}

/// Percent-decodes a captured path segment.
///
/// Matching runs on the raw path, so `%2F` never splits a segment. A value
/// that does not decode to UTF-8 is kept as sent.
pub(crate) fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |decoded| decoded.into_owned())
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
