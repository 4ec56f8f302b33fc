//! The route table.

use http::Method;

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::node::Node;
use crate::params::Params;
use crate::{Lookup, RouteMatch};

/// Method-qualified route table backed by a radix tree.
///
/// Values are usually handlers, but the table is generic so it can be
/// tested and benchmarked with plain data.
///
/// # Example
///
/// ```rust
/// use keycard_router::{Lookup, RouteTable};
/// use http::Method;
///
/// let mut table = RouteTable::new();
/// table.insert(Method::GET, "/items/{id}", "getItem").unwrap();
///
/// match table.lookup(&Method::GET, "/items/7") {
///     Lookup::Found(m) => {
///         assert_eq!(*m.value, "getItem");
///         assert_eq!(m.params.get("id"), Some("7"));
///     }
///     other => panic!("unexpected lookup: {other:?}"),
/// }
///
/// assert!(matches!(table.lookup(&Method::DELETE, "/items/7"), Lookup::MethodNotAllowed(_)));
/// assert!(matches!(table.lookup(&Method::GET, "/nope"), Lookup::NotFound));
/// ```
#[derive(Debug, Clone)]
pub struct RouteTable<T> {
    root: Node<T>,
    route_count: usize,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RouteTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Registers `value` under `method` and `pattern`.
    ///
    /// Fails if the pattern is malformed or the (method, pattern) pair is
    /// already taken. A failed insert leaves existing routes untouched.
    pub fn insert(&mut self, method: Method, pattern: &str, value: T) -> Result<(), RouteError> {
        let segments = Node::<T>::parse_pattern(pattern)?;
        let node = self.root.node_for(pattern, &segments)?;
        node.methods
            .insert(method.clone(), value)
            .map_err(|_| RouteError::Duplicate {
                method,
                pattern: pattern.to_string(),
            })?;
        self.route_count += 1;
        Ok(())
    }

    /// Resolves a request method and path.
    ///
    /// A `HEAD` request falls back to the `GET` registration when no explicit
    /// `HEAD` route exists. When the path matches but the method does not,
    /// the methods registered on the most specific matching pattern are
    /// returned.
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, T> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();

        let serves = |m: &MethodRouter<T>| {
            m.contains(method) || (*method == Method::HEAD && m.contains(&Method::GET))
        };
        if let Some(methods) = self.root.find(&segments, &mut params, &serves) {
            let value = methods
                .get(method)
                .or_else(|| methods.get(&Method::GET));
            if let Some(value) = value {
                return Lookup::Found(RouteMatch { value, params });
            }
        }

        let mut params = Params::new();
        match self
            .root
            .find(&segments, &mut params, &|m: &MethodRouter<T>| !m.is_empty())
        {
            Some(methods) => Lookup::MethodNotAllowed(methods.allowed_methods()),
            None => Lookup::NotFound,
        }
    }

    /// Returns the number of registered (method, pattern) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
