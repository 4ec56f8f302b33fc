//! Radix tree route table for Keycard.
//!
//! Maps an HTTP method plus a path pattern to a value (normally a composed
//! handler). Patterns are split on `/` into segments:
//!
//! - **Static**: `items` matches only itself
//! - **Named**: `{id}` matches any single segment and binds it as `id`
//! - **Wildcard**: `{*rest}` (or `*rest`) matches one or more trailing
//!   segments and binds them joined with `/`
//!
//! # Precedence
//!
//! Overlapping patterns resolve per segment: static beats named, named
//! beats wildcard. A branch that fails deeper down falls back to the next
//! candidate. Only patterns that actually serve the request method take
//! part; if the path matches but no pattern serves the method, the lookup
//! reports [`Lookup::MethodNotAllowed`].
//!
//! # Example
//!
//! ```rust
//! use keycard_router::{Lookup, RouteTable};
//! use http::Method;
//!
//! let mut table = RouteTable::new();
//! table.insert(Method::GET, "/items/new", "newForm").unwrap();
//! table.insert(Method::GET, "/items/{id}", "getItem").unwrap();
//!
//! let Lookup::Found(m) = table.lookup(&Method::GET, "/items/new") else { panic!() };
//! assert_eq!(*m.value, "newForm");
//!
//! let Lookup::Found(m) = table.lookup(&Method::GET, "/items/42") else { panic!() };
//! assert_eq!(*m.value, "getItem");
//! assert_eq!(m.params.get("id"), Some("42"));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod method_router;
mod node;
mod params;
mod table;

use http::Method;

pub use error::RouteError;
pub use method_router::MethodRouter;
pub use node::{Node, SegmentKind};
pub use params::Params;
pub use table::RouteTable;

/// A matched route with its value and bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, T> {
    /// The registered value
    pub value: &'a T,
    /// Bound path parameters
    pub params: Params,
}

/// Outcome of resolving a method and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a, T> {
    /// A pattern serving the method matched.
    Found(RouteMatch<'a, T>),
    /// The path is known but no pattern serves the method.
    MethodNotAllowed(Vec<Method>),
    /// No pattern matches the path.
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn named_segment_binds_any_segment(id in "[A-Za-z0-9_.~-]{1,24}") {
            let mut table = RouteTable::new();
            table.insert(Method::GET, "/items/{id}", ()).unwrap();

            let path = format!("/items/{id}");
            match table.lookup(&Method::GET, &path) {
                Lookup::Found(m) => prop_assert_eq!(m.params.get("id"), Some(id.as_str())),
                other => prop_assert!(false, "unexpected lookup {:?}", other),
            }
        }

        #[test]
        fn static_segment_always_wins(seg in "[a-z]{1,12}") {
            let mut table = RouteTable::new();
            table.insert(Method::GET, &format!("/items/{seg}"), "static").unwrap();
            table.insert(Method::GET, "/items/{id}", "param").unwrap();

            let path = format!("/items/{seg}");
            let Lookup::Found(m) = table.lookup(&Method::GET, &path) else {
                return Err(TestCaseError::fail("no match"));
            };
            prop_assert_eq!(*m.value, "static");
            prop_assert!(m.params.is_empty());
        }
    }

    #[test]
    fn test_lookup_variants_compare() {
        let table: RouteTable<u8> = RouteTable::new();
        assert_eq!(table.lookup(&Method::GET, "/"), Lookup::NotFound);
    }
}
