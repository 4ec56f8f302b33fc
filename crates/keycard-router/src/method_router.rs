//! HTTP method dispatch for a single path.
//!
//! [`MethodRouter`] holds one value per HTTP method registered at a path.
//! Any method the `http` crate can represent is accepted, including
//! extension methods.

use http::Method;
use smallvec::SmallVec;

/// Maps HTTP methods to values for a single route.
///
/// # Example
///
/// ```rust
/// use keycard_router::MethodRouter;
/// use http::Method;
///
/// let mut router = MethodRouter::new();
/// router.insert(Method::GET, "listItems").unwrap();
/// router.insert(Method::POST, "createItem").unwrap();
///
/// assert_eq!(router.get(&Method::GET), Some(&"listItems"));
/// assert_eq!(router.get(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRouter<T> {
    /// Registered (method, value) pairs in registration order
    entries: SmallVec<[(Method, T); 2]>,
}

impl<T> Default for MethodRouter<T> {
    fn default() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }
}

impl<T> MethodRouter<T> {
    /// Creates a new empty method router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value for a method.
    ///
    /// Returns the value back if the method is already taken; the existing
    /// registration is never overwritten.
    pub fn insert(&mut self, method: Method, value: T) -> Result<(), T> {
        if self.contains(&method) {
            return Err(value);
        }
        self.entries.push((method, value));
        Ok(())
    }

    /// Returns the value registered for a method.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&T> {
        self.entries
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
    }

    /// Returns true if the method has a registration.
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.entries.iter().any(|(m, _)| m == method)
    }

    /// Returns the registered methods in registration order.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.entries.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Returns true if no method is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut router = MethodRouter::new();
        router.insert(Method::GET, 1).unwrap();
        router.insert(Method::PUT, 2).unwrap();

        assert_eq!(router.get(&Method::GET), Some(&1));
        assert_eq!(router.get(&Method::PUT), Some(&2));
        assert_eq!(router.get(&Method::POST), None);
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_duplicate_method_is_rejected() {
        let mut router = MethodRouter::new();
        router.insert(Method::GET, "first").unwrap();

        let rejected = router.insert(Method::GET, "second");
        assert_eq!(rejected, Err("second"));
        assert_eq!(router.get(&Method::GET), Some(&"first"));
    }

    #[test]
    fn test_allowed_methods_keeps_order() {
        let mut router = MethodRouter::new();
        router.insert(Method::DELETE, ()).unwrap();
        router.insert(Method::GET, ()).unwrap();

        assert_eq!(router.allowed_methods(), vec![Method::DELETE, Method::GET]);
    }

    #[test]
    fn test_extension_method() {
        let purge = Method::from_bytes(b"PURGE").unwrap();
        let mut router = MethodRouter::new();
        router.insert(purge.clone(), "purge").unwrap();

        assert!(router.contains(&purge));
        assert!(!router.is_empty());
    }
}
