//! Per-request state carried through the handler chain.
//!
//! A fresh [`RequestContext`] is created by the server for every request
//! and passed by `&mut` through each middleware into the handler. It is
//! never shared between requests, which is what keeps loggers, hub tags
//! and request ids from leaking across concurrent requests.
//!
//! The logger and hub slots are filled by middleware. Reading either one
//! before it was attached is a wiring bug in the application, so the
//! plain accessors panic; the `try_` variants exist for code that runs
//! outside the standard stack.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use keycard_router::Params;
use keycard_telemetry::{Hub, Logger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a request.
///
/// Uses UUID v7 so ids are time-ordered.
///
/// # Example
///
/// ```
/// use keycard_core::RequestId;
///
/// let a = RequestId::new();
/// let b = RequestId::new();
/// assert_ne!(a, b);
/// assert_eq!(a.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Request-scoped state.
///
/// # Example
///
/// ```
/// use keycard_core::RequestContext;
/// use keycard_telemetry::Logger;
///
/// let mut ctx = RequestContext::new();
/// ctx.attach_logger(Logger::new().with_field("env", "dev"));
/// ctx.augment_logger("user_id", 42);
///
/// assert_eq!(ctx.logger().field("user_id"), Some(&42.into()));
/// ```
pub struct RequestContext {
    logger: Option<Logger>,
    hub: Option<Hub>,
    request_id: Option<RequestId>,
    params: Params,
    remote_addr: Option<SocketAddr>,
    client_ip: Option<IpAddr>,
    started_at: Instant,
}

impl RequestContext {
    /// Creates an empty context. The request clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logger: None,
            hub: None,
            request_id: None,
            params: Params::new(),
            remote_addr: None,
            client_ip: None,
            started_at: Instant::now(),
        }
    }

    /// Creates a context for a connection from `remote_addr`.
    #[must_use]
    pub fn with_remote_addr(remote_addr: SocketAddr) -> Self {
        let mut ctx = Self::new();
        ctx.remote_addr = Some(remote_addr);
        ctx
    }

    // Logger slot

    /// Binds a fresh logger to this request, replacing any earlier one.
    pub fn attach_logger(&mut self, logger: Logger) {
        self.logger = Some(logger);
    }

    /// Returns the request logger.
    ///
    /// # Panics
    ///
    /// Panics if no logger was attached. Every request served through the
    /// standard middleware stack has one.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        match &self.logger {
            Some(logger) => logger,
            None => panic!("logger not found in request context"),
        }
    }

    /// Returns the request logger if one was attached.
    #[must_use]
    pub fn try_logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    /// Replaces the request logger with one that carries `key = value`.
    ///
    /// Later reads on this request see the field; other requests never do.
    ///
    /// # Panics
    ///
    /// Panics if no logger was attached.
    pub fn augment_logger(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let augmented = self.logger().with_field(key, value);
        self.logger = Some(augmented);
    }

    // Hub slot

    /// Binds a hub to this request. The hub should be a per-request clone.
    pub fn attach_hub(&mut self, hub: Hub) {
        self.hub = Some(hub);
    }

    /// Returns the request hub.
    ///
    /// # Panics
    ///
    /// Panics if no hub was attached.
    #[must_use]
    pub fn hub(&self) -> &Hub {
        match &self.hub {
            Some(hub) => hub,
            None => panic!("hub not found in request context"),
        }
    }

    /// Returns the request hub mutably, e.g. to set tags.
    ///
    /// # Panics
    ///
    /// Panics if no hub was attached.
    pub fn hub_mut(&mut self) -> &mut Hub {
        match &mut self.hub {
            Some(hub) => hub,
            None => panic!("hub not found in request context"),
        }
    }

    /// Returns the request hub if one was attached.
    #[must_use]
    pub fn try_hub(&self) -> Option<&Hub> {
        self.hub.as_ref()
    }

    // Request id

    /// Assigns the request id.
    ///
    /// The id is fixed once assigned; later calls are ignored and return
    /// false.
    pub fn set_request_id(&mut self, id: RequestId) -> bool {
        if self.request_id.is_some() {
            return false;
        }
        self.request_id = Some(id);
        true
    }

    /// Returns the request id, if assigned.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.request_id
    }

    // Routing and connection data

    /// Returns the path parameters bound by the router.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns one path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Stores the path parameters. Called by the router before dispatch.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Returns the socket peer address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns the resolved client address: the proxy-reported one when set,
    /// otherwise the socket peer.
    #[must_use]
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
            .or_else(|| self.remote_addr.map(|addr| addr.ip()))
    }

    /// Records the proxy-reported client address.
    pub fn set_client_ip(&mut self, ip: IpAddr) {
        self.client_ip = Some(ip);
    }

    /// Returns when the request started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns time spent on the request so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("logger", &self.logger)
            .field("hub", &self.hub)
            .field("params", &self.params)
            .field("remote_addr", &self.remote_addr)
            .field("client_ip", &self.client_ip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_unique_and_parse() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert_ne!(RequestId::new(), RequestId::new());
        assert!("not-a-uuid".parse::<RequestId>().is_err());
    }

    #[test]
    #[should_panic(expected = "logger not found in request context")]
    fn test_logger_without_attach_panics() {
        let ctx = RequestContext::new();
        let _ = ctx.logger();
    }

    #[test]
    #[should_panic(expected = "logger not found in request context")]
    fn test_augment_without_attach_panics() {
        let mut ctx = RequestContext::new();
        ctx.augment_logger("k", "v");
    }

    #[test]
    #[should_panic(expected = "hub not found in request context")]
    fn test_hub_without_attach_panics() {
        let ctx = RequestContext::new();
        let _ = ctx.hub();
    }

    #[test]
    fn test_augment_then_get() {
        let mut ctx = RequestContext::new();
        ctx.attach_logger(Logger::new());
        ctx.augment_logger("request_id", "abc");
        ctx.augment_logger("user_id", 9);

        let logger = ctx.logger();
        assert_eq!(logger.field("request_id").and_then(Value::as_str), Some("abc"));
        assert_eq!(logger.field("user_id"), Some(&Value::from(9)));
    }

    #[test]
    fn test_sibling_requests_are_isolated() {
        let base = Logger::new().with_field("env", "test");

        let mut first = RequestContext::new();
        let mut second = RequestContext::new();
        first.attach_logger(base.clone());
        second.attach_logger(base.clone());

        first.augment_logger("user_id", 1);

        assert!(second.logger().field("user_id").is_none());
        assert!(base.field("user_id").is_none());
        assert_eq!(first.logger().len(), 2);
    }

    #[test]
    fn test_attach_replaces_container() {
        let mut ctx = RequestContext::new();
        ctx.attach_logger(Logger::new().with_field("a", 1));
        ctx.attach_logger(Logger::new());
        assert!(ctx.logger().is_empty());
    }

    #[test]
    fn test_request_id_is_fixed_once_set() {
        let mut ctx = RequestContext::new();
        let first = RequestId::new();
        assert!(ctx.set_request_id(first));
        assert!(!ctx.set_request_id(RequestId::new()));
        assert_eq!(ctx.request_id(), Some(first));
    }

    #[test]
    fn test_hub_tags_are_per_request() {
        let template = Hub::noop();
        let mut ctx = RequestContext::new();
        ctx.attach_hub(template.clone_for_request());
        ctx.hub_mut().set_tag("request_id", "x");

        assert_eq!(ctx.hub().tags().len(), 1);
        assert!(template.tags().is_empty());
    }

    #[test]
    fn test_client_ip_prefers_forwarded() {
        let mut ctx = RequestContext::with_remote_addr("10.0.0.1:5000".parse().unwrap());
        assert_eq!(ctx.client_ip(), Some("10.0.0.1".parse().unwrap()));

        ctx.set_client_ip("203.0.113.9".parse().unwrap());
        assert_eq!(ctx.client_ip(), Some("203.0.113.9".parse().unwrap()));
        assert_eq!(ctx.remote_addr().map(|a| a.port()), Some(5000));
    }
}
