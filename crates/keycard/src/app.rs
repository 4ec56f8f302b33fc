//! Service wiring from a loaded [`KeycardConfig`].

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use keycard_config::{DatabaseSection, KeycardConfig};
use keycard_core::{handler_fn, json_response, Handler};
use keycard_database::PoolSettings;
use keycard_middleware::Pipeline;
use keycard_server::{Router, ServerConfig};
use keycard_telemetry::{fields, Hub, LogTransport, Logger};
use serde_json::json;

/// Server settings from the `server` section.
#[must_use]
pub fn server_config(config: &KeycardConfig) -> ServerConfig {
    ServerConfig::builder()
        .http_addr(config.server.http_addr())
        .shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout_secs))
        .keep_alive(config.server.keep_alive)
        .env(config.server.env.clone())
        .version(config.server.version.clone())
        .build()
}

/// Pool settings from the `database` section.
#[must_use]
pub fn pool_settings(database: &DatabaseSection, url: &str) -> PoolSettings {
    PoolSettings::new(url)
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .idle_timeout(Duration::from_secs(database.idle_timeout_secs))
        .connect_timeout(Duration::from_secs(database.connect_timeout_secs))
}

/// Template hub reporting through the log, or a no-op hub when disabled.
#[must_use]
pub fn build_hub(config: &KeycardConfig) -> Hub {
    if config.hub.enabled {
        Hub::new(config.hub_options(), Arc::new(LogTransport))
    } else {
        Hub::noop()
    }
}

/// Lifecycle middleware for every request.
#[must_use]
pub fn pipeline(config: &KeycardConfig, hub: Hub) -> Pipeline {
    let logger = Logger::new()
        .with_field(fields::ENV, config.server.env.clone())
        .with_field(fields::VERSION, config.server.version.clone());

    config
        .server
        .quiet_routes
        .iter()
        .fold(Pipeline::builder(), |builder, route| builder.quiet_route(route.clone()))
        .logger(logger)
        .hub(hub)
        .trust_request_id(config.server.trust_request_id)
        .build()
}

/// Base router with `GET /healthz`.
#[must_use]
pub fn router(config: &KeycardConfig) -> Router {
    let mut router = Router::new();
    router.get("/healthz", healthz(config));
    router
}

fn healthz(config: &KeycardConfig) -> Handler {
    let body = Arc::new(json!({
        "status": "available",
        "environment": config.server.env,
        "version": config.server.version,
    }));

    handler_fn(move |_ctx, _req| {
        let body = Arc::clone(&body);
        Box::pin(async move { json_response(StatusCode::OK, body.as_ref()) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_from_section() {
        let mut config = KeycardConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 4000;
        config.server.shutdown_timeout_secs = 3;

        let server = server_config(&config);
        assert_eq!(server.http_addr(), "127.0.0.1:4000");
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(3));
        assert_eq!(server.env(), "dev");
    }

    #[test]
    fn test_pool_settings_from_section() {
        let mut database = DatabaseSection::default();
        database.max_connections = 8;
        database.idle_timeout_secs = 60;

        let settings = pool_settings(&database, "postgres://localhost/keycard");
        assert_eq!(settings.url, "postgres://localhost/keycard");
        assert_eq!(settings.max_connections, 8);
        assert_eq!(settings.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_pipeline_order() {
        let pipeline = pipeline(&KeycardConfig::default(), Hub::noop());
        assert_eq!(
            pipeline.stage_names(),
            vec!["recovery", "logger", "request_id", "real_ip"]
        );
    }
}
