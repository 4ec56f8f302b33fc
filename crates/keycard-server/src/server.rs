//! HTTP server and shutdown coordinator.
//!
//! The server accepts HTTP/1.1 connections with Hyper on Tokio and hands each
//! request to a single [`Handler`], usually a [`Router`](crate::Router)
//! wrapped in the standard middleware pipeline.
//!
//! # Shutdown
//!
//! When the [`ShutdownSignal`] fires:
//!
//! 1. the state moves to `Draining` and the listener stops accepting,
//! 2. every connection finishes its in-flight request and closes,
//! 3. the server waits up to the configured grace period for that,
//! 4. the state moves to `Stopped` and [`Server::serve`] returns.
//!
//! Connections still open when the grace period elapses make `serve` return
//! [`ServerError::ShutdownTimeout`], so the process can exit non-zero.
//!
//! # Example
//!
//! ```rust,ignore
//! use keycard_server::{Router, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keycard_server::ServerError> {
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!     let router = Router::new();
//!
//!     Server::run(config, router.into_handler()).await
//! }
//! ```

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use keycard_core::{ApiError, Handler, Request, RequestContext, Response};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::shutdown::{ConnectionToken, ConnectionTracker, ServerState, ShutdownSignal, StateCell};

/// A bound HTTP server.
///
/// Binding and serving are separate so callers can learn the bound address
/// (for port 0) before serving.
pub struct Server {
    config: ServerConfig,
    handler: Handler,
    listener: TcpListener,
    local_addr: SocketAddr,
    state: StateCell,
}

impl Server {
    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidAddress`] if the address does not parse
    /// and [`ServerError::Bind`] if it cannot be bound.
    pub async fn bind(config: ServerConfig, handler: Handler) -> Result<Self, ServerError> {
        let addr = config
            .socket_addr()
            .map_err(|source| ServerError::InvalidAddress {
                addr: config.http_addr().to_string(),
                source,
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Self {
            config,
            handler,
            listener,
            local_addr,
            state: StateCell::new(),
        })
    }

    /// Binds and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns any bind, listener or shutdown failure, and
    /// [`ServerError::Signal`] if the signal handlers cannot be installed.
    pub async fn run(config: ServerConfig, handler: Handler) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals().map_err(ServerError::Signal)?;
        Self::bind(config, handler).await?.serve(shutdown).await
    }

    /// Returns the bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle to the lifecycle state.
    #[must_use]
    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    /// Serves connections until `shutdown` fires, then drains.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listener`] if accepting fails for a reason other
    /// than a single dropped connection, and
    /// [`ServerError::ShutdownTimeout`] if connections outlive the grace
    /// period.
    pub async fn serve(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let Self {
            config,
            handler,
            listener,
            local_addr,
            state,
        } = self;

        tracing::info!(
            addr = %local_addr,
            env = config.env(),
            version = config.version(),
            "starting server"
        );

        // Connections and the accept loop follow `stop`, which only fires once
        // the drain task has taken over.
        let stop = ShutdownSignal::new();
        let tracker = ConnectionTracker::new();
        let (drained_tx, drained_rx) = oneshot::channel();

        let drain = {
            let stop = stop.clone();
            let tracker = tracker.clone();
            let state = state.clone();
            let grace = config.shutdown_timeout();

            tokio::spawn(async move {
                shutdown.recv().await;
                state.advance(ServerState::Draining);
                tracing::info!(
                    active = tracker.active_connections(),
                    grace_ms = grace.as_millis() as u64,
                    "shutting down server"
                );
                stop.trigger();

                let outcome = match tokio::time::timeout(grace, tracker.wait_for_shutdown()).await
                {
                    Ok(()) => Ok(()),
                    Err(_) => Err(ServerError::ShutdownTimeout {
                        timeout: grace,
                        active: tracker.active_connections(),
                    }),
                };
                let _ = drained_tx.send(outcome);
            })
        };

        loop {
            tokio::select! {
                biased;

                () = stop.recv() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let Some(token) = admit(&tracker, &stop) else {
                            drop(stream);
                            break;
                        };
                        let handler = handler.clone();
                        let stop = stop.clone();
                        let keep_alive = config.keep_alive();

                        tokio::spawn(async move {
                            serve_connection(stream, remote_addr, handler, keep_alive, stop).await;
                            drop(token);
                        });
                    }
                    Err(e) if is_transient(&e) => {
                        tracing::debug!(error = %e, "dropped connection during accept");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "listener failed");
                        drain.abort();
                        stop.trigger();
                        state.advance(ServerState::Stopped);
                        return Err(ServerError::Listener(e));
                    }
                },
            }
        }

        drop(listener);

        let outcome = drained_rx.await.unwrap_or(Err(ServerError::ShutdownAborted));
        state.advance(ServerState::Stopped);

        match outcome {
            Ok(()) => {
                tracing::info!("stopped server");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to shutdown http server");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Registers an accepted connection unless draining has already begun.
///
/// The token is taken before the flag is read, so the drain task either
/// counts this connection or the connection is refused here.
fn admit(tracker: &ConnectionTracker, stop: &ShutdownSignal) -> Option<ConnectionToken> {
    let token = tracker.acquire();
    if stop.is_shutdown() {
        return None;
    }
    Some(token)
}

/// Serves one connection until it closes or `stop` fires.
///
/// On `stop` the connection finishes the request it is processing, then
/// closes; idle keep-alive connections close at once.
async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    handler: Handler,
    keep_alive: bool,
    stop: ShutdownSignal,
) {
    let service = service_fn(move |req: hyper::Request<Incoming>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(dispatch(&handler, remote_addr, req).await) }
    });

    let conn = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(error = %e, remote_addr = %remote_addr, "connection error");
                }
                break;
            }
            () = stop.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Buffers the body and runs the handler with a fresh context.
async fn dispatch(
    handler: &Handler,
    remote_addr: SocketAddr,
    req: hyper::Request<Incoming>,
) -> Response {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            return ApiError::BadRequest("failed to read request body".to_string())
                .into_response();
        }
    };

    let request = Request::from_parts(parts, Full::<Bytes>::new(body));
    let mut ctx = RequestContext::with_remote_addr(remote_addr);
    handler(&mut ctx, request).await
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
