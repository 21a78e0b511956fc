//! Same-origin callback route.
//!
//! Hosts the fixed path the provider redirects back to. Where the platform
//! allows it, this is the preferred channel: the route parks a waiter keyed
//! by the CSRF state and hands the callback parameters straight to the
//! in-process flow, instead of relying on the popup location poll.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ConnectError, Result};
use crate::oauth::ConnectionService;
use crate::popup::CallbackParams;
use crate::store::ConnectionProfile;

pub const CALLBACK_PATH: &str = "/connections/provider/callback";

struct Waiter {
    sender: oneshot::Sender<CallbackParams>,
    created_at: Instant,
}

#[derive(Clone)]
struct ServerState {
    waiters: Arc<Mutex<HashMap<String, Waiter>>>,
}

/// HTTP server exposing the provider callback path.
pub struct CallbackServer {
    addr: SocketAddr,
    timeout: Duration,
}

impl CallbackServer {
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self { addr: addr.into(), timeout: Duration::from_secs(300) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn start(self) -> Result<CallbackServerHandle> {
        let state = ServerState { waiters: Arc::new(Mutex::new(HashMap::new())) };

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .route("/health", get(|| async { "OK" }))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| ConnectError::config(format!("cannot bind {}: {e}", self.addr)))?;
        let actual_addr = listener
            .local_addr()
            .map_err(|e| ConnectError::config(format!("cannot resolve local addr: {e}")))?;

        let cancel_token = CancellationToken::new();
        let server_cancel = cancel_token.clone();
        let server_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    server_cancel.cancelled().await;
                })
                .await;
        });

        // Drop waiters nobody will ever complete.
        let cleanup_state = state.clone();
        let cleanup_cancel = cancel_token.clone();
        let timeout = self.timeout;
        let cleanup_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let mut waiters = cleanup_state.waiters.lock().unwrap();
                        let now = Instant::now();
                        waiters.retain(|_, w| now.duration_since(w.created_at) <= timeout);
                    }
                    _ = cleanup_cancel.cancelled() => break,
                }
            }
        });

        info!(target: "connectflow", addr = %actual_addr, "callback server listening");
        Ok(CallbackServerHandle {
            addr: actual_addr,
            state,
            timeout: self.timeout,
            cancel_token,
            server_task,
            cleanup_task,
        })
    }
}

pub struct CallbackServerHandle {
    addr: SocketAddr,
    state: ServerState,
    timeout: Duration,
    cancel_token: CancellationToken,
    server_task: tokio::task::JoinHandle<()>,
    cleanup_task: tokio::task::JoinHandle<()>,
}

impl CallbackServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn callback_url(&self) -> String {
        format!("http://{}{}", self.addr, CALLBACK_PATH)
    }

    /// Park until the provider redirects back with the given state, or the
    /// timeout elapses.
    pub async fn wait_for_callback(&self, state: &str) -> Result<CallbackParams> {
        let (sender, receiver) = oneshot::channel();
        {
            let mut waiters = self.state.waiters.lock().unwrap();
            waiters.insert(state.to_string(), Waiter { sender, created_at: Instant::now() });
        }

        tokio::select! {
            result = receiver => {
                result.map_err(|_| ConnectError::Timeout { timeout_secs: self.timeout.as_secs() })
            }
            _ = tokio::time::sleep(self.timeout) => {
                let mut waiters = self.state.waiters.lock().unwrap();
                waiters.remove(state);
                Err(ConnectError::Timeout { timeout_secs: self.timeout.as_secs() })
            }
        }
    }

    /// Full bridge-based authorization: initiate, wait for the redirect,
    /// complete the exchange.
    pub async fn run_authorization(
        &self,
        service: &ConnectionService,
        user_id: &str,
    ) -> Result<ConnectionProfile> {
        let request = service.initiate(user_id).await?;
        info!(target: "connectflow", user = %user_id, url = %request.auth_url,
            "authorization URL issued; waiting for provider redirect");

        let params = self.wait_for_callback(&request.state).await?;
        if let Some(error) = params.error {
            return Err(ConnectError::ProviderDenied(error));
        }
        let (Some(code), Some(state)) = (params.code, params.state) else {
            return Err(ConnectError::InvalidState);
        };
        service.complete(user_id, &code, &state).await
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel_token.cancel();
        let _ = tokio::join!(self.server_task, self.cleanup_task);
        Ok(())
    }
}

async fn handle_callback(
    Query(params): Query<CallbackParams>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    let key = params.state.clone().unwrap_or_default();
    let waiter = {
        let mut waiters = state.waiters.lock().unwrap();
        waiters.remove(&key)
    };

    match waiter {
        Some(waiter) => {
            let _ = waiter.sender.send(params);
            (
                StatusCode::OK,
                Html(
                    "<html><head><title>Connected</title></head><body>\
                     <p>Authorization complete. You can close this window.</p>\
                     <script>setTimeout(() => window.close(), 1500);</script>\
                     </body></html>",
                ),
            )
        }
        None => {
            debug!(target: "connectflow", "callback with unknown or expired state");
            (
                StatusCode::BAD_REQUEST,
                Html(
                    "<html><head><title>Authorization error</title></head><body>\
                     <p>This authorization request is unknown or has expired.</p>\
                     </body></html>",
                ),
            )
        }
    }
}
