//! OAuth correlation engine
//!
//! A connect request registers a pending authorization under its server id,
//! prints the provider URL (whose `state` is that server id) and waits. The
//! provider later redirects the user's browser to `GET /callback`, where the
//! engine finishes the token exchange and resolves the waiter.
//!
//! A callback whose state has no waiter still completes the exchange; its
//! result is dropped with a warning.

mod pending;
mod provider;
mod server;

pub use pending::{AuthorizationOutcome, PendingAuthorizations, PendingHandle};
pub use provider::{FacebookOAuth, OAuthProvider};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::OAuthConfig;
use crate::error::{AuthorizationError, Result, SocialcastError};
use crate::types::{ManagedPage, Platform};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Query string of a provider redirect
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Plain-text page shown in the user's browser after a redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPage {
    pub status: StatusCode,
    pub body: String,
}

impl CallbackPage {
    fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

struct RunningListener {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct OAuthEngine {
    provider: Arc<dyn OAuthProvider>,
    pending: PendingAuthorizations,
    listen_address: String,
    listener: Mutex<Option<RunningListener>>,
}

impl OAuthEngine {
    pub fn new(provider: Arc<dyn OAuthProvider>, listen_address: impl Into<String>) -> Self {
        Self {
            provider,
            pending: PendingAuthorizations::new(),
            listen_address: listen_address.into(),
            listener: Mutex::new(None),
        }
    }

    /// Engine backed by Facebook Login, scoped for `platform`
    pub fn from_config(config: &OAuthConfig, platform: Platform) -> Self {
        Self::new(
            Arc::new(FacebookOAuth::new(config, platform)),
            config.listen_address(),
        )
    }

    pub fn get_auth_url(&self, server_id: &str) -> Result<String> {
        self.provider.authorization_url(server_id)
    }

    /// Register a waiter for `server_id`. The handle must be awaited with
    /// [`PendingHandle::wait`]; dropping it unregisters.
    pub fn register_pending(&self, server_id: &str) -> PendingHandle {
        self.pending.register(server_id)
    }

    pub fn pending(&self) -> &PendingAuthorizations {
        &self.pending
    }

    pub async fn handle_callback(&self, query: CallbackQuery) -> CallbackPage {
        if query.error.is_some() {
            let description = query
                .error_description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!("Authorization denied: {}", description);

            if let Some(state) = &query.state {
                self.pending
                    .resolve(state, Err(AuthorizationError::Denied(description.clone())));
            }
            return CallbackPage::new(
                StatusCode::OK,
                format!("Authorization failed: {}", description),
            );
        }

        let (code, state) = match (query.code, query.state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => (code, state),
            _ => {
                return CallbackPage::new(
                    StatusCode::BAD_REQUEST,
                    "Invalid callback - missing code or state",
                )
            }
        };

        match self.complete_exchange(&code).await {
            Ok(pages) => {
                let count = pages.len();
                if self.pending.resolve(&state, Ok(pages)) {
                    info!("Authorization for {} completed with {} page(s)", state, count);
                } else {
                    warn!(
                        "No pending authorization for {}, dropping {} page(s)",
                        state, count
                    );
                }
                CallbackPage::new(
                    StatusCode::OK,
                    "Connected! You can close this window and return to your chat.",
                )
            }
            Err(e) => {
                error!("Authorization for {} failed: {}", state, e);
                self.pending.resolve(&state, Err(e.clone()));
                CallbackPage::new(StatusCode::BAD_GATEWAY, format!("Authorization failed: {}", e))
            }
        }
    }

    async fn complete_exchange(
        &self,
        code: &str,
    ) -> std::result::Result<Vec<ManagedPage>, AuthorizationError> {
        let short_token = self.provider.exchange_code(code).await?;

        let token = match self.provider.long_lived_token(&short_token).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Long-lived token exchange failed, keeping short-lived token: {}", e);
                short_token
            }
        };

        self.provider.managed_accounts(&token).await
    }

    /// Start the callback listener. Starting a running listener is a no-op
    /// that returns the address already bound.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr> {
        let mut listener = self.listener.lock().await;
        if let Some(running) = listener.as_ref() {
            return Ok(running.addr);
        }

        let tcp = tokio::net::TcpListener::bind(&self.listen_address)
            .await
            .map_err(SocialcastError::Listener)?;
        let addr = tcp.local_addr().map_err(SocialcastError::Listener)?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = server::router(self.clone());
        let task = tokio::spawn(async move {
            let result = axum::serve(tcp, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("OAuth callback listener stopped: {}", e);
            }
        });

        info!("OAuth callback listener on http://{}/callback", addr);
        *listener = Some(RunningListener {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    /// Stop the listener, release its port, and cancel every pending
    /// authorization. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let running = self.listener.lock().await.take();
        let Some(running) = running else {
            return false;
        };

        let _ = running.shutdown.send(());
        let mut task = running.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("OAuth callback listener did not drain in time, aborting");
            task.abort();
            let _ = task.await;
        }

        let cancelled = self.pending.cancel_all();
        info!(
            "OAuth callback listener stopped ({} pending authorization(s) cancelled)",
            cancelled
        );
        true
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|r| r.addr)
    }
}
