//! Loopback HTTP listener that captures one authorization redirect.

use super::error::{AuthError, InvalidStateError, MissingCodeError, MissingStateError, SsoError};
use crate::Config;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

type AuthResult = std::result::Result<String, SsoError>;

/// `None` until the login settles; written at most once.
type Slot = Option<AuthResult>;

/// How long `close()` waits for open connections before aborting the server.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Default wait used by [`AuthSsoServer::wait_for_configured_authorization`].
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_BODY: &str = "Authorization complete. You can close this window.";

/// Observable lifecycle of an [`AuthSsoServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoServerState {
    /// Not yet listening
    Created,
    /// Bound and waiting for the redirect
    Listening,
    /// Listening, and the login has settled
    Completed,
    /// Port released; the server cannot be restarted
    Closed,
}

enum Phase {
    Created,
    Starting,
    Listening(Listener),
    Closed,
}

struct Listener {
    redirect_uri: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

struct RedirectHandler {
    expected_state: String,
    result: Arc<watch::Sender<Slot>>,
}

/// Captures the authorization code of a browser-based SSO login.
///
/// Requests to the redirect path are evaluated in order:
///
/// 1. `error` present: HTTP 400 and the login fails with [`AuthError`].
/// 2. `code` missing: HTTP 400 `missing code`, keep waiting.
/// 3. `state` missing: HTTP 400 `missing state`, keep waiting.
/// 4. `state` differs from [`csrf_state`](Self::csrf_state): HTTP 400
///    `invalid state`, keep waiting.
/// 5. Otherwise HTTP 200 and the login succeeds with `code`.
///
/// The login settles once; later requests are answered but change nothing.
/// Call [`close`](Self::close) on every exit path. Dropping the server also
/// stops the listener.
pub struct AuthSsoServer {
    expected_state: String,
    redirect_path: String,
    timeout: Duration,
    result: Arc<watch::Sender<Slot>>,
    phase: Mutex<Phase>,
}

impl Default for AuthSsoServer {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSsoServer {
    /// Creates a server with a random CSRF state and the `/` redirect path.
    pub fn new() -> Self {
        let (result, _) = watch::channel(None);
        Self {
            expected_state: Uuid::new_v4().to_string(),
            redirect_path: "/".to_string(),
            timeout: DEFAULT_TIMEOUT,
            result: Arc::new(result),
            phase: Mutex::new(Phase::Created),
        }
    }

    /// Creates a server using the redirect path and timeout from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_redirect_path(config.sso_redirect_path.as_str())
            .with_timeout(config.sso_timeout)
    }

    /// Overrides the expected CSRF state.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.expected_state = state.into();
        self
    }

    /// Sets the path the redirect is served on. A leading `/` is added if
    /// missing.
    pub fn with_redirect_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.redirect_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// Sets how long [`wait_for_configured_authorization`](Self::wait_for_configured_authorization)
    /// waits (default: 5 minutes).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wait applied by
    /// [`wait_for_configured_authorization`](Self::wait_for_configured_authorization).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The CSRF state the redirect must carry.
    pub fn csrf_state(&self) -> &str {
        &self.expected_state
    }

    /// The redirect URI, once listening.
    pub fn redirect_uri(&self) -> std::result::Result<String, SsoError> {
        match &*self.lock() {
            Phase::Listening(listener) => Ok(listener.redirect_uri.clone()),
            Phase::Closed => Err(SsoError::Closed),
            Phase::Created | Phase::Starting => Err(SsoError::NotStarted),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SsoServerState {
        match &*self.lock() {
            Phase::Created | Phase::Starting => SsoServerState::Created,
            Phase::Closed => SsoServerState::Closed,
            Phase::Listening(_) if self.result.borrow().is_some() => SsoServerState::Completed,
            Phase::Listening(_) => SsoServerState::Listening,
        }
    }

    /// Binds an ephemeral loopback port and starts serving the redirect path.
    ///
    /// Returns the redirect URI, `http://127.0.0.1:<port><path>`.
    ///
    /// # Errors
    ///
    /// [`SsoError::AlreadyStarted`] on a second call, [`SsoError::Closed`]
    /// after `close()`, [`SsoError::Bind`] if no port could be bound.
    pub async fn start(&self) -> std::result::Result<String, SsoError> {
        {
            let mut phase = self.lock();
            if matches!(*phase, Phase::Closed) {
                return Err(SsoError::Closed);
            }
            if !matches!(*phase, Phase::Created) {
                return Err(SsoError::AlreadyStarted);
            }
            *phase = Phase::Starting;
        }

        let listener = match TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await {
            Ok(listener) => listener,
            Err(e) => return Err(self.abort_start(e)),
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => return Err(self.abort_start(e)),
        };
        let redirect_uri = format!("http://127.0.0.1:{}{}", port, self.redirect_path);

        let handler = Arc::new(RedirectHandler {
            expected_state: self.expected_state.clone(),
            result: Arc::clone(&self.result),
        });
        let app = Router::new()
            .route(&self.redirect_path, get(handle_redirect))
            .with_state(handler);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
            debug!("SSO redirect server shutting down");
        });
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                warn!(error = %e, "SSO redirect server error");
            }
        });

        let mut phase = self.lock();
        if !matches!(*phase, Phase::Starting) {
            // closed while binding
            let _ = shutdown_tx.send(());
            task.abort();
            return Err(SsoError::Closed);
        }
        *phase = Phase::Listening(Listener {
            redirect_uri: redirect_uri.clone(),
            shutdown: Some(shutdown_tx),
            task,
        });

        info!(%redirect_uri, "SSO redirect server listening");
        Ok(redirect_uri)
    }

    /// Waits until the login settles.
    ///
    /// Any number of callers may wait; all observe the same result.
    ///
    /// # Errors
    ///
    /// [`SsoError::Auth`] if the identity provider reported an error,
    /// [`SsoError::Cancelled`] if the server was closed first.
    pub async fn wait_for_authorization(&self) -> AuthResult {
        let mut rx = self.result.subscribe();
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        settled.unwrap_or(Err(SsoError::Closed))
    }

    /// Waits up to `timeout` for the login to settle, then closes the server
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`SsoError::Timeout`] if nothing settled in time, otherwise as
    /// [`wait_for_authorization`](Self::wait_for_authorization).
    pub async fn wait_for_authorization_with_timeout(&self, timeout: Duration) -> AuthResult {
        let waited = tokio::time::timeout(timeout, self.wait_for_authorization()).await;
        if waited.is_err() && settle(&self.result, Err(SsoError::Timeout(timeout))) {
            warn!(?timeout, "timed out waiting for SSO redirect");
        }

        self.close().await;
        self.settled().unwrap_or(Err(SsoError::Cancelled))
    }

    /// Like [`wait_for_authorization_with_timeout`](Self::wait_for_authorization_with_timeout),
    /// using the timeout this server was built with.
    pub async fn wait_for_configured_authorization(&self) -> AuthResult {
        self.wait_for_authorization_with_timeout(self.timeout).await
    }

    /// Stops listening and releases the port.
    ///
    /// Idempotent. Waiters still pending receive [`SsoError::Cancelled`].
    pub async fn close(&self) {
        let previous = {
            let mut phase = self.lock();
            std::mem::replace(&mut *phase, Phase::Closed)
        };

        if settle(&self.result, Err(SsoError::Cancelled)) {
            debug!("SSO login cancelled before a redirect arrived");
        }

        let Phase::Listening(mut listener) = previous else {
            return;
        };

        if let Some(shutdown) = listener.shutdown.take() {
            let _ = shutdown.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut listener.task)
            .await
            .is_err()
        {
            debug!("SSO redirect server did not drain in time, aborting");
            listener.task.abort();
            let _ = (&mut listener.task).await;
        }

        info!(redirect_uri = %listener.redirect_uri, "SSO redirect server closed");
    }

    fn settled(&self) -> Slot {
        self.result.borrow().clone()
    }

    fn abort_start(&self, err: std::io::Error) -> SsoError {
        let mut phase = self.lock();
        if matches!(*phase, Phase::Starting) {
            *phase = Phase::Created;
        }
        warn!(error = %err, "failed to bind SSO redirect listener");
        SsoError::Bind(Arc::new(err))
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AuthSsoServer {
    fn drop(&mut self) {
        let phase = self.phase.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Phase::Listening(listener) = std::mem::replace(phase, Phase::Closed) {
            if let Some(shutdown) = listener.shutdown {
                let _ = shutdown.send(());
            }
            listener.task.abort();
        }
    }
}

/// Stores `result` unless the login already settled. Returns whether it did.
fn settle(slot: &watch::Sender<Slot>, result: AuthResult) -> bool {
    slot.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(result);
        true
    })
}

#[derive(Debug, Default)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl RedirectParams {
    /// Collects the known parameters. A repeated key keeps its first value.
    fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let field = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if field.is_none() {
                *field = Some(value.into());
            }
        }
        params
    }
}

/// Applies the redirect checks in order. Empty parameters count as absent.
fn evaluate(params: RedirectParams, expected_state: &str) -> AuthResult {
    let present = |value: Option<String>| value.filter(|v| !v.is_empty());

    if let Some(error) = present(params.error) {
        return Err(AuthError::new(error, present(params.error_description)).into());
    }
    let code = present(params.code).ok_or(MissingCodeError)?;
    let state = present(params.state).ok_or(MissingStateError)?;
    if state != expected_state {
        return Err(InvalidStateError.into());
    }
    Ok(code)
}

async fn handle_redirect(
    State(handler): State<Arc<RedirectHandler>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> (StatusCode, String) {
    match evaluate(RedirectParams::from_pairs(pairs), &handler.expected_state) {
        Ok(code) => {
            if settle(&handler.result, Ok(code)) {
                info!("SSO authorization code received");
            } else {
                debug!("SSO redirect ignored, login already settled");
            }
            (StatusCode::OK, SUCCESS_BODY.to_string())
        }
        Err(err @ SsoError::Auth(_)) => {
            let body = err.to_string();
            if settle(&handler.result, Err(err)) {
                warn!(error = %body, "identity provider rejected SSO login");
            }
            (StatusCode::BAD_REQUEST, body)
        }
        Err(err) => {
            debug!(error = %err, "rejected SSO redirect request");
            (StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}
