// Loopback consent flow for Google: the browser redirects back to a one-shot
// listener on 127.0.0.1 carrying the authorization code.
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use instadocs_api::{ClientSecrets, GoogleAuthClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use crate::credentials::AuthorizedUser;
use crate::{Error, Result};

/// How long to wait for the user to finish in the browser
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str = "<html><body><h3>instadocs is authorized.</h3>\
    <p>You can close this tab and return to the terminal.</p></body></html>";

pub struct ConsentFlow {
    secrets: ClientSecrets,
    redirect_uri: String,
    state: String,
    authorization_url: String,
    code_rx: oneshot::Receiver<Result<String>>,
    shutdown: Option<oneshot::Sender<()>>,
}

struct RedirectState {
    expected_state: String,
    /// Taken by the first request that carries a code or an error
    code_tx: Mutex<Option<oneshot::Sender<Result<String>>>>,
}

impl ConsentFlow {
    /// Serve the loopback redirect target and prepare the consent URL
    pub async fn start(secrets: ClientSecrets) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state = uuid::Uuid::new_v4().simple().to_string();
        let authorization_url = secrets.authorization_url(&redirect_uri, &state)?;

        let (code_tx, code_rx) = oneshot::channel();
        let shared = Arc::new(RedirectState {
            expected_state: state.clone(),
            code_tx: Mutex::new(Some(code_tx)),
        });
        let app = Router::new()
            .route("/", get(receive_redirect))
            .with_state(shared);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        debug!("Waiting for Google redirect on {}", redirect_uri);

        Ok(Self {
            secrets,
            redirect_uri,
            state,
            authorization_url,
            code_rx,
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// Try to open the consent page; false when no browser could be launched
    pub fn open_browser(&self) -> bool {
        match open::that(&self.authorization_url) {
            Ok(()) => true,
            Err(e) => {
                debug!("Could not open browser: {}", e);
                false
            }
        }
    }

    /// Wait for the redirect, exchange the code, and return the new record
    pub async fn finish(mut self, auth: &GoogleAuthClient) -> Result<AuthorizedUser> {
        let code = self.wait_for_code().await?;
        info!("Received authorization code, exchanging for tokens");
        let token = auth
            .exchange_code(&self.secrets, &code, &self.redirect_uri)
            .await?;
        AuthorizedUser::from_token_response(&self.secrets, token, Utc::now())
    }

    async fn wait_for_code(&mut self) -> Result<String> {
        let received = tokio::time::timeout(CONSENT_TIMEOUT, &mut self.code_rx)
            .await
            .map_err(|_| Error::AuthError("timed out waiting for Google authorization".into()));
        self.stop();

        received?.map_err(|_| Error::AuthError("redirect listener stopped unexpectedly".into()))?
    }

    fn stop(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
    }
}

impl Drop for ConsentFlow {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn receive_redirect(
    State(shared): State<Arc<RedirectState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    // Anything without a code or an error isn't Google's redirect
    if !params.contains_key("code") && !params.contains_key("error") {
        return (
            StatusCode::BAD_REQUEST,
            Html("<html><body>Waiting for Google.</body></html>".to_string()),
        );
    }

    let outcome = parse_redirect(&params, &shared.expected_state);
    let response = match &outcome {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE.to_string())),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Html(format!("<html><body>{}</body></html>", e)),
        ),
    };

    if let Some(code_tx) = shared.code_tx.lock().await.take() {
        let _ = code_tx.send(outcome);
    }
    response
}

/// Pull the authorization code out of the redirect query, checking `state`
fn parse_redirect(params: &HashMap<String, String>, expected_state: &str) -> Result<String> {
    if let Some(error) = params.get("error") {
        return Err(Error::AuthError(format!("Google denied access: {}", error)));
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(Error::AuthError("state mismatch in Google redirect".into()));
    }

    params
        .get("code")
        .filter(|c| !c.is_empty())
        .cloned()
        .ok_or_else(|| Error::AuthError("Google redirect carried no code".into()))
}
