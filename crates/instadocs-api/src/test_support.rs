// Loopback fakes for exercising the clients over real HTTP
use axum::Router;
use std::collections::HashMap;
use tokio::net::TcpListener;

use crate::RetryConfig;

/// Serve `app` on an ephemeral port and return its base URL
pub(crate) async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Retries without the real backoff delays
pub(crate) fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
    }
}

/// `OAuth k="v", ...` back into decoded pairs
pub(crate) fn oauth_header_params(header: &str) -> HashMap<String, String> {
    header
        .trim_start_matches("OAuth ")
        .split(", ")
        .filter_map(|field| field.split_once('='))
        .map(|(k, v)| {
            let v = v.trim_matches('"');
            (
                urlencoding::decode(k).unwrap().into_owned(),
                urlencoding::decode(v).unwrap().into_owned(),
            )
        })
        .collect()
}
