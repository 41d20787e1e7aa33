//! Outbound HTTP helpers shared by the engine and payment provider clients.
//!
//! Every upstream call goes through one `reqwest::Client` with an explicit
//! timeout. Retries cover transport failures only: connection errors on any
//! call, timeouts only on idempotent reads. A non-2xx response is returned
//! to the caller untouched.

use reqwest::{Client, RequestBuilder, Response};

use super::config::HttpConfig;

/// Build the shared client with the configured timeout
pub fn build_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .build()
}

/// Whether the request may be replayed after this transport error
pub fn is_transient(err: &reqwest::Error, idempotent: bool) -> bool {
    err.is_connect() || (idempotent && err.is_timeout())
}

/// Send a request built by `build`, retrying transient transport failures
///
/// `idempotent` must be false for anything that submits a transaction;
/// a timed-out POST may have reached the upstream.
pub async fn send_with_retry<F>(
    config: &HttpConfig,
    idempotent: bool,
    build: F,
) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match build().send().await {
            Ok(resp) => return Ok(resp),
            Err(e) if attempt < config.max_retries && is_transient(&e, idempotent) => {
                attempt += 1;
                tracing::debug!(
                    target: "megabolsa::http",
                    attempt,
                    error = %e,
                    "transient transport error, retrying"
                );
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_reported() {
        // Bind and drop a listener to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = HttpConfig {
            timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        };
        let client = build_client(&config).unwrap();
        let url = format!("http://{}/status", addr);

        let err = send_with_retry(&config, true, || client.get(&url))
            .await
            .unwrap_err();
        assert!(err.is_connect());
    }
}
