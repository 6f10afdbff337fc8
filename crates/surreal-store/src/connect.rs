use std::time::Duration;

use anyhow::{anyhow, Context};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;

/// Connection settings for the target SurrealDB instance.
#[derive(Clone, Debug)]
pub struct SurrealOpts {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Connect with the default retry policy.
pub async fn surreal_connect(opts: &SurrealOpts) -> anyhow::Result<Surreal<Any>> {
    surreal_connect_with_retries(opts, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY).await
}

/// Connect to SurrealDB, retrying transient failures.
///
/// Servers that are still starting up refuse connections for a while, so
/// each failed attempt waits `retry_delay` before trying again.
pub async fn surreal_connect_with_retries(
    opts: &SurrealOpts,
    max_attempts: u32,
    retry_delay: Duration,
) -> anyhow::Result<Surreal<Any>> {
    let endpoint = websocket_endpoint(&opts.endpoint);
    tracing::debug!(
        "Connecting to SurrealDB at {} (namespace: {}, database: {})",
        endpoint,
        opts.namespace,
        opts.database
    );

    let mut last_error = None;
    for attempt in 1..=max_attempts.max(1) {
        match try_connect(&endpoint, opts).await {
            Ok(client) => {
                if attempt > 1 {
                    tracing::info!("Connected to SurrealDB after {attempt} attempts");
                }
                return Ok(client);
            }
            Err(e) => {
                if attempt < max_attempts {
                    tracing::warn!(
                        "Failed to connect to SurrealDB at '{}' (attempt {}/{}): {:#}. Retrying in {:?}",
                        endpoint,
                        attempt,
                        max_attempts,
                        e,
                        retry_delay
                    );
                    tokio::time::sleep(retry_delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    let last_error = last_error
        .map(|e| format!("{e:#}"))
        .unwrap_or_else(|| "no attempt was made".to_string());
    Err(anyhow!(
        "Failed to connect to SurrealDB at '{}' after {} attempts. Last error: {}",
        endpoint,
        max_attempts,
        last_error
    ))
}

/// HTTP endpoints are served over WebSocket by the `any` engine.
fn websocket_endpoint(endpoint: &str) -> String {
    endpoint
        .replace("http://", "ws://")
        .replace("https://", "wss://")
}

async fn try_connect(endpoint: &str, opts: &SurrealOpts) -> anyhow::Result<Surreal<Any>> {
    let client = surrealdb::engine::any::connect(endpoint)
        .await
        .with_context(|| format!("SurrealDB connection to '{endpoint}' failed"))?;

    // Embedded engines have no users to sign in as.
    if !endpoint.starts_with("mem://") {
        client
            .signin(surrealdb::opt::auth::Root {
                username: &opts.username,
                password: &opts.password,
            })
            .await
            .with_context(|| {
                format!(
                    "SurrealDB authentication failed (user: '{}')",
                    opts.username
                )
            })?;
    }

    client
        .use_ns(&opts.namespace)
        .use_db(&opts.database)
        .await
        .with_context(|| {
            format!(
                "SurrealDB failed to select namespace '{}' / database '{}'",
                opts.namespace, opts.database
            )
        })?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_endpoint() {
        assert_eq!(
            websocket_endpoint("http://localhost:8000"),
            "ws://localhost:8000"
        );
        assert_eq!(websocket_endpoint("https://db:8000"), "wss://db:8000");
        assert_eq!(websocket_endpoint("mem://"), "mem://");
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let opts = SurrealOpts {
            endpoint: "mem://".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            namespace: "test".to_string(),
            database: "test".to_string(),
        };
        let client = surreal_connect_with_retries(&opts, 1, Duration::from_millis(1)).await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_reports_last_error() {
        let opts = SurrealOpts {
            endpoint: "unsupported://nowhere".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            namespace: "test".to_string(),
            database: "test".to_string(),
        };
        let err = surreal_connect_with_retries(&opts, 2, Duration::from_millis(1))
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("after 2 attempts. Last error: "), "{err}");
        assert!(!err.contains("Some("), "{err}");
    }
}
