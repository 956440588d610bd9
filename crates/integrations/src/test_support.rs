use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::fetch::{ResponseCache, RetryPolicy};
use crate::IntegrationContext;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> Option<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.ok()?;
    let address = listener.local_addr().ok()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Some(format!("http://{address}"))
}

pub fn context() -> IntegrationContext {
    IntegrationContext {
        policy: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        },
        cache: Arc::new(ResponseCache::new(Duration::from_secs(300))),
        reference_ttl: Duration::from_secs(300),
    }
}
