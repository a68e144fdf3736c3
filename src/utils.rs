//! Small async helpers shared by the phase handlers

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, UpstreamError};

/// Run one suspension point under a timeout and a cancellation token
///
/// Cancellation wins over a result that becomes ready at the same time.
///
/// # Errors
///
/// - [`Error::Cancelled`] if `cancel` fires first
/// - [`UpstreamError::Timeout`] if `timeout` elapses first
/// - whatever `fut` itself returns
pub async fn bounded<T>(
    operation: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(operation.to_string())),
        outcome = tokio::time::timeout(timeout, fut) => {
            outcome.map_err(|_| UpstreamError::Timeout {
                operation: operation.to_string(),
                timeout,
            })?
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_result() {
        let value = bounded(
            "noop",
            Duration::from_secs(1),
            &CancellationToken::new(),
            async { Ok(7) },
        )
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn times_out() {
        let err = bounded(
            "slow call",
            Duration::from_millis(10),
            &CancellationToken::new(),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await
        .unwrap_err();

        match err {
            Error::Upstream(UpstreamError::Timeout { operation, .. }) => {
                assert_eq!(operation, "slow call");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = bounded("upload", Duration::from_secs(1), &cancel, async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }
}
