//! Cancellation plumbing shared by the services.

use std::future::Future;

use coldvault_core::AppError;
use tokio_util::sync::CancellationToken;

/// Race `future` against `cancel`. When the token fires first the future is dropped, which
/// aborts any provider or store call it was awaiting.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = future => result,
    }
}

pub fn ensure_active(cancel: &CancellationToken) -> Result<(), AppError> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wins_over_pending_future() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), AppError> = run_cancellable(&cancel, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_completed_future_passes_through() {
        let cancel = CancellationToken::new();
        let result = run_cancellable(&cancel, async { Ok::<_, AppError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert!(ensure_active(&cancel).is_ok());
    }
}
