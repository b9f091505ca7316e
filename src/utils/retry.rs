use std::future::Future;
use std::time::Duration;

const INITIAL_BACKOFF_MS: u64 = 50;

/// Runs `op` up to `attempts` times with exponential backoff between tries.
///
/// Returns the first success or the last error. `attempts` of 0 is treated
/// as 1 so the operation always runs at least once.
pub async fn with_retry<T, E, F, Fut>(label: &str, attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts => {
                tracing::debug!("{} failed (attempt {}): {}", label, attempt + 1, e);
                let backoff = INITIAL_BACKOFF_MS * (1 << attempt.min(10));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!("{} failed after {} attempts: {}", label, attempts, e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = with_retry("flaky", 3, || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err(format!("boom {}", n)) } else { Ok(n) }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_bound() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_retry("always", 2, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("nope".to_string())
        })
        .await;

        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _: Result<(), String> = with_retry("once", 0, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("x".to_string())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
