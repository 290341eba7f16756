use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    /// No sleeping between attempts; for id-collision loops where the next
    /// try uses a freshly generated value anyway.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }
}

/// Retries every error.
pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    retry_async_with_config_if(config, f, |_| true).await
}

/// Retries only errors for which `should_retry` holds; anything else is
/// returned immediately.
pub async fn retry_async_with_config_if<F, Fut, T, E, P>(
    config: RetryConfig,
    mut f: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left -= 1;
                if attempts_left == 0 || !should_retry(&e) {
                    return Err(e);
                }

                let extra = match config.jitter_max {
                    Some(jitter) if !jitter.is_zero() => {
                        let jitter_ms = jitter.as_millis() as u64;
                        Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
                    }
                    _ => Duration::ZERO,
                };
                let wait = backoff + extra;
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            jitter_max: None,
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_retries() {
        let counter = AtomicUsize::new(0);

        let res: Result<usize, &'static str> = retry_async_with_config(fast(3), || async {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("fail")
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(res, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_fails_after_max_attempts() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> = retry_async_with_config(fast(2), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("always fail")
        })
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);

        let res: Result<(), &'static str> = retry_async_with_config_if(
            RetryConfig::immediate(5),
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("permanent")
            },
            |e| *e == "transient",
        )
        .await;

        assert_eq!(res, Err("permanent"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
