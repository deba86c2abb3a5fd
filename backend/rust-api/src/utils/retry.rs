use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    /// `retries` extra attempts after the first, each preceded by exactly
    /// `delay`. Total waiting is bounded by `retries * delay`.
    pub fn fixed(retries: usize, delay: Duration) -> Self {
        Self {
            max_attempts: retries + 1,
            base_backoff: delay,
            max_backoff: delay,
            jitter_max: None,
        }
    }

    /// Upper bound of time spent sleeping between attempts.
    pub fn total_wait_budget(&self) -> Duration {
        let mut total = Duration::ZERO;
        let mut backoff = self.base_backoff;
        for _ in 1..self.max_attempts {
            total += backoff + self.jitter_max.unwrap_or(Duration::ZERO);
            backoff = std::cmp::min(backoff * 2, self.max_backoff);
        }
        total
    }
}

pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 {
                    return Err(e);
                }

                let wait = match config.jitter_max {
                    Some(jitter_max) => {
                        let jitter_ms = jitter_max.as_millis() as u64;
                        let extra = if jitter_ms == 0 {
                            0
                        } else {
                            rand::random::<u64>() % (jitter_ms + 1)
                        };
                        backoff + Duration::from_millis(extra)
                    }
                    None => backoff,
                };
                tokio::time::sleep(wait).await;

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
