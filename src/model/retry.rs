use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::diagnosis::ModelOutcome;

/// Bounded fixed-delay retry schedule for transient failures. The delay is
/// deliberately flat, matching the product's observed pacing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_millis(2000),
        }
    }
}

/// Runs `attempt` until it yields anything other than a transient failure,
/// sleeping the fixed delay between tries. Exhaustion returns the last
/// transient outcome unchanged; this function never panics or errors.
pub async fn with_retries<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> ModelOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ModelOutcome>,
{
    let mut last = ModelOutcome::TransientFailure {
        cause: "no attempts were made".to_string(),
    };

    for round in 1..=policy.max_attempts {
        let outcome = attempt().await;
        if !outcome.is_transient() {
            return outcome;
        }

        debug!(
            attempt = round,
            max_attempts = policy.max_attempts,
            "transient failure"
        );
        last = outcome;
        if round < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    last
}
