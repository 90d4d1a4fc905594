//! The only suspension point of a run.

use std::time::Duration;

use super::generation::{Cancelled, RunToken};

/// Suspend for `ms` milliseconds unless `token` is cancelled first.
///
/// Cancellation wakes the sleep early instead of leaving a timer behind.
/// `ms == 0` still yields once. The token is always re-checked on resume.
pub async fn sleep(token: &RunToken, ms: u64) -> Result<(), Cancelled> {
    if ms == 0 {
        tokio::task::yield_now().await;
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
            _ = token.cancelled() => {}
        }
    }
    token.check()
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::playback::generation::Generation;

    #[tokio::test(start_paused = true)]
    async fn sleeps_full_duration_when_live() {
        let generation = Generation::new();
        let token = generation.advance();
        let started = Instant::now();
        assert_eq!(sleep(&token, 250).await, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn wakes_early_on_cancel() {
        let generation = Generation::new();
        let token = generation.advance();
        let started = Instant::now();

        let sleeper = tokio::spawn({
            let token = token.clone();
            async move { sleep(&token, 10_000).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        generation.stop();

        assert_eq!(sleeper.await.unwrap(), Err(Cancelled));
        assert!(started.elapsed() < Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn zero_still_checks_token() {
        let generation = Generation::new();
        let token = generation.advance();
        assert_eq!(sleep(&token, 0).await, Ok(()));
        generation.advance();
        assert_eq!(sleep(&token, 0).await, Err(Cancelled));
    }
}
