//! Transient lock retry
//!
//! SQLite allows one writer at a time; a contended write surfaces as a
//! "database is locked" failure. Those retry with a doubling delay inside a
//! fixed time budget. Anything else propagates on the spot: constraint
//! violations and schema mismatches must never be papered over by retries.

use crate::{Error, Result};
use std::time::{Duration, Instant};

const FIRST_DELAY_MS: u64 = 10;
const DELAY_CAP_MS: u64 = 1000;

fn is_lock_contention(err: &Error) -> bool {
    matches!(err, Error::Database(db) if db.to_string().contains("database is locked"))
}

/// Delay before the next try: doubling from 10ms, capped at 1s.
fn delay_for_try(tries: u32) -> Duration {
    let shift = tries.saturating_sub(1).min(7);
    Duration::from_millis((FIRST_DELAY_MS << shift).min(DELAY_CAP_MS))
}

/// Run `op`, retrying lock-contention failures until `budget_ms` elapses.
///
/// `label` names the write in logs. The budget bounds total wall-clock time
/// across all tries; the final sleep is clipped so the deadline is honored.
pub async fn retry_on_lock<F, Fut, T>(label: &str, budget_ms: u64, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let deadline = Instant::now() + Duration::from_millis(budget_ms);
    let mut tries = 0u32;

    loop {
        tries += 1;

        let err = match op().await {
            Ok(value) => {
                if tries > 1 {
                    tracing::debug!(op = label, tries, "Write went through after lock contention");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_lock_contention(&err) {
            return Err(err);
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::error!(op = label, tries, budget_ms, "Giving up on locked store");
            return Err(Error::Internal(format!(
                "{label}: store stayed locked through {tries} tries over {budget_ms} ms"
            )));
        }

        let delay = delay_for_try(tries).min(deadline - now);
        tracing::warn!(
            op = label,
            tries,
            delay_ms = delay.as_millis() as u64,
            "Store locked, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
