use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use sle_core::error::SleError;
use sle_core::types::{Owner, TenantId, TimestampMs};

/// Per-owner request admission control (spec §4.2/§6, `RATE_LIMIT_BURST` /
/// `RATE_LIMIT_WINDOW_SECS`). A capability the Coordinator calls before
/// touching the ledger, so an abusive caller never reaches the substrate.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(
        &self,
        tenant: &TenantId,
        owner: &Owner,
        now_ms: TimestampMs,
    ) -> Result<(), SleError>;
}

struct Window {
    count: u32,
    window_start_ms: TimestampMs,
}

/// Fixed-window counter per (tenant, owner). Simpler than a token bucket and
/// sufficient for the spec's single-burst-per-window contract; a sliding
/// window is unnecessary precision for an admission guard.
pub struct FixedWindowRateLimiter {
    burst: u32,
    window_ms: i64,
    windows: Mutex<HashMap<(TenantId, Owner), Window>>,
}

impl FixedWindowRateLimiter {
    pub fn new(burst: u32, window_secs: u64) -> Self {
        Self {
            burst,
            window_ms: window_secs as i64 * 1_000,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn check(
        &self,
        tenant: &TenantId,
        owner: &Owner,
        now_ms: TimestampMs,
    ) -> Result<(), SleError> {
        let mut guard = self.windows.lock().await;
        let key = (tenant.clone(), owner.clone());
        let window = guard.entry(key).or_insert(Window {
            count: 0,
            window_start_ms: now_ms,
        });

        if now_ms - window.window_start_ms >= self.window_ms {
            window.window_start_ms = now_ms;
            window.count = 0;
        }

        if window.count >= self.burst {
            let retry_after_ms = (window.window_start_ms + self.window_ms - now_ms).max(0) as u64;
            return Err(SleError::RateLimited { retry_after_ms });
        }

        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_then_rejects() {
        let limiter = FixedWindowRateLimiter::new(2, 60);
        let tenant = TenantId("t1".into());
        let owner = Owner("o1".into());

        limiter.check(&tenant, &owner, 0).await.unwrap();
        limiter.check(&tenant, &owner, 10).await.unwrap();
        let err = limiter.check(&tenant, &owner, 20).await.unwrap_err();
        assert!(matches!(err, SleError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn window_resets_after_elapsed_period() {
        let limiter = FixedWindowRateLimiter::new(1, 60);
        let tenant = TenantId("t1".into());
        let owner = Owner("o1".into());

        limiter.check(&tenant, &owner, 0).await.unwrap();
        assert!(limiter.check(&tenant, &owner, 1_000).await.is_err());
        limiter.check(&tenant, &owner, 61_000).await.unwrap();
    }
}
