use crate::constants::LEDGER_KEY_PREFIX;
use crate::types::{PerformanceId, SeatId, TenantId};

/// Builds the canonical ledger key for one seat: `hold:v1:{tenant:performance}:seat`.
/// The braces designate a co-locating hash-tag so a multi-seat script always
/// targets a single shard (spec §3).
pub fn seat_key(tenant: &TenantId, performance: &PerformanceId, seat: &SeatId) -> String {
    format!(
        "{LEDGER_KEY_PREFIX}:{{{}:{}}}:{}",
        tenant.0, performance.0, seat.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_hash_tag() {
        let key = seat_key(
            &TenantId("t1".into()),
            &PerformanceId("p1".into()),
            &SeatId("A1".into()),
        );
        assert_eq!(key, "hold:v1:{t1:p1}:A1");
    }
}
