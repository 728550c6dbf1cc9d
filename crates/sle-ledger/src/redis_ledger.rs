use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::Script;
use tracing::warn;

use sle_core::error::SleError;
use sle_core::keys::seat_key;
use sle_core::types::{Owner, PerformanceId, SeatId, TenantId, TimestampMs, Version};

use crate::port::{AcquireOutcome, LockLedger, MutateOutcome};

/// KEYS: one per seat. ARGV: (owner, version, ttl_ms, now_ms). `now_ms` is
/// accepted but unused — the script never consults wall-clock, only TTL
/// (spec §4.1). Re-acquiring seats you already own bumps version and
/// refreshes TTL, matching the spec's "same owner re-acquire" semantics.
const ACQUIRE_ALL_OR_NONE: &str = r#"
local owner = ARGV[1]
local conflicts = {}
for i = 1, #KEYS do
  local v = redis.call('GET', KEYS[i])
  if v then
    local sep = string.find(v, ':')
    local existing_owner = string.sub(v, sep + 1)
    if existing_owner ~= owner then
      table.insert(conflicts, KEYS[i])
    end
  end
end
if #conflicts > 0 then
  return {'CONFLICT', conflicts}
end
for i = 1, #KEYS do
  redis.call('SET', KEYS[i], ARGV[2] .. ':' .. owner, 'PX', ARGV[3])
end
return {'OK'}
"#;

/// KEYS[1]: seat key. ARGV: (owner, version, ttl_ms). Does not change
/// version — a renewal keeps the same fencing token valid.
const EXTEND_IF_OWNER: &str = r#"
local v = redis.call('GET', KEYS[1])
local expected = ARGV[2] .. ':' .. ARGV[1]
if v == expected then
  redis.call('PEXPIRE', KEYS[1], ARGV[3])
  return 'OK'
end
return 'NOOP'
"#;

/// KEYS[1]: seat key. ARGV: (owner, version). Shared by release and
/// rollback — the distinction is semantic, enforced by the Coordinator.
const DELETE_IF_OWNER: &str = r#"
local v = redis.call('GET', KEYS[1])
local expected = ARGV[2] .. ':' .. ARGV[1]
if v == expected then
  redis.call('DEL', KEYS[1])
  return 'OK'
end
return 'NOOP'
"#;

fn parse_owner_version(v: &str) -> Option<(Version, Owner)> {
    let (version_str, owner_str) = v.split_once(':')?;
    let version = version_str.parse().ok()?;
    Some((version, Owner(owner_str.to_string())))
}

/// Production `LockLedger` backed by Redis. The four scripts are loaded
/// once via `Script::new` and invoked through `invoke_async`, which
/// transparently falls back from `EVALSHA` to a full `EVAL` (reloading the
/// script into the cache) on a `NOSCRIPT` miss — the "reload on cache miss"
/// requirement from spec §4.1/§9 — so rolling deployments never observe a
/// stale script identity.
pub struct RedisLockLedger {
    pool: Pool,
    acquire_script: Script,
    extend_script: Script,
    delete_script: Script,
    command_timeout: Duration,
    max_retries: u32,
}

impl RedisLockLedger {
    pub fn new(redis_url: &str, command_timeout_ms: u64, max_retries: u32) -> Result<Self, SleError> {
        let pool = PoolConfig::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| SleError::StorageError(format!("redis pool init: {e}")))?;

        Ok(Self {
            pool,
            acquire_script: Script::new(ACQUIRE_ALL_OR_NONE),
            extend_script: Script::new(EXTEND_IF_OWNER),
            delete_script: Script::new(DELETE_IF_OWNER),
            command_timeout: Duration::from_millis(command_timeout_ms),
            max_retries,
        })
    }

    async fn with_retry<T, F, Fut>(&self, mut f: F) -> Result<T, SleError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, redis::RedisError>>,
    {
        let mut attempt = 0;
        loop {
            let call = tokio::time::timeout(self.command_timeout, f()).await;
            match call {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "retryable ledger error");
                    tokio::time::sleep(Duration::from_millis(10 * 2u64.pow(attempt))).await;
                }
                Ok(Err(e)) => return Err(SleError::StorageError(e.to_string())),
                Err(_elapsed) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, "ledger command timed out, retrying");
                }
                Err(_elapsed) => return Err(SleError::Timeout),
            }
        }
    }
}

#[async_trait]
impl LockLedger for RedisLockLedger {
    async fn acquire_all_or_none(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seats: &[SeatId],
        owner: &Owner,
        version: Version,
        ttl_ms: u64,
        now_ms: TimestampMs,
    ) -> Result<AcquireOutcome, SleError> {
        let keys: Vec<String> = seats
            .iter()
            .map(|s| seat_key(tenant, performance, s))
            .collect();

        let reply: redis::Value = self
            .with_retry(|| {
                let mut invocation = self.acquire_script.prepare_invoke();
                for k in &keys {
                    invocation.key(k);
                }
                invocation
                    .arg(&owner.0)
                    .arg(version)
                    .arg(ttl_ms)
                    .arg(now_ms);
                let pool = self.pool.clone();
                async move {
                    let mut conn = pool
                        .get()
                        .await
                        .map_err(|e| redis::RedisError::from((redis::ErrorKind::IoError, "pool", e.to_string())))?;
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;

        parse_acquire_reply(reply, seats)
    }

    async fn extend_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
        ttl_ms: u64,
    ) -> Result<MutateOutcome, SleError> {
        let key = seat_key(tenant, performance, seat);
        let reply: String = self
            .with_retry(|| {
                let mut invocation = self.extend_script.prepare_invoke();
                invocation.key(&key).arg(&owner.0).arg(version).arg(ttl_ms);
                let pool = self.pool.clone();
                async move {
                    let mut conn = pool
                        .get()
                        .await
                        .map_err(|e| redis::RedisError::from((redis::ErrorKind::IoError, "pool", e.to_string())))?;
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(parse_mutate_reply(&reply))
    }

    async fn release_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError> {
        self.delete_if_owner(tenant, performance, seat, owner, version)
            .await
    }

    async fn rollback_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError> {
        self.delete_if_owner(tenant, performance, seat, owner, version)
            .await
    }

    async fn probe(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<Option<(Version, Owner)>, SleError> {
        let key = seat_key(tenant, performance, seat);
        let reply: Option<String> = self
            .with_retry(|| {
                let key = key.clone();
                let pool = self.pool.clone();
                async move {
                    let mut conn = pool
                        .get()
                        .await
                        .map_err(|e| redis::RedisError::from((redis::ErrorKind::IoError, "pool", e.to_string())))?;
                    redis::cmd("GET").arg(&key).query_async(&mut conn).await
                }
            })
            .await?;
        Ok(reply.and_then(|v| parse_owner_version(&v)))
    }
}

impl RedisLockLedger {
    async fn delete_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError> {
        let key = seat_key(tenant, performance, seat);
        let reply: String = self
            .with_retry(|| {
                let mut invocation = self.delete_script.prepare_invoke();
                invocation.key(&key).arg(&owner.0).arg(version);
                let pool = self.pool.clone();
                async move {
                    let mut conn = pool
                        .get()
                        .await
                        .map_err(|e| redis::RedisError::from((redis::ErrorKind::IoError, "pool", e.to_string())))?;
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(parse_mutate_reply(&reply))
    }
}

fn parse_mutate_reply(reply: &str) -> MutateOutcome {
    if reply == "OK" {
        MutateOutcome::Ok
    } else {
        MutateOutcome::Noop
    }
}

fn parse_acquire_reply(reply: redis::Value, seats: &[SeatId]) -> Result<AcquireOutcome, SleError> {
    match reply {
        redis::Value::Array(items) => {
            let mut iter = items.into_iter();
            let tag: String = iter
                .next()
                .and_then(|v| redis::from_redis_value(&v).ok())
                .ok_or_else(|| SleError::Internal("malformed acquire reply".into()))?;
            match tag.as_str() {
                "OK" => Ok(AcquireOutcome::Ok),
                "CONFLICT" => {
                    let conflict_keys: Vec<String> = iter
                        .next()
                        .map(|v| redis::from_redis_value(&v).unwrap_or_default())
                        .unwrap_or_default();
                    let conflicts = seats
                        .iter()
                        .filter(|s| conflict_keys.iter().any(|k| k.ends_with(&format!("}}:{}", s.0))))
                        .cloned()
                        .collect();
                    Ok(AcquireOutcome::Conflict(conflicts))
                }
                other => Err(SleError::Internal(format!("unexpected acquire tag: {other}"))),
            }
        }
        other => Err(SleError::Internal(format!(
            "unexpected acquire reply shape: {other:?}"
        ))),
    }
}
