use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};

use sle_core::error::SleError;
use sle_core::types::{
    Block, Hold, HoldEvent, HoldEventType, HoldId, HoldState, PerformanceId, SeatId, SoldRecord,
    TenantId, TimestampMs, Version,
};

use crate::port::{IdempotencyCheck, ShadowStore};

/// Production `ShadowStore` over Postgres. Every transaction scopes itself
/// to one tenant with `SET LOCAL app.tenant_id`, which row-level security
/// policies on each table key off of, and pins conservative timeouts so a
/// slow client can't hold a row lock indefinitely (spec §4.3/§6).
pub struct PostgresShadowStore {
    pool: PgPool,
}

impl PostgresShadowStore {
    pub async fn connect(database_url: &str) -> Result<Self, SleError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(|e| SleError::StorageError(format!("postgres connect: {e}")))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_tenant_scoped(
        &self,
        tenant: &TenantId,
    ) -> Result<Transaction<'_, Postgres>, SleError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SleError::StorageError(e.to_string()))?;
        sqlx::query("SET LOCAL lock_timeout = '250ms'")
            .execute(&mut *tx)
            .await
            .map_err(|e| SleError::StorageError(e.to_string()))?;
        sqlx::query("SET LOCAL statement_timeout = '1s'")
            .execute(&mut *tx)
            .await
            .map_err(|e| SleError::StorageError(e.to_string()))?;
        sqlx::query("SET LOCAL idle_in_transaction_session_timeout = '2s'")
            .execute(&mut *tx)
            .await
            .map_err(|e| SleError::StorageError(e.to_string()))?;
        sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
            .bind(&tenant.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| SleError::StorageError(e.to_string()))?;
        Ok(tx)
    }

    async fn load_events(
        tx: &mut Transaction<'_, Postgres>,
        hold_id: HoldId,
    ) -> Result<Vec<HoldEvent>, SleError> {
        let rows = sqlx::query(
            "SELECT event_type, at_ms, note FROM hold_events WHERE hold_id = $1 ORDER BY at_ms ASC",
        )
        .bind(hold_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let event_type: String = row.try_get("event_type").unwrap_or_default();
                Ok(HoldEvent {
                    event_type: parse_event_type(&event_type)?,
                    at: row.try_get::<i64, _>("at_ms").unwrap_or_default(),
                    note: row.try_get("note").ok(),
                })
            })
            .collect()
    }
}

fn parse_state(s: &str) -> Result<HoldState, SleError> {
    match s {
        "ACTIVE" => Ok(HoldState::Active),
        "EXTENDED" => Ok(HoldState::Extended),
        "RELEASED" => Ok(HoldState::Released),
        "EXPIRED" => Ok(HoldState::Expired),
        "CONVERTED" => Ok(HoldState::Converted),
        other => Err(SleError::Internal(format!("unknown hold state: {other}"))),
    }
}

fn state_str(state: HoldState) -> &'static str {
    match state {
        HoldState::Active => "ACTIVE",
        HoldState::Extended => "EXTENDED",
        HoldState::Released => "RELEASED",
        HoldState::Expired => "EXPIRED",
        HoldState::Converted => "CONVERTED",
    }
}

fn parse_event_type(s: &str) -> Result<HoldEventType, SleError> {
    match s {
        "created" => Ok(HoldEventType::Created),
        "extended" => Ok(HoldEventType::Extended),
        "released" => Ok(HoldEventType::Released),
        "rolled_back" => Ok(HoldEventType::RolledBack),
        "expired" => Ok(HoldEventType::Expired),
        "converted" => Ok(HoldEventType::Converted),
        other => Err(SleError::Internal(format!("unknown event type: {other}"))),
    }
}

fn event_type_str(kind: HoldEventType) -> &'static str {
    match kind {
        HoldEventType::Created => "created",
        HoldEventType::Extended => "extended",
        HoldEventType::Released => "released",
        HoldEventType::RolledBack => "rolled_back",
        HoldEventType::Expired => "expired",
        HoldEventType::Converted => "converted",
    }
}

#[async_trait]
impl ShadowStore for PostgresShadowStore {
    async fn allocate_version(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Version, SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        let row = sqlx::query(
            r#"
            INSERT INTO version_counters (tenant_id, performance_id, next_version)
            VALUES ($1, $2, 2)
            ON CONFLICT (tenant_id, performance_id) DO UPDATE
                SET next_version = version_counters.next_version + 1
            RETURNING next_version - 1
            "#,
        )
        .bind(&tenant.0)
        .bind(&performance.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;
        let version: i64 = row.try_get(0).map_err(|e| SleError::StorageError(e.to_string()))?;
        tx.commit().await.map_err(|e| SleError::StorageError(e.to_string()))?;
        Ok(version as Version)
    }

    async fn insert_hold(&self, hold: &Hold) -> Result<(), SleError> {
        let mut tx = self.begin_tenant_scoped(&hold.tenant_id).await?;
        let seats_json = serde_json::to_value(&hold.seats)
            .map_err(|e| SleError::Internal(format!("seat serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO holds
                (hold_id, tenant_id, performance_id, seats, owner_id, version,
                 expires_at_ms, total_life_ms, state, created_at_ms, updated_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(hold.hold_id.0)
        .bind(&hold.tenant_id.0)
        .bind(&hold.performance_id.0)
        .bind(seats_json)
        .bind(&hold.owner.0)
        .bind(hold.version as i64)
        .bind(hold.expires_at)
        .bind(hold.total_life_ms)
        .bind(state_str(hold.state))
        .bind(hold.created_at)
        .bind(hold.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        for event in &hold.events {
            insert_event(&mut tx, hold.hold_id, event).await?;
        }

        tx.commit().await.map_err(|e| SleError::StorageError(e.to_string()))
    }

    async fn update_hold(&self, hold: &Hold) -> Result<(), SleError> {
        let mut tx = self.begin_tenant_scoped(&hold.tenant_id).await?;
        let result = sqlx::query(
            r#"
            UPDATE holds
               SET state = $1, expires_at_ms = $2, total_life_ms = $3, updated_at_ms = $4
             WHERE hold_id = $5 AND tenant_id = $6
            "#,
        )
        .bind(state_str(hold.state))
        .bind(hold.expires_at)
        .bind(hold.total_life_ms)
        .bind(hold.updated_at)
        .bind(hold.hold_id.0)
        .bind(&hold.tenant_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SleError::NotFound(hold.hold_id.to_string()));
        }

        if let Some(latest) = hold.events.last() {
            insert_event(&mut tx, hold.hold_id, latest).await?;
        }

        tx.commit().await.map_err(|e| SleError::StorageError(e.to_string()))
    }

    async fn get_hold(&self, tenant: &TenantId, hold_id: HoldId) -> Result<Option<Hold>, SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        let row = sqlx::query(
            r#"
            SELECT hold_id, tenant_id, performance_id, seats, owner_id, version,
                   expires_at_ms, total_life_ms, state, created_at_ms, updated_at_ms
              FROM holds WHERE hold_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(hold_id.0)
        .bind(&tenant.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seats_json: serde_json::Value = row.try_get("seats").map_err(|e| SleError::StorageError(e.to_string()))?;
        let seats: Vec<SeatId> = serde_json::from_value(seats_json)
            .map_err(|e| SleError::Internal(format!("seat deserialization: {e}")))?;
        let state_raw: String = row.try_get("state").map_err(|e| SleError::StorageError(e.to_string()))?;

        let hold = Hold {
            hold_id,
            tenant_id: tenant.clone(),
            performance_id: PerformanceId(row.try_get("performance_id").map_err(|e| SleError::StorageError(e.to_string()))?),
            seats,
            owner: sle_core::types::Owner(row.try_get("owner_id").map_err(|e| SleError::StorageError(e.to_string()))?),
            version: row.try_get::<i64, _>("version").map_err(|e| SleError::StorageError(e.to_string()))? as Version,
            expires_at: row.try_get("expires_at_ms").map_err(|e| SleError::StorageError(e.to_string()))?,
            total_life_ms: row.try_get("total_life_ms").map_err(|e| SleError::StorageError(e.to_string()))?,
            state: parse_state(&state_raw)?,
            created_at: row.try_get("created_at_ms").map_err(|e| SleError::StorageError(e.to_string()))?,
            updated_at: row.try_get("updated_at_ms").map_err(|e| SleError::StorageError(e.to_string()))?,
            events: Self::load_events(&mut tx, hold_id).await?,
        };

        Ok(Some(hold))
    }

    async fn list_reapable_holds(&self, cutoff: TimestampMs) -> Result<Vec<Hold>, SleError> {
        // Reaper scans across all tenants, so this query runs outside the
        // per-tenant RLS session — the reaper role carries its own
        // cross-tenant grant (spec §4.6).
        let rows = sqlx::query(
            r#"
            SELECT hold_id, tenant_id FROM holds
             WHERE state IN ('ACTIVE', 'EXTENDED') AND expires_at_ms < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        let mut holds = Vec::with_capacity(rows.len());
        for row in rows {
            let tenant = TenantId(row.try_get("tenant_id").map_err(|e| SleError::StorageError(e.to_string()))?);
            let hold_id = HoldId(row.try_get("hold_id").map_err(|e| SleError::StorageError(e.to_string()))?);
            if let Some(hold) = self.get_hold(&tenant, hold_id).await? {
                holds.push(hold);
            }
        }
        Ok(holds)
    }

    async fn block_seat(&self, block: &Block) -> Result<(), SleError> {
        let mut tx = self.begin_tenant_scoped(&block.tenant_id).await?;
        sqlx::query(
            r#"
            INSERT INTO blocks (tenant_id, performance_id, seat_id, reason, created_at_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, performance_id, seat_id) DO UPDATE
                SET reason = EXCLUDED.reason, created_at_ms = EXCLUDED.created_at_ms
            "#,
        )
        .bind(&block.tenant_id.0)
        .bind(&block.performance_id.0)
        .bind(&block.seat_id.0)
        .bind(&block.reason)
        .bind(block.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;
        tx.commit().await.map_err(|e| SleError::StorageError(e.to_string()))
    }

    async fn unblock_seat(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<(), SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        sqlx::query("DELETE FROM blocks WHERE tenant_id = $1 AND performance_id = $2 AND seat_id = $3")
            .bind(&tenant.0)
            .bind(&performance.0)
            .bind(&seat.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| SleError::StorageError(e.to_string()))?;
        tx.commit().await.map_err(|e| SleError::StorageError(e.to_string()))
    }

    async fn get_block(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<Option<Block>, SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        let row = sqlx::query(
            "SELECT reason, created_at_ms FROM blocks WHERE tenant_id = $1 AND performance_id = $2 AND seat_id = $3",
        )
        .bind(&tenant.0)
        .bind(&performance.0)
        .bind(&seat.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        Ok(row.map(|row| Block {
            tenant_id: tenant.clone(),
            performance_id: performance.clone(),
            seat_id: seat.clone(),
            reason: row.try_get("reason").unwrap_or_default(),
            created_at: row.try_get("created_at_ms").unwrap_or_default(),
        }))
    }

    async fn list_blocks(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Vec<Block>, SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        let rows = sqlx::query(
            "SELECT seat_id, reason, created_at_ms FROM blocks WHERE tenant_id = $1 AND performance_id = $2",
        )
        .bind(&tenant.0)
        .bind(&performance.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| Block {
                tenant_id: tenant.clone(),
                performance_id: performance.clone(),
                seat_id: SeatId(row.try_get("seat_id").unwrap_or_default()),
                reason: row.try_get("reason").unwrap_or_default(),
                created_at: row.try_get("created_at_ms").unwrap_or_default(),
            })
            .collect())
    }

    async fn insert_sold(&self, record: &SoldRecord) -> Result<(), SleError> {
        let mut tx = self.begin_tenant_scoped(&record.tenant_id).await?;
        sqlx::query(
            r#"
            INSERT INTO sold_seats (tenant_id, performance_id, seat_id, order_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, performance_id, seat_id) DO NOTHING
            "#,
        )
        .bind(&record.tenant_id.0)
        .bind(&record.performance_id.0)
        .bind(&record.seat_id.0)
        .bind(&record.order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;
        tx.commit().await.map_err(|e| SleError::StorageError(e.to_string()))
    }

    async fn list_sold(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Vec<SoldRecord>, SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        let rows = sqlx::query(
            "SELECT seat_id, order_id FROM sold_seats WHERE tenant_id = $1 AND performance_id = $2",
        )
        .bind(&tenant.0)
        .bind(&performance.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| SoldRecord {
                tenant_id: tenant.clone(),
                performance_id: performance.clone(),
                seat_id: SeatId(row.try_get("seat_id").unwrap_or_default()),
                order_id: row.try_get("order_id").unwrap_or_default(),
            })
            .collect())
    }

    async fn check_idempotency(
        &self,
        tenant: &TenantId,
        key: &str,
        request_hash: &str,
        now_ms: TimestampMs,
    ) -> Result<IdempotencyCheck, SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        let row = sqlx::query(
            "SELECT request_hash, response_json FROM idempotency_keys \
             WHERE tenant_id = $1 AND idem_key = $2 AND expires_at_ms > $3",
        )
        .bind(&tenant.0)
        .bind(key)
        .bind(now_ms)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;

        Ok(match row {
            None => IdempotencyCheck::Fresh,
            Some(row) => {
                let stored_hash: String = row.try_get("request_hash").unwrap_or_default();
                if stored_hash == request_hash {
                    IdempotencyCheck::Replay {
                        response_json: row.try_get("response_json").unwrap_or_default(),
                    }
                } else {
                    IdempotencyCheck::Mismatch
                }
            }
        })
    }

    async fn record_idempotency(
        &self,
        tenant: &TenantId,
        key: &str,
        request_hash: &str,
        response_json: &str,
        ttl_hours: u64,
        now_ms: TimestampMs,
    ) -> Result<(), SleError> {
        let mut tx = self.begin_tenant_scoped(tenant).await?;
        let expires_at_ms = now_ms + ttl_hours as i64 * 3_600_000;
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (tenant_id, idem_key, request_hash, response_json, expires_at_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, idem_key) DO UPDATE
                SET request_hash = EXCLUDED.request_hash,
                    response_json = EXCLUDED.response_json,
                    expires_at_ms = EXCLUDED.expires_at_ms
            "#,
        )
        .bind(&tenant.0)
        .bind(key)
        .bind(request_hash)
        .bind(response_json)
        .bind(expires_at_ms)
        .execute(&mut *tx)
        .await
        .map_err(|e| SleError::StorageError(e.to_string()))?;
        tx.commit().await.map_err(|e| SleError::StorageError(e.to_string()))
    }
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    hold_id: HoldId,
    event: &HoldEvent,
) -> Result<(), SleError> {
    sqlx::query(
        "INSERT INTO hold_events (hold_id, event_type, at_ms, note) VALUES ($1, $2, $3, $4)",
    )
    .bind(hold_id.0)
    .bind(event_type_str(event.event_type))
    .bind(event.at)
    .bind(&event.note)
    .execute(&mut **tx)
    .await
    .map_err(|e| SleError::StorageError(e.to_string()))?;
    Ok(())
}
