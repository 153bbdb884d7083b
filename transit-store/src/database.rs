use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use transit_core::{CoreError, Stores};

use crate::account_repo::StoreAccountRepository;
use crate::app_config::{BusinessRules, DatabaseConfig};
use crate::booking_repo::StoreBookingRepository;
use crate::catalog_repo::StoreBoardingPointRepository;
use crate::trip_repo::StoreTripRepository;
use crate::vehicle_repo::StoreVehicleRepository;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    /// Opens the pool. Every statement runs under the configured
    /// `statement_timeout`, so a stalled store surfaces as an error
    /// instead of a hung request.
    pub async fn new(cfg: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = PgConnectOptions::from_str(&cfg.url)?
            .options([("statement_timeout", cfg.statement_timeout_ms.to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_seconds))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Repository handles sharing this pool.
    pub fn stores(&self) -> Stores {
        Stores {
            inventory: Arc::new(StoreTripRepository::new(self.pool.clone())),
            ledger: Arc::new(StoreBookingRepository::new(self.pool.clone())),
            accounts: Arc::new(StoreAccountRepository::new(self.pool.clone())),
            vehicles: Arc::new(StoreVehicleRepository::new(self.pool.clone())),
            boarding_points: Arc::new(StoreBoardingPointRepository::new(self.pool.clone())),
        }
    }

    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    /// Overrides config defaults with rows from `business_rules`.
    /// Expected row format: `{"value": <number>}`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        #[derive(sqlx::FromRow)]
        struct RuleRow {
            rule_key: String,
            rule_value: Value,
        }

        let rows = sqlx::query_as::<_, RuleRow>("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;

        for row in rows {
            let Some(v) = row.rule_value.get("value") else {
                continue;
            };
            match row.rule_key.as_str() {
                "commission_bps" => {
                    if let Some(n) = v.as_i64() {
                        rules.commission_bps = n;
                    }
                }
                "refund_bps" => {
                    if let Some(n) = v.as_i64() {
                        rules.refund_bps = n;
                    }
                }
                "pending_hold_seconds" => {
                    if let Some(n) = v.as_u64() {
                        rules.pending_hold_seconds = n;
                    }
                }
                "reconciliation_grace_minutes" => {
                    if let Some(n) = v.as_u64() {
                        rules.reconciliation_grace_minutes = n;
                    }
                }
                "sweep_interval_seconds" => {
                    if let Some(n) = v.as_u64() {
                        rules.sweep_interval_seconds = n;
                    }
                }
                "rate_limit_per_minute" => {
                    if let Some(n) = v.as_i64() {
                        rules.rate_limit_per_minute = n;
                    }
                }
                other => info!("Ignoring unknown business rule {}", other),
            }
        }

        Ok(rules)
    }
}

/// Unique violations are conflicts. Everything else (pool timeout,
/// statement timeout, I/O, closed pool) is reported as unavailable.
pub fn map_sqlx(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return CoreError::Conflict(db.message().to_string());
        }
    }
    error!("Database error: {}", err);
    CoreError::Unavailable(err.to_string())
}
