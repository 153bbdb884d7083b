use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Without a database section the service runs on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_commission_bps")]
    pub commission_bps: i64,
    #[serde(default = "default_refund_bps")]
    pub refund_bps: i64,
    /// Age after which an unconfirmed hold is abandoned.
    #[serde(default = "default_pending_hold_seconds")]
    pub pending_hold_seconds: u64,
    /// How long after departure open bookings are failed by the sweep.
    #[serde(default = "default_grace_minutes")]
    pub reconciliation_grace_minutes: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_commission_bps() -> i64 { 700 }
fn default_refund_bps() -> i64 { 8_500 }
fn default_pending_hold_seconds() -> u64 { 900 }
fn default_grace_minutes() -> u64 { 360 }
fn default_sweep_interval() -> u64 { 300 }
fn default_rate_limit() -> i64 { 100 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            commission_bps: default_commission_bps(),
            refund_bps: default_refund_bps(),
            pending_hold_seconds: default_pending_hold_seconds(),
            reconciliation_grace_minutes: default_grace_minutes(),
            sweep_interval_seconds: default_sweep_interval(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    #[serde(default = "default_device_ttl")]
    pub device_token_ttl_seconds: u64,
    /// Key for proof-of-purchase signatures.
    pub proof_secret: String,
    /// Shared key of the payment provider. Webhook signatures are checked
    /// only when set.
    #[serde(default)]
    pub payment_webhook_key: Option<String>,
}

fn default_device_ttl() -> u64 { 43_200 }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_statement_timeout() -> u64 { 5_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
}

fn default_notification_topic() -> String { "booking.notifications".into() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TRANSIT__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TRANSIT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rule_defaults() {
        let raw = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [auth]
                jwt_secret = "secret"
                jwt_expiration_seconds = 3600
                proof_secret = "proof"

                [business_rules]
                refund_bps = 9000
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let cfg: Config = raw.try_deserialize().unwrap();
        assert!(cfg.database.is_none());
        assert!(cfg.redis.is_none());
        assert_eq!(cfg.business_rules.commission_bps, 700);
        assert_eq!(cfg.business_rules.refund_bps, 9_000);
        assert_eq!(cfg.auth.device_token_ttl_seconds, 43_200);
    }
}
