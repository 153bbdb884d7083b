use chrono::Duration;
use std::sync::Arc;
use transit_catalog::FarePolicy;
use transit_core::{IdentityResolver, Notifier, Stores};
use transit_reservation::{ProofSigner, ReconciliationPolicy, ReservationEngine, TicketReconciler};
use transit_store::app_config::{AuthConfig, BusinessRules};
use transit_store::RedisClient;

use crate::auth::JwtAuth;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub reconciler: Arc<TicketReconciler>,
    pub identity: Arc<dyn IdentityResolver>,
    pub tokens: Arc<JwtAuth>,
    pub metrics: Arc<Metrics>,
    /// Rate limiting is off without Redis.
    pub redis: Option<Arc<RedisClient>>,
    pub business_rules: BusinessRules,
    pub payment_webhook_key: Option<String>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        auth: &AuthConfig,
        business_rules: BusinessRules,
    ) -> prometheus::Result<Self> {
        let engine = Arc::new(ReservationEngine::new(
            stores,
            notifier,
            FarePolicy::new(business_rules.commission_bps, business_rules.refund_bps),
            ProofSigner::new(&auth.proof_secret),
        ));
        let reconciler = Arc::new(TicketReconciler::new(
            engine.clone(),
            ReconciliationPolicy {
                pending_hold: Duration::seconds(business_rules.pending_hold_seconds as i64),
                grace: Duration::minutes(business_rules.reconciliation_grace_minutes as i64),
            },
        ));
        let tokens = Arc::new(JwtAuth::new(
            auth.jwt_secret.clone(),
            auth.jwt_expiration_seconds,
            auth.device_token_ttl_seconds,
        ));

        Ok(Self {
            engine,
            reconciler,
            identity: tokens.clone(),
            tokens,
            metrics: Arc::new(Metrics::new()?),
            redis: None,
            business_rules,
            payment_webhook_key: auth.payment_webhook_key.clone(),
        })
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>) -> Self {
        self.redis = Some(redis);
        self
    }
}
