use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, CounterVec, Gauge};
use tracing::{info, warn};

use crate::db::PrincipalStore;

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "authgate_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref REFRESHES_COUNTER: CounterVec = register_counter_vec!(
        "authgate_token_refreshes_total",
        "Token refresh attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref TOKEN_REJECTIONS_COUNTER: CounterVec = register_counter_vec!(
        "authgate_token_rejections_total",
        "Bearer tokens rejected by reason",
        &["reason"]
    ).unwrap();

    pub static ref REGISTRATIONS_COUNTER: CounterVec = register_counter_vec!(
        "authgate_registrations_total",
        "Registration attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref AUTHORIZATION_DENIALS_COUNTER: CounterVec = register_counter_vec!(
        "authgate_authorization_denials_total",
        "Requests denied for a missing permission",
        &["permission"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref ACTIVE_USERS_GAUGE: Gauge = register_gauge!(
        "authgate_active_users",
        "Principals with an active account"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(store: Arc<dyn PrincipalStore>) {
    tokio::spawn(async move {
        if let Err(e) = collect(store.as_ref()).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(store.as_ref()).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(store: &dyn PrincipalStore) -> anyhow::Result<()> {
    let active = store.count_active_users().await?;
    ACTIVE_USERS_GAUGE.set(active as f64);
    info!("Metrics: {} active principal(s)", active);
    Ok(())
}
