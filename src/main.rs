//! OpenSASE Coupons - coupon validation and usage accounting service

use anyhow::Result;
use opensase_coupons::api::{router, AppState};
use opensase_coupons::config::AppConfig;
use opensase_coupons::{CouponService, PgCouponStore, PgOrderLedger};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let db = PgPoolOptions::new().max_connections(config.max_connections).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, coupon events will not be published"); None }
        },
        None => None,
    };

    let coupons = CouponService::new(Arc::new(PgCouponStore::new(db.clone())), Arc::new(PgOrderLedger::new(db))).with_nats(nats);
    let app = router(AppState { coupons });

    tracing::info!("🚀 OpenSASE Coupons listening on {}", config.bind_addr());
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr()).await?, app).await?;
    Ok(())
}
