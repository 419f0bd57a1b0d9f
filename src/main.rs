//! Fleet sync daemon

use std::sync::Arc;

use chrono::Utc;
use fleet_sync::{
    api::{ApiClient, HttpTransport},
    cache::QueryCache,
    cashflow,
    config::{AppConfig, SyncConfig},
    context::{Notification, NotificationLevel, VesselContext},
    errors::FleetError,
    models::Transaction,
    query::VesselQuery,
};
use tokio::{signal, sync::broadcast};
use tracing::{error, info, warn};

const TRANSACTIONS_ENDPOINT: &str = "/api/banking/transactions";

#[tokio::main]
async fn main() -> Result<(), FleetError> {
    // Environment from .env, if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let transport = Arc::new(HttpTransport::new(&config.api)?);
    let api = ApiClient::new(transport, config.retry.clone());
    let context = Arc::new(VesselContext::new(api, Arc::new(QueryCache::new())));

    if let Some(id) = config.sync.vessel_id {
        context.select_vessel(id).await;
    }

    tokio::select! {
        result = run_sync(context, config.sync) => {
            info!("Fleet sync completed: {:?}", result);
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

async fn run_sync(context: Arc<VesselContext>, sync: SyncConfig) -> Result<(), FleetError> {
    let mut notifications = context.notifications();
    let mut transactions: VesselQuery<Vec<Transaction>> =
        VesselQuery::new(context.clone(), TRANSACTIONS_ENDPOINT);
    let mut ticker = tokio::time::interval(sync.poll_interval);

    loop {
        ticker.tick().await;

        if let Err(e) = context.refresh().await {
            error!("Vessel list refresh failed: {}", e);
            continue;
        }

        if context.take_changed() {
            info!(vessel = ?context.current_vessel_id(), "Now tracking vessel");
        }

        match context.current_vessel().await {
            Some(vessel) => match &vessel.telemetry {
                Some(t) => info!(
                    id = %vessel.id,
                    name = %vessel.name,
                    lat = t.latitude,
                    lon = t.longitude,
                    speed = ?t.speed,
                    heading = ?t.heading,
                    "Vessel position"
                ),
                None => info!(id = %vessel.id, name = %vessel.name, "No position reported"),
            },
            None => {
                warn!("No vessels available");
                continue;
            }
        }

        context
            .cache()
            .invalidate_endpoint(TRANSACTIONS_ENDPOINT)
            .await;
        match transactions.fetch().await {
            Ok(list) => {
                let flow = cashflow::aggregate(
                    &list,
                    None,
                    sync.cashflow_months,
                    Utc::now().date_naive(),
                );
                for bucket in &flow.buckets {
                    info!(
                        month = %bucket.month,
                        money_in = bucket.money_in,
                        money_out = bucket.money_out,
                        "Cash flow"
                    );
                }
                info!(balance = flow.total_balance, "Cash flow balance");
            }
            Err(e) => error!("Transaction fetch failed: {}", e),
        }

        drain_notifications(&mut notifications);
    }
}

fn drain_notifications(rx: &mut broadcast::Receiver<Notification>) {
    loop {
        match rx.try_recv() {
            Ok(n) if n.level == NotificationLevel::Error => warn!("{}", n.message),
            Ok(n) => info!("{}", n.message),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Dropped notifications");
            }
            Err(_) => break,
        }
    }
}
