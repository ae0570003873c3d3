use std::sync::Arc;

use anyhow::Result;
use crates::{
    domain::{
        repositories::{
            payment_gateway::PaymentGateway, subscription_histories::SubscriptionHistoryRepository,
            subscriptions::SubscriptionRepository, users::UserAccountRepository,
        },
        value_objects::billing_cycle::BillingCycleEngine,
    },
    infra::db::{
        postgres::postgres_connection,
        repositories::{
            subscription_histories::SubscriptionHistoryPostgres,
            subscriptions::SubscriptionPostgres, users::UserAccountPostgres,
        },
    },
    payments::toss_payments::TossPaymentsClient,
};
use tracing::{error, info};
use worker::{
    axum_http, billing_scheduler::worker::BillingScheduler, config,
    usecases::subscription_billing::SubscriptionBillingUseCase,
};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("worker: exited with error: {:#}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    crates::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!(stage = %dotenvy_env.stage, "worker: env loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?;
    info!("worker: postgres pool established");

    let db_pool_arc = Arc::new(postgres_pool);

    let subscription_repository: Arc<dyn SubscriptionRepository + Send + Sync> =
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool_arc)));
    let user_repository: Arc<dyn UserAccountRepository + Send + Sync> =
        Arc::new(UserAccountPostgres::new(Arc::clone(&db_pool_arc)));
    let history_repository: Arc<dyn SubscriptionHistoryRepository + Send + Sync> =
        Arc::new(SubscriptionHistoryPostgres::new(Arc::clone(&db_pool_arc)));

    let payment_gateway: Arc<dyn PaymentGateway + Send + Sync> = Arc::new(
        TossPaymentsClient::new(dotenvy_env.toss_payments.clone())?,
    );

    let billing_usecase = Arc::new(SubscriptionBillingUseCase::new(
        subscription_repository,
        user_repository,
        history_repository,
        payment_gateway,
        BillingCycleEngine::new(dotenvy_env.billing.timezone),
    ));

    let scheduler = Arc::new(BillingScheduler::from_config(
        Arc::clone(&billing_usecase),
        &dotenvy_env.billing,
        dotenvy_env.stage,
    )?);
    info!(
        timezone = dotenvy_env.billing.timezone.name(),
        triggers = scheduler.jobs().len(),
        "worker: billing scheduler configured"
    );

    let mut scheduler_loop = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run().await }
    });

    let server_config = Arc::clone(&dotenvy_env);
    let http_server = tokio::spawn(async move {
        axum_http::http_serve::start(server_config, billing_usecase).await
    });

    tokio::select! {
        result = &mut scheduler_loop => result??,
        result = http_server => {
            scheduler.stop();
            scheduler_loop.await??;
            result??
        },
    };

    info!("worker: shut down");
    Ok(())
}
