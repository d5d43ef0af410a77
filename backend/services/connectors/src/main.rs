mod config;
mod connector;
mod document_source;
mod nango;
mod notion;
mod tracker;
mod workflow;

use std::sync::Arc;
use std::time::Duration;

use dust_common::types::ServiceInfo;
use dust_config::{init_tracing, AppConfig};
use dust_data_sources::DataSourceClient;
use dust_db::connectors::models::ConnectorType;
use dust_db::connectors::pg_repository::PgConnectorRepository;
use dust_post_upsert_hooks::{PostUpsertHook, RunPostUpsertHooksWorkflow, WebhookHook};
use dust_workflows::{LocalScheduler, WorkflowScheduler};
use tokio::sync::watch;

use crate::config::SyncConfig;
use crate::document_source::ConnectorDocumentSource;
use crate::nango::NangoClient;
use crate::notion::activities::NotionActivities;
use crate::notion::client::NotionClient;
use crate::notion::sync::NotionSyncer;
use crate::tracker::SyncStateTracker;
use crate::workflow::{run_sync_trigger, SyncConnectorWorkflow};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let service = ServiceInfo::new("dust-connectors");
    tracing::info!(
        service = %service.name,
        version = %service.version,
        instance_id = %service.instance_id,
        "starting"
    );

    let app = AppConfig::from_env().expect("invalid configuration");
    let sync_config = SyncConfig::from_env(&app).expect("invalid sync configuration");

    let pool = dust_db::create_pool(&app.database_url)
        .await
        .expect("failed to connect to database");
    dust_db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");
    let repo = PgConnectorRepository::new(pool);

    let scheduler = LocalScheduler::new(app.max_concurrent_workflows);
    let dispatcher: Arc<dyn WorkflowScheduler> = Arc::new(scheduler.clone());

    let data_sources = DataSourceClient::new(sync_config.data_sources.clone())
        .expect("failed to create data source client");

    // Post-upsert hooks
    let mut hooks: Vec<Arc<dyn PostUpsertHook>> = Vec::new();
    match sync_config.webhook.clone() {
        Some(webhook) => {
            tracing::info!(
                url = %webhook.url,
                data_sources = ?webhook.data_sources,
                "post-upsert webhook configured"
            );
            hooks.push(Arc::new(
                WebhookHook::new(webhook).expect("failed to create webhook client"),
            ));
        }
        None => tracing::info!("no post-upsert webhook configured"),
    }
    scheduler.register(Arc::new(RunPostUpsertHooksWorkflow::new(
        Arc::new(ConnectorDocumentSource::new(
            repo.clone(),
            data_sources.clone(),
        )),
        hooks,
        sync_config.retry,
    )));

    // Notion sync
    let activities = NotionActivities::new(
        NangoClient::new(sync_config.nango.clone()).expect("failed to create nango client"),
        NotionClient::new(sync_config.notion.clone()).expect("failed to create notion client"),
        data_sources,
        SyncStateTracker::new(repo.clone()),
        dispatcher.clone(),
    );
    let notion = Arc::new(NotionSyncer::new(activities, sync_config.retry));
    scheduler.register(Arc::new(
        SyncConnectorWorkflow::new().with_connector(ConnectorType::Notion, notion),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trigger = tokio::spawn(run_sync_trigger(
        repo,
        dispatcher,
        Duration::from_secs(app.sync_interval_secs),
        shutdown_rx,
    ));
    tracing::info!(
        interval_secs = app.sync_interval_secs,
        max_concurrent = app.max_concurrent_workflows,
        "connectors service running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    if let Err(e) = trigger.await {
        tracing::error!(error = %e, "sync trigger task failed");
    }
    scheduler.shutdown().await;

    tracing::info!("connectors service stopped");
}
