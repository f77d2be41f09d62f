use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lernia_events::delivery::crypto::ContactCipher;
use lernia_events::delivery::email::{LogMailTransport, SmtpMailTransport};
use lernia_events::ports::MailTransport;
use lernia_events::store::{PgTemplateStore, PgUserDirectory};
use lernia_events::{
    bus, BatchNotificationHandler, HandlerPool, NotificationDispatcher, OperationRouter,
    RegistryBuilder, TelemetryBus,
};
use lernia_worker::config::{LogFormat, WorkerConfig};
use lernia_worker::ingest;

/// How long shutdown waits for in-flight operations at each stage.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(?config, "Loaded worker configuration");

    // --- Database ---
    let pool = lernia_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    lernia_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    lernia_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Telemetry ---
    let telemetry = Arc::new(TelemetryBus::default());
    let telemetry_log = tokio::spawn(bus::log_events(telemetry.subscribe()));

    // --- Mail transport ---
    let mailer: Arc<dyn MailTransport> = match &config.email {
        Some(email) => {
            tracing::info!(host = %email.smtp_host, port = email.smtp_port, "SMTP delivery enabled");
            Arc::new(SmtpMailTransport::new(email).context("Invalid SMTP configuration")?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, notification emails will only be logged");
            Arc::new(LogMailTransport)
        }
    };

    // --- Handlers ---
    let dispatcher = NotificationDispatcher::new(
        Arc::new(PgTemplateStore::new(pool.clone())),
        Arc::new(ContactCipher::new(config.encryption_key.as_bytes())),
        mailer,
    )
    .with_telemetry(Arc::clone(&telemetry));

    let batch_handler = BatchNotificationHandler::new(
        Arc::new(PgUserDirectory::new(pool.clone())),
        dispatcher,
    );
    let batch_pool = HandlerPool::spawn(Arc::new(batch_handler), config.workers);
    tracing::info!(workers = batch_pool.worker_count(), "Batch notification workers started");

    // --- Router ---
    let mut registry = RegistryBuilder::new();
    registry.register(&config.router_name, batch_pool.operations(), &batch_pool.handle())?;

    let router = OperationRouter::new(config.router_name.as_str(), Arc::new(registry.build()))
        .with_telemetry(Arc::clone(&telemetry));
    let router_cancel = CancellationToken::new();
    let (router_ref, router_task) = router.spawn(router_cancel.clone());

    // --- Input loop ---
    let in_flight = TaskTracker::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!("Reading operations from stdin");
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!("Input closed, starting graceful shutdown");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read from stdin");
                        break;
                    }
                };

                let envelope = match ingest::parse_line(&line) {
                    Ok(Some(envelope)) => envelope,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Rejected input line");
                        println!("{}", ingest::rejection_line(&e));
                        continue;
                    }
                };

                let router_ref = router_ref.clone();
                in_flight.spawn(async move {
                    let request_id = envelope.request_id.clone();
                    match router_ref.ask(envelope).await {
                        Ok(reply) => println!("{}", ingest::reply_line(&request_id, reply.as_ref())),
                        Err(e) => tracing::error!(request_id = %request_id, error = %e, "Operation not routed"),
                    }
                });
            }
        }
    }

    // --- Shutdown ---
    in_flight.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, in_flight.wait()).await.is_err() {
        tracing::warn!(pending = in_flight.len(), "Timed out waiting for in-flight operations");
    }

    drop(router_ref);
    router_cancel.cancel();
    let _ = router_task.await;
    tracing::info!("Operation router stopped");

    if tokio::time::timeout(DRAIN_TIMEOUT, batch_pool.join()).await.is_err() {
        tracing::warn!("Timed out waiting for notification workers");
    }

    drop(telemetry);
    let _ = tokio::time::timeout(Duration::from_secs(5), telemetry_log).await;

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lernia_worker=debug,lernia_events=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
