use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kb_mail_triage::channels::SmtpMailer;
use kb_mail_triage::config::Config;
use kb_mail_triage::knowledge::KnowledgeBaseClient;
use kb_mail_triage::objects;
use kb_mail_triage::pipeline::{
    IntakeRecorder, KnowledgeBaseRefresher, PipelineRunner, ResponseDrafter, ReviewDispatcher,
};
use kb_mail_triage::server::{AppState, routes};
use kb_mail_triage::store::{LibSqlBackend, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing: stderr always, plus daily files when a log dir is set
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "kb-mail-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    let records: Arc<dyn RecordStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path, &config.record_table)
            .await
            .context("Failed to open record database")?,
    );
    let object_store: Arc<dyn objects::ObjectStore> = Arc::from(objects::from_source(&config.objects));
    let knowledge = Arc::new(KnowledgeBaseClient::from_config(&config.knowledge_base));
    let mailer = Arc::new(SmtpMailer::new(config.smtp.clone()));

    let intake = Arc::new(IntakeRecorder::new(object_store, records.clone()));
    let drafter = Arc::new(ResponseDrafter::new(knowledge.clone(), &config.knowledge_base));
    let review = Arc::new(ReviewDispatcher::new(
        mailer,
        records.clone(),
        config.review.clone(),
    ));
    let refresher = Arc::new(KnowledgeBaseRefresher::new(knowledge, &config.knowledge_base));
    let runner = Arc::new(PipelineRunner::new(
        intake.clone(),
        drafter.clone(),
        review.clone(),
    ));

    let app = routes(AppState {
        intake,
        drafter,
        review,
        refresher,
        runner,
        records,
    });

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(
        port = config.http_port,
        table = %config.record_table,
        knowledge_base_id = %config.knowledge_base.knowledge_base_id,
        "Triage host started"
    );
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
