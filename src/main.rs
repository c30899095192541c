use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_insight::agents::rag::{RagAgent, RagState};
use audit_insight::agents::self_rag::{SelfRagAgent, SelfRagState};
use audit_insight::agents::summary::SummaryService;
use audit_insight::agents::supervisor::{Supervisor, SupervisorState};
use audit_insight::config::Config;
use audit_insight::embeddings::vector_index::{Retriever, VectorIndex};
use audit_insight::embeddings::{Embedder, OpenAiEmbeddings};
use audit_insight::graph::MemorySaver;
use audit_insight::ingest;
use audit_insight::llm::provider::create_chat_model;
use audit_insight::report::renderer::{ChromiumRenderer, PdfRenderer};
use audit_insight::report::{ReportPipeline, ReportStore};
use audit_insight::routes::create_router;
use audit_insight::tools::pdf_report::PdfReportTool;
use audit_insight::tools::retriever::RetrieverTool;
use audit_insight::tools::Tool;
use audit_insight::AppState;

#[derive(Parser)]
#[command(name = "audit-insight", about = "RAG and multi-agent service over audit data")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Build the vector indices from the database
    Ingest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_insight=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    let pool = audit_insight::db::create_pool(&config.database).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Ingest => {
            ingest::run(&config, &pool).await?;
            Ok(())
        }
        Command::Serve => serve(config, pool).await,
    }
}

async fn serve(config: Config, pool: sqlx::PgPool) -> anyhow::Result<()> {
    let llm = create_chat_model(&config.llm)?;
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbeddings::new(
        &config.llm.openai_api_key,
        &config.llm.embedding_model,
    ));

    // Indices are built by `audit-insight ingest`; serving requires them.
    let store_path = Path::new(&config.storage.vector_store_path);
    let audit_index = Arc::new(
        VectorIndex::load(&store_path.join(ingest::AUDIT_DOMAIN))
            .map_err(|e| anyhow::anyhow!("Vector store not initialized, run `audit-insight ingest` first: {}", e))?,
    );
    let observation_index = Arc::new(
        VectorIndex::load(&store_path.join(ingest::OBSERVATION_DOMAIN))
            .map_err(|e| anyhow::anyhow!("Vector store not initialized, run `audit-insight ingest` first: {}", e))?,
    );

    let audit_tool: Arc<dyn Tool> = Arc::new(RetrieverTool::new(
        "retrieve_audit_data",
        "Search and return information about audit data.",
        Retriever::new(audit_index.clone(), embedder.clone()),
    ));
    let observation_tool: Arc<dyn Tool> = Arc::new(RetrieverTool::new(
        "retrieve_observation_data",
        "Search and return information about observation data.",
        Retriever::new(observation_index, embedder.clone()),
    ));

    let renderer: Arc<dyn PdfRenderer> = Arc::new(ChromiumRenderer);
    let reports = Arc::new(ReportStore::new(
        config.storage.reports_path.clone(),
        &config.server.app_url,
        renderer,
    )?);
    let pdf_tool: Arc<dyn Tool> = Arc::new(PdfReportTool::new(reports.clone()));

    let capacity = config.agents.checkpoint_capacity;
    let rag = Arc::new(RagAgent::new(
        llm.clone(),
        vec![audit_tool, observation_tool],
        MemorySaver::<RagState>::new(capacity),
    )?);
    let self_rag = Arc::new(SelfRagAgent::new(
        llm.clone(),
        Arc::new(Retriever::new(audit_index, embedder)),
        MemorySaver::<SelfRagState>::new(capacity),
    )?);
    let supervisor = Arc::new(Supervisor::new(
        llm.clone(),
        vec![pdf_tool],
        pool.clone(),
        MemorySaver::<SupervisorState>::new(capacity),
    )?);
    let summary = Arc::new(SummaryService::new(llm.clone(), pool.clone()));
    let report_pipeline = Arc::new(ReportPipeline::new(llm, reports.clone()));

    let state = AppState {
        pool,
        config: config.clone(),
        rag,
        self_rag,
        supervisor,
        summary,
        reports,
        report_pipeline,
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
