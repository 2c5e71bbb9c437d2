use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use ao_domain::cancel::CancelMap;
use ao_domain::config::{Config, ConfigSeverity};
use ao_gateway::cli::{self, Cli, Command, ConfigCommand};
use ao_gateway::state::AppState;
use ao_gateway::ws::ws_handler;
use ao_pipeline::{DirectQaExecutor, PlanExecutor};
use ao_providers::ProviderRegistry;
use ao_store::Store;
use ao_tools::ToolRegistry;
use ao_workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::validate_config(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::show_config(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ao_gateway=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("agent orchestrator starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Core services ────────────────────────────────────────────────
    let workspace = WorkspaceManager::new(config.workspace.root.clone());
    tracing::info!(root = %config.workspace.root.display(), "workspace manager ready");

    let store = Store::open(&config.store.path).await.with_context(|| format!("opening store at {}", config.store.path.display()))?;
    tracing::info!(path = %config.store.path.display(), "persistence store ready");

    let llm = ProviderRegistry::from_config(&config.llm).context("building LLM provider registry")?;
    if llm.is_empty() {
        tracing::warn!("no LLM providers registered; planning and execution will fail at call time");
    }
    let llm = Arc::new(llm);

    let tools = ToolRegistry::new(workspace.clone(), config.tools.clone());
    tracing::info!("tool registry ready");

    let cancel_map = Arc::new(CancelMap::new());
    let plan_executor = Arc::new(PlanExecutor::new(llm.clone(), config.pipeline.clone()));
    let direct_qa = Arc::new(DirectQaExecutor::new(llm.clone()));

    let state = AppState {
        config: config.clone(),
        store: Arc::new(store),
        workspace: Arc::new(workspace),
        llm,
        tools: Arc::new(tools),
        plan_executor,
        direct_qa,
        cancel_map,
    };

    // ── Router ───────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);
    let max_message_bytes = config.server.channel.max_message_bytes;

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .with_state(state);
    tracing::info!(max_message_bytes, "router assembled");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "agent orchestrator listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

/// Origins may end in `:*` to match any port on that host; a lone `"*"`
/// allows everything (warned about during config validation).
fn build_cors_layer(cors: &ao_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str.strip_prefix(prefix.as_str()).map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())).unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
