// kavach/src/main.rs
//
// Kavach — UPI fraud-defense backend.
//
// Two operational modes:
//   serve — HTTP API: scan / validate / chat orchestration / honeypot
//   eval  — benchmark the scan pipeline on a labeled JSONL dataset
//
// Usage:
//   kavach                                        # serve on $PORT (default 4000)
//   kavach --mode eval --path labeled.jsonl       # offline evaluation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod analyzers;
mod api;
mod audit;
mod chat;
mod clients;
mod config;
mod engine;
mod eval;
mod extract;
mod honeypot;
mod metrics;
mod store;
mod types;

use api::{AppState, NoQrDecoder};
use audit::Audit;
use chat::Orchestrator;
use clients::llm::LlmClient;
use clients::ml::MlClient;
use config::Settings;
use honeypot::engine::HoneypotEngine;
use metrics::Metrics;
use store::blacklist::BlacklistStore;
use store::persist;
use store::phishing::PhishingStore;
use store::sessions::SessionStore;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "kavach",
    about   = "UPI fraud-defense backend — multi-signal risk scoring + honeypot",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "serve")]
    mode: Mode,

    #[arg(long, help = "Labeled JSONL dataset (eval mode)")]
    path: Option<PathBuf>,

    #[arg(long, default_value = "40", help = "Scam decision threshold 0-100 (eval mode)")]
    eval_threshold: u8,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Serve, // HTTP API server
    Eval,  // offline dataset benchmark
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("kavach=info".parse()?),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Eval => {
            let path = cli.path.context("--path is required in eval mode")?;
            let result = eval::Evaluator::new(cli.eval_threshold)
                .run_dataset(&path)
                .await?;
            result.print_report();
            Ok(())
        }
        Mode::Serve => serve().await,
    }
}

async fn serve() -> Result<()> {
    let settings = Settings::from_env();
    print_banner();

    // Stores + persistence restore before accepting traffic.
    let sessions = Arc::new(SessionStore::new());
    let blacklist = Arc::new(BlacklistStore::new());
    let phishing = Arc::new(PhishingStore::new());

    let redis = match settings.redis_url.as_deref() {
        Some(url) => persist::connect(url).await,
        None => {
            warn!("REDIS_URL not set — state is in-memory only");
            None
        }
    };
    if let Some(con) = &redis {
        if let Err(e) = persist::restore_all(con, &sessions, &blacklist, &phishing).await {
            warn!("State restore failed ({e}) — starting empty");
        }
    }
    let _writer = persist::start(redis, &sessions, &blacklist, &phishing);
    phishing.seed_if_empty();

    // Optional external collaborators.
    let llm: Option<Arc<LlmClient>> = if settings.llm_configured() {
        match LlmClient::new(
            &settings.llm_base_url,
            settings.llm_api_key.as_deref().unwrap_or_default(),
            &settings.llm_model,
            settings.llm_timeout,
        ) {
            Ok(c) => {
                info!("LLM provider configured: {} ({})", settings.llm_base_url, settings.llm_model);
                Some(Arc::new(c))
            }
            Err(e) => {
                warn!("LLM client init failed ({e}) — continuing rule-only");
                None
            }
        }
    } else {
        info!("No LLM configured — rule-only classification");
        None
    };

    let ml: Option<Arc<MlClient>> = match settings.ml_url.as_deref() {
        Some(url) => match MlClient::new(url, settings.ml_timeout_ms) {
            Ok(c) => {
                info!("ML service configured: {url} (timeout {}ms)", settings.ml_timeout_ms);
                Some(Arc::new(c))
            }
            Err(e) => {
                warn!("ML client init failed ({e}) — continuing without ML");
                None
            }
        },
        None => {
            info!("No ML service configured");
            None
        }
    };

    let metrics = Metrics::new();
    let audit = Arc::new(Audit::new(settings.output_dir.clone()));

    let orchestrator = Orchestrator::new(
        sessions.clone(),
        blacklist.clone(),
        phishing.clone(),
        llm.clone(),
        metrics.clone(),
        audit.clone(),
        settings.scam_threshold,
    );

    let honeypot = HoneypotEngine::new(
        llm.clone(),
        phishing.clone(),
        metrics.clone(),
        settings.callback_url.clone(),
        settings.scam_threshold,
        settings.min_messages_for_callback,
        settings.session_timeout_mins,
    );
    tokio::spawn(honeypot.clone().sweeper_loop());

    let bind = settings.bind;
    let state = Arc::new(AppState {
        settings,
        orchestrator,
        honeypot,
        sessions,
        blacklist,
        phishing,
        llm,
        ml,
        metrics,
        audit,
        qr_decoder: Arc::new(NoQrDecoder),
    });

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Kavach API listening on {bind}");

    axum::serve(listener, app).await.context("Server error")
}

fn print_banner() {
    println!("\x1b[1m");
    println!(" ██╗  ██╗ █████╗ ██╗   ██╗ █████╗  ██████╗██╗  ██╗");
    println!(" ██║ ██╔╝██╔══██╗██║   ██║██╔══██╗██╔════╝██║  ██║");
    println!(" █████╔╝ ███████║██║   ██║███████║██║     ███████║");
    println!(" ██╔═██╗ ██╔══██║╚██╗ ██╔╝██╔══██║██║     ██╔══██║");
    println!(" ██║  ██╗██║  ██║ ╚████╔╝ ██║  ██║╚██████╗██║  ██║");
    println!(" ╚═╝  ╚═╝╚═╝  ╚═╝  ╚═══╝  ╚═╝  ╚═╝ ╚═════╝╚═╝  ╚═╝");
    println!("\x1b[0m");
    println!("  \x1b[90mUPI fraud defense | multi-signal risk scoring + honeypot\x1b[0m\n");
}
