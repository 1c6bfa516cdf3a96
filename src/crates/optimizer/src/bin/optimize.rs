//! Prompt optimizer CLI
//!
//! Runs one optimization workflow against the xAI API and prints the
//! aggregated result as JSON.

use anyhow::Context;
use clap::Parser;
use llm::remote::GrokClient;
use llm::RemoteLlmConfig;
use optimizer::{OptimizerConfig, RequestContext, WorkflowOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "optimize")]
#[command(about = "Optimize a prompt with a five-stage agent workflow", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Prompt to optimize
    #[arg(short, long)]
    prompt: String,

    /// Category: general, creative, technical, analytical, marketing
    #[arg(short, long, default_value = "general")]
    category: String,

    /// Execution mode: auto, parallel, sequential
    #[arg(short, long, default_value = "auto")]
    mode: String,

    /// YAML configuration file
    #[arg(long, env = "OPTIMIZER_CONFIG")]
    config: Option<PathBuf>,

    /// Model identifier (defaults to XAI_MODEL or the provider default)
    #[arg(long)]
    model: Option<String>,

    /// HTTP timeout per LLM call, in seconds
    #[arg(long, default_value_t = 60)]
    request_timeout: u64,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,

    /// Always call the model, even for repeated stage inputs
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(rust_log)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => OptimizerConfig::from_file_with_env(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let config = OptimizerConfig::from_env();
            config.validate()?;
            config
        }
    };

    if cli.no_cache {
        config.cache.enabled = false;
    }

    let ctx = RequestContext::parse(cli.prompt, &cli.category, Some(&cli.mode))?;

    let mut llm_config = RemoteLlmConfig::xai_from_env()
        .context("XAI_API_KEY must be set")?
        .with_timeout(Duration::from_secs(cli.request_timeout));
    if let Some(model) = cli.model {
        llm_config = llm_config.with_model(model);
    }
    let client = GrokClient::new(llm_config)?;

    tracing::info!(model = %client.config().model, "Using remote model");

    let orchestrator = WorkflowOrchestrator::new(Arc::new(client), config)?;
    let result = orchestrator.run(&ctx).await?;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    Ok(())
}
