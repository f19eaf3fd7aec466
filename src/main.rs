use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use opinion_analyzer::classify::onnx::NliZeroShotClassifier;
use opinion_analyzer::config::Config;
use opinion_analyzer::download;
use opinion_analyzer::output;
use opinion_analyzer::pipeline::PipelineOrchestrator;
use opinion_analyzer::resources::ResourceScope;
use opinion_analyzer::summarize::http::HttpSummarizer;
use opinion_analyzer::text::TextNormalizer;
use opinion_analyzer::topics::embeddings::SentenceEmbedder;

/// Opinion analyzer: sort comments by topic and argumentative role, then
/// summarize what each topic's commenters are saying.
#[derive(Parser)]
#[command(name = "opinion-analyzer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an opinions CSV against a topics CSV (both need a `text` column)
    Analyze {
        /// CSV file of topics
        #[arg(long)]
        topics: PathBuf,

        /// CSV file of opinions
        #[arg(long)]
        opinions: PathBuf,

        /// Directory for the result files (default: OPINION_OUTPUT_DIR or ./outputs)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Opinions per classification batch (default: OPINION_BATCH_SIZE or 8192)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Download the ONNX embedding and zero-shot models (~500 MB)
    DownloadModel,

    /// Show model files, summarizer endpoint and batch settings
    Status,

    /// Serve the analysis pipeline over HTTP
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "50051")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("opinion_analyzer=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            topics,
            opinions,
            output,
            batch_size,
        } => {
            let mut config = Config::load()?;
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size.max(1);
            }
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());

            let orchestrator = build_orchestrator(&config).await?.with_progress(true);

            println!(
                "Analyzing {} against {} (batches of {})...",
                opinions.display(),
                topics.display(),
                config.batch_size
            );

            let report = orchestrator.run_files(&topics, &opinions).await?;

            let written = output::csv::write_results(&output_dir, &report.comments, &report.conclusions)?;
            output::terminal::display_conclusions(&report);

            println!();
            for path in [written.opinions, written.conclusions].into_iter().flatten() {
                println!("  Saved {}", path.display());
            }
            for e in &written.errors {
                println!("  {} {:#}", "!".bright_red(), e);
            }
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading ONNX models...");
            println!("  Destination: {}", model_dir.display());

            download::download_models(model_dir).await?;

            println!("\n{}", "Models downloaded successfully.".bold());
            println!("You can now run `opinion-analyzer analyze --topics <csv> --opinions <csv>`.");
        }

        Commands::Status => {
            let config = Config::load()?;
            opinion_analyzer::status::show(&config);
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            let orchestrator = build_orchestrator(&config).await?;
            let state =
                opinion_analyzer::web::AppState::new(Arc::new(orchestrator), config.server_workers)
                    .with_body_limit(config.max_request_bytes);
            opinion_analyzer::web::run_server(state, port, &bind).await?;
        }
    }

    Ok(())
}

/// Load the models and wire the pipeline. Model weights are loaded once
/// here and shared read-only by every invocation.
async fn build_orchestrator(config: &Config) -> Result<PipelineOrchestrator> {
    config.require_models()?;
    config.require_summarizer()?;

    let embed_dir = download::embedding_model_dir(&config.model_dir);
    let nli_dir = download::zero_shot_model_dir(&config.model_dir);
    let pair_batch = config.nli_pair_batch;

    // Model loading is CPU-heavy; keep it off the async workers.
    let (embedder, classifier) = tokio::task::spawn_blocking(move || -> Result<_> {
        let embedder = SentenceEmbedder::load(&embed_dir)?;
        let classifier = NliZeroShotClassifier::load(&nli_dir)?.with_pair_batch(pair_batch);
        Ok((embedder, classifier))
    })
    .await??;
    info!("Inference models loaded");

    let mut summarizer =
        HttpSummarizer::new(config.summarizer_url.clone(), config.summarizer_token.clone());
    if let Some(qps) = config.summarizer_qps {
        summarizer = summarizer.with_rate_limit(qps);
    }

    Ok(PipelineOrchestrator::new(
        Arc::new(embedder),
        Arc::new(classifier),
        Arc::new(summarizer),
        ResourceScope::default(),
    )
    .with_normalizer(TextNormalizer::new(config.max_text_length))
    .with_batch_size(config.batch_size)
    .with_summary_batch_size(config.summary_batch_size))
}
