// System status display: model files, summarizer endpoint, batch settings.

use std::path::Path;

use colored::Colorize;

use crate::config::Config;
use crate::download::{ModelSpec, EMBEDDING_MODEL, ZERO_SHOT_MODEL};

/// Display system status to the terminal.
pub fn show(config: &Config) {
    println!("Model directory: {}", config.model_dir.display());
    for spec in [&EMBEDDING_MODEL, &ZERO_SHOT_MODEL] {
        show_model(spec, &config.model_dir);
    }

    println!("\nSummarizer: {}", config.summarizer_url);
    let auth = if config.summarizer_token.is_some() {
        "token configured".green()
    } else {
        "no token".yellow()
    };
    let pacing = config
        .summarizer_qps
        .map(|q| format!("{q} req/s"))
        .unwrap_or_else(|| "unlimited".to_string());
    println!("  Auth: {}  |  Rate limit: {}", auth, pacing);
    if let Err(e) = config.require_summarizer() {
        println!("  {} {}", "!".bright_red(), e);
    }

    println!("\nBatch size: {} opinions", config.batch_size);
    println!("Summary batch size: {} comments", config.summary_batch_size);
    println!("Zero-shot pair batch: {} pairs", config.nli_pair_batch);
    println!("Max text length: {} chars", config.max_text_length);
    println!("Output directory: {}", config.output_dir.display());
    println!("Server workers: {}", config.server_workers);
}

fn show_model(spec: &ModelSpec, base: &Path) {
    let dir = spec.dir(base);
    if spec.files_present(base) {
        let size = dir_size(&dir).map(format_bytes).unwrap_or_else(|| "unknown".to_string());
        println!("  {} {} ({})", "ok".green(), spec.name, size);
    } else {
        println!("  {} {}: not downloaded", "--".yellow(), spec.name);
        println!("     Run `opinion-analyzer download-model` to fetch it");
    }
}

/// Total size of the regular files directly inside `dir`.
fn dir_size(dir: &Path) -> Option<u64> {
    let entries = std::fs::read_dir(dir).ok()?;
    Some(
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum(),
    )
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
