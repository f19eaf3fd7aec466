// Model download for the local inference collaborators.
//
// Two ONNX models are fetched from HuggingFace, each into its own
// subdirectory of the model dir (~/.local/share/opinion-analyzer/models/ on
// Linux):
//   all-MiniLM-L6-v2   sentence embeddings for topic assignment (~90MB)
//   bart-large-mnli    zero-shot NLI for role classification (~410MB)
//
// Summarization runs remotely and needs no local weights.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// One file to fetch: path inside the HF repo, local name, approximate size
/// for the progress message.
struct ModelFile {
    remote: &'static str,
    local: &'static str,
    approx_size: Option<&'static str>,
}

/// A model repo and the files we need from it.
pub struct ModelSpec {
    pub name: &'static str,
    pub subdir: &'static str,
    base_url: &'static str,
    files: &'static [ModelFile],
}

pub const EMBEDDING_MODEL: ModelSpec = ModelSpec {
    name: "Sentence embedding model (all-MiniLM-L6-v2)",
    subdir: "all-MiniLM-L6-v2",
    base_url: "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main",
    files: &[
        ModelFile {
            remote: "tokenizer.json",
            local: "tokenizer.json",
            approx_size: None,
        },
        ModelFile {
            remote: "onnx/model.onnx",
            local: "model.onnx",
            approx_size: Some("~90 MB"),
        },
    ],
};

pub const ZERO_SHOT_MODEL: ModelSpec = ModelSpec {
    name: "Zero-shot NLI model (bart-large-mnli)",
    subdir: "bart-large-mnli",
    base_url: "https://huggingface.co/Xenova/bart-large-mnli/resolve/main",
    files: &[
        ModelFile {
            remote: "tokenizer.json",
            local: "tokenizer.json",
            approx_size: None,
        },
        ModelFile {
            remote: "onnx/model_quantized.onnx",
            local: "model_quantized.onnx",
            approx_size: Some("~410 MB"),
        },
    ],
};

impl ModelSpec {
    /// Where this model lives under `base`.
    pub fn dir(&self, base: &Path) -> PathBuf {
        base.join(self.subdir)
    }

    /// True when every file this model needs is on disk.
    pub fn files_present(&self, base: &Path) -> bool {
        let dir = self.dir(base);
        self.files.iter().all(|f| dir.join(f.local).exists())
    }

    /// Local paths of this model's files that are not on disk yet.
    pub fn missing_files(&self, base: &Path) -> Vec<PathBuf> {
        let dir = self.dir(base);
        self.files
            .iter()
            .map(|f| dir.join(f.local))
            .filter(|p| !p.exists())
            .collect()
    }
}

/// Returns the default directory for storing model files.
/// Uses the platform data directory: ~/.local/share/opinion-analyzer/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("opinion-analyzer")
        .join("models")
}

pub fn embedding_model_dir(base: &Path) -> PathBuf {
    EMBEDDING_MODEL.dir(base)
}

pub fn zero_shot_model_dir(base: &Path) -> PathBuf {
    ZERO_SHOT_MODEL.dir(base)
}

/// Download every model the pipeline needs. Files already on disk are
/// skipped, so an interrupted download can simply be re-run.
pub async fn download_models(base: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    for spec in [&EMBEDDING_MODEL, &ZERO_SHOT_MODEL] {
        download_model(&client, spec, base).await?;
    }
    Ok(())
}

async fn download_model(client: &reqwest::Client, spec: &ModelSpec, base: &Path) -> Result<()> {
    println!("\n{}:", spec.name);

    let dir = spec.dir(base);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    for file in spec.files {
        let dest = dir.join(file.local);
        if dest.exists() {
            info!(file = file.local, model = spec.subdir, "Already present, skipping");
            println!("  {} (already exists)", file.local);
            continue;
        }

        match file.approx_size {
            Some(size) => println!("  Downloading {} ({})...", file.local, size),
            None => println!("  Downloading {}...", file.local),
        }
        let url = format!("{}/{}", spec.base_url, file.remote);
        download_file(client, &url, &dest, file.approx_size.is_some()).await?;
    }

    Ok(())
}

/// Stream one file to disk. Writes to a `.part` file first and renames on
/// completion so a half-written model is never mistaken for a finished one.
async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    show_progress: bool,
) -> Result<()> {
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = match (show_progress, response.content_length()) {
        (false, _) => ProgressBar::hidden(),
        (true, Some(size)) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .expect("valid template")
                    .progress_chars("=> "),
            );
            pb
        }
        (true, None) => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("    {spinner} {bytes}")
                    .expect("valid template"),
            );
            pb
        }
    };

    let partial = partial_path(dest);
    let mut out = File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("Failed to read body of {}", url))?
    {
        out.write_all(&chunk)
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        pb.inc(chunk.len() as u64);
    }
    out.flush()
        .with_context(|| format!("Failed to flush {}", partial.display()))?;
    drop(out);

    std::fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move download into place: {}", dest.display()))?;
    pb.finish_and_clear();

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
