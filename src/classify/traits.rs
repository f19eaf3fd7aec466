// Zero-shot classifier trait: the swap-ready abstraction.
//
// The default implementation scores (text, label) pairs with a local NLI
// model. Anything that ranks candidate labels per text can stand in.

use anyhow::Result;
use async_trait::async_trait;

/// One candidate label and its probability for a given text.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Ranks candidate labels for each text.
#[async_trait]
pub trait ZeroShotClassifier: Send + Sync {
    /// For every text, return all labels ranked by descending score. The
    /// outer vector is aligned with `texts`.
    async fn classify(&self, texts: &[String], labels: &[&str]) -> Result<Vec<Vec<LabelScore>>>;
}

/// Sort label scores descending. Stable, so equal scores keep label order.
pub fn rank_labels(labels: &[&str], scores: &[f32]) -> Vec<LabelScore> {
    let mut ranked: Vec<LabelScore> = labels
        .iter()
        .zip(scores)
        .map(|(label, &score)| LabelScore {
            label: label.to_string(),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
