// Argumentative role classification.
//
// Each comment is classified against the four role labels and keeps only the
// top-ranked one. The whole call fails soft: a bad batch yields an empty
// result and the caller treats it as "nothing classified here".

use std::sync::Arc;

use tracing::{error, info, warn};

use super::traits::ZeroShotClassifier;
use crate::error::StageError;
use crate::models::Role;
use crate::resources::ResourceScope;

pub struct RoleClassifier {
    classifier: Arc<dyn ZeroShotClassifier>,
    scope: ResourceScope,
}

impl RoleClassifier {
    pub fn new(classifier: Arc<dyn ZeroShotClassifier>, scope: ResourceScope) -> Self {
        Self { classifier, scope }
    }

    /// Classify comments, aligned by position. Returns an empty vector if the
    /// input is invalid or the classifier fails.
    pub async fn classify(&self, comments: &[String]) -> Vec<Role> {
        match self.try_classify(comments).await {
            Ok(roles) => roles,
            Err(StageError::InvalidInput(reason)) => {
                error!(reason = %reason, "Rejected classification batch");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, "Classification failed for batch");
                Vec::new()
            }
        }
    }

    /// Classify comments, surfacing the failure instead of swallowing it.
    /// Device memory is released on every exit path.
    pub async fn try_classify(&self, comments: &[String]) -> Result<Vec<Role>, StageError> {
        let _lease = self.scope.acquire("role-classification");

        if let Some(index) = comments.iter().position(|c| c.trim().is_empty()) {
            return Err(StageError::InvalidInput(format!(
                "comment {index} is empty; all comments must be non-empty strings"
            )));
        }

        if comments.is_empty() {
            warn!("No comments to classify in this batch");
            return Ok(Vec::new());
        }

        info!(comments = comments.len(), "Classifying batch");

        let labels = Role::labels();
        let ranked = self
            .classifier
            .classify(comments, &labels)
            .await
            .map_err(StageError::Classification)?;

        if ranked.len() != comments.len() {
            return Err(StageError::MisalignedBatch {
                expected: comments.len(),
                got: ranked.len(),
            });
        }

        let roles = ranked
            .iter()
            .enumerate()
            .map(|(i, scores)| {
                let top = scores.first().ok_or_else(|| {
                    StageError::Classification(anyhow::anyhow!("no labels returned for comment {i}"))
                })?;
                Role::from_label(&top.label).ok_or_else(|| {
                    StageError::Classification(anyhow::anyhow!(
                        "classifier returned unknown label {:?}",
                        top.label
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Comment classification completed");
        Ok(roles)
    }
}
