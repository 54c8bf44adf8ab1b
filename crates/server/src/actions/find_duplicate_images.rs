//! find_duplicate_images action implementation.
//!
//! Validates the request payload and hands it to the pipeline.

use serde::Deserialize;
use serde_json::Value;

use imgdup_core::model::coerce_threshold;
use imgdup_core::{ImageCategory, ImageName};

use crate::error::PipelineError;
use crate::outbound::Outbound;
use crate::pipeline::{DuplicateRequest, Pipeline, PipelineOutcome};

/// Input payload for find_duplicate_images.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindDuplicateImagesParams {
    /// Image names to compare.
    #[serde(default)]
    pub images: Vec<ImageName>,

    /// One of "poster", "profile", "backdrop" or "logo".
    #[serde(rename = "imageType", default)]
    pub image_type: Option<String>,

    /// Similarity in [0, 1]. Numbers and numeric strings are accepted.
    #[serde(rename = "minSimilarityThreshold", default)]
    pub min_similarity_threshold: Option<Value>,
}

impl FindDuplicateImagesParams {
    /// Check the payload and resolve the threshold.
    pub fn into_request(self, default_threshold: f64) -> Result<DuplicateRequest, PipelineError> {
        let image_type = self
            .image_type
            .ok_or_else(|| PipelineError::Validation("imageType is required".into()))?;
        let category: ImageCategory = image_type.parse()?;

        if self.images.is_empty() {
            return Err(PipelineError::Validation("images cannot be empty".into()));
        }

        let threshold = coerce_threshold(self.min_similarity_threshold.as_ref(), default_threshold);

        Ok(DuplicateRequest { images: self.images, category, threshold })
    }
}

/// Implementation of the find_duplicate_images action.
pub async fn find_duplicate_images_impl(
    pipeline: &Pipeline, data: Value, outbound: &Outbound, default_threshold: f64,
) -> Result<PipelineOutcome, PipelineError> {
    let params: FindDuplicateImagesParams =
        serde_json::from_value(data).map_err(|e| PipelineError::Validation(format!("malformed payload: {e}")))?;
    let request = params.into_request(default_threshold)?;

    tracing::info!(
        images = request.images.len(),
        category = %request.category,
        threshold = request.threshold,
        "find_duplicate_images"
    );

    Ok(pipeline.run(request, outbound).await)
}
