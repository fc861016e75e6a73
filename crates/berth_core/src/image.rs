//! Image references and the pull-if-absent resolver.

use berth_engine::ContainerEngine;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::error::{ContainerError, ContainerResult};

/// An image name plus tag. The tag defaults to `latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Reference with the default `latest` tag.
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, "latest")
    }

    /// Full `name:tag` reference.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Ensure `image` exists locally, pulling it if absent.
///
/// Listing the local tag set is the only step when the image is already
/// present; otherwise a streaming pull runs and the first error-bearing
/// progress event aborts it. An error mentioning "not found" (or a 404
/// status) classifies as [`ContainerError::ImageNotFound`], anything else
/// as [`ContainerError::ImagePullFailed`]. No retry is attempted.
pub async fn ensure_image_present(
    engine: &dyn ContainerEngine,
    image: &ImageRef,
) -> ContainerResult<()> {
    let reference = image.reference();

    let tags = engine.image_tags(&image.name).await?;
    if tags.iter().any(|tag| *tag == reference) {
        debug!("Image {} already present", reference);
        return Ok(());
    }

    info!(
        "Pulling image: {}. This may take some time but only needs to be done once.",
        reference
    );

    let mut stream = engine.pull_image(&image.name, &image.tag).await?;
    while let Some(event) = stream.next().await {
        let progress = event.map_err(|e| ContainerError::ImagePullFailed {
            image: reference.clone(),
            detail: e.to_string(),
        })?;

        if let Some(status) = &progress.status {
            debug!("Pull status: {}", status);
        }

        if let Some(error) = progress.error {
            return Err(classify_pull_error(&reference, error));
        }
    }

    info!("Image {} pulled successfully", reference);
    Ok(())
}

fn classify_pull_error(reference: &str, error: String) -> ContainerError {
    if error.contains("not found") || error.contains("404") {
        ContainerError::ImageNotFound {
            image: reference.to_string(),
            detail: error,
        }
    } else {
        ContainerError::ImagePullFailed {
            image: reference.to_string(),
            detail: error,
        }
    }
}
