//! End-to-end analysis orchestration with guaranteed scratch cleanup.

use std::path::{Path, PathBuf};

use crate::credentials::ApiKey;
use crate::error::{ServiceError, ServiceResult};
use crate::provider::ProviderFactory;

/// Drop guard owning the normalized image file for one analysis request.
///
/// Every exit path out of [`run_analysis`] drops the guard, which removes
/// the file. There is no per-branch cleanup code to keep in sync.
struct ScratchImage {
    path: PathBuf,
}

impl Drop for ScratchImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed scratch image {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove scratch image {}: {e}",
                self.path.display()
            ),
        }
    }
}

/// Run one analysis request end to end: validate, build a provider for
/// `key`, submit `instruction` plus the image at `image_path`, and delete
/// the file before returning, whatever the outcome.
///
/// A missing or nonexistent `image_path` fails before the file guard is
/// taken, so no file operation is attempted for it. Once the referenced
/// file is confirmed to exist, it is deleted on every path that follows,
/// including a missing credential and a factory that returns no provider.
pub async fn run_analysis(
    factory: &dyn ProviderFactory,
    key: Option<ApiKey>,
    image_path: &Path,
    instruction: &str,
) -> ServiceResult<String> {
    if image_path.as_os_str().is_empty() {
        return Err(ServiceError::Precondition("no image reference given".into()));
    }
    if !image_path.is_file() {
        return Err(ServiceError::Precondition(format!(
            "image file does not exist: {}",
            image_path.display()
        )));
    }

    // The file's only purpose is this one call; the guard deletes it on
    // every path below.
    let guard = ScratchImage {
        path: image_path.to_path_buf(),
    };

    let key = key.ok_or(ServiceError::MissingCredential)?;
    let provider = factory
        .build(&key)
        .ok_or(ServiceError::ProviderUnavailable)?;

    tracing::info!("Starting analysis for {}", guard.path.display());
    let result = provider.analyze(instruction, &guard.path).await;

    match result {
        Ok(text) => {
            tracing::info!(
                "Analysis succeeded for {} ({} chars)",
                guard.path.display(),
                text.len()
            );
            Ok(text)
        }
        Err(e) => {
            tracing::error!("Analysis failed for {}: {e}", guard.path.display());
            // Whatever went wrong during submission surfaces as one kind.
            match e {
                ServiceError::AnalysisFailure(_) => Err(e),
                other => Err(ServiceError::AnalysisFailure(other.to_string())),
            }
        }
    }
}
