//! Medilens — medical image analysis web service.
//!
//! Receives an uploaded medical image, normalizes it to a bounded PNG,
//! submits it to a hosted multimodal model with a fixed analysis
//! instruction, and returns the textual report. Normalized images are
//! transient: every analysis request deletes its file before returning.

pub mod credentials;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod web;

pub use credentials::{ApiKey, CredentialStore};
pub use error::{ServiceError, ServiceResult};
pub use normalize::{normalize_upload, NormalizedImage, MAX_DIMENSION};
pub use pipeline::run_analysis;
pub use provider::{AnalysisProvider, GeminiFactory, ProviderFactory};
