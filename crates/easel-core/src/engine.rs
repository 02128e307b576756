//! Seam to the external generation engine.

use async_trait::async_trait;

use crate::domain::TaskKind;
use crate::domain::params::TaskParams;

/// Output of a successful generation operation.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Base64-encoded output images.
    pub images: Vec<String>,
    /// Engine-reported metadata (timings, actual seeds, etc.).
    pub info: serde_json::Value,
}

/// The external image-generation engine, invoked once per running task.
///
/// The scheduler treats this as opaque: the call happens outside the
/// scheduler's state lock, may take arbitrarily long, and reports either an
/// output or an error message that is folded into the task's failure result.
/// Checkpoint/VAE selection is the engine's concern — the scheduler only
/// forwards the parameters it admitted.
#[async_trait]
pub trait GenerationEngine: Send + Sync + 'static {
    async fn generate(
        &self,
        kind: TaskKind,
        params: &TaskParams,
    ) -> Result<GenerationOutput, String>;
}
