use crate::domain::metric::Window;
use thiserror::Error;

/// Degradation taxonomy for a daily run. None of these abort the run; each one downgrades
/// the item it belongs to (a window, a metric, a prompt or a record).
#[derive(Debug, Error)]
pub enum SimsError {
    #[error("sample unavailable for {symbol} ({window})")]
    SampleUnavailable { symbol: String, window: Window },

    #[error("percent change undefined: reference price is zero")]
    DivisionUndefined,

    #[error("completion failed for {name}: {detail}")]
    CompletionFailure { name: String, detail: String },

    #[error("publish to {collection} failed: {detail}")]
    PublishFailure { collection: String, detail: String },
}
