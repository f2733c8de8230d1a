use looper_transport::TrackId;

use crate::transport::EngineState;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport has been disposed")]
    Disposed,

    #[error("transport is not ready (state: {0:?})")]
    NotReady(EngineState),

    #[error("failed to initialize audio output: {source}")]
    InitializeFailed { source: anyhow::Error },

    #[error("failed to load '{locator}' for {track}: {reason}")]
    Load {
        track: TrackId,
        locator: String,
        reason: String,
    },
}
