//! Arrangement editing for the looper: the clip store, grid-snapped edits
//! with undo, conversion to the engine's beat-based clips and the session
//! facade that keeps a shared transport in step with the arrangement.

pub mod analyze;
pub mod arrangement;
pub mod clip_ops;
pub mod editor;
pub mod session;
pub mod store;
pub mod undo;

pub use analyze::{Analysis, analyze_sources};
pub use arrangement::{ClipSignature, compute_engine_clips};
pub use editor::{ArrangementEditor, EditorConfig};
pub use session::Session;
pub use store::ClipStore;
pub use undo::{Change, Command, CommandKind, Direction, UndoManager};

pub use looper_decode::{AudioCache, Peaks, PeaksCache};
pub use looper_engine::{DeviceLoader, EngineConfig, EngineError, SharedTransport, SourceLoader};
pub use looper_transport::{
    AudioClip, ClipId, ClipInput, EngineClip, SourceTrim, TempoClock, TrackId, TrackInfo,
};
