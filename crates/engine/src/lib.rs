//! Playback side of the looper: the transport state machine, per-track
//! players that keep media elements aligned to it, and a cpal-backed
//! element implementation.

pub mod config;
pub mod device;
pub mod element;
pub mod error;
pub mod output;
pub mod player;
pub mod shared;
pub mod sync;
pub mod transport;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use device::DeviceLoader;
pub use element::{MediaElement, SourceLoader};
pub use error::EngineError;
pub use output::OutputStream;
pub use player::{Cue, LoadState, MixState, PlayerClip, TrackPlayer, cue_at};
pub use shared::SharedTransport;
pub use sync::{ClipOverride, SyncCoordinator, any_solo, is_explicit_seek, resolve_mix};
pub use transport::{EngineState, TickCallback, TickSubscription, Transport, TransportSnapshot};
pub use voice::{BufferElement, Voice, mix_voices};
