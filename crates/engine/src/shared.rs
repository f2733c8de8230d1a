use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::EngineConfig;
use crate::element::SourceLoader;
use crate::error::EngineError;
use crate::transport::Transport;

struct SharedState<L: SourceLoader> {
    transport: Transport<L>,
    users: usize,
    /// Bumped each time the last user releases.
    session: u64,
}

/// Process-wide transport shared by several mount points.
///
/// `acquire` initializes on first use, `release` disposes when the last
/// user lets go, and the next `acquire` starts a fresh transport.
pub struct SharedTransport<L: SourceLoader> {
    inner: Arc<Mutex<SharedState<L>>>,
}

impl<L: SourceLoader> Clone for SharedTransport<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: SourceLoader> SharedTransport<L> {
    pub fn new(loader: L, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState {
                transport: Transport::new(loader, config),
                users: 0,
                session: 0,
            })),
        }
    }

    pub async fn acquire(&self) -> Result<(), EngineError> {
        let mut state = self.inner.lock().await;
        if state.transport.is_disposed() {
            let loader = state.transport.loader().clone();
            let config = state.transport.config().clone();
            state.transport = Transport::with_loader(loader, config);
            log::debug!("starting a new transport session");
        }
        state.transport.initialize().await?;
        state.users += 1;
        log::debug!("transport acquired ({} users)", state.users);
        Ok(())
    }

    pub async fn release(&self) {
        let mut state = self.inner.lock().await;
        if state.users == 0 {
            log::warn!("release without a matching acquire");
            return;
        }
        state.users -= 1;
        log::debug!("transport released ({} users)", state.users);
        if state.users == 0 {
            state.transport.dispose();
            state.session += 1;
        }
    }

    pub async fn users(&self) -> usize {
        self.inner.lock().await.users
    }

    /// Run `f` with exclusive access to the transport.
    pub async fn with<R>(&self, f: impl FnOnce(&mut Transport<L>) -> R) -> R {
        let mut state = self.inner.lock().await;
        f(&mut state.transport)
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        self.inner.lock().await.transport.start().await
    }

    pub async fn wait_for_loads(&self) {
        self.inner.lock().await.transport.wait_for_loads().await
    }

    /// Poll the transport every `tick_interval` until the current session
    /// is disposed.
    pub fn spawn_tick_loop(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let (session, period) = {
                let state = inner.lock().await;
                (state.session, state.transport.config().tick_interval())
            };
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let mut state = inner.lock().await;
                if state.session != session || state.transport.is_disposed() {
                    log::debug!("tick loop for session {session} stopped");
                    break;
                }
                state.transport.poll();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLoader;
    use crate::transport::EngineState;
    use looper_transport::{ClipId, EngineClip, TrackId};
    use std::time::Duration;

    fn shared() -> (SharedTransport<ScriptedLoader>, ScriptedLoader) {
        let loader = ScriptedLoader::new();
        (
            SharedTransport::new(loader.clone(), EngineConfig::default()),
            loader,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposes_on_last_release_only() {
        let (shared, loader) = shared();
        shared.acquire().await.expect("first");
        shared.acquire().await.expect("second");
        assert_eq!(shared.users().await, 2);
        assert_eq!(loader.script().prepare_calls, 1);

        shared.release().await;
        assert_eq!(shared.with(|t| t.state()).await, EngineState::Ready);

        shared.release().await;
        assert_eq!(shared.with(|t| t.state()).await, EngineState::Disposed);
        assert_eq!(loader.script().releases, 1);

        shared.release().await;
        assert_eq!(shared.users().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_after_dispose_starts_fresh() {
        let (shared, loader) = shared();
        shared.acquire().await.expect("acquire");
        shared.release().await;
        shared.acquire().await.expect("reacquire");
        assert_eq!(shared.with(|t| t.state()).await, EngineState::Ready);
        assert_eq!(loader.script().prepare_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_acquire_does_not_count() {
        let (shared, loader) = shared();
        loader.script().failing_prepares = 1;
        assert!(shared.acquire().await.is_err());
        assert_eq!(shared.users().await, 0);
        shared.acquire().await.expect("retry");
        assert_eq!(shared.users().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_loop_drives_position() {
        let (shared, _) = shared();
        shared.acquire().await.expect("acquire");
        shared
            .with(|t| {
                t.set_clips(
                    vec![EngineClip {
                        clip_id: ClipId(1),
                        track_id: TrackId(1),
                        source_url: "a.wav".into(),
                        offset_beats: 0.0,
                        duration_beats: 32.0,
                        trim: None,
                        gain: 1.0,
                        muted: false,
                        solo: false,
                    }],
                    8.0,
                )
            })
            .await;
        shared.start().await.expect("start");
        let ticks = shared.spawn_tick_loop();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let position = shared.with(|t| t.position()).await;
        assert!(position > 0.4 && position <= 0.5, "position {position}");

        shared.release().await;
        tokio::time::timeout(Duration::from_secs(1), ticks)
            .await
            .expect("tick loop ends after dispose")
            .expect("tick loop task");
    }
}
