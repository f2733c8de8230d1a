use looper_engine::{EngineConfig, EngineError, SharedTransport, SourceLoader, TransportSnapshot};
use looper_transport::{EngineClip, TempoClock};

use crate::analyze::Analysis;
use crate::arrangement::{ClipSignature, compute_engine_clips};
use crate::editor::{ArrangementEditor, EditorConfig};

/// Host-facing facade: arrangement edits on one side, the shared transport
/// on the other.
///
/// Every mutating call recomputes the engine clip list and forwards it to
/// the transport only when its signature changed. The transport is only
/// touched while the session is open.
pub struct Session<L: SourceLoader> {
    editor: ArrangementEditor,
    transport: SharedTransport<L>,
    min_bars: f64,
    signature: Option<ClipSignature>,
    open: bool,
}

impl<L: SourceLoader> Session<L> {
    pub fn new(loader: L, config: EngineConfig) -> Self {
        let transport = SharedTransport::new(loader, config.clone());
        Self::with_transport(transport, &config)
    }

    /// A session on a transport shared with other mount points.
    pub fn with_transport(transport: SharedTransport<L>, config: &EngineConfig) -> Self {
        let editor_config = EditorConfig {
            max_history: config.undo_history,
            ..EditorConfig::default()
        };
        Self {
            editor: ArrangementEditor::new(TempoClock::default(), editor_config),
            transport,
            min_bars: config.min_bars,
            signature: None,
            open: false,
        }
    }

    pub fn editor(&self) -> &ArrangementEditor {
        &self.editor
    }

    pub fn transport(&self) -> &SharedTransport<L> {
        &self.transport
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn min_bars(&self) -> f64 {
        self.min_bars
    }

    /// Acquire the transport and push tempo and clips to it.
    pub async fn open(&mut self) -> Result<(), EngineError> {
        if self.open {
            return Ok(());
        }
        self.transport.acquire().await?;
        self.open = true;
        self.signature = None;

        let bpm = self.editor.clock().bpm();
        self.transport.with(|t| t.set_bpm(bpm)).await;
        self.sync().await;
        log::info!("session opened at {bpm:.2} bpm");
        Ok(())
    }

    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.signature = None;
        self.transport.release().await;
        log::info!("session closed");
    }

    pub fn engine_clips(&self) -> Vec<EngineClip> {
        let store = self.editor.store();
        compute_engine_clips(store.tracks(), store.clips(), self.editor.clock())
    }

    /// Forward the engine clip list if it changed since the last push.
    /// Returns whether the transport was updated.
    pub async fn sync(&mut self) -> bool {
        if !self.open {
            return false;
        }
        let clips = self.engine_clips();
        let signature = ClipSignature::of(&clips);
        if self.signature == Some(signature) {
            return false;
        }
        self.signature = Some(signature);

        let min_bars = self.min_bars;
        self.transport
            .with(move |t| t.set_clips(clips, min_bars))
            .await;
        true
    }

    /// Run an edit, then sync the transport.
    pub async fn edit<R>(&mut self, f: impl FnOnce(&mut ArrangementEditor) -> R) -> R {
        let result = f(&mut self.editor);
        self.sync().await;
        result
    }

    pub async fn undo(&mut self) -> Option<String> {
        let label = self.editor.undo();
        if label.is_some() {
            self.sync().await;
        }
        label
    }

    pub async fn redo(&mut self) -> Option<String> {
        let label = self.editor.redo();
        if label.is_some() {
            self.sync().await;
        }
        label
    }

    /// Fill in analyzed source lengths. Returns how many tracks changed.
    pub async fn apply_analysis(&mut self, analysis: &Analysis) -> usize {
        let updates: Vec<_> = self
            .editor
            .store()
            .tracks()
            .filter_map(|t| Some((t.id, analysis.duration(&t.source_url)?)))
            .collect();
        let changed = updates
            .into_iter()
            .filter(|(id, seconds)| self.editor.set_track_duration(*id, *seconds))
            .count();
        if changed > 0 {
            self.sync().await;
        }
        changed
    }

    pub async fn set_bpm(&mut self, bpm: f64) {
        self.editor.set_bpm(bpm);
        if self.open {
            let bpm = self.editor.clock().bpm();
            self.transport.with(|t| t.set_bpm(bpm)).await;
        }
        self.sync().await;
    }

    pub async fn set_min_bars(&mut self, bars: f64) {
        if !bars.is_finite() || bars <= 0.0 {
            log::warn!("ignoring invalid min bars {bars}");
            return;
        }
        self.min_bars = bars;
        self.signature = None;
        self.sync().await;
    }

    pub async fn play(&mut self) -> Result<(), EngineError> {
        if !self.open {
            self.open().await?;
        }
        self.transport.start().await
    }

    pub async fn pause(&self) {
        if !self.open {
            return;
        }
        self.transport.with(|t| t.pause()).await;
    }

    pub async fn seek(&self, seconds: f64) {
        if !self.open {
            return;
        }
        self.transport.with(|t| t.seek(seconds)).await;
    }

    pub async fn snapshot(&self) -> TransportSnapshot {
        self.transport.with(|t| t.snapshot()).await
    }
}
