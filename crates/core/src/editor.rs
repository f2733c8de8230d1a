use std::collections::BTreeSet;

use looper_transport::{
    AudioClip, ClipId, ClipInput, MIN_CLIP_BEATS, MIN_CLIP_SECONDS, TempoClock, TrackId, TrackInfo,
};
use serde::{Deserialize, Serialize};

use crate::clip_ops;
use crate::store::ClipStore;
use crate::undo::{Change, Command, CommandKind, DEFAULT_MAX_HISTORY, Direction, UndoManager, apply};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Moves smaller than this (seconds) are ignored.
    pub move_epsilon: f64,
    pub min_clip_beats: f64,
    pub min_clip_seconds: f64,
    pub max_history: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            move_epsilon: 0.01,
            min_clip_beats: MIN_CLIP_BEATS,
            min_clip_seconds: MIN_CLIP_SECONDS,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Arrangement edits over a `ClipStore`, with grid snapping, selection,
/// a one-clip clipboard and undo.
///
/// Every mutation is expressed as a `Command`, applied through the same
/// dispatcher undo and redo use, and recorded. Unknown ids are logged
/// no-ops.
#[derive(Debug, Clone)]
pub struct ArrangementEditor {
    store: ClipStore,
    clock: TempoClock,
    config: EditorConfig,
    selection: BTreeSet<ClipId>,
    clipboard: Option<ClipId>,
    history: UndoManager,
}

impl ArrangementEditor {
    pub fn new(clock: TempoClock, config: EditorConfig) -> Self {
        let history = UndoManager::new(config.max_history);
        Self {
            store: ClipStore::new(),
            clock,
            config,
            selection: BTreeSet::new(),
            clipboard: None,
            history,
        }
    }

    pub fn store(&self) -> &ClipStore {
        &self.store
    }

    pub fn clock(&self) -> &TempoClock {
        &self.clock
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.clock.set_bpm(bpm);
    }

    pub fn history(&self) -> &UndoManager {
        &self.history
    }

    pub fn snap_to_grid(&self, seconds: f64) -> f64 {
        self.clock.snap_to_grid(seconds)
    }

    fn min_clip_len(&self) -> f64 {
        self.clock
            .beats_to_seconds(self.config.min_clip_beats)
            .max(self.config.min_clip_seconds)
    }

    fn commit(
        &mut self,
        kind: CommandKind,
        label: impl Into<String>,
        changes: Vec<Change>,
    ) -> bool {
        let command = Command::new(kind, label, changes);
        if command.is_empty() {
            return false;
        }
        apply(&mut self.store, &command, Direction::Redo);
        log::debug!("{}", command.label);
        self.history.push(command);
        true
    }

    fn existing_clip(&self, id: ClipId, op: &str) -> Option<AudioClip> {
        let clip = self.store.clip(id).cloned();
        if clip.is_none() {
            log::warn!("{op}: unknown {id}");
        }
        clip
    }

    fn existing_track(&self, id: TrackId, op: &str) -> Option<TrackInfo> {
        let track = self.store.track(id).cloned();
        if track.is_none() {
            log::warn!("{op}: unknown {id}");
        }
        track
    }

    // -- tracks --

    /// Add a track. An id already in use is replaced by a fresh one.
    pub fn add_track(&mut self, mut track: TrackInfo) -> TrackId {
        if self.store.track(track.id).is_some() {
            track.id = self.store.allocate_track_id();
        }
        let id = track.id;
        let label = format!("Add track {}", track.source_url);
        let change = Change::track(None, Some(track));
        self.commit(CommandKind::AddTrack, label, vec![change]);
        id
    }

    /// Remove a track and every clip on it.
    pub fn delete_track(&mut self, id: TrackId) -> bool {
        let Some(track) = self.existing_track(id, "delete_track") else {
            return false;
        };
        let clips: Vec<AudioClip> = self.store.clips_on_track(id).cloned().collect();
        let mut changes: Vec<Change> = clips
            .iter()
            .map(|clip| Change::clip(Some(clip.clone()), None))
            .collect();
        changes.push(Change::track(Some(track), None));

        for clip in &clips {
            self.forget_clip(clip.id);
        }
        self.commit(CommandKind::DeleteTrack, "Delete track", changes)
    }

    pub fn set_track_muted(&mut self, id: TrackId, muted: bool) -> bool {
        self.update_track(id, "set_track_muted", |t| t.muted = muted)
    }

    pub fn set_track_solo(&mut self, id: TrackId, solo: bool) -> bool {
        self.update_track(id, "set_track_solo", |t| t.solo = solo)
    }

    pub fn set_track_gain(&mut self, id: TrackId, gain: f32) -> bool {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 1.0 };
        self.update_track(id, "set_track_gain", |t| t.gain = gain)
    }

    /// Record the analyzed length of a track's source. Not an edit, so it
    /// is not recorded in the history.
    pub fn set_track_duration(&mut self, id: TrackId, seconds: f64) -> bool {
        if !seconds.is_finite() || seconds <= 0.0 {
            log::warn!("set_track_duration: ignoring invalid duration {seconds}");
            return false;
        }
        let Some(mut track) = self.existing_track(id, "set_track_duration") else {
            return false;
        };
        if track.nominal_duration == Some(seconds) {
            return false;
        }
        track.nominal_duration = Some(seconds);
        self.store.put_track(track);
        true
    }

    fn update_track(&mut self, id: TrackId, op: &str, edit: impl FnOnce(&mut TrackInfo)) -> bool {
        let Some(before) = self.existing_track(id, op) else {
            return false;
        };
        let mut after = before.clone();
        edit(&mut after);
        if after == before {
            return false;
        }
        let change = Change::track(Some(before), Some(after));
        self.commit(CommandKind::TrackMix, "Track settings", vec![change])
    }

    // -- clips --

    /// Add an explicit clip from host input.
    pub fn add_clip(&mut self, input: &ClipInput) -> Option<ClipId> {
        self.existing_track(input.track_id, "add_clip")?;
        let id = self.store.allocate_clip_id();
        let clip = input.resolve(id, &self.clock);
        let change = Change::clip(None, Some(clip));
        self.commit(CommandKind::AddClip, "Add clip", vec![change])
            .then_some(id)
    }

    pub fn move_clip(&mut self, id: ClipId, new_start: f64) -> bool {
        let Some(clip) = self.existing_clip(id, "move_clip") else {
            return false;
        };
        if !new_start.is_finite() || (new_start - clip.start).abs() < self.config.move_epsilon {
            return false;
        }
        let after = clip_ops::moved(&clip, new_start);
        if after == clip {
            return false;
        }
        let change = Change::clip(Some(clip), Some(after));
        self.commit(CommandKind::Move, "Move clip", vec![change])
    }

    pub fn move_clip_to_track(&mut self, id: ClipId, track: TrackId, new_start: f64) -> bool {
        let Some(clip) = self.existing_clip(id, "move_clip_to_track") else {
            return false;
        };
        if self.existing_track(track, "move_clip_to_track").is_none() {
            return false;
        }
        if track == clip.track_id {
            return self.move_clip(id, new_start);
        }
        let mut after = clip_ops::moved(&clip, new_start);
        after.track_id = track;
        let change = Change::clip(Some(clip), Some(after));
        self.commit(CommandKind::Move, "Move clip to track", vec![change])
    }

    pub fn copy(&mut self, id: ClipId) -> bool {
        if self.existing_clip(id, "copy").is_none() {
            return false;
        }
        self.clipboard = Some(id);
        true
    }

    pub fn clipboard(&self) -> Option<ClipId> {
        self.clipboard
    }

    /// Paste the clipboard clip at the snapped `at`, on `track` or on the
    /// source clip's own track.
    pub fn paste(&mut self, at: f64, track: Option<TrackId>) -> Option<ClipId> {
        let Some(source_id) = self.clipboard else {
            log::debug!("paste: clipboard is empty");
            return None;
        };
        let source = self.existing_clip(source_id, "paste")?;
        let track = track.unwrap_or(source.track_id);
        self.existing_track(track, "paste")?;

        let id = self.store.allocate_clip_id();
        let start = self.snap_to_grid(at.max(0.0));
        let clip = clip_ops::placed_copy(&source, id, track, start);
        let change = Change::clip(None, Some(clip));
        self.commit(CommandKind::Paste, "Paste clip", vec![change])
            .then_some(id)
    }

    /// Copy of the clip right after it, at the snapped end, on its track.
    pub fn duplicate(&mut self, id: ClipId) -> Option<ClipId> {
        let change = self.duplicate_change(id)?;
        let new_id = match &change {
            Change::Clip { after: Some(clip), .. } => clip.id,
            _ => return None,
        };
        self.commit(CommandKind::Duplicate, "Duplicate clip", vec![change])
            .then_some(new_id)
    }

    fn duplicate_change(&mut self, id: ClipId) -> Option<Change> {
        let source = self.existing_clip(id, "duplicate")?;
        let new_id = self.store.allocate_clip_id();
        let start = self.snap_to_grid(source.end);
        let clip = clip_ops::placed_copy(&source, new_id, source.track_id, start);
        Some(Change::clip(None, Some(clip)))
    }

    pub fn delete_clip(&mut self, id: ClipId) -> bool {
        let Some(clip) = self.existing_clip(id, "delete_clip") else {
            return false;
        };
        self.forget_clip(id);
        let change = Change::clip(Some(clip), None);
        self.commit(CommandKind::Delete, "Delete clip", vec![change])
    }

    /// Split a clip at the snapped `at`. Returns the id of the right half.
    pub fn slice_clip(&mut self, id: ClipId, at: f64) -> Option<ClipId> {
        let clip = self.existing_clip(id, "slice_clip")?;
        let at = self.snap_to_grid(at);
        let right_id = self.store.allocate_clip_id();
        let Some((left, right)) = clip_ops::slice(&clip, at, right_id, self.min_clip_len()) else {
            log::debug!("slice_clip: {at:.3}s is outside {id}");
            return None;
        };
        self.commit(
            CommandKind::Slice,
            "Slice clip",
            vec![
                Change::clip(Some(clip), Some(left)),
                Change::clip(None, Some(right)),
            ],
        )
        .then_some(right_id)
    }

    pub fn trim_clip_start(&mut self, id: ClipId, new_start: f64) -> bool {
        let Some(clip) = self.existing_clip(id, "trim_clip_start") else {
            return false;
        };
        let after = clip_ops::trimmed_start(&clip, new_start, self.min_clip_len());
        if after == clip {
            return false;
        }
        let change = Change::clip(Some(clip), Some(after));
        self.commit(CommandKind::Trim, "Trim clip start", vec![change])
    }

    pub fn trim_clip_end(&mut self, id: ClipId, new_end: f64) -> bool {
        let Some(clip) = self.existing_clip(id, "trim_clip_end") else {
            return false;
        };
        let after = clip_ops::trimmed_end(&clip, new_end, self.min_clip_len());
        if after == clip {
            return false;
        }
        let change = Change::clip(Some(clip), Some(after));
        self.commit(CommandKind::Trim, "Trim clip end", vec![change])
    }

    pub fn set_clip_gain(&mut self, id: ClipId, gain: f32) -> bool {
        let Some(clip) = self.existing_clip(id, "set_clip_gain") else {
            return false;
        };
        let gain = if gain.is_finite() { gain.max(0.0) } else { 1.0 };
        if clip.gain == gain {
            return false;
        }
        let after = AudioClip { gain, ..clip.clone() };
        let change = Change::clip(Some(clip), Some(after));
        self.commit(CommandKind::Gain, "Clip gain", vec![change])
    }

    pub fn set_clip_muted(&mut self, id: ClipId, muted: bool) -> bool {
        let Some(clip) = self.existing_clip(id, "set_clip_muted") else {
            return false;
        };
        if clip.muted == muted {
            return false;
        }
        let after = AudioClip { muted, ..clip.clone() };
        let change = Change::clip(Some(clip), Some(after));
        self.commit(CommandKind::Mute, "Clip mute", vec![change])
    }

    // -- selection --

    /// Plain click replaces the selection; modifier click toggles.
    pub fn click(&mut self, id: ClipId, modifier: bool) {
        if modifier {
            self.toggle_selection(id);
        } else {
            self.select(id);
        }
    }

    pub fn select(&mut self, id: ClipId) {
        if self.existing_clip(id, "select").is_none() {
            return;
        }
        self.selection.clear();
        self.selection.insert(id);
    }

    pub fn toggle_selection(&mut self, id: ClipId) {
        if self.existing_clip(id, "toggle_selection").is_none() {
            return;
        }
        if !self.selection.remove(&id) {
            self.selection.insert(id);
        }
    }

    pub fn deselect(&mut self, id: ClipId) -> bool {
        self.selection.remove(&id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> impl Iterator<Item = ClipId> + '_ {
        self.selection.iter().copied()
    }

    pub fn is_selected(&self, id: ClipId) -> bool {
        self.selection.contains(&id)
    }

    /// Put one of the selected clips on the clipboard.
    pub fn copy_selection(&mut self) -> bool {
        match self.selection.first().copied() {
            Some(id) => self.copy(id),
            None => false,
        }
    }

    /// Paste and select the new clip.
    pub fn paste_selection(&mut self, at: f64, track: Option<TrackId>) -> Option<ClipId> {
        let id = self.paste(at, track)?;
        self.selection.clear();
        self.selection.insert(id);
        Some(id)
    }

    /// Duplicate every selected clip as one undoable step and select the
    /// copies.
    pub fn duplicate_selection(&mut self) -> Vec<ClipId> {
        let ids: Vec<ClipId> = self.selection.iter().copied().collect();
        let changes: Vec<Change> = ids
            .into_iter()
            .filter_map(|id| self.duplicate_change(id))
            .collect();
        let new_ids: Vec<ClipId> = changes
            .iter()
            .filter_map(|c| match c {
                Change::Clip { after: Some(clip), .. } => Some(clip.id),
                _ => None,
            })
            .collect();

        let label = format!("Duplicate {} clips", new_ids.len());
        if !self.commit(CommandKind::Duplicate, label, changes) {
            return Vec::new();
        }
        self.selection = new_ids.iter().copied().collect();
        new_ids
    }

    /// Delete every selected clip as one undoable step.
    pub fn delete_selection(&mut self) -> usize {
        let clips: Vec<AudioClip> = self
            .selection
            .iter()
            .filter_map(|id| self.store.clip(*id).cloned())
            .collect();
        for clip in &clips {
            self.forget_clip(clip.id);
        }
        self.selection.clear();

        let count = clips.len();
        let changes = clips.into_iter().map(|c| Change::clip(Some(c), None)).collect();
        if self.commit(CommandKind::Delete, format!("Delete {count} clips"), changes) {
            count
        } else {
            0
        }
    }

    fn forget_clip(&mut self, id: ClipId) {
        self.selection.remove(&id);
        if self.clipboard == Some(id) {
            self.clipboard = None;
        }
    }

    // -- history --

    pub fn undo(&mut self) -> Option<String> {
        let label = self.history.undo(&mut self.store)?.label.clone();
        self.prune_references();
        Some(label)
    }

    pub fn redo(&mut self) -> Option<String> {
        let label = self.history.redo(&mut self.store)?.label.clone();
        self.prune_references();
        Some(label)
    }

    fn prune_references(&mut self) {
        let store = &self.store;
        self.selection.retain(|id| store.clip(*id).is_some());
        if self.clipboard.is_some_and(|id| store.clip(id).is_none()) {
            self.clipboard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_transport::SourceTrim;

    fn editor() -> (ArrangementEditor, TrackId) {
        let mut editor = ArrangementEditor::new(TempoClock::new(120.0), EditorConfig::default());
        let track = editor.add_track(TrackInfo::new(TrackId(1), "drums.wav"));
        (editor, track)
    }

    fn add(editor: &mut ArrangementEditor, track: TrackId, start: f64, end: f64) -> ClipId {
        editor
            .add_clip(&ClipInput {
                track_id: track,
                start_time: start,
                end_time: end,
                source_trim_start: 0.0,
                source_trim_end: None,
                full_source_duration: Some(30.0),
            })
            .expect("clip added")
    }

    fn span(editor: &ArrangementEditor, id: ClipId) -> (f64, f64) {
        let clip = editor.store().clip(id).expect("clip");
        (clip.start, clip.end)
    }

    #[test]
    fn test_move_then_undo() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 2.0, 6.0);
        let undo_depth = editor.history().len();

        assert!(editor.move_clip(c1, 5.0));
        assert_eq!(span(&editor, c1), (5.0, 9.0));
        assert_eq!(editor.history().len(), undo_depth + 1);

        assert_eq!(editor.undo().as_deref(), Some("Move clip"));
        assert_eq!(span(&editor, c1), (2.0, 6.0));
    }

    #[test]
    fn test_tiny_move_is_ignored() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 2.0, 6.0);
        let depth = editor.history().len();
        assert!(!editor.move_clip(c1, 2.005));
        assert_eq!(editor.history().len(), depth);
    }

    #[test]
    fn test_move_unknown_clip_is_noop() {
        let (mut editor, _) = editor();
        assert!(!editor.move_clip(ClipId(42), 1.0));
    }

    #[test]
    fn test_move_to_other_track() {
        let (mut editor, track) = editor();
        let bass = editor.add_track(TrackInfo::new(TrackId(2), "bass.wav"));
        let c1 = add(&mut editor, track, 2.0, 6.0);
        assert!(editor.move_clip_to_track(c1, bass, 4.0));
        let clip = editor.store().clip(c1).expect("clip");
        assert_eq!(clip.track_id, bass);
        assert_eq!((clip.start, clip.end), (4.0, 8.0));
    }

    #[test]
    fn test_duplicate_lands_on_snapped_end() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 1.0, 3.2);
        let copy = editor.duplicate(c1).expect("duplicate");

        let source = editor.store().clip(c1).cloned().expect("source");
        let dup = editor.store().clip(copy).cloned().expect("copy");
        assert_ne!(copy, c1);
        assert_eq!(dup.start, 3.0);
        assert!((dup.duration() - source.duration()).abs() < 1e-12);
        assert_eq!(dup.trim, source.trim);
        assert_eq!(dup.track_id, track);
    }

    #[test]
    fn test_paste_snaps_and_targets_track() {
        let (mut editor, track) = editor();
        let other = editor.add_track(TrackInfo::new(TrackId(2), "keys.wav"));
        let c1 = add(&mut editor, track, 0.0, 2.0);

        assert!(editor.paste(4.0, None).is_none());
        assert!(editor.copy(c1));
        let pasted = editor.paste(4.26, Some(other)).expect("paste");
        let clip = editor.store().clip(pasted).expect("clip");
        assert_eq!(clip.track_id, other);
        assert_eq!((clip.start, clip.end), (4.5, 6.5));
    }

    #[test]
    fn test_delete_track_cascades() {
        let (mut editor, track) = editor();
        let keep = editor.add_track(TrackInfo::new(TrackId(2), "keys.wav"));
        let c1 = add(&mut editor, track, 0.0, 2.0);
        let c2 = add(&mut editor, track, 4.0, 6.0);
        let c3 = add(&mut editor, keep, 0.0, 2.0);
        editor.click(c1, false);
        editor.click(c3, true);
        editor.copy(c2);

        assert!(editor.delete_track(track));
        assert!(editor.store().track(track).is_none());
        assert_eq!(editor.store().clip_count(), 1);
        assert_eq!(editor.selection().collect::<Vec<_>>(), vec![c3]);
        assert_eq!(editor.clipboard(), None);

        editor.undo();
        assert_eq!(editor.store().clip_count(), 3);
        assert!(editor.store().track(track).is_some());
    }

    #[test]
    fn test_click_replaces_and_modifier_toggles() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 0.0, 1.0);
        let c2 = add(&mut editor, track, 2.0, 3.0);

        editor.click(c1, false);
        editor.click(c2, true);
        assert!(editor.is_selected(c1) && editor.is_selected(c2));
        editor.click(c1, true);
        assert!(!editor.is_selected(c1));
        editor.click(c1, false);
        assert_eq!(editor.selection().collect::<Vec<_>>(), vec![c1]);
        assert!(editor.deselect(c1));
        assert!(!editor.deselect(c1));
    }

    #[test]
    fn test_selection_actions_are_one_command() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 0.0, 1.0);
        let c2 = add(&mut editor, track, 2.0, 3.0);
        editor.click(c1, false);
        editor.click(c2, true);

        let before = editor.store().clone();
        let copies = editor.duplicate_selection();
        assert_eq!(copies.len(), 2);
        assert_eq!(editor.store().clip_count(), 4);
        assert!(copies.iter().all(|id| editor.is_selected(*id)));

        assert_eq!(editor.delete_selection(), 2);
        assert_eq!(editor.store().clip_count(), 2);

        editor.undo();
        editor.undo();
        assert_eq!(editor.store(), &before);
    }

    #[test]
    fn test_slice_and_undo() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 2.0, 6.0);
        let right = editor.slice_clip(c1, 3.1).expect("slice");

        assert_eq!(span(&editor, c1), (2.0, 3.0));
        assert_eq!(span(&editor, right), (3.0, 6.0));
        let r = editor.store().clip(right).expect("right");
        assert_eq!(r.trim, SourceTrim { offset: 1.0, duration: 3.0 });

        editor.undo();
        assert_eq!(span(&editor, c1), (2.0, 6.0));
        assert!(editor.store().clip(right).is_none());
    }

    #[test]
    fn test_trims_respect_minimum_length() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 2.0, 6.0);
        assert!(editor.trim_clip_start(c1, 10.0));
        // a quarter beat at 120 bpm
        assert_eq!(span(&editor, c1), (5.875, 6.0));
        assert!(editor.trim_clip_end(c1, 7.0));
        assert_eq!(span(&editor, c1), (5.875, 7.0));
    }

    #[test]
    fn test_n_edits_then_n_undos_restore_store() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 2.0, 6.0);
        let c2 = add(&mut editor, track, 8.0, 10.0);
        let before = editor.store().clone();

        let mut edits = 0;
        edits += editor.move_clip(c1, 3.0) as usize;
        edits += editor.set_clip_gain(c2, 0.5) as usize;
        edits += editor.duplicate(c2).is_some() as usize;
        edits += editor.slice_clip(c1, 4.0).is_some() as usize;
        edits += editor.trim_clip_end(c2, 9.0) as usize;
        edits += editor.set_clip_muted(c1, true) as usize;
        edits += editor.set_track_solo(track, true) as usize;
        edits += editor.delete_clip(c2) as usize;
        assert_eq!(edits, 8);

        for _ in 0..edits {
            assert!(editor.undo().is_some());
        }
        assert_eq!(editor.store(), &before);
    }

    #[test]
    fn test_redo_replays_and_push_truncates() {
        let (mut editor, track) = editor();
        let c1 = add(&mut editor, track, 2.0, 6.0);
        editor.move_clip(c1, 5.0);
        editor.undo();
        assert_eq!(editor.redo().as_deref(), Some("Move clip"));
        assert_eq!(span(&editor, c1), (5.0, 9.0));

        editor.undo();
        editor.move_clip(c1, 7.0);
        assert!(editor.redo().is_none());
    }

    #[test]
    fn test_add_track_with_taken_id_gets_fresh_one() {
        let (mut editor, track) = editor();
        let second = editor.add_track(TrackInfo::new(track, "other.wav"));
        assert_ne!(second, track);
        assert_eq!(editor.store().track_count(), 2);
    }
}
