use std::collections::VecDeque;

use looper_transport::{AudioClip, TrackInfo};

use crate::store::ClipStore;

pub const DEFAULT_MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    AddTrack,
    AddClip,
    Move,
    Paste,
    Duplicate,
    Delete,
    DeleteTrack,
    Slice,
    Trim,
    Gain,
    Mute,
    TrackMix,
}

/// One record's state before and after an edit. `None` means the record
/// did not exist on that side.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Track {
        before: Option<TrackInfo>,
        after: Option<TrackInfo>,
    },
    Clip {
        before: Option<AudioClip>,
        after: Option<AudioClip>,
    },
}

impl Change {
    pub fn clip(before: Option<AudioClip>, after: Option<AudioClip>) -> Self {
        Change::Clip { before, after }
    }

    pub fn track(before: Option<TrackInfo>, after: Option<TrackInfo>) -> Self {
        Change::Track { before, after }
    }
}

/// A data-only edit: enough state to apply it in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub label: String,
    pub changes: Vec<Change>,
}

impl Command {
    pub fn new(kind: CommandKind, label: impl Into<String>, changes: Vec<Change>) -> Self {
        Self {
            kind,
            label: label.into(),
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

/// Apply a command to the store. Changes are replayed in order for redo
/// and in reverse for undo; a change whose target is missing is skipped.
///
/// Returns the number of changes applied.
pub fn apply(store: &mut ClipStore, command: &Command, direction: Direction) -> usize {
    let mut applied = 0;
    let mut apply_one = |change: &Change| {
        let ok = match change {
            Change::Track { before, after } => {
                let (from, to) = orient(before, after, direction);
                apply_track(store, from, to)
            }
            Change::Clip { before, after } => {
                let (from, to) = orient(before, after, direction);
                apply_clip(store, from, to)
            }
        };
        if ok {
            applied += 1;
        } else {
            log::warn!("'{}' ({direction:?}): target no longer exists, skipped", command.label);
        }
    };

    match direction {
        Direction::Redo => command.changes.iter().for_each(&mut apply_one),
        Direction::Undo => command.changes.iter().rev().for_each(&mut apply_one),
    }
    applied
}

fn orient<'a, T>(
    before: &'a Option<T>,
    after: &'a Option<T>,
    direction: Direction,
) -> (Option<&'a T>, Option<&'a T>) {
    match direction {
        Direction::Redo => (before.as_ref(), after.as_ref()),
        Direction::Undo => (after.as_ref(), before.as_ref()),
    }
}

fn apply_track(store: &mut ClipStore, from: Option<&TrackInfo>, to: Option<&TrackInfo>) -> bool {
    match (from, to) {
        (Some(from), None) => store.remove_track(from.id).is_some(),
        (Some(from), Some(to)) => {
            if store.track(from.id).is_none() {
                return false;
            }
            store.put_track(to.clone());
            true
        }
        (None, Some(to)) => {
            store.put_track(to.clone());
            true
        }
        (None, None) => true,
    }
}

fn apply_clip(store: &mut ClipStore, from: Option<&AudioClip>, to: Option<&AudioClip>) -> bool {
    match (from, to) {
        (Some(from), None) => store.remove_clip(from.id).is_some(),
        (Some(from), Some(to)) => {
            if store.clip(from.id).is_none() {
                return false;
            }
            store.put_clip(to.clone())
        }
        (None, Some(to)) => store.put_clip(to.clone()),
        (None, None) => true,
    }
}

/// Linear undo history with redo. Pushing a new command drops anything
/// that was undone.
#[derive(Debug, Clone)]
pub struct UndoManager {
    undo: VecDeque<Command>,
    redo: Vec<Command>,
    max_history: usize,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl UndoManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn push(&mut self, command: Command) {
        if command.is_empty() {
            return;
        }
        self.redo.clear();
        self.undo.push_back(command);
        while self.undo.len() > self.max_history {
            self.undo.pop_front();
        }
    }

    pub fn undo(&mut self, store: &mut ClipStore) -> Option<&Command> {
        let command = self.undo.pop_back()?;
        apply(store, &command, Direction::Undo);
        log::debug!("undo '{}'", command.label);
        self.redo.push(command);
        self.redo.last()
    }

    pub fn redo(&mut self, store: &mut ClipStore) -> Option<&Command> {
        let command = self.redo.pop()?;
        apply(store, &command, Direction::Redo);
        log::debug!("redo '{}'", command.label);
        self.undo.push_back(command);
        self.undo.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo.back().map(|c| c.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|c| c.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
