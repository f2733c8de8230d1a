//! Pure functions for clip edits, testable without a store or an engine.

use looper_transport::{AudioClip, ClipId, SourceTrim, TrackId};

/// The clip shifted to `new_start` (clamped to zero) with its duration kept.
pub fn moved(clip: &AudioClip, new_start: f64) -> AudioClip {
    let start = if new_start.is_finite() { new_start.max(0.0) } else { clip.start };
    let mut out = clip.clone();
    out.start = start;
    out.end = start + clip.duration();
    out
}

/// A copy of `source` under a new id, placed at `start` on `track` with the
/// same duration and source mapping.
pub fn placed_copy(source: &AudioClip, id: ClipId, track: TrackId, start: f64) -> AudioClip {
    let mut out = moved(source, start);
    out.id = id;
    out.track_id = track;
    out
}

/// Split at `at` into two clips whose source windows continue each other.
///
/// Returns `None` when either half would be shorter than `min_len`.
pub fn slice(
    clip: &AudioClip,
    at: f64,
    right_id: ClipId,
    min_len: f64,
) -> Option<(AudioClip, AudioClip)> {
    if !at.is_finite() || at < clip.start + min_len || at > clip.end - min_len {
        return None;
    }

    let local = at - clip.start;
    let window = clip.trim.duration;
    let phase = if window > 0.0 { local % window } else { 0.0 };

    let mut left = clip.clone();
    left.end = at;
    left.trim.duration = local.min(window);

    let mut right = clip.clone();
    right.id = right_id;
    right.start = at;
    right.trim = SourceTrim {
        offset: clip.trim.offset + phase,
        duration: window - phase,
    };

    Some((left, right))
}

/// Move the clip's start edge, revealing or hiding source at the front.
/// The start never precedes the beginning of the source.
pub fn trimmed_start(clip: &AudioClip, new_start: f64, min_len: f64) -> AudioClip {
    let lower = (clip.start - clip.trim.offset).max(0.0);
    let upper = clip.end - min_len;
    let start = if new_start.is_finite() && lower <= upper {
        new_start.clamp(lower, upper)
    } else {
        clip.start
    };

    let delta = start - clip.start;
    let mut out = clip.clone();
    out.start = start;
    out.trim = SourceTrim {
        offset: clip.trim.offset + delta,
        duration: (clip.trim.duration - delta).max(0.0),
    }
    .clamped(clip.source_total);
    out
}

/// Move the clip's end edge. The window grows with it up to the end of
/// the source when that is known.
pub fn trimmed_end(clip: &AudioClip, new_end: f64, min_len: f64) -> AudioClip {
    let lower = clip.start + min_len;
    let upper = clip
        .source_total
        .map_or(f64::INFINITY, |total| clip.start + (total - clip.trim.offset))
        .max(lower);
    let end = if new_end.is_finite() {
        new_end.clamp(lower, upper)
    } else {
        clip.end
    };

    let mut out = clip.clone();
    out.end = end;
    out.trim = SourceTrim {
        offset: clip.trim.offset,
        duration: end - clip.start,
    }
    .clamped(clip.source_total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_clip(start: f64, end: f64, offset: f64, total: Option<f64>) -> AudioClip {
        AudioClip {
            id: ClipId(1),
            track_id: TrackId(1),
            start,
            end,
            trim: SourceTrim {
                offset,
                duration: end - start,
            },
            source_total: total,
            gain: 1.0,
            muted: false,
        }
    }

    #[test]
    fn test_move_preserves_duration() {
        let clip = make_clip(2.0, 6.0, 0.0, None);
        let out = moved(&clip, 5.0);
        assert_eq!((out.start, out.end), (5.0, 9.0));
        assert_eq!(out.trim, clip.trim);
    }

    #[test]
    fn test_move_clamps_at_zero() {
        let clip = make_clip(2.0, 6.0, 0.0, None);
        let out = moved(&clip, -3.0);
        assert_eq!((out.start, out.end), (0.0, 4.0));
    }

    #[test]
    fn test_placed_copy_keeps_mapping() {
        let mut clip = make_clip(2.0, 6.0, 1.5, Some(10.0));
        clip.gain = 0.7;
        let copy = placed_copy(&clip, ClipId(9), TrackId(2), 8.0);
        assert_eq!(copy.id, ClipId(9));
        assert_eq!(copy.track_id, TrackId(2));
        assert_eq!((copy.start, copy.end), (8.0, 12.0));
        assert_eq!(copy.trim, clip.trim);
        assert_eq!(copy.gain, 0.7);
    }

    #[test]
    fn test_slice_windows_are_contiguous() {
        let clip = make_clip(2.0, 6.0, 1.0, Some(10.0));
        let (left, right) = slice(&clip, 3.0, ClipId(2), 0.1).expect("slice");

        assert_eq!((left.start, left.end), (2.0, 3.0));
        assert_eq!((right.start, right.end), (3.0, 6.0));
        assert_eq!(left.trim, SourceTrim { offset: 1.0, duration: 1.0 });
        assert_eq!(right.trim, SourceTrim { offset: 2.0, duration: 3.0 });
        assert_eq!(left.trim.end(), right.trim.offset);
        assert_eq!(right.id, ClipId(2));
    }

    #[test]
    fn test_slice_too_close_to_edge() {
        let clip = make_clip(2.0, 6.0, 0.0, None);
        assert!(slice(&clip, 2.05, ClipId(2), 0.1).is_none());
        assert!(slice(&clip, 6.0, ClipId(2), 0.1).is_none());
        assert!(slice(&clip, f64::NAN, ClipId(2), 0.1).is_none());
    }

    #[test]
    fn test_trim_start_moves_source_offset() {
        let clip = make_clip(2.0, 6.0, 1.0, Some(10.0));
        let out = trimmed_start(&clip, 3.0, 0.1);
        assert_eq!((out.start, out.end), (3.0, 6.0));
        assert_eq!(out.trim, SourceTrim { offset: 2.0, duration: 3.0 });
    }

    #[test]
    fn test_trim_start_stops_at_source_start() {
        let clip = make_clip(2.0, 6.0, 1.0, Some(10.0));
        let out = trimmed_start(&clip, 0.0, 0.1);
        assert_eq!(out.start, 1.0);
        assert_eq!(out.trim.offset, 0.0);
        assert_eq!(out.trim.duration, 5.0);
    }

    #[test]
    fn test_trim_start_keeps_min_length() {
        let clip = make_clip(2.0, 6.0, 0.0, None);
        let out = trimmed_start(&clip, 7.0, 0.25);
        assert_eq!(out.start, 5.75);
        assert_eq!(out.duration(), 0.25);
    }

    #[test]
    fn test_trim_end_bounded_by_source() {
        let clip = make_clip(2.0, 6.0, 1.0, Some(10.0));
        let out = trimmed_end(&clip, 20.0, 0.1);
        assert_eq!(out.end, 11.0);
        assert_eq!(out.trim, SourceTrim { offset: 1.0, duration: 9.0 });

        let out = trimmed_end(&clip, 1.0, 0.1);
        assert!((out.end - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_trim_end_unknown_source_is_open() {
        let clip = make_clip(2.0, 6.0, 0.0, None);
        let out = trimmed_end(&clip, 30.0, 0.1);
        assert_eq!(out.end, 30.0);
        assert_eq!(out.trim.duration, 28.0);
    }
}
