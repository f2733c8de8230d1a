use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use looper_decode::AudioArc;

use crate::element::MediaElement;

/// Playback state of one decoded source, shared between the control side
/// and the output callback. The callback only reads the PCM and touches
/// atomics.
pub struct Voice {
    audio: AudioArc,
    /// Playhead in frames of `audio`.
    position: AtomicU64,
    playing: AtomicBool,
    muted: AtomicBool,
    gain: AtomicU32,
    retired: AtomicBool,
}

impl Voice {
    pub fn new(audio: AudioArc) -> Arc<Self> {
        Arc::new(Self {
            audio,
            position: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            muted: AtomicBool::new(true),
            gain: AtomicU32::new(1.0f32.to_bits()),
            retired: AtomicBool::new(false),
        })
    }

    pub fn audio(&self) -> &AudioArc {
        &self.audio
    }

    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Acquire))
    }

    /// Set once the owning element is dropped; the output stream prunes it.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Add this voice into an interleaved buffer and advance the playhead,
    /// wrapping at the end of the source. Muted voices advance silently.
    pub fn render_add(&self, out: &mut [f32], channels: usize) {
        if !self.is_playing() || channels == 0 {
            return;
        }
        let frames = self.audio.frames() as u64;
        if frames == 0 {
            return;
        }

        let start = self.position.load(Ordering::Acquire);
        let gain = if self.is_muted() { 0.0 } else { self.gain() };
        let mut pos = start % frames;

        for frame in out.chunks_mut(channels) {
            if gain != 0.0 {
                for (ch, sample) in frame.iter_mut().enumerate() {
                    *sample += self.audio.sample(pos as usize, ch) * gain;
                }
            }
            pos += 1;
            if pos >= frames {
                pos = 0;
            }
        }

        // a seek from the control side wins over the advanced playhead
        let _ = self
            .position
            .compare_exchange(start, pos, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Clear `out` and mix every voice into it.
pub fn mix_voices(voices: &[Arc<Voice>], out: &mut [f32], channels: usize) {
    out.fill(0.0);
    for voice in voices {
        voice.render_add(out, channels);
    }
}

/// `MediaElement` over a voice registered with the output stream.
pub struct BufferElement {
    voice: Arc<Voice>,
}

impl BufferElement {
    pub fn new(voice: Arc<Voice>) -> Self {
        Self { voice }
    }

    pub fn voice(&self) -> &Arc<Voice> {
        &self.voice
    }
}

impl MediaElement for BufferElement {
    fn play(&mut self) {
        self.voice.playing.store(true, Ordering::Release);
    }

    fn pause(&mut self) {
        self.voice.playing.store(false, Ordering::Release);
    }

    fn is_paused(&self) -> bool {
        !self.voice.is_playing()
    }

    fn current_time(&self) -> f64 {
        self.voice.position_frames() as f64 / self.voice.audio.sample_rate() as f64
    }

    fn set_current_time(&mut self, seconds: f64) {
        let frames = self.voice.audio.frames() as u64;
        let target = if seconds.is_finite() {
            (seconds.max(0.0) * self.voice.audio.sample_rate() as f64) as u64
        } else {
            0
        };
        let target = if frames == 0 { 0 } else { target % frames };
        self.voice.position.store(target, Ordering::Release);
    }

    fn duration(&self) -> Option<f64> {
        if self.voice.audio.is_empty() {
            None
        } else {
            Some(self.voice.audio.duration_secs())
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.voice.muted.store(muted, Ordering::Release);
    }

    fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
        self.voice.gain.store(volume.to_bits(), Ordering::Release);
    }
}

impl Drop for BufferElement {
    fn drop(&mut self) {
        self.voice.playing.store(false, Ordering::Release);
        self.voice.retired.store(true, Ordering::Release);
    }
}
