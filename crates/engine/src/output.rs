use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;

use basedrop::{Collector, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

use crate::voice::{Voice, mix_voices};

type SharedVoices = Shared<Vec<Arc<Voice>>>;

/// Frames mixed per inner pass of the callback.
const MIX_BLOCK_FRAMES: usize = 1024;

/// The default output device, running on its own thread.
///
/// The cpal stream lives and dies on that thread; the control side only
/// pushes new voice lists through a ring buffer.
pub struct OutputStream {
    voices_tx: rtrb::Producer<SharedVoices>,
    voices: Vec<Arc<Voice>>,
    collector: Collector,
    sample_rate: u32,
    channels: u16,
    shutdown_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl OutputStream {
    pub fn open() -> anyhow::Result<Self> {
        let collector = Collector::new();
        let handle = collector.handle();

        let (voices_tx, voices_rx) = rtrb::RingBuffer::<SharedVoices>::new(16);
        let initial = Shared::new(&handle, Vec::new());

        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<(u32, u16)>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("looper-output".into())
            .spawn(move || match start_stream(initial, voices_rx) {
                Ok((stream, sample_rate, channels)) => {
                    let _ = ready_tx.send(Ok((sample_rate, channels)));
                    // parked until shutdown or until the handle is dropped
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("output thread exited before the stream started"))??;

        log::info!("output stream running at {sample_rate} Hz, {channels} ch");

        Ok(Self {
            voices_tx,
            voices: Vec::new(),
            collector,
            sample_rate,
            channels,
            shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn register(&mut self, voice: Arc<Voice>) {
        self.voices.retain(|v| !v.is_retired());
        self.voices.push(voice);
        self.publish();
    }

    /// Drop retired voices from the mix.
    pub fn prune(&mut self) {
        let before = self.voices.len();
        self.voices.retain(|v| !v.is_retired());
        if self.voices.len() != before {
            self.publish();
        }
    }

    fn publish(&mut self) {
        let list = Shared::new(&self.collector.handle(), self.voices.clone());
        if self.voices_tx.push(list).is_err() {
            log::warn!("voice list queue full; update dropped");
        }
        self.collector.collect();
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("output thread panicked");
            }
        }
        self.collector.collect();
        log::info!("output stream closed");
    }
}

fn start_stream(
    initial: SharedVoices,
    voices_rx: rtrb::Consumer<SharedVoices>,
) -> anyhow::Result<(cpal::Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let config = device.default_output_config()?;
    let sample_format = config.sample_format();
    let config: cpal::StreamConfig = config.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, initial, voices_rx)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, initial, voices_rx)?,
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    stream.play()?;

    Ok((stream, config.sample_rate.0, config.channels))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    initial: SharedVoices,
    mut voices_rx: rtrb::Consumer<SharedVoices>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut current = initial;
    let mut scratch = vec![0.0f32; MIX_BLOCK_FRAMES * channels];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            while let Ok(voices) = voices_rx.pop() {
                current = voices;
            }

            for block in data.chunks_mut(scratch.len()) {
                let mix = &mut scratch[..block.len()];
                mix_voices(&current, mix, channels);
                for (out, sample) in block.iter_mut().zip(mix.iter()) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
            }
        },
        |err| log::error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
