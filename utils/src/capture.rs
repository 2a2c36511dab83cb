//! Microphone capture on a dedicated thread.
//!
//! cpal streams are not `Send`, so the stream lives on its own thread for
//! its whole lifetime. The callback mixes interleaved frames down to mono
//! and ships them over a bounded channel; the consumer resamples and frames
//! them for the codec at its own pace.

use crate::audio;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::JoinHandle;
use std::time::Duration;

/// Fixed cpal buffer size requested for the input stream.
pub const CAPTURE_CHUNK_SIZE: usize = 1024;

const CHUNK_CHANNEL_CAPACITY: usize = 64;

pub struct MicCapture {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl MicCapture {
    /// Open the named input device (or the default) and start capturing.
    /// Returns the handle plus the channel of mono f32 chunks at the
    /// device's native sample rate.
    pub fn start(device_name: Option<String>) -> anyhow::Result<(Self, Receiver<Vec<f32>>)> {
        let (chunk_tx, chunk_rx) = sync_channel::<Vec<f32>>(CHUNK_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = sync_channel::<anyhow::Result<u32>>(1);
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture(device_name, chunk_tx, ready_tx, thread_shutdown))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("capture thread exited before reporting readiness"))??;

        Ok((
            Self {
                shutdown,
                handle: Some(handle),
                sample_rate,
            },
            chunk_rx,
        ))
    }

    /// Native sample rate of the captured chunks.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop the stream and join the capture thread. Safe to call twice.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("mic capture thread panicked");
            }
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    device_name: Option<String>,
    chunk_tx: SyncSender<Vec<f32>>,
    ready_tx: SyncSender<anyhow::Result<u32>>,
    shutdown: Arc<AtomicBool>,
) {
    let stream = match build_stream(device_name, chunk_tx) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
}

fn build_stream(
    device_name: Option<String>,
    chunk_tx: SyncSender<Vec<f32>>,
) -> anyhow::Result<(cpal::Stream, u32)> {
    let input = crate::device::get_or_default_input(device_name)?;
    tracing::debug!(device = ?input.name(), "opening input device");

    let default_config = input.default_input_config()?;
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(CAPTURE_CHUNK_SIZE as u32)),
    };
    let channel_count = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mono = audio::mix_to_mono(data, channel_count);
        // Dropping a chunk under backpressure is preferable to blocking the
        // audio callback.
        if chunk_tx.try_send(mono).is_err() {
            tracing::trace!("capture channel full, dropping chunk");
        }
    };

    let stream = input.build_input_stream(
        &config,
        input_data_fn,
        move |err| tracing::error!(error = %err, "input stream error"),
        None,
    )?;
    stream.play()?;

    Ok((stream, sample_rate))
}
