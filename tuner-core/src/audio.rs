//! # Audio Capture Module
//!
//! The capture side of the detection loop. [`CaptureBackend`] is the blocking
//! read / re-prepare interface the loop drives; [`CpalCapture`] implements it
//! on top of CPAL (Cross-Platform Audio Library).
//!
//! ## Amplitude scale
//! Backends deliver samples on the signed 16-bit scale (full scale = 32768),
//! whatever the device's native format. The default noise floor assumes it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::TunerConfig;
use crate::error::CaptureError;

/// Scale factor from normalized float samples to the 16-bit range.
pub const I16_SCALE: f32 = 32768.0;

/// Blocks the callback may queue before the reader is considered overrun.
const QUEUED_BLOCKS: usize = 2;

/// How long one read waits for a block before reporting an empty read.
///
/// One block duration, so a stalled device still lets the loop see a cancel
/// within a block.
fn read_timeout(config: &TunerConfig) -> Duration {
    config.block_duration()
}

/// A source of fixed-size sample blocks.
pub trait CaptureBackend {
    /// Blocks until samples are available and copies up to `buf.len()` of
    /// them into `buf`, returning how many were written. Fewer than
    /// `buf.len()` is a partial read.
    ///
    /// [`CaptureError::Overrun`] asks the caller to [`prepare`] and retry;
    /// any other error is fatal.
    ///
    /// [`prepare`]: CaptureBackend::prepare
    fn read_block(&mut self, buf: &mut [f32]) -> Result<usize, CaptureError>;

    /// Recovers the device after an overrun.
    fn prepare(&mut self) -> Result<(), CaptureError>;
}

/// Flags shared between the audio callback and the reader.
#[derive(Default)]
struct CaptureFlags {
    /// Set by the callback when a finished block could not be queued.
    overrun: AtomicBool,
    /// Set by the reader to make the callback discard its partial block.
    reset: AtomicBool,
}

/// Capture from the default input device.
///
/// The audio callback assembles full blocks and queues them on a bounded
/// channel; `read_block` waits on that channel. The stream is paused when
/// the capture is dropped.
pub struct CpalCapture {
    stream: cpal::Stream,
    blocks: Receiver<Vec<f32>>,
    errors: Receiver<String>,
    flags: Arc<CaptureFlags>,
    read_timeout: Duration,
}

impl CpalCapture {
    /// Opens the default input device at the configured sample rate and starts streaming.
    pub fn open(config: &TunerConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        match device.name() {
            Ok(name) => info!("Using audio input device: {}", name),
            Err(e) => debug!("Input device has no name: {}", e),
        }

        let configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::UnsupportedConfig(e.to_string()))?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, config.sample_rate).ok_or_else(|| {
            CaptureError::UnsupportedConfig(format!(
                "no i16/f32 input format at {} Hz",
                config.sample_rate
            ))
        })?;

        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();
        let channels = stream_config.channels as usize;

        info!(
            "Capturing {} Hz, {} channel(s), {:?}, blocks of {} samples",
            config.sample_rate, channels, sample_format, config.block_size
        );

        let (block_tx, block_rx) = crossbeam_channel::bounded(QUEUED_BLOCKS);
        let (error_tx, error_rx) = crossbeam_channel::unbounded();
        let flags = Arc::new(CaptureFlags::default());

        let assembler = BlockAssembler {
            block_size: config.block_size,
            channels,
            pending: Vec::with_capacity(config.block_size * 2),
            sender: block_tx,
            flags: Arc::clone(&flags),
        };

        let stream = match sample_format {
            SampleFormat::I16 => {
                build_stream(&device, &stream_config, assembler, error_tx, |s: i16| s as f32)?
            }
            SampleFormat::F32 => build_stream(&device, &stream_config, assembler, error_tx, |s: f32| {
                (s * I16_SCALE).clamp(-I16_SCALE, I16_SCALE - 1.0)
            })?,
            other => {
                return Err(CaptureError::UnsupportedConfig(format!(
                    "sample format {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        Ok(Self {
            stream,
            blocks: block_rx,
            errors: error_rx,
            flags,
            read_timeout: read_timeout(config),
        })
    }
}

impl CaptureBackend for CpalCapture {
    fn read_block(&mut self, buf: &mut [f32]) -> Result<usize, CaptureError> {
        if let Ok(message) = self.errors.try_recv() {
            return Err(CaptureError::Stream(message));
        }
        if self.flags.overrun.load(Ordering::Acquire) {
            return Err(CaptureError::Overrun);
        }

        match self.blocks.recv_timeout(self.read_timeout) {
            Ok(block) => {
                let n = block.len().min(buf.len());
                buf[..n].copy_from_slice(&block[..n]);
                Ok(n)
            }
            // Reported as an empty read so the caller can check for cancellation.
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Disconnected),
        }
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        while self.blocks.try_recv().is_ok() {}
        self.flags.reset.store(true, Ordering::Release);
        self.flags.overrun.store(false, Ordering::Release);
        self.stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            error!("Error pausing capture stream: {}", e);
        }
    }
}

/// Callback-side state: turns interleaved device frames into mono blocks.
struct BlockAssembler {
    block_size: usize,
    channels: usize,
    pending: Vec<f32>,
    sender: Sender<Vec<f32>>,
    flags: Arc<CaptureFlags>,
}

impl BlockAssembler {
    /// Appends the first channel of every frame and queues each completed block.
    fn push<T: Copy>(&mut self, data: &[T], convert: impl Fn(T) -> f32) {
        if self.flags.reset.swap(false, Ordering::AcqRel) {
            self.pending.clear();
        }

        self.pending
            .extend(data.chunks(self.channels).map(|frame| convert(frame[0])));

        while self.pending.len() >= self.block_size {
            let block = self.pending[..self.block_size].to_vec();
            self.pending.drain(..self.block_size);

            match self.sender.try_send(block) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.flags.overrun.store(true, Ordering::Release),
                // Reader is gone; nothing left to deliver to.
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut assembler: BlockAssembler,
    errors: Sender<String>,
    convert: F,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let err_fn = move |err: cpal::StreamError| {
        error!("An error occurred on the audio stream: {}", err);
        let _ = errors.send(err.to_string());
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| assembler.push(data, &convert),
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))
}

/// Picks a configuration whose rate range contains `target_rate`.
///
/// Only `i16` and `f32` formats qualify. Mono is preferred, then the fewest
/// channels, then `i16` (no conversion loss).
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|c| c.channels() > 0)
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::I16))
}
