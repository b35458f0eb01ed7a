//! Drives `Tuner::run` with scripted capture backends.

use std::collections::VecDeque;
use std::f64::consts::PI;

use tuner_core::audio::CaptureBackend;
use tuner_core::config::OverrunPolicy;
use tuner_core::output::TerminalSink;
use tuner_core::{CancelToken, CaptureError, Detection, Tuner, TunerConfig, TunerError};

enum Read {
    Block(Vec<f32>),
    Short(usize),
    Overrun,
    Gone,
}

struct ScriptedCapture {
    reads: VecDeque<Read>,
    cancel: CancelToken,
    prepares: usize,
}

impl ScriptedCapture {
    fn new(reads: Vec<Read>, cancel: CancelToken) -> Self {
        Self {
            reads: reads.into(),
            cancel,
            prepares: 0,
        }
    }
}

impl CaptureBackend for ScriptedCapture {
    fn read_block(&mut self, buf: &mut [f32]) -> Result<usize, CaptureError> {
        let read = self.reads.pop_front().unwrap_or(Read::Short(0));
        if self.reads.is_empty() {
            self.cancel.cancel();
        }
        match read {
            Read::Block(samples) => {
                buf.copy_from_slice(&samples);
                Ok(samples.len())
            }
            Read::Short(n) => Ok(n),
            Read::Overrun => Err(CaptureError::Overrun),
            Read::Gone => Err(CaptureError::Disconnected),
        }
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        self.prepares += 1;
        Ok(())
    }
}

fn config() -> TunerConfig {
    TunerConfig {
        overrun: OverrunPolicy {
            max_retries: 3,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        },
        ..TunerConfig::default()
    }
}

fn sine(freq: f64, config: &TunerConfig) -> Vec<f32> {
    (0..config.block_size)
        .map(|i| (8000.0 * (2.0 * PI * freq * i as f64 / config.sample_rate as f64).sin()) as f32)
        .collect()
}

#[test]
fn one_overrun_then_block_gives_exactly_one_detection() {
    let config = config();
    let block = sine(440.0, &config);
    let mut tuner = Tuner::new(config).unwrap();
    let mut capture = ScriptedCapture::new(vec![Read::Overrun, Read::Block(block)], tuner.cancel_token());

    let mut detections: Vec<Detection> = Vec::new();
    tuner.run(&mut capture, &mut detections).unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].note.name, "A4");
    assert_eq!(capture.prepares, 1);
}

#[test]
fn short_reads_are_never_analyzed() {
    let config = config();
    let block = sine(220.0, &config);
    let mut tuner = Tuner::new(config).unwrap();
    let mut capture = ScriptedCapture::new(
        vec![Read::Short(100), Read::Short(0), Read::Block(block), Read::Short(8191)],
        tuner.cancel_token(),
    );

    let mut detections: Vec<Detection> = Vec::new();
    tuner.run(&mut capture, &mut detections).unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].note.name, "A3");
}

#[test]
fn disconnect_ends_the_loop_with_an_error() {
    let config = config();
    let mut tuner = Tuner::new(config).unwrap();
    let mut capture = ScriptedCapture::new(vec![Read::Gone, Read::Short(0)], tuner.cancel_token());

    let mut detections: Vec<Detection> = Vec::new();
    let err = tuner.run(&mut capture, &mut detections).unwrap_err();

    assert!(matches!(err, TunerError::Capture(CaptureError::Disconnected)));
    assert!(detections.is_empty());
}

#[test]
fn endless_overruns_are_reported() {
    let config = config();
    let mut tuner = Tuner::new(config).unwrap();
    let reads = (0..10).map(|_| Read::Overrun).collect();
    let mut capture = ScriptedCapture::new(reads, tuner.cancel_token());

    let mut detections: Vec<Detection> = Vec::new();
    let err = tuner.run(&mut capture, &mut detections).unwrap_err();

    assert!(matches!(err, TunerError::OverrunLimit { attempts: 4 }));
    assert_eq!(capture.prepares, 3);
}

#[test]
fn terminal_sink_shows_one_line_per_pass() {
    let config = config();
    let blocks = vec![
        Read::Block(sine(440.0, &config)),
        Read::Block(sine(220.0, &config)),
    ];
    let mut tuner = Tuner::new(config).unwrap();
    let mut capture = ScriptedCapture::new(blocks, tuner.cancel_token());

    let mut sink = TerminalSink::new(Vec::new());
    tuner.run(&mut capture, &mut sink).unwrap();
    let out = String::from_utf8(sink.finish().unwrap()).unwrap();

    let lines: Vec<&str> = out.trim_end().split('\r').filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("A4 "), "{:?}", lines);
    assert!(lines[1].starts_with("A3 "), "{:?}", lines);
}
