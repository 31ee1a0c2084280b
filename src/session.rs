//! Acquisition session: configure, stream, calibrate, store, publish.
//!
//! A session owns the board, the calibration state and the sink for its whole
//! lifetime and runs strictly sequentially on the calling thread. The only
//! blocking point is the read of the next streaming frame.
//!
//! Any error ends the session. Before returning, the session always tries to
//! stop the stream (if it was started) and always closes the sink; the first
//! error encountered is the one reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::calibration::{normalized_vector, Calibrator, Reading};
use crate::config::Mode;
use crate::errors::Result;
use crate::evm::Evm;
use crate::publish::{format_readings, Publisher};
use crate::sink::{utc_now, SampleRow, SampleSink};
use crate::stream::{decode_stream_frame, FrameErrorPolicy, RawSample};

/// Counters reported when a session ends cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub flagged_frames: u64,
    pub rows: u64,
    pub normalized_cycles: u64,
    pub published: u64,
}

/// What happened in one decode cycle, for live display.
#[derive(Debug)]
pub struct CycleReport<'a> {
    pub time_utc: f64,
    pub samples: &'a [RawSample],
    pub readings: &'a [Reading],
}

type Observer = Box<dyn FnMut(&CycleReport<'_>)>;

pub struct Session<S: SampleSink> {
    evm: Evm,
    sink: S,
    mode: Mode,
    frame_errors: FrameErrorPolicy,
    publisher: Option<Publisher>,
    stop: Arc<AtomicBool>,
    frame_limit: Option<u64>,
    observer: Option<Observer>,
}

impl<S: SampleSink> Session<S> {
    pub fn new(evm: Evm, sink: S, mode: Mode) -> Self {
        Self {
            evm,
            sink,
            mode,
            frame_errors: FrameErrorPolicy::default(),
            publisher: None,
            stop: Arc::new(AtomicBool::new(false)),
            frame_limit: None,
            observer: None,
        }
    }

    pub fn frame_errors(mut self, policy: FrameErrorPolicy) -> Self {
        self.frame_errors = policy;
        self
    }

    pub fn publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Share a flag that ends the session before the next frame read.
    pub fn stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// End the session after this many streaming frames.
    pub fn frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn observer(mut self, observer: impl FnMut(&CycleReport<'_>) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Run to completion. The sink is handed back so callers can inspect it.
    pub fn run(mut self) -> (Result<SessionSummary>, S) {
        let mut summary = SessionSummary::default();
        let acquired = self.acquire(&mut summary);
        let cleaned = self.shutdown();

        let result = match (acquired, cleaned) {
            (Ok(()), Ok(())) => Ok(summary),
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!("Cleanup after failed session also failed: {cleanup}");
                Err(e)
            }
        };
        (result, self.sink)
    }

    fn acquire(&mut self, summary: &mut SessionSummary) -> Result<()> {
        self.evm.reset_link()?;
        let identity = self.evm.identify()?;
        info!(
            "EVM manufacturer {:#06x}, device {:#06x}",
            identity.manufacturer_id, identity.device_id
        );

        self.mode.profile()?.apply(&mut self.evm)?;
        self.evm.start_stream()?;
        info!("Beginning logging ({:?} mode)", self.mode);

        let stream_channels = self.mode.stream_channels();
        let mut calibrator = Calibrator::new(self.mode.live_channels());

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested");
                return Ok(());
            }
            if self.frame_limit.is_some_and(|limit| summary.frames >= limit) {
                info!("Frame limit reached");
                return Ok(());
            }

            let buffer = self.evm.read_stream_frame()?;
            let time_utc = utc_now();
            let frame = decode_stream_frame(&buffer, stream_channels);
            summary.frames += 1;
            if frame.is_flagged() {
                summary.flagged_frames += 1;
                self.frame_errors.check(&frame)?;
            }

            let live = &frame.samples[..calibrator.len()];
            let readings = calibrator.observe_all(live);

            if live.iter().any(|s| s.is_valid()) {
                self.sink.append(&SampleRow {
                    time_utc,
                    values: frame.samples.iter().map(|s| s.value()).collect(),
                })?;
                summary.rows += 1;
            }

            if let Some(percentages) = normalized_vector(&readings) {
                summary.normalized_cycles += 1;
                if let Some(publisher) = &self.publisher {
                    publisher.publish(format_readings(&percentages));
                    summary.published += 1;
                }
            }

            if let Some(observer) = self.observer.as_mut() {
                observer(&CycleReport {
                    time_utc,
                    samples: &frame.samples,
                    readings: &readings,
                });
            }
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        info!("Cleaning up...");
        let stopped = if self.evm.is_streaming() {
            self.evm.stop_stream()
        } else {
            Ok(())
        };
        if let Err(e) = &stopped {
            warn!("Failed to stop stream: {e}");
        }
        let closed = self.sink.close();
        stopped.and(closed)
    }
}
