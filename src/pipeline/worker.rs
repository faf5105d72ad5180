//! Decode worker
//!
//! Drains the receiver channel through the [`Decoder`] and the
//! [`LineComposer`], in arrival order.
//!
//! # Shutdown
//!
//! | Cause                    | Behavior                                    |
//! |--------------------------|---------------------------------------------|
//! | channel disconnected     | flush pending line, return stats            |
//! | `ReceiverEvent::Failed`  | flush pending line, return `Transport` error|
//! | running flag cleared     | decode queued chunks, flush, return stats   |

use crate::decoder::{Decoded, Decoder};
use crate::emitter::{LineComposer, LineSink};
use crate::error::{Result, TriceError};
use crate::pipeline::receiver::ReceiverEvent;
use crate::types::StampWidth;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long the worker waits for bytes before re-checking the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Counters reported when the pipeline stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Bytes fed to the framer
    pub bytes: u64,
    /// Records decoded
    pub records: u64,
    /// Framing errors (resynchronizations)
    pub framing_errors: u64,
    /// Lines handed to the sink
    pub lines: u64,
}

/// Device stamp column printed in front of a line
pub fn target_stamp_column(stamp: StampWidth, timestamp: u32) -> String {
    match stamp {
        StampWidth::None => format!("time:{:8}", ""),
        StampWidth::Bits16 | StampWidth::Bits32 => format!("time:{:8x}", timestamp),
    }
}

/// Consumer side of the decode pipeline
pub struct DecodeWorker<S: LineSink> {
    decoder: Decoder,
    composer: LineComposer<S>,
    events: Receiver<ReceiverEvent>,
    running: Arc<AtomicBool>,
    target_stamp: bool,
}

impl<S: LineSink> DecodeWorker<S> {
    /// Create a worker
    pub fn new(
        decoder: Decoder,
        composer: LineComposer<S>,
        events: Receiver<ReceiverEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            decoder,
            composer,
            events,
            running,
            target_stamp: false,
        }
    }

    /// Prefix each new line with the device stamp column
    pub fn with_target_stamp(mut self, enabled: bool) -> Self {
        self.target_stamp = enabled;
        self
    }

    /// Current counters
    pub fn stats(&self) -> PipelineStats {
        let framer = self.decoder.stats();
        PipelineStats {
            bytes: framer.bytes,
            records: framer.records,
            framing_errors: framer.framing_errors,
            lines: self.composer.lines(),
        }
    }

    /// Access the composer (and through it the sink)
    pub fn composer(&self) -> &LineComposer<S> {
        &self.composer
    }

    /// Run until the input ends, fails or the running flag clears
    pub fn run(&mut self) -> Result<PipelineStats> {
        tracing::info!("Decode worker started");

        let outcome = self.receive_loop();
        let flushed = self.composer.flush();

        let stats = self.stats();
        tracing::info!(
            "Decode worker stopped: {} bytes, {} records, {} framing errors, {} lines",
            stats.bytes,
            stats.records,
            stats.framing_errors,
            stats.lines
        );

        if let Err(e) = &outcome {
            tracing::error!("Decoding aborted: {}", e);
        }
        outcome?;
        flushed?;
        Ok(stats)
    }

    fn receive_loop(&mut self) -> Result<()> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                tracing::debug!("Stop requested, draining queued input");
                return self.drain();
            }
            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.handle(event)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Decode everything already queued without waiting for more
    fn drain(&mut self) -> Result<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle(event)?,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn handle(&mut self, event: ReceiverEvent) -> Result<()> {
        match event {
            ReceiverEvent::Bytes(bytes) => self.consume(&bytes),
            ReceiverEvent::Failed(message) => Err(TriceError::Transport(message)),
        }
    }

    fn consume(&mut self, bytes: &[u8]) -> Result<()> {
        self.decoder.push(bytes);
        while let Some(next) = self.decoder.next_decoded() {
            match next {
                Ok(decoded) => self.emit(&decoded)?,
                Err(e) => tracing::debug!("{}", e),
            }
        }
        Ok(())
    }

    fn emit(&mut self, decoded: &Decoded) -> Result<()> {
        if self.target_stamp && self.composer.is_line_start() {
            let column = target_stamp_column(decoded.record.stamp, decoded.record.timestamp);
            self.composer.write(&column)?;
        }
        self.composer.write(&decoded.text)
    }
}
