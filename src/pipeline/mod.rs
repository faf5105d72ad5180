//! Run-time decode pipeline
//!
//! # Architecture
//!
//! ```text
//! [source: Read] ──► ByteReceiver ──bounded──► DecodeWorker ──► LineSink
//!                    (own thread)   channel    Decoder + LineComposer
//! ```
//!
//! The receiver owns the input and only moves bytes. The worker runs on the
//! calling thread and does all decoding, so records come out in exactly the
//! order their bytes arrived. Both sides share one running flag; a
//! [`StopHandle`] clears it (Ctrl-C in the CLI).

pub mod receiver;
pub mod worker;

pub use receiver::{ByteReceiver, ReceiverEvent};
pub use worker::{target_stamp_column, DecodeWorker, PipelineStats};

use crate::decoder::Decoder;
use crate::emitter::{LineComposer, LineSink};
use crate::error::{Result, ResultExt};
use crossbeam_channel::bounded;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Channel and read sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Queued chunks before the receiver blocks
    pub channel_capacity: usize,
    /// Maximum bytes per read
    pub chunk_size: usize,
    /// Print the device stamp column at line starts
    pub target_stamp: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            chunk_size: 4096,
            target_stamp: false,
        }
    }
}

/// Clears the shared running flag
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Ask both pipeline threads to stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether stop has not been requested yet
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Receiver thread plus decode worker over one byte source
pub struct DecodePipeline {
    options: PipelineOptions,
    running: Arc<AtomicBool>,
}

impl DecodePipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle for stopping a running pipeline from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Decode `source` until it ends, fails or a stop is requested.
    ///
    /// Blocks the calling thread. A receiver stuck in a blocking read after
    /// a stop request is detached rather than joined.
    pub fn run<R, S>(
        &self,
        source: R,
        decoder: Decoder,
        composer: LineComposer<S>,
    ) -> Result<PipelineStats>
    where
        R: Read + Send + 'static,
        S: LineSink,
    {
        let (tx, rx) = bounded(self.options.channel_capacity.max(1));
        let receiver = ByteReceiver::new(
            source,
            self.options.chunk_size,
            tx,
            Arc::clone(&self.running),
        )
        .spawn()
        .context("spawning receiver thread")?;

        let mut worker = DecodeWorker::new(decoder, composer, rx, Arc::clone(&self.running))
            .with_target_stamp(self.options.target_stamp);
        let result = worker.run();
        if result.is_err() {
            self.running.store(false, Ordering::SeqCst);
        }
        // Dropping the worker closes the channel, which unblocks a sending receiver
        drop(worker);

        if receiver.is_finished() || self.running.load(Ordering::SeqCst) {
            match receiver.join() {
                Ok(bytes) => tracing::debug!("Receiver forwarded {} bytes", bytes),
                Err(_) => tracing::error!("Receiver thread panicked"),
            }
        } else {
            tracing::debug!("Receiver still blocked in read, detaching");
        }
        result
    }
}
