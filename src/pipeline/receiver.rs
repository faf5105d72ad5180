//! Receiver thread
//!
//! Owns the physical input (file, stdin, TCP stream) and forwards raw byte
//! chunks in arrival order. The channel is bounded, so a slow decoder blocks
//! the receiver instead of growing an unbounded backlog.

use crossbeam_channel::Sender;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Messages from the receiver thread to the decode worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// Raw bytes, exactly as read
    Bytes(Vec<u8>),
    /// The source failed; no more events follow
    Failed(String),
}

/// Reads a byte source into the pipeline channel
pub struct ByteReceiver<R: Read> {
    source: R,
    chunk_size: usize,
    tx: Sender<ReceiverEvent>,
    running: Arc<AtomicBool>,
}

impl<R: Read + Send + 'static> ByteReceiver<R> {
    /// Create a receiver. A zero `chunk_size` is raised to one byte.
    pub fn new(
        source: R,
        chunk_size: usize,
        tx: Sender<ReceiverEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            tx,
            running,
        }
    }

    /// Run [`run`](Self::run) on a named thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<u64>> {
        std::thread::Builder::new()
            .name("trice-receiver".to_string())
            .spawn(move || self.run())
    }

    /// Read until end of input, a read error, a closed channel or a cleared
    /// running flag. Returns the number of bytes forwarded.
    ///
    /// Dropping the sender at the end is what tells the worker that the
    /// input is exhausted.
    pub fn run(mut self) -> u64 {
        tracing::info!("Receiver started (chunk size {})", self.chunk_size);
        let mut buf = vec![0u8; self.chunk_size];
        let mut forwarded = 0u64;

        while self.running.load(Ordering::SeqCst) {
            match self.source.read(&mut buf) {
                Ok(0) => {
                    tracing::info!("Input closed after {} bytes", forwarded);
                    break;
                }
                Ok(n) => {
                    if self.tx.send(ReceiverEvent::Bytes(buf[..n].to_vec())).is_err() {
                        tracing::debug!("Decode worker gone, receiver exits");
                        break;
                    }
                    forwarded += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // Read timeouts on sockets let the loop observe the running flag
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => {
                    tracing::error!("Input failed: {}", e);
                    let _ = self.tx.send(ReceiverEvent::Failed(e.to_string()));
                    break;
                }
            }
        }

        tracing::info!("Receiver stopped");
        forwarded
    }
}
