//! Background plot construction
//!
//! Plotting fills the index tables by deterministic derivation from the
//! committed public key:
//!
//! - pass 1: for every x in [0, 2^B), `A[f(x)] = x`
//! - pass 2: for every y where both `A[y]` and `A[flip(y)]` are occupied,
//!   `B[fb(x, x')] = (x, x')` with `x = A[y]`, `x' = A[flip(y)]`
//!
//! The work runs on a blocking worker task, one per index instance at a
//! time. Every `plot()` call gets its own completion channel; calls made
//! while a build is running join it. `stop_plot()` requests cooperative
//! cancellation at the next batch boundary and resolves separately from the
//! builds it interrupts. Partial writes are never rolled back: derivation
//! is deterministic, so re-plotting writes identical bytes.

use std::os::unix::fs::FileExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::index::{
    a_table_offset, b_table_offset, read_word, IndexInner, PlotIndex, A_SLOT_SIZE, B_SLOT_SIZE,
    OCCUPIED, PLOTTED_FLAG_OFFSET,
};
use crate::scalar::{domain_mask, f, fb, flip, value_to_bytes};

/// Keys processed between cancellation checkpoints
const PLOT_BATCH: u64 = 1 << 12;

/// How a plot build ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotOutcome {
    /// Every record slot was derived and written
    Completed,
    /// The build halted at a batch boundary after `stop_plot()`; the index
    /// is only partially usable
    Cancelled,
}

/// Worker termination message, fanned out to every waiter
#[derive(Debug, Clone)]
enum PlotTermination {
    Outcome(PlotOutcome),
    Failed(String),
}

/// Per-instance plot job state
#[derive(Debug, Default)]
pub(crate) struct PlotState {
    running: bool,
    plot_waiters: Vec<oneshot::Sender<PlotTermination>>,
    stop_waiters: Vec<oneshot::Sender<()>>,
}

/// Completion signal for one `plot()` call
pub struct PlotHandle {
    rx: oneshot::Receiver<PlotTermination>,
}

impl PlotHandle {
    /// Wait for the build this handle joined to terminate
    pub async fn wait(self) -> Result<PlotOutcome> {
        match self.rx.await {
            Ok(PlotTermination::Outcome(outcome)) => Ok(outcome),
            Ok(PlotTermination::Failed(message)) => Err(Error::PlotFailed(message)),
            Err(_) => Err(Error::PlotFailed("plot worker dropped its handle".into())),
        }
    }
}

/// Completion signal for one `stop_plot()` call
pub struct StopHandle {
    rx: oneshot::Receiver<()>,
}

impl StopHandle {
    /// Wait until all build activity at the time of the stop request has
    /// halted. Resolves immediately when nothing was running.
    pub async fn wait(self) -> Result<()> {
        self.rx
            .await
            .map_err(|_| Error::PlotFailed("plot worker dropped its handle".into()))
    }
}

impl PlotIndex {
    /// Begin building the index in the background, or join the build that
    /// is already running. Each call returns its own handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn plot(&self) -> PlotHandle {
        let (tx, rx) = oneshot::channel();

        let mut state = self.inner.plot.lock().unwrap();
        state.plot_waiters.push(tx);
        if !state.running {
            state.running = true;
            self.inner.cancel.store(false, Ordering::SeqCst);
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || run_plot(inner));
        } else {
            debug!(path = %self.inner.path.display(), "joining running plot");
        }

        PlotHandle { rx }
    }

    /// Request cooperative cancellation of all running build activity on
    /// this instance. The returned handle resolves once the worker has
    /// halted (immediately when idle); its outcome is separate from the
    /// outcomes of the builds it cancelled.
    pub fn stop_plot(&self) -> StopHandle {
        let (tx, rx) = oneshot::channel();

        let mut state = self.inner.plot.lock().unwrap();
        if state.running {
            self.inner.cancel.store(true, Ordering::SeqCst);
            state.stop_waiters.push(tx);
        } else {
            let _ = tx.send(());
        }

        StopHandle { rx }
    }
}

/// Blocking worker: builds both tables, then fans the termination out to
/// every waiter registered by the time it finishes.
fn run_plot(inner: Arc<IndexInner>) {
    info!(path = %inner.path.display(), bit_length = inner.bit_length, "plot started");

    let termination = match build_tables(&inner) {
        Ok(PlotOutcome::Completed) => {
            info!(path = %inner.path.display(), "plot completed");
            PlotTermination::Outcome(PlotOutcome::Completed)
        }
        Ok(PlotOutcome::Cancelled) => {
            info!(path = %inner.path.display(), "plot cancelled");
            PlotTermination::Outcome(PlotOutcome::Cancelled)
        }
        Err(e) => {
            warn!(path = %inner.path.display(), error = %e, "plot failed");
            PlotTermination::Failed(e.to_string())
        }
    };

    let mut state = inner.plot.lock().unwrap();
    state.running = false;
    for tx in state.plot_waiters.drain(..) {
        let _ = tx.send(termination.clone());
    }
    for tx in state.stop_waiters.drain(..) {
        let _ = tx.send(());
    }
}

fn build_tables(inner: &IndexInner) -> Result<PlotOutcome> {
    let bit_length = inner.bit_length;
    let capacity = 1u64 << bit_length;
    let pk_hash = inner.pubkey_hash;

    // Pass 1: A[f(x)] = x. Writes land direct-addressed, so they are
    // scattered; batching bounds memory and gives cancellation checkpoints.
    let mut next = 0u64;
    while next < capacity {
        if inner.cancel.load(Ordering::SeqCst) {
            return Ok(PlotOutcome::Cancelled);
        }
        let end = (next + PLOT_BATCH).min(capacity);
        for x in next..end {
            let y = f(x, bit_length, &pk_hash);
            let word = (x | OCCUPIED).to_le_bytes();
            inner
                .file
                .write_all_at(&word, a_table_offset() + y * A_SLOT_SIZE as u64)?;
        }
        next = end;
    }
    debug!(path = %inner.path.display(), "table A written");

    // Pass 2: stream table A in chunks alongside the mirrored flip-chunk.
    // flip() reflects [s, e) onto [flip(e-1), flip(s)], so both sides of
    // every pair come from two contiguous reads.
    let mask = domain_mask(bit_length);
    let mut next = 0u64;
    let mut chunk = vec![0u8; (PLOT_BATCH as usize) * A_SLOT_SIZE];
    let mut flip_chunk = vec![0u8; (PLOT_BATCH as usize) * A_SLOT_SIZE];
    while next < capacity {
        if inner.cancel.load(Ordering::SeqCst) {
            return Ok(PlotOutcome::Cancelled);
        }
        let end = (next + PLOT_BATCH).min(capacity);
        let len = ((end - next) as usize) * A_SLOT_SIZE;

        inner
            .file
            .read_exact_at(&mut chunk[..len], a_table_offset() + next * A_SLOT_SIZE as u64)?;
        inner.file.read_exact_at(
            &mut flip_chunk[..len],
            a_table_offset() + flip(end - 1, bit_length) * A_SLOT_SIZE as u64,
        )?;

        for y in next..end {
            let x_word = read_word(slot(&chunk, (y - next) as usize));
            // flip(y) sits mirrored within the flip chunk
            let xp_word = read_word(slot(&flip_chunk, (end - 1 - y) as usize));
            if x_word & OCCUPIED == 0 || xp_word & OCCUPIED == 0 {
                continue;
            }

            let x = x_word & !OCCUPIED;
            let x_prime = xp_word & !OCCUPIED;
            debug_assert_eq!(f(x, bit_length, &pk_hash), y & mask);

            let z = fb(x, x_prime, bit_length, &pk_hash);
            let mut record = [0u8; B_SLOT_SIZE];
            record[..A_SLOT_SIZE].copy_from_slice(&value_to_bytes(x | OCCUPIED));
            record[A_SLOT_SIZE..].copy_from_slice(&value_to_bytes(x_prime | OCCUPIED));
            inner
                .file
                .write_all_at(&record, b_table_offset(bit_length) + z * B_SLOT_SIZE as u64)?;
        }
        next = end;
    }
    debug!(path = %inner.path.display(), "table B written");

    inner.file.write_all_at(&[1u8], PLOTTED_FLAG_OFFSET)?;
    inner.file.sync_data()?;

    Ok(PlotOutcome::Completed)
}

fn slot(chunk: &[u8], index: usize) -> &[u8] {
    &chunk[index * A_SLOT_SIZE..(index + 1) * A_SLOT_SIZE]
}
