//! `BlockingSource` — the base pattern for input adapters (spec §4.E).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::buffer::typed::Sample;
use crate::node::Source;
use crate::queue::Queue;

/// How a `BlockingSource` pulls data into its `Source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    /// `start` spawns a dedicated thread calling `next()` in a loop.
    Parallel,
    /// `next()` is registered on the Queue's idle list; new input is pulled
    /// only once downstream has drained (back-pressure by idle-polling).
    IdleDriven,
}

/// Implemented by concrete input adapters (WAV readers, device sources).
/// `next` pulls and sends one block; returning `false` signals end-of-stream.
pub trait Next: Send + Sync {
    fn next(&self) -> bool;
}

/// Drives a `Next` implementation per [`DriveMode`], managing the
/// active/inactive lifecycle and, on EOS, the optional `Queue::stop` signal.
///
/// `original_source/src/node.cc`'s `BlockingSource::start()` never actually
/// sets its active flag before spawning the parallel worker, so the worker's
/// loop condition is always false there — a defect, not a documented
/// behaviour, so it is not reproduced here: `start()` below sets `is_active`
/// true before the worker thread is spawned (or before the first
/// idle-driven `next()` call is armed).
pub struct BlockingSource {
    mode: DriveMode,
    is_active: Arc<AtomicBool>,
    stop_queue_on_eos: bool,
    queue: Arc<Queue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    idle_id: usize,
}

impl BlockingSource {
    pub fn new(mode: DriveMode, queue: Arc<Queue>, stop_queue_on_eos: bool) -> Arc<Self> {
        let idle_id = Arc::as_ptr(&queue) as *const () as usize;
        Arc::new(BlockingSource {
            mode,
            is_active: Arc::new(AtomicBool::new(false)),
            stop_queue_on_eos,
            queue,
            worker: Mutex::new(None),
            idle_id,
        })
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    /// Begins producing. Parallel mode spawns a worker thread; idle-driven
    /// mode registers `next` on the Queue's idle list. A no-op if already
    /// active.
    pub fn start(self: &Arc<Self>, driver: Arc<dyn Next>) {
        if self.is_active.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.mode {
            DriveMode::Parallel => {
                let this = Arc::clone(self);
                let handle = std::thread::spawn(move || this.parallel_main(driver));
                *self.worker.lock().expect("blocking source lock poisoned") = Some(handle);
            }
            DriveMode::IdleDriven => {
                let this = Arc::clone(self);
                self.queue.add_idle(
                    self.idle_id,
                    Arc::new(move || {
                        if this.is_active() && !driver.next() {
                            this.finish();
                        }
                    }),
                );
            }
        }
    }

    /// Cancels further production. For the parallel worker this only flips
    /// the loop condition; an in-flight blocking read inside `Next::next`
    /// is expected to return promptly on its own (device-specific; a file
    /// reader observes this on its next iteration).
    pub fn stop(&self) {
        self.is_active.store(false, Ordering::SeqCst);
        if self.mode == DriveMode::IdleDriven {
            self.queue.rem_idle(self.idle_id);
        }
    }

    /// Joins the parallel worker thread, if any.
    pub fn wait(&self) {
        let handle = self.worker.lock().expect("blocking source lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn parallel_main(&self, driver: Arc<dyn Next>) {
        while self.is_active.load(Ordering::SeqCst) {
            if !driver.next() {
                self.finish();
                break;
            }
        }
    }

    fn finish(&self) {
        self.is_active.store(false, Ordering::SeqCst);
        if self.stop_queue_on_eos {
            self.queue.stop();
        }
    }
}

/// Convenience: a `BlockingSource` paired with the typed `Source<T>` it
/// feeds, the shape every concrete input adapter (`WavReader`) embeds.
pub struct BlockingSourceNode<T: Sample> {
    pub blocking: Arc<BlockingSource>,
    pub source: Arc<Source<T>>,
}

impl<T: Sample> BlockingSourceNode<T> {
    pub fn new(mode: DriveMode, queue: Arc<Queue>, stop_queue_on_eos: bool) -> Self {
        BlockingSourceNode {
            blocking: BlockingSource::new(mode, Arc::clone(&queue), stop_queue_on_eos),
            source: Arc::new(Source::new(queue)),
        }
    }
}
