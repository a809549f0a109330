//! Sink/Source contracts and the connection graph (spec §4.C).

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};

use crate::buffer::raw::RawBuffer;
use crate::buffer::typed::{Buffer, Sample};
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError};
use crate::queue::Queue;

/// Type-erased sink endpoint, the boundary the Queue and direct dispatch
/// operate against.
pub trait SinkBase: Send + Sync {
    fn handle_buffer(&self, raw: &RawBuffer, allow_overwrite: bool) -> Result<(), RuntimeError>;
    fn config(&self, cfg: Config) -> Result<(), ConfigError>;
}

/// The common case: a sink typed over its scalar. `handle_buffer`
/// reinterprets the raw buffer to `Buffer<T>` and forwards to `process`.
pub trait Sink<T: Sample>: Send + Sync {
    fn process(&self, buf: Buffer<T>, allow_overwrite: bool) -> Result<(), RuntimeError>;
    fn config(&self, cfg: Config) -> Result<(), ConfigError>;
}

/// Adapts a concrete `Arc<S: Sink<T>>` to the type-erased `SinkBase`
/// boundary. `T` is carried in `Self` via the marker field so the impl
/// below is a normal, fully-constrained `impl<T, S> SinkBase for
/// TypedSink<T, S>` rather than a blanket `impl<T, S: Sink<T>> SinkBase for
/// S` (which leaves `T` unconstrained by `Self` — E0207). Built by
/// `Source::connect`; callers never construct this directly.
struct TypedSink<T: Sample, S: Sink<T>> {
    inner: Arc<S>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Sample, S: Sink<T>> TypedSink<T, S> {
    fn new(inner: Arc<S>) -> Arc<Self> {
        Arc::new(TypedSink {
            inner,
            _marker: PhantomData,
        })
    }
}

impl<T: Sample, S: Sink<T>> SinkBase for TypedSink<T, S> {
    fn handle_buffer(&self, raw: &RawBuffer, allow_overwrite: bool) -> Result<(), RuntimeError> {
        let buf = Buffer::<T>::from_raw(raw.clone());
        self.inner.process(buf, allow_overwrite)
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        self.inner.config(cfg)
    }
}

/// Notified when a Source announces end-of-stream. `Queue::stop` is the
/// typical delegate (see `BlockingSource`).
pub trait EosDelegate: Send + Sync {
    fn on_eos(&self);
}

/// Holds a Source's current `Config`, its connected sinks (each tagged
/// with a direct/non-direct flag), and its EOS delegate list.
///
/// Not `Clone`: a Source's sink map is mutated only at graph-assembly
/// time; concurrent mutation while the Queue is running is undefined by
/// spec §5 and is the caller's responsibility to avoid.
pub struct Source<T: Sample> {
    config: Mutex<Config>,
    sinks: Mutex<Vec<(Arc<dyn SinkBase>, bool)>>,
    eos: Mutex<Vec<Weak<dyn EosDelegate>>>,
    queue: Arc<Queue>,
    _marker: PhantomData<T>,
}

impl<T: Sample> Source<T> {
    pub fn new(queue: Arc<Queue>) -> Self {
        Source {
            config: Mutex::new(Config::UNDEFINED),
            sinks: Mutex::new(Vec::new()),
            eos: Mutex::new(Vec::new()),
            queue,
            _marker: PhantomData,
        }
    }

    /// Convenience constructor against the opt-in process-wide `Queue`
    /// singleton.
    pub fn with_default_queue() -> Self {
        Source::new(Queue::global())
    }

    pub fn config(&self) -> Config {
        *self.config.lock().expect("source lock poisoned")
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Stores the mapping and immediately calls `sink.config(current)`.
    /// Wraps `sink` in the [`TypedSink`] adapter so it can be held as
    /// `Arc<dyn SinkBase>` alongside every other connected sink.
    pub fn connect<S: Sink<T> + 'static>(&self, sink: Arc<S>, direct: bool) -> Result<(), ConfigError> {
        let erased: Arc<dyn SinkBase> = TypedSink::new(sink);
        let current = self.config();
        erased.config(current)?;
        self.sinks.lock().expect("source lock poisoned").push((erased, direct));
        Ok(())
    }

    /// Removes every connected sink matching by pointer identity.
    pub fn disconnect(&self, sink: &Arc<dyn SinkBase>) {
        self.sinks
            .lock()
            .expect("source lock poisoned")
            .retain(|(s, _)| !Arc::ptr_eq(s, sink));
    }

    /// Idempotent: only propagates when the new Config differs from the
    /// current one (invariant 10: two equal `set_config` calls propagate
    /// exactly once, counting the first).
    pub fn set_config(&self, new: Config) -> Result<(), ConfigError> {
        {
            let mut current = self.config.lock().expect("source lock poisoned");
            if *current == new {
                return Ok(());
            }
            *current = new;
        }
        self.propagate_config()
    }

    fn propagate_config(&self) -> Result<(), ConfigError> {
        let cfg = self.config();
        for (sink, _) in self.sinks.lock().expect("source lock poisoned").iter() {
            sink.config(cfg)?;
        }
        Ok(())
    }

    /// Iterates connected sinks; direct sinks are invoked inline, others
    /// are enqueued to the Queue. `allow_overwrite` is forwarded to a sink
    /// only if exactly one downstream sink exists and the caller permitted
    /// it — computed per sink as the spec's source does, not hoisted
    /// outside the loop.
    pub fn send(&self, buf: Buffer<T>, allow_overwrite: bool) -> Result<(), RuntimeError> {
        let sinks = self.sinks.lock().expect("source lock poisoned");
        let single_sink = sinks.len() == 1;
        for (sink, direct) in sinks.iter() {
            let allow = allow_overwrite && single_sink;
            if *direct {
                sink.handle_buffer(buf.raw(), allow)?;
            } else {
                self.queue.send(buf.raw().clone(), Arc::clone(sink), allow);
            }
        }
        Ok(())
    }

    pub fn add_eos(&self, delegate: Weak<dyn EosDelegate>) {
        self.eos.lock().expect("source lock poisoned").push(delegate);
    }

    /// Invokes every live registered EOS delegate.
    pub fn signal_eos(&self) {
        for delegate in self.eos.lock().expect("source lock poisoned").iter() {
            if let Some(delegate) = delegate.upgrade() {
                delegate.on_eos();
            }
        }
    }
}

impl EosDelegate for Queue {
    fn on_eos(&self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: Arc<AtomicUsize>,
        last_refcount: Mutex<usize>,
    }

    impl Sink<i16> for CountingSink {
        fn process(&self, buf: Buffer<i16>, _allow_overwrite: bool) -> Result<(), RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_refcount.lock().unwrap() = buf.raw().refcount();
            Ok(())
        }

        fn config(&self, _cfg: Config) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    #[test]
    fn direct_sinks_are_called_synchronously() {
        // Scenario S4.
        let queue = Queue::new();
        let source = Source::<i16>::new(queue);
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let a = Arc::new(CountingSink {
            calls: calls_a.clone(),
            last_refcount: Mutex::new(0),
        });
        let b = Arc::new(CountingSink {
            calls: calls_b.clone(),
            last_refcount: Mutex::new(0),
        });
        source.connect(a, true).unwrap();
        source.connect(b, true).unwrap();

        let buf = Buffer::<i16>::from_values(&[1, 2, 3]);
        source.send(buf, false).unwrap();

        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_config_propagates_once_on_change() {
        // Invariant 10.
        let queue = Queue::new();
        let source = Source::<i16>::new(queue);
        let propagations = Arc::new(AtomicUsize::new(0));
        struct ConfigCountingSink(Arc<AtomicUsize>);
        impl Sink<i16> for ConfigCountingSink {
            fn process(&self, _buf: Buffer<i16>, _allow_overwrite: bool) -> Result<(), RuntimeError> {
                Ok(())
            }
            fn config(&self, _cfg: Config) -> Result<(), ConfigError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let sink = Arc::new(ConfigCountingSink(propagations.clone()));
        source.connect(sink, true).unwrap(); // +1 from connect()

        let cfg = Config::new(Type::S16, 48000.0, 1024, 2);
        source.set_config(cfg).unwrap(); // +1, changed
        source.set_config(cfg).unwrap(); // no-op, unchanged

        assert_eq!(propagations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn connect_forwards_current_config_immediately() {
        let queue = Queue::new();
        let source = Source::<i16>::new(queue);
        source
            .set_config(Config::new(Type::S16, 8000.0, 16, 1))
            .unwrap();

        let seen = Arc::new(Mutex::new(None));
        struct Recorder(Arc<Mutex<Option<Config>>>);
        impl Sink<i16> for Recorder {
            fn process(&self, _buf: Buffer<i16>, _allow_overwrite: bool) -> Result<(), RuntimeError> {
                Ok(())
            }
            fn config(&self, cfg: Config) -> Result<(), ConfigError> {
                *self.0.lock().unwrap() = Some(cfg);
                Ok(())
            }
        }
        let sink = Arc::new(Recorder(seen.clone()));
        source.connect(sink, true).unwrap();

        assert!(seen.lock().unwrap().is_some());
    }
}
