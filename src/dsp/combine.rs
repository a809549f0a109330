//! Combine / Interleave — merges N independently-clocked streams (SPEC_FULL
//! §4.M), grounded on `original_source/src/combine.hh`.

use std::sync::{Arc, Mutex};

use crate::buffer::ring::RingBuffer;
use crate::buffer::typed::{Buffer, Sample};
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError};
use crate::node::{Sink, Source};

/// Shared state every `CombineSink` reports into: one ring per logical
/// input, plus the unified Config once all N inputs agree.
struct Shared<T: Sample> {
    rings: Vec<Mutex<RingBuffer<T>>>,
    config: Mutex<Config>,
}

/// A single input leg of a `Combine`/`Interleave` node. `process` copies
/// into its ring and notifies the parent; `config` unifies into the shared
/// Config, erroring if a later leg disagrees on type or sample rate.
pub struct CombineSink<T: Sample> {
    index: usize,
    shared: Arc<Shared<T>>,
    on_data: Box<dyn Fn(usize) + Send + Sync>,
    on_config: Box<dyn Fn(usize, Config) -> Result<(), ConfigError> + Send + Sync>,
}

impl<T: Sample + Send + Sync> Sink<T> for CombineSink<T> {
    fn process(&self, buf: Buffer<T>, _allow_overwrite: bool) -> Result<(), RuntimeError> {
        let values = buf.to_vec();
        self.shared.rings[self.index]
            .lock()
            .expect("combine ring lock poisoned")
            .put(&values);
        (self.on_data)(self.index);
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() || !cfg.has_sample_rate() {
            return Ok(());
        }
        (self.on_config)(self.index, cfg)
    }
}

/// Interleaves `N` input streams round-robin into a single output stream.
/// Scenario S1: two `i16` sinks fed `[1,2,3]`/`[4,5,6]` at 1 Hz produce
/// `[1,4,2,5,3,6]` downstream.
pub struct Interleave<T: Sample> {
    n: usize,
    shared: Arc<Shared<T>>,
    output: Mutex<Buffer<T>>,
    source: Source<T>,
}

impl<T: Sample + Send + Sync + 'static> Interleave<T> {
    pub fn new(queue: Arc<crate::queue::Queue>, n: usize) -> Arc<Self> {
        let rings = (0..n).map(|_| Mutex::new(RingBuffer::new(0))).collect();
        Arc::new(Interleave {
            n,
            shared: Arc::new(Shared {
                rings,
                config: Mutex::new(Config::UNDEFINED),
            }),
            output: Mutex::new(Buffer::new(0)),
            source: Source::new(queue),
        })
    }

    pub fn source(&self) -> &Source<T> {
        &self.source
    }

    /// Returns the `i`-th input sink, to be connected upstream.
    pub fn sink(self: &Arc<Self>, i: usize) -> Arc<CombineSink<T>> {
        assert!(i < self.n, "Interleave: sink index {i} out of range [0,{})", self.n);
        let this = Arc::clone(self);
        let this_cfg = Arc::clone(self);
        Arc::new(CombineSink {
            index: i,
            shared: Arc::clone(&self.shared),
            on_data: Box::new(move |idx| this.notify_data(idx)),
            on_config: Box::new(move |idx, cfg| this_cfg.notify_config(idx, cfg)),
        })
    }

    fn notify_config(&self, idx: usize, cfg: Config) -> Result<(), ConfigError> {
        let mut unified = self.shared.config.lock().expect("combine config lock poisoned");
        if !unified.has_type() {
            unified.type_id = cfg.type_id;
        } else if unified.type_id != cfg.type_id {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(unified.type_id).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        if !unified.has_sample_rate() {
            unified.sample_rate_hz = cfg.sample_rate_hz;
        } else if (unified.sample_rate_hz - cfg.sample_rate_hz).abs() > f64::EPSILON {
            return Err(ConfigError::UnsupportedSampleRate {
                sample_rate_hz: cfg.sample_rate_hz,
            });
        }
        if !unified.has_buffer_size() {
            unified.buffer_size = cfg.buffer_size;
        } else {
            unified.buffer_size = unified.buffer_size.max(cfg.buffer_size);
        }
        let merged = *unified;
        drop(unified);

        for ring in self.shared.rings.iter() {
            *ring.lock().expect("combine ring lock poisoned") = RingBuffer::new(merged.buffer_size * 4);
        }

        log::debug!("combine sink #{idx}: unified config buffer_size={}", merged.buffer_size);
        self.node_config(merged)
    }

    fn node_config(&self, cfg: Config) -> Result<(), ConfigError> {
        *self.output.lock().expect("combine output lock poisoned") = Buffer::new(self.n * cfg.buffer_size.max(1));
        self.source
            .set_config(Config::new(cfg.type_id, cfg.sample_rate_hz, self.n * cfg.buffer_size.max(1), 1))
    }

    fn notify_data(&self, _idx: usize) {
        let min_fill = self
            .shared
            .rings
            .iter()
            .map(|r| r.lock().expect("combine ring lock poisoned").len())
            .min()
            .unwrap_or(0);
        if min_fill == 0 {
            return;
        }
        if let Err(err) = self.process(min_fill) {
            crate::error::log_runtime_error(&err, "Interleave");
        }
    }

    fn process(&self, min_fill: usize) -> Result<(), RuntimeError> {
        let output = self.output.lock().expect("combine output lock poisoned");
        if !output.is_unused() {
            log::warn!("Interleave: output buffer in use, dropping {}x{} input values", self.n, min_fill);
            for ring in self.shared.rings.iter() {
                ring.lock().expect("combine ring lock poisoned").drop_n(min_fill);
            }
            return Ok(());
        }

        let num = (output.len() / self.n).min(min_fill);
        let mut taken: Vec<Vec<T>> = Vec::with_capacity(self.n);
        for ring in self.shared.rings.iter() {
            let mut ring = ring.lock().expect("combine ring lock poisoned");
            taken.push(ring.take(num).unwrap_or_default());
        }

        let mut interleaved = Vec::with_capacity(num * self.n);
        for i in 0..num {
            for leg in taken.iter() {
                interleaved.push(leg[i]);
            }
        }
        output.write_values(&interleaved);
        self.source.send(output.head(num * self.n), false)?;
        Ok(())
    }
}
