//! `Proxy<T>` — a NOP Sink+Source, grounded on `original_source/src/node.hh`'s
//! `Proxy` class (`node.cc`'s `Proxy::config`/`Proxy::handleBuffer` simply
//! forward to the embedded `Source`).
//!
//! Used to fan a single upstream into a point where a differently-configured
//! subgraph needs its own `Source` identity — e.g. the merge point
//! downstream of a `Combine`/`Interleave` node.

use crate::buffer::typed::{Buffer, Sample};
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError};
use crate::node::{Sink, Source};
use crate::queue::Queue;

use std::sync::Arc;

pub struct Proxy<T: Sample> {
    source: Source<T>,
}

impl<T: Sample> Proxy<T> {
    pub fn new(queue: Arc<Queue>) -> Self {
        Proxy {
            source: Source::new(queue),
        }
    }

    pub fn source(&self) -> &Source<T> {
        &self.source
    }
}

impl<T: Sample + Send + Sync> Sink<T> for Proxy<T> {
    fn process(&self, buf: Buffer<T>, allow_overwrite: bool) -> Result<(), RuntimeError> {
        self.source.send(buf, allow_overwrite)
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        self.source.set_config(cfg)
    }
}
