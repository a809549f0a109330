//! Buffer/ownership model: raw storage, typed views, ring buffers, pools.

pub mod pool;
pub mod raw;
pub mod ring;
pub mod typed;

pub use pool::BufferSet;
pub use raw::{BufferOwner, RawBuffer};
pub use ring::{RawRingBuffer, RingBuffer};
pub use typed::{Buffer, Sample};
