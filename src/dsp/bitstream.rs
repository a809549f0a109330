//! PLL-locked bit slicer (spec §4.J), grounded on
//! `original_source/src/afsk.hh`/`afsk.cc`'s `BitStream` class.

use std::sync::Mutex;

use crate::buffer::typed::Buffer;
use crate::config::Config;
use crate::error::{ConfigError, RuntimeError};
use crate::node::{Sink, Source};
use crate::types::Type;

/// Output bit convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// mark -> 1, space -> 0.
    Normal,
    /// transition -> 0, no transition -> 1.
    Transition,
}

struct State {
    baud: f64,
    mode: Mode,
    corr_len: usize,
    symbols: Vec<i8>,
    sym_idx: usize,
    sym_sum: i32,
    last_sym_sum: i32,
    phase: f64,
    omega: f64,
    omega_min: f64,
    omega_max: f64,
    /// Preserved from the spec's Open Question: these PLL constants are
    /// empirically calibrated in the source, not rederived here.
    pll_gain: f64,
    last_bits: u8,
}

impl State {
    fn new(baud: f64, mode: Mode) -> Self {
        State {
            baud,
            mode,
            corr_len: 0,
            symbols: Vec::new(),
            sym_idx: 0,
            sym_sum: 0,
            last_sym_sum: 0,
            phase: 0.0,
            omega: 0.0,
            omega_min: 0.0,
            omega_max: 0.0,
            pll_gain: 0.0005,
            last_bits: 0,
        }
    }

    fn reconfigure(&mut self, sample_rate: f64) {
        self.corr_len = (sample_rate / self.baud) as usize;
        self.phase = 0.0;
        self.omega = self.baud / sample_rate;
        self.omega_min = self.omega - 0.005 * self.omega;
        self.omega_max = self.omega + 0.005 * self.omega;
        self.pll_gain = 0.0005;
        self.symbols = vec![0i8; self.corr_len.max(1)];
        self.sym_idx = 0;
        self.sym_sum = 0;
        self.last_sym_sum = 0;
        self.last_bits = 0;
    }
}

/// Consumes soft symbol decisions (nonzero == mark) and emits sliced bits,
/// one per detected symbol-clock cycle.
pub struct BitStream {
    state: Mutex<State>,
    buffer: Mutex<Buffer<u8>>,
    source: Source<u8>,
}

impl BitStream {
    pub fn new(queue: std::sync::Arc<crate::queue::Queue>, baud: f64, mode: Mode) -> Self {
        BitStream {
            state: Mutex::new(State::new(baud, mode)),
            buffer: Mutex::new(Buffer::new(0)),
            source: Source::new(queue),
        }
    }

    pub fn source(&self) -> &Source<u8> {
        &self.source
    }
}

impl Sink<u8> for BitStream {
    fn process(&self, buf: Buffer<u8>, _allow_overwrite: bool) -> Result<(), RuntimeError> {
        let input = buf.to_vec();
        let mut state = self.state.lock().expect("bitstream lock poisoned");
        let out_buf = self.buffer.lock().expect("bitstream lock poisoned");
        let mut bits = Vec::with_capacity(out_buf.len());

        for symbol in input {
            state.last_sym_sum = state.sym_sum;
            let idx = state.sym_idx;
            state.sym_sum -= state.symbols[idx] as i32;
            state.symbols[idx] = if symbol != 0 { 1 } else { -1 };
            state.sym_sum += state.symbols[idx] as i32;
            state.sym_idx = (state.sym_idx + 1) % state.corr_len.max(1);

            state.phase += state.omega;

            if state.phase >= 1.0 {
                while state.phase >= 1.0 {
                    state.phase -= 1.0;
                }
                let mark = state.sym_sum > 0;
                state.last_bits = (state.last_bits << 1) | (mark as u8);
                let bit = match state.mode {
                    Mode::Transition => (state.last_bits ^ (state.last_bits >> 1) ^ 0x1) & 0x1,
                    Mode::Normal => state.last_bits & 0x1,
                };
                bits.push(bit);
            }

            let crossed = (state.last_sym_sum < 0 && state.sym_sum >= 0)
                || (state.last_sym_sum >= 0 && state.sym_sum < 0);
            if crossed {
                if state.phase < 0.5 {
                    state.omega += state.pll_gain * (0.5 - state.phase);
                } else {
                    state.omega -= state.pll_gain * (state.phase - 0.5);
                }
                state.omega = state.omega.clamp(state.omega_min, state.omega_max);
            }
        }

        if !bits.is_empty() {
            out_buf.write_values(&bits);
            self.source.send(out_buf.head(bits.len()), false)?;
        }
        Ok(())
    }

    fn config(&self, cfg: Config) -> Result<(), ConfigError> {
        if !cfg.has_type() || !cfg.has_sample_rate() {
            return Ok(());
        }
        if cfg.type_id != Type::U8 {
            return Err(ConfigError::TypeMismatch {
                expected: crate::types::type_name(Type::U8).to_string(),
                got: crate::types::type_name(cfg.type_id).to_string(),
            });
        }
        let mut state = self.state.lock().expect("bitstream lock poisoned");
        state.reconfigure(cfg.sample_rate_hz);
        let out_len = 1 + cfg.buffer_size / state.corr_len.max(1);
        let baud = state.baud;
        drop(state);
        *self.buffer.lock().expect("bitstream lock poisoned") = Buffer::new(out_len);
        self.source.set_config(Config::new(Type::U8, baud, out_len, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_vote_emits_one_bit_per_symbol_clock() {
        let queue = crate::queue::Queue::new();
        let bs = BitStream::new(queue, 1200.0, Mode::Normal);
        bs.config(Config::new(Type::U8, 9600.0, 64, 1)).unwrap();
        // corr_len = 8 symbols/bit; feed one bit's worth of "mark" symbols.
        let symbols = vec![1u8; 8];
        let buf = Buffer::from_values(&symbols);
        bs.process(buf, false).unwrap();
        let out = bs.buffer.lock().unwrap();
        assert!(!out.to_vec().is_empty());
    }

    #[test]
    fn omega_stays_within_pll_clamp_bounds() {
        let queue = crate::queue::Queue::new();
        let bs = BitStream::new(queue, 1200.0, Mode::Transition);
        bs.config(Config::new(Type::U8, 9600.0, 64, 1)).unwrap();
        let symbols: Vec<u8> = (0..64).map(|i| if i % 4 < 2 { 1 } else { 0 }).collect();
        let buf = Buffer::from_values(&symbols);
        bs.process(buf, false).unwrap();
        let state = bs.state.lock().unwrap();
        assert!(state.omega >= state.omega_min && state.omega <= state.omega_max);
    }
}
