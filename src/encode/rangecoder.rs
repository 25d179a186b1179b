use crate::model::{BitTree, LenModel, BIT_MODEL_TOTAL, BIT_MODEL_TOTAL_BITS, MOVE_BITS};
use crate::model::{LEN_LOW_SYMBOLS, LEN_MID_SYMBOLS, MATCH_MIN_LEN};
use alloc::vec::Vec;

/// Range encoder writing into an owned buffer, drained by the caller.
#[derive(Debug)]
pub struct RangeEncoder {
    stream: Vec<u8>,
    // Bytes of `stream` already handed out
    drained: usize,
    // Bytes ever appended to `stream`
    emitted: u64,
    range: u32,
    low: u64,
    cache: u8,
    cachesz: u32,
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeEncoder {
    pub fn new() -> Self {
        RangeEncoder {
            stream: Vec::new(),
            drained: 0,
            emitted: 0,
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cachesz: 1,
        }
    }

    /// Start a new range coded stream. Undrained bytes are dropped.
    pub fn reset(&mut self) {
        self.stream.clear();
        self.drained = 0;
        self.emitted = 0;
        self.range = 0xFFFF_FFFF;
        self.low = 0;
        self.cache = 0;
        self.cachesz = 1;
    }

    fn write_byte(&mut self, byte: u8) {
        self.stream.push(byte);
        self.emitted += 1;
    }

    fn write_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let mut tmp = self.cache;
            loop {
                let byte = tmp.wrapping_add((self.low >> 32) as u8);
                self.write_byte(byte);
                tmp = 0xFF;
                self.cachesz -= 1;
                if self.cachesz == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cachesz += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    /// Flush the coder. The stream is complete once the output is drained.
    pub fn finish(&mut self) {
        for _ in 0..5 {
            self.write_low();
        }
    }

    /// Total size of the stream if it were finished now.
    pub fn finished_len(&self) -> u64 {
        self.emitted + self.cachesz as u64 + 4
    }

    /// Number of bytes ready to be drained.
    pub fn pending_len(&self) -> usize {
        self.stream.len() - self.drained
    }

    /// Copy ready bytes into `out`, returning how many were copied.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let count = core::cmp::min(out.len(), self.pending_len());
        out[..count].copy_from_slice(&self.stream[self.drained..self.drained + count]);
        self.drained += count;
        if self.drained == self.stream.len() {
            self.stream.clear();
            self.drained = 0;
        }
        count
    }

    /// Take every ready byte.
    pub fn take_all(&mut self) -> Vec<u8> {
        let mut bytes = core::mem::take(&mut self.stream);
        bytes.drain(..self.drained);
        self.drained = 0;
        bytes
    }

    #[inline]
    fn normalize(&mut self) {
        while self.range < 0x0100_0000 {
            self.range <<= 8;
            self.write_low();
        }
    }

    pub fn encode_bit(&mut self, prob: &mut u16, bit: bool) {
        let bound: u32 = (self.range >> BIT_MODEL_TOTAL_BITS) * (*prob as u32);
        lzma_trace!("  bound: {:08x}, prob: {:04x}, bit: {}", bound, prob, bit as u8);

        if bit {
            *prob -= *prob >> MOVE_BITS;
            self.low += bound as u64;
            self.range -= bound;
        } else {
            *prob += ((BIT_MODEL_TOTAL as u16) - *prob) >> MOVE_BITS;
            self.range = bound;
        }
        self.normalize();
    }

    /// Encode the `count` low bits of `value` with a fixed one-half
    /// probability, most significant bit first.
    pub fn encode_direct_bits(&mut self, value: u32, count: usize) {
        for i in (0..count).rev() {
            self.range >>= 1;
            if (value >> i) & 1 != 0 {
                self.low += self.range as u64;
            }
            self.normalize();
        }
    }

    pub fn encode_bit_tree(&mut self, num_bits: usize, probs: &mut [u16], value: u32) {
        let mut tmp: usize = 1;
        for i in (0..num_bits).rev() {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[tmp], bit != 0);
            tmp = (tmp << 1) ^ (bit as usize);
        }
    }

    pub fn encode_reverse_bit_tree(
        &mut self,
        num_bits: usize,
        probs: &mut [u16],
        offset: usize,
        value: u32,
    ) {
        let mut tmp: usize = 1;
        for i in 0..num_bits {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[offset + tmp], bit != 0);
            tmp = (tmp << 1) ^ (bit as usize);
        }
    }
}

impl<const PROBS_ARRAY_LEN: usize> BitTree<PROBS_ARRAY_LEN> {
    pub fn encode(&mut self, rangecoder: &mut RangeEncoder, value: u32) {
        rangecoder.encode_bit_tree(Self::NUM_BITS, &mut self.probs, value)
    }

    pub fn encode_reverse(&mut self, rangecoder: &mut RangeEncoder, value: u32) {
        rangecoder.encode_reverse_bit_tree(Self::NUM_BITS, &mut self.probs, 0, value)
    }
}

impl LenModel {
    /// Encode a match length (2..=273).
    pub fn encode(&mut self, rangecoder: &mut RangeEncoder, len: usize, pos_state: usize) {
        let symbol = len - MATCH_MIN_LEN;
        if symbol < LEN_LOW_SYMBOLS {
            rangecoder.encode_bit(&mut self.choice, false);
            self.low[pos_state].encode(rangecoder, symbol as u32);
        } else if symbol < LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
            rangecoder.encode_bit(&mut self.choice, true);
            rangecoder.encode_bit(&mut self.choice2, false);
            self.mid[pos_state].encode(rangecoder, (symbol - LEN_LOW_SYMBOLS) as u32);
        } else {
            rangecoder.encode_bit(&mut self.choice, true);
            rangecoder.encode_bit(&mut self.choice2, true);
            self.high
                .encode(rangecoder, (symbol - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS) as u32);
        }
    }
}
