use crate::io::{self, BufRead, BufReadExt};
use crate::model::{BitTree, LenModel, BIT_MODEL_TOTAL, BIT_MODEL_TOTAL_BITS, MOVE_BITS};
use crate::model::{LEN_LOW_SYMBOLS, LEN_MID_SYMBOLS, MATCH_MIN_LEN};

/// Below this value the range is shifted by one byte.
pub const TOP_VALUE: u32 = 1 << 24;

/// Number of bytes a range decoder is initialized from.
pub const INIT_BYTES: usize = 5;

pub struct RangeDecoder<'a, R>
where
    R: 'a + BufRead,
{
    pub stream: &'a mut R,
    pub range: u32,
    pub code: u32,
}

impl<'a, R> RangeDecoder<'a, R>
where
    R: BufRead,
{
    /// Resume decoding with registers saved from a previous call.
    pub fn from_parts(stream: &'a mut R, range: u32, code: u32) -> Self {
        Self {
            stream,
            range,
            code,
        }
    }

    /// Shift in one byte if the range fell below [`TOP_VALUE`]. Nothing is
    /// modified when the byte is not available.
    #[inline]
    pub fn normalize(&mut self) -> io::Result<()> {
        lzma_trace!("  {{ range: {:08x}, code: {:08x} }}", self.range, self.code);
        if self.range < TOP_VALUE {
            let byte = self.stream.read_u8()?;
            self.range <<= 8;
            self.code = (self.code << 8) ^ (byte as u32);
            lzma_trace!("+ {{ range: {:08x}, code: {:08x} }}", self.range, self.code);
        }
        Ok(())
    }

    #[inline]
    fn get_bit(&mut self) -> io::Result<bool> {
        self.normalize()?;
        self.range >>= 1;
        let bit = self.code >= self.range;
        if bit {
            self.code -= self.range
        }
        Ok(bit)
    }

    /// Decode `count` bits with a fixed one-half probability, most
    /// significant bit first.
    pub fn get(&mut self, count: usize) -> io::Result<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            result = (result << 1) ^ (self.get_bit()? as u32)
        }
        Ok(result)
    }

    /// Decode one bit with the adaptive probability `prob`. The probability
    /// is only adapted when `update` is set, so a dry run leaves the model
    /// untouched.
    #[inline]
    pub fn decode_bit(&mut self, prob: &mut u16, update: bool) -> io::Result<bool> {
        self.normalize()?;
        let bound: u32 = (self.range >> BIT_MODEL_TOTAL_BITS) * (*prob as u32);
        if self.code < bound {
            if update {
                *prob += ((BIT_MODEL_TOTAL as u16) - *prob) >> MOVE_BITS;
            }
            self.range = bound;
            Ok(false)
        } else {
            if update {
                *prob -= *prob >> MOVE_BITS;
            }
            self.code -= bound;
            self.range -= bound;
            Ok(true)
        }
    }

    pub fn parse_bit_tree(
        &mut self,
        num_bits: usize,
        probs: &mut [u16],
        update: bool,
    ) -> io::Result<u32> {
        let mut tmp: u32 = 1;
        for _ in 0..num_bits {
            let bit = self.decode_bit(&mut probs[tmp as usize], update)?;
            tmp = (tmp << 1) ^ (bit as u32);
        }
        Ok(tmp - (1 << num_bits))
    }

    pub fn parse_reverse_bit_tree(
        &mut self,
        num_bits: usize,
        probs: &mut [u16],
        offset: usize,
        update: bool,
    ) -> io::Result<u32> {
        let mut result = 0u32;
        let mut tmp: usize = 1;
        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[offset + tmp], update)?;
            tmp = (tmp << 1) ^ (bit as usize);
            result ^= (bit as u32) << i;
        }
        Ok(result)
    }
}

impl<const PROBS_ARRAY_LEN: usize> BitTree<PROBS_ARRAY_LEN> {
    pub fn parse<R: BufRead>(
        &mut self,
        rangecoder: &mut RangeDecoder<R>,
        update: bool,
    ) -> io::Result<u32> {
        rangecoder.parse_bit_tree(Self::NUM_BITS, &mut self.probs, update)
    }

    pub fn parse_reverse<R: BufRead>(
        &mut self,
        rangecoder: &mut RangeDecoder<R>,
        update: bool,
    ) -> io::Result<u32> {
        rangecoder.parse_reverse_bit_tree(Self::NUM_BITS, &mut self.probs, 0, update)
    }
}

impl LenModel {
    /// Decode a match length (2..=273).
    pub fn decode<R: BufRead>(
        &mut self,
        rangecoder: &mut RangeDecoder<R>,
        pos_state: usize,
        update: bool,
    ) -> io::Result<usize> {
        let symbol = if !rangecoder.decode_bit(&mut self.choice, update)? {
            self.low[pos_state].parse(rangecoder, update)? as usize
        } else if !rangecoder.decode_bit(&mut self.choice2, update)? {
            self.mid[pos_state].parse(rangecoder, update)? as usize + LEN_LOW_SYMBOLS
        } else {
            self.high.parse(rangecoder, update)? as usize + LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS
        };
        Ok(symbol + MATCH_MIN_LEN)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::rangecoder::RangeEncoder;
    use crate::model::PROB_INIT;
    use crate::io::Cursor;

    fn decoder_registers(encoded: &[u8]) -> (u32, u32) {
        assert_eq!(encoded[0], 0);
        (
            0xFFFF_FFFF,
            u32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]),
        )
    }

    #[test]
    fn decode_bits_round_trip() {
        let bits: std::vec::Vec<bool> = (0..2000).map(|i| (i * 7 + i / 3) % 5 == 0).collect();

        let mut encoder = RangeEncoder::new();
        let mut prob = PROB_INIT;
        for &bit in bits.iter() {
            encoder.encode_bit(&mut prob, bit);
        }
        encoder.finish();
        let encoded = encoder.take_all();

        let (range, code) = decoder_registers(&encoded);
        let mut stream = Cursor::new(&encoded[INIT_BYTES..]);
        let mut decoder = RangeDecoder::from_parts(&mut stream, range, code);
        let mut prob = PROB_INIT;
        for &bit in bits.iter() {
            assert_eq!(decoder.decode_bit(&mut prob, true).unwrap(), bit);
            assert!(prob >= 1 && prob < BIT_MODEL_TOTAL as u16);
        }
        decoder.normalize().unwrap();
        assert_eq!(decoder.code, 0);
    }

    #[test]
    fn decode_trees_and_direct_bits() {
        let mut encoder = RangeEncoder::new();
        let mut tree = BitTree::<64>::new();
        let mut reverse = BitTree::<16>::new();
        let mut len = LenModel::new();
        for value in 0..64u32 {
            tree.encode(&mut encoder, value);
            reverse.encode_reverse(&mut encoder, value & 15);
            encoder.encode_direct_bits(value * 12345, 26);
            len.encode(&mut encoder, 2 + value as usize * 4, (value & 3) as usize);
        }
        encoder.finish();
        let encoded = encoder.take_all();

        let (range, code) = decoder_registers(&encoded);
        let mut stream = Cursor::new(&encoded[INIT_BYTES..]);
        let mut decoder = RangeDecoder::from_parts(&mut stream, range, code);
        let mut tree = BitTree::<64>::new();
        let mut reverse = BitTree::<16>::new();
        let mut len = LenModel::new();
        for value in 0..64u32 {
            assert_eq!(tree.parse(&mut decoder, true).unwrap(), value);
            assert_eq!(reverse.parse_reverse(&mut decoder, true).unwrap(), value & 15);
            assert_eq!(decoder.get(26).unwrap(), (value * 12345) & 0x3FF_FFFF);
            assert_eq!(
                len.decode(&mut decoder, (value & 3) as usize, true).unwrap(),
                2 + value as usize * 4
            );
        }
    }

    #[test]
    fn dry_run_leaves_probabilities() {
        let mut encoder = RangeEncoder::new();
        let mut prob = PROB_INIT;
        encoder.encode_bit(&mut prob, true);
        encoder.encode_bit(&mut prob, true);
        encoder.finish();
        let encoded = encoder.take_all();

        let (range, code) = decoder_registers(&encoded);
        let mut stream = Cursor::new(&encoded[INIT_BYTES..]);
        let mut decoder = RangeDecoder::from_parts(&mut stream, range, code);
        let mut prob = PROB_INIT;
        assert!(decoder.decode_bit(&mut prob, false).unwrap());
        assert_eq!(prob, PROB_INIT);
    }

    #[test]
    fn starved_normalization_keeps_registers() {
        let empty: [u8; 0] = [];
        let mut stream = Cursor::new(&empty[..]);
        let mut decoder = RangeDecoder::from_parts(&mut stream, 0x00FF_FFFF, 0x1234);
        let mut prob = PROB_INIT;
        let err = decoder.decode_bit(&mut prob, true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(decoder.range, 0x00FF_FFFF);
        assert_eq!(decoder.code, 0x1234);
        assert_eq!(prob, PROB_INIT);
    }
}
