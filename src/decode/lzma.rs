use crate::decode::lzbuffer::LzCircularBuffer;
use crate::decode::rangecoder::{RangeDecoder, INIT_BYTES};
use crate::error::lzma::LzmaError;
use crate::error::{CodecError, CodecResult};
use crate::io;
use crate::model::{self, LzmaModel, State, END_MARKER_DISTANCE};
use crate::model::{ALIGN_BITS, END_POS_MODEL_INDEX, START_POS_MODEL_INDEX};
use crate::params::LzmaProperties;
use crate::progress::{Progress, Status};
use byteorder::{BigEndian, ByteOrder};
use core::cmp;

/// Upper bound of the input one symbol (plus the trailing normalization) can
/// consume. With at least this much input a symbol is decoded directly;
/// otherwise it is first decoded as a dry run to check the input suffices.
pub const MAX_REQUIRED_INPUT: usize = 21;

/// Smallest dictionary the decoder allocates.
pub const DICT_SIZE_MIN: u32 = 4096;

/// Why [`DecoderState::process`] stopped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessingStatus {
    /// The output limit of the dictionary was reached.
    OutputFull,
    /// All supplied input was consumed or buffered.
    NeedInput,
    /// The end marker was decoded.
    EndMarker,
}

enum StepError {
    NeedInput,
    Lzma(LzmaError),
}

impl From<io::Error> for StepError {
    fn from(_: io::Error) -> Self {
        StepError::NeedInput
    }
}

impl From<LzmaError> for StepError {
    fn from(e: LzmaError) -> Self {
        StepError::Lzma(e)
    }
}

enum Symbol {
    Decoded,
    EndMarker,
}

/// All mutable state of one LZMA1 bitstream: models, automaton, rep
/// distances, range decoder registers and the dictionary.
///
/// The state is driven one symbol at a time. A symbol is either decoded
/// completely or not at all, and a match that does not fit in the output
/// window is finished on the next call.
#[derive(Debug)]
pub struct DecoderState {
    // Input bytes that were not enough to decode the next symbol
    partial_input_buf: [u8; MAX_REQUIRED_INPUT],
    partial_input_len: usize,
    pub(crate) props: LzmaProperties,
    model: LzmaModel,
    state: State,
    rep: [usize; 4],
    range: u32,
    code: u32,
    // Bytes of the current match still to be copied
    pending_len: usize,
    pub(crate) dict: LzCircularBuffer,
}

impl DecoderState {
    pub fn new(props: LzmaProperties, dict_size: u32) -> Self {
        let dict_size = cmp::max(dict_size, DICT_SIZE_MIN);
        Self {
            partial_input_buf: [0; MAX_REQUIRED_INPUT],
            partial_input_len: 0,
            props,
            model: LzmaModel::new(&props),
            state: State::new(),
            rep: [1; 4],
            range: 0xFFFF_FFFF,
            code: 0,
            pending_len: 0,
            dict: LzCircularBuffer::new(dict_size as usize),
        }
    }

    /// Reset the automaton, the rep distances and every probability. The
    /// dictionary is kept.
    pub fn reset_state(&mut self) {
        lzma_debug!("Resetting LZMA state with {:?}", self.props);
        self.model.reset(&self.props);
        self.state = State::new();
        self.rep = [1; 4];
        self.pending_len = 0;
        self.partial_input_len = 0;
    }

    /// Switch to new properties, which implies a state reset.
    pub fn set_props(&mut self, props: LzmaProperties) {
        self.props = props;
        self.reset_state();
    }

    /// Forget the dictionary contents.
    pub fn reset_dict(&mut self) {
        self.dict.reset();
    }

    /// Reset everything, as for a new stream.
    pub fn reset(&mut self) {
        self.reset_dict();
        self.reset_state();
        self.range = 0xFFFF_FFFF;
        self.code = 0;
    }

    /// Load the range decoder from its five initialization bytes.
    pub fn init_range_coder(&mut self, bytes: &[u8]) -> Result<(), LzmaError> {
        debug_assert_eq!(bytes.len(), INIT_BYTES);
        if bytes[0] != 0 {
            return Err(LzmaError::InvalidRangeCoderInit {
                first_byte: bytes[0],
            });
        }
        self.range = 0xFFFF_FFFF;
        self.code = BigEndian::read_u32(&bytes[1..INIT_BYTES]);
        self.partial_input_len = 0;
        lzma_trace!("Range coder initialized, code {:08x}", self.code);
        Ok(())
    }

    pub fn is_rc_finished(&self) -> bool {
        self.code == 0
    }

    pub fn pending_len(&self) -> usize {
        self.pending_len
    }

    /// Number of input bytes accepted but not yet decoded.
    pub fn partial_input_len(&self) -> usize {
        self.partial_input_len
    }

    /// Decode symbols from `input` into the dictionary until its output limit
    /// is reached, the input runs out or the end marker is found. Returns the
    /// number of input bytes consumed, including bytes kept back because they
    /// were too few to decode the next symbol. Bytes past the last decoded
    /// symbol are never counted once enough input is available.
    pub fn process(&mut self, input: &[u8]) -> Result<(usize, ProcessingStatus), LzmaError> {
        let mut consumed = 0;
        loop {
            if self.pending_len > 0 {
                let copied = self.dict.copy_match(self.rep[0], self.pending_len)?;
                self.pending_len -= copied;
                if self.pending_len > 0 {
                    return Ok((consumed, ProcessingStatus::OutputFull));
                }
            }
            if !self.dict.has_space() {
                return Ok((consumed, ProcessingStatus::OutputFull));
            }

            let symbol = if self.partial_input_len > 0 {
                // Decode from the kept back bytes followed by new input. Only
                // the new bytes the symbol used count as consumed.
                let old_len = self.partial_input_len;
                let take = cmp::min(MAX_REQUIRED_INPUT - old_len, input.len() - consumed);
                let mut tmp = self.partial_input_buf;
                tmp[old_len..old_len + take].copy_from_slice(&input[consumed..consumed + take]);
                let available = &tmp[..old_len + take];
                if available.len() < MAX_REQUIRED_INPUT && !self.try_symbol(available)? {
                    self.partial_input_buf = tmp;
                    self.partial_input_len = available.len();
                    return Ok((consumed + take, ProcessingStatus::NeedInput));
                }
                let (used, symbol) = self.decode_symbol(available)?;
                if used >= old_len {
                    consumed += used - old_len;
                    self.partial_input_len = 0;
                } else {
                    self.partial_input_buf.copy_within(used..old_len, 0);
                    self.partial_input_len = old_len - used;
                }
                symbol
            } else {
                let available = &input[consumed..];
                if available.len() < MAX_REQUIRED_INPUT && !self.try_symbol(available)? {
                    self.partial_input_buf[..available.len()].copy_from_slice(available);
                    self.partial_input_len = available.len();
                    return Ok((input.len(), ProcessingStatus::NeedInput));
                }
                let (used, symbol) = self.decode_symbol(available)?;
                consumed += used;
                symbol
            };

            if let Symbol::EndMarker = symbol {
                return Ok((consumed, ProcessingStatus::EndMarker));
            }
        }
    }

    /// Whether `input` holds enough bytes to decode the next symbol. Nothing
    /// is modified.
    fn try_symbol(&mut self, mut input: &[u8]) -> Result<bool, LzmaError> {
        let mut rangecoder = RangeDecoder::from_parts(&mut input, self.range, self.code);
        match self.process_next(&mut rangecoder, false) {
            Ok(_) => Ok(true),
            Err(StepError::NeedInput) => Ok(false),
            Err(StepError::Lzma(e)) => Err(e),
        }
    }

    /// Decode one symbol for real. The caller made sure `input` suffices.
    fn decode_symbol(&mut self, mut input: &[u8]) -> Result<(usize, Symbol), LzmaError> {
        let len = input.len();
        let mut rangecoder = RangeDecoder::from_parts(&mut input, self.range, self.code);
        let symbol = match self.process_next(&mut rangecoder, true) {
            Ok(symbol) => symbol,
            Err(StepError::Lzma(e)) => return Err(e),
            Err(StepError::NeedInput) => unreachable!("symbol was checked to fit the input"),
        };
        self.range = rangecoder.range;
        self.code = rangecoder.code;
        Ok((len - input.len(), symbol))
    }

    fn process_next<R: io::BufRead>(
        &mut self,
        rangecoder: &mut RangeDecoder<R>,
        update: bool,
    ) -> Result<Symbol, StepError> {
        let symbol = self.process_next_inner(rangecoder, update)?;
        // Keep the range coder normalized between symbols
        rangecoder.normalize()?;
        Ok(symbol)
    }

    fn process_next_inner<R: io::BufRead>(
        &mut self,
        rangecoder: &mut RangeDecoder<R>,
        update: bool,
    ) -> Result<Symbol, StepError> {
        let pos_state = model::pos_state(&self.props, self.dict.len());
        let state = self.state.index();
        let ctx = (state << 4) + pos_state;

        if !rangecoder.decode_bit(&mut self.model.is_match[ctx], update)? {
            let byte = self.decode_literal(rangecoder, update)?;
            if update {
                lzma_trace!("Literal: {}", byte);
                self.dict.put_byte(byte);
                self.state.update_literal();
            }
            return Ok(Symbol::Decoded);
        }

        let len = if rangecoder.decode_bit(&mut self.model.is_rep[state], update)? {
            if !rangecoder.decode_bit(&mut self.model.is_rep_g0[state], update)? {
                if !rangecoder.decode_bit(&mut self.model.is_rep_0long[ctx], update)? {
                    if update {
                        let byte = self.dict.last_n(self.rep[0])?;
                        lzma_trace!("Short rep: {}", byte);
                        self.dict.put_byte(byte);
                        self.state.update_short_rep();
                    }
                    return Ok(Symbol::Decoded);
                }
            } else {
                let index = if !rangecoder.decode_bit(&mut self.model.is_rep_g1[state], update)? {
                    1
                } else if !rangecoder.decode_bit(&mut self.model.is_rep_g2[state], update)? {
                    2
                } else {
                    3
                };
                if update {
                    let dist = self.rep[index];
                    self.rep.copy_within(0..index, 1);
                    self.rep[0] = dist;
                }
            }

            let len = self.model.rep_len.decode(rangecoder, pos_state, update)?;
            if update {
                self.state.update_rep();
            }
            len
        } else {
            let len = self.model.len.decode(rangecoder, pos_state, update)?;
            let dist = self.decode_distance(rangecoder, len, update)?;
            if dist == END_MARKER_DISTANCE {
                lzma_debug!("End marker found");
                return Ok(Symbol::EndMarker);
            }
            if update {
                self.rep.copy_within(0..3, 1);
                self.rep[0] = dist as usize + 1;
                self.state.update_match();
            }
            len
        };

        if update {
            lzma_trace!("Match: len {}, dist {}", len, self.rep[0]);
            let copied = self.dict.copy_match(self.rep[0], len)?;
            self.pending_len = len - copied;
        }
        Ok(Symbol::Decoded)
    }

    fn decode_literal<R: io::BufRead>(
        &mut self,
        rangecoder: &mut RangeDecoder<R>,
        update: bool,
    ) -> Result<u8, StepError> {
        let prev_byte = self.dict.last_or(0);
        let offset = model::literal_offset(&self.props, prev_byte, self.dict.len());
        let match_byte = if self.state.is_literal() {
            None
        } else {
            Some(self.dict.last_n(self.rep[0])?)
        };
        let probs = &mut self.model.literal_probs[offset..offset + 0x300];

        let mut result: usize = 1;
        if let Some(match_byte) = match_byte {
            let mut match_byte = match_byte as usize;
            while result < 0x100 {
                let match_bit = (match_byte >> 7) & 1;
                match_byte <<= 1;
                let bit = rangecoder
                    .decode_bit(&mut probs[((1 + match_bit) << 8) + result], update)?
                    as usize;
                result = (result << 1) ^ bit;
                if match_bit != bit {
                    break;
                }
            }
        }
        while result < 0x100 {
            result = (result << 1) ^ (rangecoder.decode_bit(&mut probs[result], update)? as usize);
        }
        Ok((result - 0x100) as u8)
    }

    /// Decode a zero-based distance.
    fn decode_distance<R: io::BufRead>(
        &mut self,
        rangecoder: &mut RangeDecoder<R>,
        len: usize,
        update: bool,
    ) -> Result<u32, StepError> {
        let len_state = model::len_to_pos_state(len);
        let pos_slot = self.model.pos_slot[len_state].parse(rangecoder, update)?;
        if pos_slot < START_POS_MODEL_INDEX as u32 {
            return Ok(pos_slot);
        }

        let num_direct_bits = (pos_slot >> 1) as usize - 1;
        let mut dist = (2 | (pos_slot & 1)) << num_direct_bits;
        if pos_slot < END_POS_MODEL_INDEX as u32 {
            dist += rangecoder.parse_reverse_bit_tree(
                num_direct_bits,
                &mut self.model.pos_decoders,
                (dist - pos_slot) as usize,
                update,
            )?;
        } else {
            dist += rangecoder.get(num_direct_bits - ALIGN_BITS)? << ALIGN_BITS;
            dist += self.model.align.parse_reverse(rangecoder, update)?;
        }
        Ok(dist)
    }

    #[cfg(test)]
    pub(crate) fn model(&self) -> &LzmaModel {
        &self.model
    }
}

#[derive(Debug)]
enum Sequence {
    /// Collecting the range coder initialization bytes.
    Init(heapless::Vec<u8, INIT_BYTES>),
    Decode,
    Finished,
    Failed(CodecError),
}

/// Incremental LZMA1 decoder for a raw LZMA bitstream, without any header.
///
/// Each call to [`decode`](LzmaDecoder::decode) consumes some input, writes
/// some output and reports why it stopped. Splitting the input or output
/// into arbitrary pieces yields the same bytes as a single call.
///
/// The stream ends either when `unpacked_size` bytes have been produced or
/// when the end marker is decoded. Without a known size the end marker is
/// required.
#[derive(Debug)]
pub struct LzmaDecoder {
    state: DecoderState,
    unpacked_size: Option<u64>,
    sequence: Sequence,
}

impl LzmaDecoder {
    /// Create a decoder. Dictionary sizes below 4096 are raised to 4096.
    pub fn new(properties: LzmaProperties, dict_size: u32, unpacked_size: Option<u64>) -> Self {
        lzma_info!(
            "LZMA decoder: {:?}, dict size {}, unpacked size {:?}",
            properties,
            dict_size,
            unpacked_size
        );
        Self {
            state: DecoderState::new(properties, dict_size),
            unpacked_size,
            sequence: Sequence::Init(heapless::Vec::new()),
        }
    }

    /// Like [`new`](LzmaDecoder::new), but fail with
    /// [`LzmaError::DictionaryTooLarge`] if the dictionary exceeds
    /// `memlimit` bytes.
    pub fn with_memlimit(
        properties: LzmaProperties,
        dict_size: u32,
        unpacked_size: Option<u64>,
        memlimit: usize,
    ) -> CodecResult<Self> {
        let needed = cmp::max(dict_size, DICT_SIZE_MIN) as usize;
        if needed > memlimit {
            return Err(LzmaError::DictionaryTooLarge {
                dict_size: needed,
                memlimit,
            }
            .into());
        }
        Ok(Self::new(properties, dict_size, unpacked_size))
    }

    /// Prepare for a new stream with the same parameters.
    pub fn reset(&mut self) {
        self.state.reset();
        self.sequence = Sequence::Init(heapless::Vec::new());
    }

    /// Number of bytes produced so far.
    pub fn unpacked_len(&self) -> u64 {
        self.state.dict.len()
    }

    /// Declared number of bytes the stream decodes to.
    pub fn unpacked_size(&self) -> Option<u64> {
        self.unpacked_size
    }

    /// Whether the end of the stream was reached.
    pub fn is_finished(&self) -> bool {
        matches!(self.sequence, Sequence::Finished)
    }

    /// Decode as much of `input` into `output` as possible.
    pub fn decode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        match &self.sequence {
            Sequence::Finished => return Ok(Progress::new(Status::Finished, 0, 0)),
            Sequence::Failed(e) => return Err(e.clone()),
            _ => {}
        }
        let result = self.decode_inner(input, output);
        if let Err(e) = &result {
            lzma_error!("LZMA decoding failed: {:?}", e);
            self.sequence = Sequence::Failed(e.clone());
        }
        result
    }

    fn decode_inner(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        let mut consumed = 0;
        let mut written = 0;

        if let Sequence::Init(bytes) = &mut self.sequence {
            let take = cmp::min(INIT_BYTES - bytes.len(), input.len());
            // Capacity was checked just above
            let _ = bytes.extend_from_slice(&input[..take]);
            consumed += take;
            if bytes.len() < INIT_BYTES {
                return Ok(Progress::new(Status::NeedMoreInput, consumed, 0));
            }
            self.state.init_range_coder(bytes)?;
            self.sequence = Sequence::Decode;
        }

        loop {
            let mut limit = output.len() - written;
            if let Some(unpacked_size) = self.unpacked_size {
                let remaining = unpacked_size - self.state.dict.len();
                if remaining == 0 {
                    lzma_debug!("Declared unpacked size reached");
                    self.sequence = Sequence::Finished;
                    return Ok(Progress::new(Status::Finished, consumed, written));
                }
                limit = cmp::min(limit as u64, remaining) as usize;
            }
            if limit == 0 {
                return Ok(Progress::new(Status::NeedMoreOutput, consumed, written));
            }

            self.state.dict.set_limit(limit);
            let (used, status) = self.state.process(&input[consumed..])?;
            consumed += used;
            written += self.state.dict.flush(&mut output[written..]);

            match status {
                ProcessingStatus::OutputFull => {}
                ProcessingStatus::NeedInput => {
                    return Ok(Progress::new(Status::NeedMoreInput, consumed, written))
                }
                ProcessingStatus::EndMarker => {
                    if let Some(unpacked_size) = self.unpacked_size {
                        return Err(LzmaError::EosFoundBeforeUnpackedSize {
                            unpacked_size,
                            decompressed_data: self.state.dict.len(),
                        }
                        .into());
                    }
                    if !self.state.is_rc_finished() {
                        return Err(LzmaError::RangeCoderNotDrained.into());
                    }
                    self.sequence = Sequence::Finished;
                    return Ok(Progress::new(Status::Finished, consumed, written));
                }
            }
        }
    }
}
