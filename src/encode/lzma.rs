use crate::decode::lzbuffer::LzCircularBuffer;
use crate::decode::lzma::DICT_SIZE_MIN;
use crate::encode::rangecoder::RangeEncoder;
use crate::error::lzma::LzmaError;
use crate::error::{CodecError, CodecResult};
use crate::model::{self, LzmaModel, State, END_MARKER_DISTANCE};
use crate::model::{ALIGN_BITS, END_POS_MODEL_INDEX, MATCH_MAX_LEN, MATCH_MIN_LEN};
use crate::model::START_POS_MODEL_INDEX;
use crate::params::LzmaProperties;
use crate::progress::{Progress, Status};
use alloc::vec::Vec;
use core::cmp;

/// One token of an LZMA stream, chosen by the caller.
///
/// Distances are 1-based: a distance of 1 repeats the previous byte.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Op {
    /// A single byte.
    Literal(u8),
    /// Repeat `len` bytes found `distance` bytes back.
    Match {
        /// 1..=dictionary size, and at most the number of bytes produced.
        distance: u32,
        /// 2..=273
        len: u32,
    },
    /// Repeat `len` bytes at one of the four most recent match distances.
    Rep {
        /// 0 is the most recent distance.
        index: usize,
        /// 2..=273
        len: u32,
    },
    /// Repeat one byte at the most recent match distance.
    ShortRep,
}

impl Op {
    /// Number of bytes this token expands to.
    pub fn unpacked_len(&self) -> u64 {
        match *self {
            Op::Literal(_) | Op::ShortRep => 1,
            Op::Match { len, .. } | Op::Rep { len, .. } => len as u64,
        }
    }
}

/// Mirror of the decoder state on the encoding side: the same models,
/// automaton and rep distances, plus the produced bytes needed for literal
/// contexts and validation.
#[derive(Debug)]
pub struct EncoderState {
    pub(crate) props: LzmaProperties,
    model: LzmaModel,
    state: State,
    rep: [usize; 4],
    dict: LzCircularBuffer,
    // Produced bytes are appended here while set
    captured: Option<Vec<u8>>,
}

impl EncoderState {
    pub fn new(props: LzmaProperties, dict_size: u32) -> Self {
        let dict_size = cmp::max(dict_size, DICT_SIZE_MIN);
        Self {
            props,
            model: LzmaModel::new(&props),
            state: State::new(),
            rep: [1; 4],
            dict: LzCircularBuffer::new(dict_size as usize),
            captured: None,
        }
    }

    pub fn reset_state(&mut self) {
        lzma_debug!("Resetting LZMA encoder state with {:?}", self.props);
        self.model.reset(&self.props);
        self.state = State::new();
        self.rep = [1; 4];
    }

    pub fn set_props(&mut self, props: LzmaProperties) {
        self.props = props;
        self.reset_state();
    }

    pub fn reset_dict(&mut self) {
        self.dict.reset();
    }

    pub fn reset(&mut self) {
        self.reset_dict();
        self.reset_state();
        if let Some(captured) = &mut self.captured {
            captured.clear();
        }
    }

    /// Number of bytes produced since the last dictionary reset.
    pub fn processed(&self) -> u64 {
        self.dict.len()
    }

    /// Start or stop collecting the bytes produced by each operation.
    pub fn set_capture(&mut self, capture: bool) {
        self.captured = if capture { Some(Vec::new()) } else { None };
    }

    /// Take the bytes collected since the last call.
    pub fn take_captured(&mut self) -> Vec<u8> {
        match &mut self.captured {
            Some(captured) => core::mem::take(captured),
            None => Vec::new(),
        }
    }

    /// Check that `op` can be expressed at the current position.
    pub fn validate(&self, op: &Op) -> Result<(), LzmaError> {
        match *op {
            Op::Literal(_) => Ok(()),
            Op::Match { distance, len } => {
                check_len(len)?;
                if distance == 0 {
                    return Err(LzmaError::InvalidMatchDistance { distance });
                }
                self.dict.last_n(distance as usize).map(|_| ())
            }
            Op::Rep { index, len } => {
                check_len(len)?;
                if index >= self.rep.len() {
                    return Err(LzmaError::InvalidRepIndex { index });
                }
                self.dict.last_n(self.rep[index]).map(|_| ())
            }
            Op::ShortRep => self.dict.last_n(self.rep[0]).map(|_| ()),
        }
    }

    /// Encode one operation after checking it.
    pub fn encode_op(&mut self, rangecoder: &mut RangeEncoder, op: &Op) -> Result<(), LzmaError> {
        self.validate(op)?;
        self.encode_op_unchecked(rangecoder, op)
    }

    /// Apply an operation to the dictionary and the rep distances without
    /// producing any bits, for data stored in copy chunks.
    pub fn apply_op(&mut self, op: &Op) -> Result<(), LzmaError> {
        self.validate(op)?;
        self.apply(op)
    }

    pub(crate) fn encode_op_unchecked(
        &mut self,
        rangecoder: &mut RangeEncoder,
        op: &Op,
    ) -> Result<(), LzmaError> {
        self.emit(rangecoder, op)?;
        self.apply(op)
    }

    /// Encode the end of stream marker.
    pub fn encode_end_marker(&mut self, rangecoder: &mut RangeEncoder) {
        lzma_debug!("Writing end marker");
        let pos_state = model::pos_state(&self.props, self.dict.len());
        let state = self.state.index();
        rangecoder.encode_bit(&mut self.model.is_match[(state << 4) + pos_state], true);
        rangecoder.encode_bit(&mut self.model.is_rep[state], false);
        self.model.len.encode(rangecoder, MATCH_MIN_LEN, pos_state);
        self.encode_distance(rangecoder, END_MARKER_DISTANCE, MATCH_MIN_LEN);
    }

    fn emit(&mut self, rangecoder: &mut RangeEncoder, op: &Op) -> Result<(), LzmaError> {
        let pos_state = model::pos_state(&self.props, self.dict.len());
        let state = self.state.index();
        let ctx = (state << 4) + pos_state;

        match *op {
            Op::Literal(byte) => {
                rangecoder.encode_bit(&mut self.model.is_match[ctx], false);
                self.encode_literal(rangecoder, byte)?;
            }
            Op::Match { distance, len } => {
                rangecoder.encode_bit(&mut self.model.is_match[ctx], true);
                rangecoder.encode_bit(&mut self.model.is_rep[state], false);
                self.model.len.encode(rangecoder, len as usize, pos_state);
                self.encode_distance(rangecoder, distance - 1, len as usize);
            }
            Op::Rep { index, len } => {
                rangecoder.encode_bit(&mut self.model.is_match[ctx], true);
                rangecoder.encode_bit(&mut self.model.is_rep[state], true);
                if index == 0 {
                    rangecoder.encode_bit(&mut self.model.is_rep_g0[state], false);
                    rangecoder.encode_bit(&mut self.model.is_rep_0long[ctx], true);
                } else {
                    rangecoder.encode_bit(&mut self.model.is_rep_g0[state], true);
                    if index == 1 {
                        rangecoder.encode_bit(&mut self.model.is_rep_g1[state], false);
                    } else {
                        rangecoder.encode_bit(&mut self.model.is_rep_g1[state], true);
                        rangecoder.encode_bit(&mut self.model.is_rep_g2[state], index == 3);
                    }
                }
                self.model.rep_len.encode(rangecoder, len as usize, pos_state);
            }
            Op::ShortRep => {
                rangecoder.encode_bit(&mut self.model.is_match[ctx], true);
                rangecoder.encode_bit(&mut self.model.is_rep[state], true);
                rangecoder.encode_bit(&mut self.model.is_rep_g0[state], false);
                rangecoder.encode_bit(&mut self.model.is_rep_0long[ctx], false);
            }
        }
        Ok(())
    }

    fn encode_literal(&mut self, rangecoder: &mut RangeEncoder, byte: u8) -> Result<(), LzmaError> {
        let prev_byte = self.dict.last_or(0);
        let offset = model::literal_offset(&self.props, prev_byte, self.dict.len());
        let mut match_byte = if self.state.is_literal() {
            None
        } else {
            Some(self.dict.last_n(self.rep[0])?)
        };
        let probs = &mut self.model.literal_probs[offset..offset + 0x300];

        let mut result: usize = 1;
        for i in (0..8).rev() {
            let bit = ((byte >> i) & 1) as usize;
            match match_byte {
                Some(matched) => {
                    let match_bit = ((matched >> i) & 1) as usize;
                    rangecoder.encode_bit(&mut probs[((1 + match_bit) << 8) + result], bit != 0);
                    if match_bit != bit {
                        match_byte = None;
                    }
                }
                None => rangecoder.encode_bit(&mut probs[result], bit != 0),
            }
            result = (result << 1) ^ bit;
        }
        Ok(())
    }

    /// Encode a zero-based distance.
    fn encode_distance(&mut self, rangecoder: &mut RangeEncoder, dist: u32, len: usize) {
        let pos_slot = model::pos_slot(dist);
        self.model.pos_slot[model::len_to_pos_state(len)].encode(rangecoder, pos_slot);
        if pos_slot < START_POS_MODEL_INDEX as u32 {
            return;
        }

        let num_direct_bits = (pos_slot >> 1) as usize - 1;
        let base = (2 | (pos_slot & 1)) << num_direct_bits;
        let reduced = dist - base;
        if pos_slot < END_POS_MODEL_INDEX as u32 {
            rangecoder.encode_reverse_bit_tree(
                num_direct_bits,
                &mut self.model.pos_decoders,
                (base - pos_slot) as usize,
                reduced,
            );
        } else {
            rangecoder.encode_direct_bits(reduced >> ALIGN_BITS, num_direct_bits - ALIGN_BITS);
            self.model
                .align
                .encode_reverse(rangecoder, reduced & ((1 << ALIGN_BITS) - 1));
        }
    }

    /// Update the automaton, the rep distances and the dictionary.
    fn apply(&mut self, op: &Op) -> Result<(), LzmaError> {
        match *op {
            Op::Literal(byte) => {
                self.state.update_literal();
                self.record_byte(byte);
            }
            Op::Match { distance, len } => {
                self.rep.copy_within(0..3, 1);
                self.rep[0] = distance as usize;
                self.state.update_match();
                self.record_match(distance as usize, len as usize)?;
            }
            Op::Rep { index, len } => {
                let dist = self.rep[index];
                self.rep.copy_within(0..index, 1);
                self.rep[0] = dist;
                self.state.update_rep();
                self.record_match(dist, len as usize)?;
            }
            Op::ShortRep => {
                let byte = self.dict.last_n(self.rep[0])?;
                self.state.update_short_rep();
                self.record_byte(byte);
            }
        }
        Ok(())
    }

    fn record_byte(&mut self, byte: u8) {
        self.dict.set_limit(1);
        self.dict.put_byte(byte);
        self.release();
    }

    fn record_match(&mut self, dist: usize, len: usize) -> Result<(), LzmaError> {
        let mut remaining = len;
        while remaining > 0 {
            self.dict.set_limit(remaining);
            remaining -= self.dict.copy_match(dist, remaining)?;
            self.release();
        }
        Ok(())
    }

    fn release(&mut self) {
        match &mut self.captured {
            Some(captured) => {
                let mut scratch = [0u8; MATCH_MAX_LEN];
                let count = self.dict.flush(&mut scratch);
                captured.extend_from_slice(&scratch[..count]);
            }
            None => {
                self.dict.discard();
            }
        }
    }
}

fn check_len(len: u32) -> Result<(), LzmaError> {
    if (MATCH_MIN_LEN as u32..=MATCH_MAX_LEN as u32).contains(&len) {
        Ok(())
    } else {
        Err(LzmaError::InvalidMatchLength { len })
    }
}

#[derive(Debug)]
enum Sequence {
    Encode,
    /// The range coder was flushed; draining the last bytes.
    Flush,
    Finished,
    Failed(CodecError),
}

/// Incremental LZMA1 encoder producing a raw LZMA bitstream, without any
/// header.
///
/// The caller supplies the tokens: either explicit [`Op`]s or plain bytes,
/// which are encoded as literals.
#[derive(Debug)]
pub struct LzmaEncoder {
    state: EncoderState,
    rangecoder: RangeEncoder,
    unpacked_size: Option<u64>,
    write_end_marker: bool,
    sequence: Sequence,
}

impl LzmaEncoder {
    /// Create an encoder. Without an `unpacked_size` the end marker is always
    /// written.
    pub fn new(
        properties: LzmaProperties,
        dict_size: u32,
        unpacked_size: Option<u64>,
        write_end_marker: bool,
    ) -> Self {
        lzma_info!(
            "LZMA encoder: {:?}, dict size {}, unpacked size {:?}, end marker {}",
            properties,
            dict_size,
            unpacked_size,
            write_end_marker
        );
        Self {
            state: EncoderState::new(properties, dict_size),
            rangecoder: RangeEncoder::new(),
            unpacked_size,
            write_end_marker: write_end_marker || unpacked_size.is_none(),
            sequence: Sequence::Encode,
        }
    }

    /// Prepare for a new stream with the same parameters.
    pub fn reset(&mut self) {
        self.state.reset();
        self.rangecoder.reset();
        self.sequence = Sequence::Encode;
    }

    /// Number of bytes encoded so far.
    pub fn processed(&self) -> u64 {
        self.state.processed()
    }

    /// Encode `ops`, returning how many were consumed and how many bytes
    /// were written.
    pub fn encode_ops(&mut self, ops: &[Op], output: &mut [u8]) -> CodecResult<Progress> {
        self.run(ops.len(), |i| ops[i], output)
    }

    /// Encode `input` as literals.
    pub fn encode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        self.run(input.len(), |i| Op::Literal(input[i]), output)
    }

    fn run<F>(&mut self, count: usize, op_at: F, output: &mut [u8]) -> CodecResult<Progress>
    where
        F: Fn(usize) -> Op,
    {
        match &self.sequence {
            Sequence::Encode => {}
            Sequence::Failed(e) => return Err(e.clone()),
            Sequence::Flush | Sequence::Finished => return self.finish(output),
        }
        let result = self.run_inner(count, op_at, output);
        if let Err(e) = &result {
            lzma_error!("LZMA encoding failed: {:?}", e);
            self.sequence = Sequence::Failed(e.clone());
        }
        result
    }

    fn run_inner<F>(&mut self, count: usize, op_at: F, output: &mut [u8]) -> CodecResult<Progress>
    where
        F: Fn(usize) -> Op,
    {
        let mut consumed = 0;
        let mut written = 0;
        loop {
            written += self.rangecoder.drain_into(&mut output[written..]);
            if self.rangecoder.pending_len() > 0 {
                return Ok(Progress::new(Status::NeedMoreOutput, consumed, written));
            }
            if consumed == count {
                return Ok(Progress::new(Status::Ok, consumed, written));
            }
            let room = output.len() - written;
            if room == 0 {
                return Ok(Progress::new(Status::NeedMoreOutput, consumed, written));
            }
            while consumed < count && self.rangecoder.pending_len() <= room {
                let op = op_at(consumed);
                if let Some(unpacked_size) = self.unpacked_size {
                    if self.state.processed() + op.unpacked_len() > unpacked_size {
                        return Err(LzmaError::UnpackedSizeExceeded { unpacked_size }.into());
                    }
                }
                self.state.encode_op(&mut self.rangecoder, &op)?;
                consumed += 1;
            }
        }
    }

    /// End the stream and drain the remaining bytes. Call again with a fresh
    /// output window until it reports [`Status::Finished`].
    pub fn finish(&mut self, output: &mut [u8]) -> CodecResult<Progress> {
        match &self.sequence {
            Sequence::Encode => {
                if let Some(unpacked_size) = self.unpacked_size {
                    let processed = self.state.processed();
                    if processed != unpacked_size {
                        let e: CodecError = LzmaError::UnpackedSizeNotReached {
                            unpacked_size,
                            processed,
                        }
                        .into();
                        lzma_error!("LZMA encoding failed: {:?}", e);
                        self.sequence = Sequence::Failed(e.clone());
                        return Err(e);
                    }
                }
                if self.write_end_marker {
                    self.state.encode_end_marker(&mut self.rangecoder);
                }
                self.rangecoder.finish();
                self.sequence = Sequence::Flush;
            }
            Sequence::Flush => {}
            Sequence::Finished => return Ok(Progress::new(Status::Finished, 0, 0)),
            Sequence::Failed(e) => return Err(e.clone()),
        }

        let written = self.rangecoder.drain_into(output);
        if self.rangecoder.pending_len() > 0 {
            return Ok(Progress::new(Status::NeedMoreOutput, 0, written));
        }
        self.sequence = Sequence::Finished;
        Ok(Progress::new(Status::Finished, 0, written))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decode::lzma::LzmaDecoder;

    fn encode_all(encoder: &mut LzmaEncoder, ops: &[Op], out_step: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = alloc::vec![0u8; out_step];
        let mut ops = ops;
        loop {
            let progress = encoder.encode_ops(ops, &mut buf).unwrap();
            out.extend_from_slice(&buf[..progress.written]);
            ops = &ops[progress.consumed..];
            if progress.status == Status::Ok {
                break;
            }
        }
        loop {
            let progress = encoder.finish(&mut buf).unwrap();
            out.extend_from_slice(&buf[..progress.written]);
            if progress.is_finished() {
                return out;
            }
        }
    }

    fn decode(props: LzmaProperties, stream: &[u8], unpacked_size: Option<u64>) -> Vec<u8> {
        let mut decoder = LzmaDecoder::new(props, 1 << 16, unpacked_size);
        let mut out = alloc::vec![0u8; 1 << 16];
        let progress = decoder.decode(stream, &mut out).unwrap();
        assert!(progress.is_finished());
        assert_eq!(progress.consumed, stream.len());
        out.truncate(progress.written);
        out
    }

    #[test]
    fn output_chunking_is_transparent() {
        let props = LzmaProperties::default();
        let ops: Vec<Op> = b"the quick brown fox jumps over the lazy dog"
            .iter()
            .map(|&b| Op::Literal(b))
            .chain(core::iter::once(Op::Match {
                distance: 44,
                len: 44,
            }))
            .collect();
        let mut reference = LzmaEncoder::new(props, 4096, Some(88), false);
        let expected = encode_all(&mut reference, &ops, 1 << 12);
        for &out_step in &[1, 2, 5, 64] {
            let mut encoder = LzmaEncoder::new(props, 4096, Some(88), false);
            assert_eq!(encode_all(&mut encoder, &ops, out_step), expected);
        }
        let decoded = decode(props, &expected, Some(88));
        assert_eq!(&decoded[..44], b"the quick brown fox jumps over the lazy dog");
        assert_eq!(&decoded[..44], &decoded[44..]);
    }

    #[test]
    fn literal_only() {
        let props = LzmaProperties::new(0, 0, 0).unwrap();
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 17) as u8 ^ (i / 100) as u8).collect();
        let mut encoder = LzmaEncoder::new(props, 4096, None, true);
        let mut stream = Vec::new();
        let mut buf = [0u8; 100];
        let mut input = &data[..];
        while !input.is_empty() {
            let progress = encoder.encode(input, &mut buf).unwrap();
            stream.extend_from_slice(&buf[..progress.written]);
            input = &input[progress.consumed..];
        }
        loop {
            let progress = encoder.finish(&mut buf).unwrap();
            stream.extend_from_slice(&buf[..progress.written]);
            if progress.is_finished() {
                break;
            }
        }
        assert_eq!(decode(props, &stream, None), data);
    }

    #[test]
    fn invalid_ops_are_rejected_before_encoding() {
        let props = LzmaProperties::default();
        let mut out = [0u8; 64];

        let mut encoder = LzmaEncoder::new(props, 4096, None, true);
        assert_eq!(
            encoder.encode_ops(&[Op::ShortRep], &mut out),
            Err(LzmaError::MatchDistanceIsBeyondOutputSize {
                distance: 1,
                output_len: 0
            }
            .into())
        );
        // Sticky
        assert!(encoder.encode_ops(&[Op::Literal(0)], &mut out).is_err());
        assert!(encoder.finish(&mut out).is_err());

        let mut encoder = LzmaEncoder::new(props, 4096, None, true);
        let ops = [Op::Literal(1), Op::Match { distance: 1, len: 1 }];
        assert_eq!(
            encoder.encode_ops(&ops, &mut out),
            Err(LzmaError::InvalidMatchLength { len: 1 }.into())
        );

        let mut encoder = LzmaEncoder::new(props, 4096, None, true);
        let ops = [Op::Literal(1), Op::Match { distance: 1, len: 274 }];
        assert!(encoder.encode_ops(&ops, &mut out).is_err());

        let mut encoder = LzmaEncoder::new(props, 4096, None, true);
        let ops = [Op::Literal(1), Op::Rep { index: 4, len: 2 }];
        assert_eq!(
            encoder.encode_ops(&ops, &mut out),
            Err(LzmaError::InvalidRepIndex { index: 4 }.into())
        );

        let mut encoder = LzmaEncoder::new(props, 4096, None, true);
        let ops = [Op::Literal(1), Op::Match { distance: 0, len: 2 }];
        assert_eq!(
            encoder.encode_ops(&ops, &mut out),
            Err(LzmaError::InvalidMatchDistance { distance: 0 }.into())
        );

        let mut encoder = LzmaEncoder::new(props, 4096, None, true);
        let ops = [Op::Literal(1), Op::Match { distance: 4097, len: 2 }];
        assert_eq!(
            encoder.encode_ops(&ops, &mut out),
            Err(LzmaError::MatchDistanceIsBeyondDictionarySize {
                distance: 4097,
                dict_size: 4096
            }
            .into())
        );
    }

    #[test]
    fn declared_size_is_enforced() {
        let props = LzmaProperties::default();
        let mut out = [0u8; 64];

        let mut encoder = LzmaEncoder::new(props, 4096, Some(2), false);
        assert_eq!(
            encoder.encode(b"abc", &mut out),
            Err(LzmaError::UnpackedSizeExceeded { unpacked_size: 2 }.into())
        );

        let mut encoder = LzmaEncoder::new(props, 4096, Some(2), false);
        assert_eq!(encoder.encode(b"a", &mut out).unwrap().consumed, 1);
        assert_eq!(
            encoder.finish(&mut out),
            Err(LzmaError::UnpackedSizeNotReached {
                unpacked_size: 2,
                processed: 1
            }
            .into())
        );

        encoder.reset();
        let progress = encoder.encode(b"ab", &mut out).unwrap();
        assert_eq!(progress.status, Status::Ok);
        let progress = encoder.finish(&mut out[progress.written..]).unwrap();
        assert!(progress.is_finished());
        assert_eq!(encoder.finish(&mut out).unwrap(), Progress::new(Status::Finished, 0, 0));
    }

    #[test]
    fn capture_produced_bytes() {
        let mut state = EncoderState::new(LzmaProperties::default(), 4096);
        state.set_capture(true);
        for op in &[
            Op::Literal(b'x'),
            Op::Literal(b'y'),
            Op::Match { distance: 2, len: 5 },
            Op::ShortRep,
        ] {
            state.apply_op(op).unwrap();
        }
        assert_eq!(state.take_captured(), b"xyxyxyxy");
        assert_eq!(state.processed(), 8);
        assert!(state.take_captured().is_empty());
    }
}
