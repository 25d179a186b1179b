use crate::decode::lzma2::{ChunkHeader, ChunkReset, CHUNK_HEADER_MAX_LEN};
use crate::decode::lzma2::{CHUNK_PACKED_MAX, CHUNK_UNPACKED_MAX};
use crate::encode::lzma::{EncoderState, Op};
use crate::encode::options::{ChunkMode, Lzma2Options};
use crate::encode::rangecoder::RangeEncoder;
use crate::error::{CodecError, CodecResult};
use crate::model::MATCH_MAX_LEN;
use crate::params::{self, LzmaProperties};
use crate::progress::{Progress, Status};
use alloc::vec::Vec;
use core::cmp;

// Upper bound on the range coder bytes one operation can add
const OP_PACKED_MAX: u64 = 32;

#[derive(Debug)]
enum Sequence {
    Encode,
    /// The end of stream chunk was queued; draining.
    Flush,
    Finished,
    Failed(CodecError),
}

/// Incremental LZMA2 encoder.
///
/// Operations are gathered into chunks of at most `chunk_size` unpacked
/// bytes. The reset carried by a chunk header is decided when the chunk is
/// opened, so [`reset_state`](Lzma2Encoder::reset_state) and
/// [`set_properties`](Lzma2Encoder::set_properties) close the current chunk.
#[derive(Debug)]
pub struct Lzma2Encoder {
    state: EncoderState,
    rangecoder: RangeEncoder,
    properties: LzmaProperties,
    dict_size: u32,
    mode: ChunkMode,
    chunk_size: usize,
    // Reset of the open chunk, if any
    chunk: Option<ChunkReset>,
    chunk_unpacked: usize,
    need_dict_reset: bool,
    need_props: bool,
    need_state_reset: bool,
    // Finished chunks waiting to be handed out
    pending: Vec<u8>,
    drained: usize,
    sequence: Sequence,
}

impl Lzma2Encoder {
    /// Create an encoder.
    pub fn new(options: &Lzma2Options) -> Self {
        let chunk_size = cmp::min(cmp::max(options.chunk_size, MATCH_MAX_LEN), CHUNK_UNPACKED_MAX);
        let chunk_size = match options.mode {
            ChunkMode::Lzma => chunk_size,
            ChunkMode::Copy => cmp::min(chunk_size, CHUNK_PACKED_MAX),
        };
        lzma_info!(
            "LZMA2 encoder: {:?}, dict size {}, {:?} chunks of {} bytes",
            options.properties,
            options.dict_size,
            options.mode,
            chunk_size
        );
        let mut state = EncoderState::new(options.properties, options.dict_size);
        state.set_capture(true);
        Self {
            state,
            rangecoder: RangeEncoder::new(),
            properties: options.properties,
            dict_size: options.dict_size,
            mode: options.mode,
            chunk_size,
            chunk: None,
            chunk_unpacked: 0,
            need_dict_reset: true,
            need_props: true,
            need_state_reset: true,
            pending: Vec::new(),
            drained: 0,
            sequence: Sequence::Encode,
        }
    }

    /// Prepare for a new stream with the same options.
    pub fn reset(&mut self) {
        self.state.reset();
        self.rangecoder.reset();
        self.chunk = None;
        self.chunk_unpacked = 0;
        self.need_dict_reset = true;
        self.need_props = true;
        self.need_state_reset = true;
        self.pending.clear();
        self.drained = 0;
        self.sequence = Sequence::Encode;
    }

    /// Dictionary size property to store next to the stream.
    pub fn dict_size_prop(&self) -> u8 {
        params::lzma2_dict_size_prop(self.dict_size)
    }

    /// Close the current chunk and reset the LZMA state at the start of the
    /// next one.
    pub fn reset_state(&mut self) {
        self.flush_chunk();
        self.need_state_reset = true;
    }

    /// Close the current chunk and switch to `properties` from the next one
    /// on.
    pub fn set_properties(&mut self, properties: LzmaProperties) {
        self.flush_chunk();
        self.properties = properties;
        self.need_props = true;
    }

    /// Close the current chunk. Its bytes are handed out by the next call to
    /// [`encode`](Lzma2Encoder::encode), [`encode_ops`](Lzma2Encoder::encode_ops)
    /// or [`finish`](Lzma2Encoder::finish).
    pub fn flush_chunk(&mut self) {
        let reset = match self.chunk.take() {
            Some(reset) => reset,
            None => return,
        };
        let raw = self.state.take_captured();
        self.chunk_unpacked = 0;
        if self.mode == ChunkMode::Copy {
            self.write_copy_chunks(&raw, reset == ChunkReset::All);
            return;
        }

        self.rangecoder.finish();
        let packed = self.rangecoder.take_all();
        if packed.len() > CHUNK_PACKED_MAX || packed.len() >= raw.len() {
            lzma_debug!(
                "LZMA chunk of {} bytes packs into {}, storing it",
                raw.len(),
                packed.len()
            );
            self.write_copy_chunks(&raw, reset == ChunkReset::All);
            // The decoder never saw this chunk's properties nor its state
            self.need_props |= reset.has_properties();
            self.need_state_reset = true;
            return;
        }

        let header = ChunkHeader::Lzma {
            reset,
            unpacked_size: raw.len(),
            packed_size: packed.len(),
            properties: if reset.has_properties() {
                Some(self.properties)
            } else {
                None
            },
        };
        lzma_debug!("Emitting {:?}", header);
        self.write_header(&header);
        self.pending.extend_from_slice(&packed);
    }

    fn write_header(&mut self, header: &ChunkHeader) {
        let mut bytes = heapless::Vec::<u8, CHUNK_HEADER_MAX_LEN>::new();
        header.write(&mut bytes);
        self.pending.extend_from_slice(&bytes);
    }

    fn write_copy_chunks(&mut self, raw: &[u8], mut reset_dict: bool) {
        for piece in raw.chunks(CHUNK_PACKED_MAX) {
            let header = ChunkHeader::Uncompressed {
                reset_dict,
                unpacked_size: piece.len(),
            };
            lzma_debug!("Emitting {:?}", header);
            self.write_header(&header);
            self.pending.extend_from_slice(piece);
            if reset_dict {
                // A dictionary reset must be followed by new properties
                self.need_props = true;
                reset_dict = false;
            }
        }
    }

    fn open_chunk(&mut self) {
        let reset = if self.need_dict_reset {
            self.state.reset_dict();
            self.state.set_props(self.properties);
            ChunkReset::All
        } else if self.need_props {
            self.state.set_props(self.properties);
            ChunkReset::StateAndProperties
        } else if self.need_state_reset {
            self.state.reset_state();
            ChunkReset::State
        } else {
            ChunkReset::Nothing
        };
        lzma_trace!("Opening chunk with reset {:?}", reset);
        self.need_dict_reset = false;
        if self.mode == ChunkMode::Lzma {
            self.need_props = false;
            self.need_state_reset = false;
        }
        self.rangecoder.reset();
        self.chunk = Some(reset);
    }

    fn push_op(&mut self, op: &Op) -> CodecResult<()> {
        let len = op.unpacked_len() as usize;
        if self.chunk.is_some() {
            let full = self.chunk_unpacked + len > self.chunk_size
                || (self.mode == ChunkMode::Lzma
                    && self.rangecoder.finished_len() + OP_PACKED_MAX > CHUNK_PACKED_MAX as u64);
            if full {
                self.flush_chunk();
            }
        }
        if self.chunk.is_none() {
            self.open_chunk();
        }
        match self.mode {
            ChunkMode::Lzma => self.state.encode_op(&mut self.rangecoder, op)?,
            ChunkMode::Copy => self.state.apply_op(op)?,
        }
        self.chunk_unpacked += len;
        Ok(())
    }

    fn pending_len(&self) -> usize {
        self.pending.len() - self.drained
    }

    fn drain_into(&mut self, output: &mut [u8]) -> usize {
        let count = cmp::min(output.len(), self.pending_len());
        output[..count].copy_from_slice(&self.pending[self.drained..self.drained + count]);
        self.drained += count;
        if self.drained == self.pending.len() {
            self.pending.clear();
            self.drained = 0;
        }
        count
    }

    /// Encode `ops`, returning how many were consumed and how many bytes
    /// were written.
    pub fn encode_ops(&mut self, ops: &[Op], output: &mut [u8]) -> CodecResult<Progress> {
        self.run(ops.len(), |i| ops[i], output)
    }

    /// Encode `input`: as literals in LZMA mode, verbatim in copy mode.
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
        let mut consumed = 0;
        let mut written = 0;
        loop {
            written += self.drain_into(&mut output[written..]);
            if self.pending_len() > 0 {
                return Ok(Progress::new(Status::NeedMoreOutput, consumed, written));
            }
            if consumed == count {
                return Ok(Progress::new(Status::Ok, consumed, written));
            }
            while consumed < count && self.pending_len() == 0 {
                if let Err(e) = self.push_op(&op_at(consumed)) {
                    lzma_error!("LZMA2 encoding failed: {:?}", e);
                    self.sequence = Sequence::Failed(e.clone());
                    return Err(e);
                }
                consumed += 1;
            }
        }
    }

    /// Close the last chunk, append the end of stream chunk and drain. Call
    /// again with a fresh output window until it reports
    /// [`Status::Finished`].
    pub fn finish(&mut self, output: &mut [u8]) -> CodecResult<Progress> {
        match &self.sequence {
            Sequence::Encode => {
                self.flush_chunk();
                self.write_header(&ChunkHeader::End);
                self.sequence = Sequence::Flush;
            }
            Sequence::Flush => {}
            Sequence::Finished => return Ok(Progress::new(Status::Finished, 0, 0)),
            Sequence::Failed(e) => return Err(e.clone()),
        }
        let written = self.drain_into(output);
        if self.pending_len() > 0 {
            return Ok(Progress::new(Status::NeedMoreOutput, 0, written));
        }
        self.sequence = Sequence::Finished;
        Ok(Progress::new(Status::Finished, 0, written))
    }
}
