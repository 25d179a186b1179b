use crate::decode::lzma::{DecoderState, ProcessingStatus};
use crate::decode::rangecoder::INIT_BYTES;
use crate::error::lzma2::Lzma2Error;
use crate::error::{CodecError, CodecResult, Unsupported};
use crate::params::{self, LzmaProperties};
use crate::progress::{Progress, Status};
use byteorder::{BigEndian, ByteOrder};
use core::cmp;

/// Longest chunk header: control, two unpacked size bytes, two packed size
/// bytes and the properties byte.
pub const CHUNK_HEADER_MAX_LEN: usize = 6;

/// Largest unpacked size of one chunk.
pub const CHUNK_UNPACKED_MAX: usize = 1 << 21;

/// Largest packed size of one LZMA chunk, and unpacked size of a copy chunk.
pub const CHUNK_PACKED_MAX: usize = 1 << 16;

/// What an LZMA chunk resets before its data is decoded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChunkReset {
    /// Continue with the state, properties and dictionary of the previous
    /// chunk.
    Nothing,
    /// Reset the automaton and the probabilities.
    State,
    /// Reset the state and switch to new properties.
    StateAndProperties,
    /// Reset the state, switch to new properties and clear the dictionary.
    All,
}

impl ChunkReset {
    fn control_bits(self) -> u8 {
        match self {
            ChunkReset::Nothing => 0x80,
            ChunkReset::State => 0xA0,
            ChunkReset::StateAndProperties => 0xC0,
            ChunkReset::All => 0xE0,
        }
    }

    /// Whether the chunk header carries a properties byte.
    pub fn has_properties(self) -> bool {
        matches!(self, ChunkReset::StateAndProperties | ChunkReset::All)
    }
}

/// A parsed LZMA2 chunk header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChunkHeader {
    /// The 0x00 control byte terminating the stream.
    End,
    /// Raw bytes copied to the output.
    Uncompressed {
        /// Control byte 0x01: clear the dictionary first.
        reset_dict: bool,
        /// Number of raw bytes following the header.
        unpacked_size: usize,
    },
    /// One LZMA1 sub-stream.
    Lzma {
        /// What is reset before decoding.
        reset: ChunkReset,
        /// Number of bytes the chunk decodes to.
        unpacked_size: usize,
        /// Number of range coded bytes following the header.
        packed_size: usize,
        /// New properties, present with the property resetting kinds.
        properties: Option<LzmaProperties>,
    },
}

impl ChunkHeader {
    /// Length of the header introduced by `control`.
    pub fn len_for_control(control: u8) -> Result<usize, Lzma2Error> {
        match control {
            0x00 => Ok(1),
            0x01 | 0x02 => Ok(3),
            0x80..=0xBF => Ok(5),
            0xC0..=0xFF => Ok(6),
            _ => Err(Lzma2Error::InvalidControlByte { control }),
        }
    }

    /// Parse a complete header of [`ChunkHeader::len_for_control`] bytes.
    pub fn parse(bytes: &[u8]) -> CodecResult<Self> {
        let control = bytes[0];
        debug_assert_eq!(Some(bytes.len()), Self::len_for_control(control).ok());
        let header = match control {
            0x00 => ChunkHeader::End,
            0x01 | 0x02 => ChunkHeader::Uncompressed {
                reset_dict: control == 0x01,
                unpacked_size: BigEndian::read_u16(&bytes[1..3]) as usize + 1,
            },
            0x80..=0xFF => {
                let reset = match control & 0xE0 {
                    0x80 => ChunkReset::Nothing,
                    0xA0 => ChunkReset::State,
                    0xC0 => ChunkReset::StateAndProperties,
                    _ => ChunkReset::All,
                };
                let unpacked_size = (((control & 0x1F) as usize) << 16)
                    + BigEndian::read_u16(&bytes[1..3]) as usize
                    + 1;
                let packed_size = BigEndian::read_u16(&bytes[3..5]) as usize + 1;
                let properties = if reset.has_properties() {
                    Some(LzmaProperties::from_byte(bytes[5])?)
                } else {
                    None
                };
                ChunkHeader::Lzma {
                    reset,
                    unpacked_size,
                    packed_size,
                    properties,
                }
            }
            _ => return Err(Lzma2Error::InvalidControlByte { control }.into()),
        };
        Ok(header)
    }

    /// Serialize the header.
    pub fn write(&self, out: &mut heapless::Vec<u8, CHUNK_HEADER_MAX_LEN>) {
        let mut bytes = [0u8; CHUNK_HEADER_MAX_LEN];
        let len = match *self {
            ChunkHeader::End => 1,
            ChunkHeader::Uncompressed {
                reset_dict,
                unpacked_size,
            } => {
                debug_assert!(unpacked_size >= 1 && unpacked_size <= CHUNK_PACKED_MAX);
                bytes[0] = if reset_dict { 0x01 } else { 0x02 };
                BigEndian::write_u16(&mut bytes[1..3], (unpacked_size - 1) as u16);
                3
            }
            ChunkHeader::Lzma {
                reset,
                unpacked_size,
                packed_size,
                properties,
            } => {
                debug_assert!(unpacked_size >= 1 && unpacked_size <= CHUNK_UNPACKED_MAX);
                debug_assert!(packed_size >= 1 && packed_size <= CHUNK_PACKED_MAX);
                let unpacked = unpacked_size - 1;
                bytes[0] = reset.control_bits() | (unpacked >> 16) as u8;
                BigEndian::write_u16(&mut bytes[1..3], unpacked as u16);
                BigEndian::write_u16(&mut bytes[3..5], (packed_size - 1) as u16);
                match properties {
                    Some(props) => {
                        bytes[5] = props.to_byte();
                        6
                    }
                    None => 5,
                }
            }
        };
        out.clear();
        // A header is never longer than the buffer
        let _ = out.extend_from_slice(&bytes[..len]);
    }
}

#[derive(Debug)]
enum Sequence {
    Header(heapless::Vec<u8, CHUNK_HEADER_MAX_LEN>),
    Copy {
        remaining: usize,
    },
    RangeInit {
        unpacked: usize,
        packed: usize,
        bytes: heapless::Vec<u8, INIT_BYTES>,
    },
    Lzma {
        unpacked: usize,
        packed: usize,
    },
    Finished,
    Failed(CodecError),
}

/// Incremental LZMA2 decoder.
///
/// The dictionary, properties and LZMA state are carried from chunk to
/// chunk unless a chunk header asks for a reset.
#[derive(Debug)]
pub struct Lzma2Decoder {
    state: DecoderState,
    // Whether properties were ever transmitted
    has_props: bool,
    sequence: Sequence,
}

impl Lzma2Decoder {
    /// Create a decoder with a window of `dict_size` bytes.
    pub fn new(dict_size: u32) -> Self {
        lzma_info!("LZMA2 decoder: dict size {}", dict_size);
        Self {
            state: DecoderState::new(LzmaProperties::default(), dict_size),
            has_props: false,
            sequence: Sequence::Header(heapless::Vec::new()),
        }
    }

    /// Create a decoder from an LZMA2 dictionary size property (0..=40).
    pub fn from_dict_prop(prop: u8) -> CodecResult<Self> {
        Ok(Self::new(params::lzma2_dict_size(prop)?))
    }

    /// Prepare for a new stream.
    pub fn reset(&mut self) {
        self.state.reset();
        self.has_props = false;
        self.sequence = Sequence::Header(heapless::Vec::new());
    }

    /// Number of bytes produced since the last dictionary reset.
    pub fn unpacked_len(&self) -> u64 {
        self.state.dict.len()
    }

    /// Whether the end of stream chunk was reached.
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
            lzma_error!("LZMA2 decoding failed: {:?}", e);
            self.sequence = Sequence::Failed(e.clone());
        }
        result
    }

    fn decode_inner(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        let mut consumed = 0;
        let mut written = 0;

        loop {
            match &mut self.sequence {
                Sequence::Header(bytes) => {
                    if bytes.is_empty() {
                        match input.get(consumed) {
                            Some(&control) => {
                                // Fails only on a full buffer
                                let _ = bytes.push(control);
                                consumed += 1;
                            }
                            None => {
                                return Ok(Progress::new(Status::NeedMoreInput, consumed, written))
                            }
                        }
                    }
                    let header_len = ChunkHeader::len_for_control(bytes[0])?;
                    let take = cmp::min(header_len - bytes.len(), input.len() - consumed);
                    let _ = bytes.extend_from_slice(&input[consumed..consumed + take]);
                    consumed += take;
                    if bytes.len() < header_len {
                        return Ok(Progress::new(Status::NeedMoreInput, consumed, written));
                    }
                    let header = ChunkHeader::parse(bytes)?;
                    lzma_debug!("LZMA2 chunk: {:?}", header);
                    self.start_chunk(header)?;
                    if let Sequence::Finished = self.sequence {
                        return Ok(Progress::new(Status::Finished, consumed, written));
                    }
                }

                Sequence::Copy { remaining } => {
                    if *remaining == 0 {
                        self.sequence = Sequence::Header(heapless::Vec::new());
                        continue;
                    }
                    let room = output.len() - written;
                    if room == 0 {
                        return Ok(Progress::new(Status::NeedMoreOutput, consumed, written));
                    }
                    if consumed == input.len() {
                        return Ok(Progress::new(Status::NeedMoreInput, consumed, written));
                    }
                    let available = cmp::min(*remaining, input.len() - consumed);
                    self.state.dict.set_limit(cmp::min(room, *remaining));
                    let copied = self
                        .state
                        .dict
                        .put_slice(&input[consumed..consumed + available]);
                    consumed += copied;
                    *remaining -= copied;
                    written += self.state.dict.flush(&mut output[written..]);
                }

                Sequence::RangeInit {
                    unpacked,
                    packed,
                    bytes,
                } => {
                    let take = cmp::min(INIT_BYTES - bytes.len(), input.len() - consumed);
                    let _ = bytes.extend_from_slice(&input[consumed..consumed + take]);
                    consumed += take;
                    *packed -= take;
                    if bytes.len() < INIT_BYTES {
                        return Ok(Progress::new(Status::NeedMoreInput, consumed, written));
                    }
                    self.state.init_range_coder(bytes)?;
                    let (unpacked, packed) = (*unpacked, *packed);
                    self.sequence = Sequence::Lzma { unpacked, packed };
                }

                Sequence::Lzma { unpacked, packed } => {
                    if *unpacked == 0 {
                        Self::check_chunk_end(&self.state, *packed)?;
                        self.sequence = Sequence::Header(heapless::Vec::new());
                        continue;
                    }
                    let room = output.len() - written;
                    if room == 0 {
                        return Ok(Progress::new(Status::NeedMoreOutput, consumed, written));
                    }
                    let available = cmp::min(*packed, input.len() - consumed);
                    let before = self.state.dict.len();
                    self.state.dict.set_limit(cmp::min(room, *unpacked));
                    let (used, status) = self
                        .state
                        .process(&input[consumed..consumed + available])?;
                    consumed += used;
                    *packed -= used;
                    *unpacked -= (self.state.dict.len() - before) as usize;
                    written += self.state.dict.flush(&mut output[written..]);

                    match status {
                        ProcessingStatus::OutputFull => {}
                        ProcessingStatus::EndMarker => {
                            return Err(Lzma2Error::UnexpectedEndMarker.into())
                        }
                        ProcessingStatus::NeedInput => {
                            if *packed == 0 {
                                return Err(Lzma2Error::PackedDataExhausted {
                                    remaining_unpacked: *unpacked,
                                }
                                .into());
                            }
                            return Ok(Progress::new(Status::NeedMoreInput, consumed, written));
                        }
                    }
                }

                Sequence::Finished => {
                    return Ok(Progress::new(Status::Finished, consumed, written))
                }
                Sequence::Failed(e) => return Err(e.clone()),
            }
        }
    }

    /// Apply the resets of a freshly parsed header and pick the next
    /// sequence.
    fn start_chunk(&mut self, header: ChunkHeader) -> CodecResult<()> {
        self.sequence = match header {
            ChunkHeader::End => Sequence::Finished,
            ChunkHeader::Uncompressed {
                reset_dict,
                unpacked_size,
            } => {
                if reset_dict {
                    self.state.reset_dict();
                }
                Sequence::Copy {
                    remaining: unpacked_size,
                }
            }
            ChunkHeader::Lzma {
                reset,
                unpacked_size,
                packed_size,
                properties,
            } => {
                match (reset, properties) {
                    (ChunkReset::All, Some(props)) => {
                        self.state.reset_dict();
                        self.state.set_props(props);
                        self.has_props = true;
                    }
                    (ChunkReset::StateAndProperties, Some(props)) => {
                        self.state.set_props(props);
                        self.has_props = true;
                    }
                    _ => {
                        if !self.has_props {
                            return Err(Unsupported::MissingProperties {
                                control: reset.control_bits(),
                            }
                            .into());
                        }
                        if reset == ChunkReset::State {
                            self.state.reset_state();
                        }
                    }
                }
                if packed_size < INIT_BYTES {
                    return Err(Lzma2Error::PackedSizeTooSmall { packed_size }.into());
                }
                Sequence::RangeInit {
                    unpacked: unpacked_size,
                    packed: packed_size,
                    bytes: heapless::Vec::new(),
                }
            }
        };
        Ok(())
    }

    /// Check that an LZMA chunk that produced all of its bytes ended cleanly.
    fn check_chunk_end(state: &DecoderState, packed: usize) -> CodecResult<()> {
        if state.pending_len() > 0 {
            return Err(Lzma2Error::PendingMatchAtChunkEnd {
                remaining: state.pending_len(),
            }
            .into());
        }
        let remaining = packed + state.partial_input_len();
        if remaining > 0 {
            return Err(Lzma2Error::UnconsumedPackedData { remaining }.into());
        }
        if !state.is_rc_finished() {
            return Err(Lzma2Error::RangeCoderNotDrained.into());
        }
        Ok(())
    }
}
