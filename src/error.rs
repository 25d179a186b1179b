//! Error handling.
#![allow(missing_docs)]

use crate::io;
use core::fmt;
use core::result;

pub mod lzma {
    /// Malformed LZMA data, or an operation an LZMA encoder cannot express.
    #[derive(Clone, PartialEq, Debug)]
    pub enum LzmaError {
        /// `properties` must be < 225
        InvalidProperties {
            invalid_properties: u8,
        },
        /// `lc + lp` must not exceed 8
        InvalidLiteralBits {
            lc: u32,
            lp: u32,
        },
        /// The dictionary does not fit in the configured memory limit
        DictionaryTooLarge {
            dict_size: usize,
            memlimit: usize,
        },
        /// The first range coder byte of a stream must be 0
        InvalidRangeCoderInit {
            first_byte: u8,
        },
        MatchDistanceIsBeyondDictionarySize {
            distance: usize,
            dict_size: usize,
        },
        MatchDistanceIsBeyondOutputSize {
            distance: usize,
            output_len: usize,
        },
        EosFoundBeforeUnpackedSize {
            unpacked_size: u64,
            decompressed_data: u64,
        },
        /// The end marker was decoded but the range coder code is not zero
        RangeCoderNotDrained,
        InvalidMatchLength {
            len: u32,
        },
        /// Match distances start at 1
        InvalidMatchDistance {
            distance: u32,
        },
        InvalidRepIndex {
            index: usize,
        },
        /// More operations were supplied than the declared unpacked size allows
        UnpackedSizeExceeded {
            unpacked_size: u64,
        },
        /// `finish` was called before the declared unpacked size was produced
        UnpackedSizeNotReached {
            unpacked_size: u64,
            processed: u64,
        },
    }
}

pub mod lzma2 {
    /// Malformed LZMA2 framing.
    #[derive(Clone, PartialEq, Debug)]
    pub enum Lzma2Error {
        /// Control bytes 0x03..=0x7F are reserved
        InvalidControlByte {
            control: u8,
        },
        /// Dictionary size properties above 40 are reserved
        InvalidDictionarySizeProperty {
            property: u8,
        },
        /// An LZMA chunk must at least hold the range coder init bytes
        PackedSizeTooSmall {
            packed_size: usize,
        },
        /// The chunk produced its unpacked size before consuming its packed size
        UnconsumedPackedData {
            remaining: usize,
        },
        /// The chunk consumed its packed size before producing its unpacked size
        PackedDataExhausted {
            remaining_unpacked: usize,
        },
        /// The chunk ended in the middle of a match
        PendingMatchAtChunkEnd {
            remaining: usize,
        },
        /// The chunk ended without the range coder being drained
        RangeCoderNotDrained,
        /// An LZMA1 end marker inside an LZMA2 chunk
        UnexpectedEndMarker,
    }
}

pub mod stream {
    #[derive(Clone, PartialEq, Debug)]
    pub enum StreamError {
        /// When `finish` is called and header parsing was never completed
        FailedToReadLzmaHeader,
        /// When `finish` is called before the end of the stream was reached
        StreamNotFinished,
        /// When `finish` is called but previous errors corrupted the stream
        /// state
        InvalidState,
    }
}

/// Correctly formed constructs this crate does not handle.
#[derive(Clone, PartialEq, Debug)]
pub enum Unsupported {
    /// The LZMA-Alone header declares an unknown (all 0xFF) unpacked size
    UnknownUnpackedSize,
    /// An LZMA2 LZMA chunk relies on properties but none were ever transmitted
    MissingProperties {
        control: u8,
    },
}

/// Fatal codec failures. Once a decoder or encoder reports one, it keeps
/// reporting it until it is reset.
#[derive(Clone, PartialEq, Debug)]
pub enum CodecError {
    Lzma(lzma::LzmaError),
    Lzma2(lzma2::Lzma2Error),
    Unsupported(Unsupported),
}

impl CodecError {
    /// Whether this error describes a malformed stream.
    pub fn is_invalid_data(&self) -> bool {
        matches!(self, CodecError::Lzma(_) | CodecError::Lzma2(_))
    }

    /// Whether this error describes a well-formed but unhandled construct.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CodecError::Unsupported(_))
    }
}

/// Library errors.
#[derive(Debug)]
pub enum Error {
    /// Codec failure.
    Codec(CodecError),
    /// I/O error.
    IoError(io::Error),
    /// Misuse of a stream helper.
    StreamError(stream::StreamError),
}

/// Library result alias.
pub type Result<T> = result::Result<T, Error>;

/// Result alias for the resumable coders.
pub type CodecResult<T> = result::Result<T, CodecError>;

impl From<lzma::LzmaError> for CodecError {
    fn from(e: lzma::LzmaError) -> Self {
        CodecError::Lzma(e)
    }
}

impl From<lzma2::Lzma2Error> for CodecError {
    fn from(e: lzma2::Lzma2Error) -> Self {
        CodecError::Lzma2(e)
    }
}

impl From<Unsupported> for CodecError {
    fn from(e: Unsupported) -> Self {
        CodecError::Unsupported(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<lzma::LzmaError> for Error {
    fn from(e: lzma::LzmaError) -> Self {
        Error::Codec(e.into())
    }
}

impl From<lzma2::Lzma2Error> for Error {
    fn from(e: lzma2::Lzma2Error) -> Self {
        Error::Codec(e.into())
    }
}

impl From<Unsupported> for Error {
    fn from(e: Unsupported) -> Self {
        Error::Codec(e.into())
    }
}

impl From<stream::StreamError> for Error {
    fn from(e: stream::StreamError) -> Self {
        Error::StreamError(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Lzma(e) => write!(fmt, "invalid LZMA data: {:?}", e),
            CodecError::Lzma2(e) => write!(fmt, "invalid LZMA2 data: {:?}", e),
            CodecError::Unsupported(e) => write!(fmt, "unsupported: {:?}", e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Codec(e) => write!(fmt, "{}", e),
            Error::IoError(e) => write!(fmt, "io error: {}", e),
            Error::StreamError(e) => write!(fmt, "stream error: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodecError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Codec(e) => Some(e),
            Error::IoError(e) => Some(e),
            Error::StreamError(_) => None,
        }
    }
}
