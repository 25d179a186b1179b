//! Resumable LZMA and LZMA2 codecs driven by caller-supplied buffers.
//!
//! The engines ([`decompress::LzmaDecoder`], [`decompress::Lzma2Decoder`],
//! [`compress::LzmaEncoder`], [`compress::Lzma2Encoder`]) consume input and
//! produce output in pieces of any size and report their [`Progress`] after
//! every call. The io helpers at the top level run them over `BufRead` and
//! `Write` streams.

#![no_std]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![forbid(unsafe_code)]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

#[macro_use]
mod macros;

mod decode;
mod encode;
mod io_ext;
mod model;
mod params;
mod progress;
pub mod error;

/// I/O traits, from `std` when the `std` feature is on and from `core2`
/// otherwise.
pub mod io {
    pub use crate::io_ext::*;
    pub use core2::io::*;
}

pub use crate::params::{LzmaParams, LzmaProperties};
pub use crate::progress::{Progress, Status};

/// Decompression helpers.
pub mod decompress {
    pub use crate::decode::lzma::LzmaDecoder;
    pub use crate::decode::lzma2::{ChunkHeader, ChunkReset, Lzma2Decoder};
    pub use crate::decode::options::*;
    pub use crate::decode::stream::{Stream, StreamStatus};
}

/// Compression helpers.
pub mod compress {
    pub use crate::encode::lzma::{LzmaEncoder, Op};
    pub use crate::encode::lzma2::Lzma2Encoder;
    pub use crate::encode::options::*;
    pub use crate::encode::stream::AloneEncoder;
}

/// Decompress LZMA data with default [`Options`](decompress/struct.Options.html).
pub fn lzma_decompress<R: io::BufRead, W: io::Write>(
    input: &mut R,
    output: &mut W,
) -> error::Result<()> {
    lzma_decompress_with_options(input, output, &decompress::Options::default())
}

/// Decompress LZMA data with the provided options.
pub fn lzma_decompress_with_options<R: io::BufRead, W: io::Write>(
    input: &mut R,
    output: &mut W,
    options: &decompress::Options,
) -> error::Result<()> {
    let mut stream = decompress::Stream::new_with_options(options);
    decode::decode_all(&mut stream, input, output)
}

/// Decompress LZMA2 data. The window grows with the data up to the largest
/// size the format can declare.
pub fn lzma2_decompress<R: io::BufRead, W: io::Write>(
    input: &mut R,
    output: &mut W,
) -> error::Result<()> {
    let mut decoder = decompress::Lzma2Decoder::new(u32::MAX);
    decode::decode_all(&mut decoder, input, output)
}

/// Compress data with LZMA and default [`Options`](compress/struct.Options.html).
///
/// The encoder does not search for matches: every byte is stored as a
/// literal.
pub fn lzma_compress<R: io::BufRead, W: io::Write>(
    input: &mut R,
    output: &mut W,
) -> error::Result<()> {
    lzma_compress_with_options(input, output, &compress::Options::default())
}

/// Compress data with LZMA and the provided options.
///
/// With [`UnpackedSize::WriteToHeader(None)`](compress/enum.UnpackedSize.html)
/// the whole input is read first so that its length can go in the header.
pub fn lzma_compress_with_options<R: io::BufRead, W: io::Write>(
    input: &mut R,
    output: &mut W,
    options: &compress::Options,
) -> error::Result<()> {
    if options.unpacked_size != compress::UnpackedSize::WriteToHeader(None) {
        let mut encoder = compress::AloneEncoder::new(options);
        return encode::encode_all(&mut encoder, input, output);
    }

    let mut data = alloc::vec::Vec::new();
    loop {
        let buf = input.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let len = buf.len();
        data.extend_from_slice(buf);
        input.consume(len);
    }
    let options = compress::Options {
        unpacked_size: compress::UnpackedSize::WriteToHeader(Some(data.len() as u64)),
        ..*options
    };
    let mut encoder = compress::AloneEncoder::new(&options);
    encode::encode_all(&mut encoder, &mut io::Cursor::new(&data[..]), output)
}

/// Compress data with LZMA2 and default options.
pub fn lzma2_compress<R: io::BufRead, W: io::Write>(
    input: &mut R,
    output: &mut W,
) -> error::Result<()> {
    lzma2_compress_with_options(input, output, &compress::Lzma2Options::default())
}

/// Compress data with LZMA2 and the provided options.
pub fn lzma2_compress_with_options<R: io::BufRead, W: io::Write>(
    input: &mut R,
    output: &mut W,
    options: &compress::Lzma2Options,
) -> error::Result<()> {
    let mut encoder = compress::Lzma2Encoder::new(options);
    encode::encode_all(&mut encoder, input, output)
}
