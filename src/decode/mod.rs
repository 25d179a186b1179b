//! Decoding logic.

pub mod lzbuffer;
pub mod lzma;
pub mod lzma2;
pub mod options;
pub mod rangecoder;
pub mod stream;

use crate::error::{self, CodecResult};
use crate::io::{self, BufRead, Write};
use crate::progress::{Progress, Status};
use alloc::vec;

/// Size of the output window used by the io helpers.
const OUTPUT_CHUNK_LEN: usize = 1 << 16;

/// A decoder following the step contract.
pub(crate) trait StepDecoder {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress>;
}

impl StepDecoder for lzma2::Lzma2Decoder {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        lzma2::Lzma2Decoder::decode(self, input, output)
    }
}

impl StepDecoder for stream::Stream {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        stream::Stream::decode(self, input, output)
    }
}

/// Run `decoder` from `input` to `output` until the end of the stream.
/// Input following the end of the stream is left in the reader.
pub(crate) fn decode_all<D, R, W>(decoder: &mut D, input: &mut R, output: &mut W) -> error::Result<()>
where
    D: StepDecoder,
    R: BufRead,
    W: Write,
{
    let mut buf = vec![0u8; OUTPUT_CHUNK_LEN];
    loop {
        let data = input.fill_buf()?;
        let eof = data.is_empty();
        let progress = decoder.decode(data, &mut buf)?;
        input.consume(progress.consumed);
        output.write_all(&buf[..progress.written])?;
        match progress.status {
            Status::Finished => return Ok(()),
            Status::NeedMoreInput if eof => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "compressed stream ended early",
                )
                .into())
            }
            _ => {}
        }
    }
}
