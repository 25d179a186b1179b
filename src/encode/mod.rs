//! Encoding logic.

pub mod lzma;
pub mod lzma2;
pub mod options;
pub mod rangecoder;
pub mod stream;

use crate::error::{self, CodecResult};
use crate::io::{BufRead, Write};
use crate::progress::{Progress, Status};
use alloc::vec;

/// Size of the output window used by the io helpers.
const OUTPUT_CHUNK_LEN: usize = 1 << 16;

/// An encoder following the step contract.
pub(crate) trait StepEncoder {
    fn encode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress>;
    fn finish(&mut self, output: &mut [u8]) -> CodecResult<Progress>;
}

impl StepEncoder for stream::AloneEncoder {
    fn encode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        stream::AloneEncoder::encode(self, input, output)
    }

    fn finish(&mut self, output: &mut [u8]) -> CodecResult<Progress> {
        stream::AloneEncoder::finish(self, output)
    }
}

impl StepEncoder for lzma2::Lzma2Encoder {
    fn encode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        lzma2::Lzma2Encoder::encode(self, input, output)
    }

    fn finish(&mut self, output: &mut [u8]) -> CodecResult<Progress> {
        lzma2::Lzma2Encoder::finish(self, output)
    }
}

/// Feed all of `input` through `encoder` and finish the stream.
pub(crate) fn encode_all<E, R, W>(encoder: &mut E, input: &mut R, output: &mut W) -> error::Result<()>
where
    E: StepEncoder,
    R: BufRead,
    W: Write,
{
    let mut buf = vec![0u8; OUTPUT_CHUNK_LEN];
    loop {
        let data = input.fill_buf()?;
        if data.is_empty() {
            break;
        }
        let progress = encoder.encode(data, &mut buf)?;
        input.consume(progress.consumed);
        output.write_all(&buf[..progress.written])?;
    }
    loop {
        let progress = encoder.finish(&mut buf)?;
        output.write_all(&buf[..progress.written])?;
        if progress.status == Status::Finished {
            return Ok(());
        }
    }
}
