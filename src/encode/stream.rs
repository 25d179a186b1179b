use crate::encode::lzma::{LzmaEncoder, Op};
use crate::encode::options::{Options, UnpackedSize};
use crate::error::CodecResult;
use crate::params::{LzmaParams, ALONE_HEADER_LEN, ALONE_HEADER_LEN_WITHOUT_SIZE};
use crate::progress::{Progress, Status};
use core::cmp;

/// Incremental LZMA-Alone encoder: the header followed by one LZMA1 stream.
///
/// With an unknown unpacked size the header carries the all-ones size and
/// the stream always ends with an end marker.
#[derive(Debug)]
pub struct AloneEncoder {
    header: heapless::Vec<u8, ALONE_HEADER_LEN>,
    // Header bytes already written
    header_pos: usize,
    encoder: LzmaEncoder,
}

impl AloneEncoder {
    /// Create an encoder.
    pub fn new(options: &Options) -> Self {
        let unpacked_size = match options.unpacked_size {
            UnpackedSize::WriteToHeader(size) => size,
            UnpackedSize::SkipWritingToHeader => None,
        };
        let params = LzmaParams {
            properties: options.properties,
            dict_size: options.dict_size,
            unpacked_size,
        };
        let header_len = match options.unpacked_size {
            UnpackedSize::WriteToHeader(_) => ALONE_HEADER_LEN,
            UnpackedSize::SkipWritingToHeader => ALONE_HEADER_LEN_WITHOUT_SIZE,
        };
        let mut header = heapless::Vec::new();
        // Never longer than the full header
        let _ = header.extend_from_slice(&params.header_bytes()[..header_len]);
        Self {
            header,
            header_pos: 0,
            encoder: LzmaEncoder::new(
                options.properties,
                options.dict_size,
                unpacked_size,
                options.write_end_marker,
            ),
        }
    }

    /// Prepare for a new stream with the same options.
    pub fn reset(&mut self) {
        self.header_pos = 0;
        self.encoder.reset();
    }

    fn write_header(&mut self, output: &mut [u8]) -> usize {
        let count = cmp::min(self.header.len() - self.header_pos, output.len());
        output[..count].copy_from_slice(&self.header[self.header_pos..self.header_pos + count]);
        self.header_pos += count;
        count
    }

    fn with_header<F>(&mut self, output: &mut [u8], step: F) -> CodecResult<Progress>
    where
        F: FnOnce(&mut LzmaEncoder, &mut [u8]) -> CodecResult<Progress>,
    {
        let written = self.write_header(output);
        if self.header_pos < self.header.len() {
            return Ok(Progress::new(Status::NeedMoreOutput, 0, written));
        }
        let mut progress = step(&mut self.encoder, &mut output[written..])?;
        progress.written += written;
        Ok(progress)
    }

    /// Encode `input` as literals.
    pub fn encode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        self.with_header(output, |encoder, output| encoder.encode(input, output))
    }

    /// Encode `ops`.
    pub fn encode_ops(&mut self, ops: &[Op], output: &mut [u8]) -> CodecResult<Progress> {
        self.with_header(output, |encoder, output| encoder.encode_ops(ops, output))
    }

    /// End the stream. Call again with a fresh output window until it
    /// reports [`Status::Finished`].
    pub fn finish(&mut self, output: &mut [u8]) -> CodecResult<Progress> {
        self.with_header(output, |encoder, output| encoder.finish(output))
    }
}
