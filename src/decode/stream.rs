use crate::decode::lzma::LzmaDecoder;
use crate::decompress::Options;
use crate::error::{self, CodecError, CodecResult};
use crate::io::{self, Write};
use crate::params::{LzmaParams, ALONE_HEADER_LEN};
use crate::progress::{Progress, Status};
use core::cmp;

/// Size of the scratch buffer used by [`Stream::write`].
const WRITE_CHUNK_LEN: usize = 1024;

/// Internal state of this streaming decoder. The header has to be buffered
/// before the LZMA1 engine can be created.
#[derive(Debug)]
enum State {
    /// Header bytes gathered so far.
    Header(heapless::Vec<u8, ALONE_HEADER_LEN>),
    /// Header values have been read and the stream is ready to process more
    /// data.
    Data(LzmaDecoder),
    /// A fatal error was reported; sticky until reset.
    Failed(CodecError),
}

/// Enum describing current state of a stream
#[derive(PartialEq, Debug)]
pub enum StreamStatus {
    /// LZMA header is currently being processed
    ProcessingHeader,
    /// LZMA data stream is currently being processed
    ProcessingData {
        /// Data that has been already decompressed in bytes.
        unpacked_data_processed: u64,
        /// Expected unpacked size (behaviour of decoder depends on
        /// [`Options::unpacked_size`] setting)
        unpacked_size: Option<u64>,
    },
    /// Stream entered an error state. Call [`Stream::reset`] to reuse it.
    InvalidState,
    /// The end of the stream has been reached
    EosReached,
}

/// Incremental LZMA-Alone decoder: the header followed by one LZMA1 stream.
///
/// [`decode`](Stream::decode) follows the same step contract as the raw
/// engines; [`write`](Stream::write) and [`write_all`](Stream::write_all)
/// push the decoded bytes into an `io::Write` sink instead.
#[derive(Debug)]
pub struct Stream {
    state: State,
    /// Options given when a stream is created.
    options: Options,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    /// Create a stream with default options.
    pub const fn new() -> Self {
        Self::new_with_options(&Options::new())
    }

    /// Create a stream with the given `options`.
    pub const fn new_with_options(options: &Options) -> Self {
        Self {
            state: State::Header(heapless::Vec::new()),
            options: *options,
        }
    }

    /// Reset the state of the stream, ready for a new header.
    pub fn reset(&mut self) {
        self.state = State::Header(heapless::Vec::new());
    }

    /// Decode as much of `input` into `output` as possible.
    pub fn decode(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        let result = self.decode_inner(input, output);
        if let Err(e) = &result {
            self.state = State::Failed(e.clone());
        }
        result
    }

    fn decode_inner(&mut self, input: &[u8], output: &mut [u8]) -> CodecResult<Progress> {
        let mut consumed = 0;
        if let State::Header(bytes) = &mut self.state {
            let header_len = LzmaParams::header_len(&self.options);
            let take = cmp::min(header_len - bytes.len(), input.len());
            // Bounded by the header length
            let _ = bytes.extend_from_slice(&input[..take]);
            consumed += take;
            if bytes.len() < header_len {
                return Ok(Progress::new(Status::NeedMoreInput, consumed, 0));
            }

            let params = LzmaParams::read_header(bytes, &self.options)?;
            let decoder = match self.options.memlimit {
                Some(memlimit) => LzmaDecoder::with_memlimit(
                    params.properties,
                    params.dict_size,
                    params.unpacked_size,
                    memlimit,
                )?,
                None => LzmaDecoder::new(params.properties, params.dict_size, params.unpacked_size),
            };
            self.state = State::Data(decoder);
        }

        match &mut self.state {
            State::Data(decoder) => {
                let mut progress = decoder.decode(&input[consumed..], output)?;
                progress.consumed += consumed;
                Ok(progress)
            }
            State::Failed(e) => Err(e.clone()),
            State::Header(_) => unreachable!("header is complete at this point"),
        }
    }

    /// Write slice of compressed `data` into the stream. Decompressed data will
    /// be written to the `output` sink.
    ///
    /// This function reads between 0 and `data.len()` of bytes. To read all the
    /// data from `data` slice, use [`Stream::write_all`] function.
    pub fn write(&mut self, output: &mut dyn Write, data: &[u8]) -> error::Result<usize> {
        let mut buf = [0u8; WRITE_CHUNK_LEN];
        let mut consumed = 0;
        loop {
            let progress = self.decode(&data[consumed..], &mut buf)?;
            consumed += progress.consumed;
            output.write_all(&buf[..progress.written])?;
            if progress.status != Status::NeedMoreOutput {
                return Ok(consumed);
            }
        }
    }

    /// Write all of `buf` into the stream. Bytes following the end of the
    /// stream are ignored.
    pub fn write_all(&mut self, output: &mut dyn Write, mut buf: &[u8]) -> error::Result<()> {
        while !buf.is_empty() {
            if self.get_stream_status() == StreamStatus::EosReached {
                lzma_debug!("Ignoring {} bytes after the end of the stream", buf.len());
                break;
            }
            match self.write(output, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    )
                    .into());
                }
                Ok(n) => buf = &buf[n..],
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Make sure the end of the stream was reached, then reset the stream.
    pub fn finish(&mut self) -> error::Result<()> {
        let status = match &self.state {
            State::Header(bytes) => {
                if bytes.is_empty() {
                    Ok(())
                } else {
                    Err(error::stream::StreamError::FailedToReadLzmaHeader.into())
                }
            }
            State::Data(decoder) => {
                if decoder.is_finished() {
                    Ok(())
                } else {
                    Err(error::stream::StreamError::StreamNotFinished.into())
                }
            }
            State::Failed(_) => Err(error::stream::StreamError::InvalidState.into()),
        };
        self.reset();
        status
    }

    /// Retrieve the stream state.
    ///
    /// If [`StreamStatus::EosReached`] is returned, [`Stream::finish`] call is
    /// guaranteed not to fail.
    pub fn get_stream_status(&self) -> StreamStatus {
        match &self.state {
            State::Header(_) => StreamStatus::ProcessingHeader,
            State::Data(decoder) if decoder.is_finished() => StreamStatus::EosReached,
            State::Data(decoder) => StreamStatus::ProcessingData {
                unpacked_data_processed: decoder.unpacked_len(),
                unpacked_size: decoder.unpacked_size(),
            },
            State::Failed(_) => StreamStatus::InvalidState,
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use crate::compress;
    use crate::decompress::UnpackedSize;
    use crate::error::lzma::LzmaError;
    use crate::error::Unsupported;
    use std::vec::Vec;

    const HELLO: &[u8] = b"Hello, hello, hello world!\n";

    fn compressed(data: &[u8], options: &compress::Options) -> Vec<u8> {
        let mut out = Vec::new();
        crate::lzma_compress_with_options(&mut io::Cursor::new(data), &mut out, options).unwrap();
        out
    }

    /// Test an empty stream
    #[test]
    fn test_stream_noop() {
        let mut stream = Stream::new();
        stream.finish().unwrap();
    }

    /// Test writing an empty slice
    #[test]
    fn test_stream_zero() {
        let mut sink = Vec::new();
        let mut stream = Stream::new();

        stream.write_all(&mut sink, &[]).unwrap();
        stream.write_all(&mut sink, &[]).unwrap();
        stream.finish().unwrap();

        assert!(sink.is_empty());
    }

    /// Test a bad header value
    #[test]
    fn test_bad_header() {
        let input = [255u8; 32];

        let mut sink = Vec::new();
        let mut stream = Stream::new();

        match stream.write_all(&mut sink, &input[..]).unwrap_err() {
            error::Error::Codec(CodecError::Lzma(LzmaError::InvalidProperties {
                invalid_properties: 255,
            })) => {}
            err => panic!("Unexpected error: {:#?}", err),
        }
        assert_eq!(stream.get_stream_status(), StreamStatus::InvalidState);

        match stream.finish().unwrap_err() {
            error::Error::StreamError(error::stream::StreamError::InvalidState) => {}
            err => panic!("Unexpected error: {:#?}", err),
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unknown_size_is_unsupported() {
        let input = compressed(
            HELLO,
            &compress::Options {
                unpacked_size: compress::UnpackedSize::WriteToHeader(None),
                ..compress::Options::default()
            },
        );
        let mut stream = Stream::new();
        let mut out = [0u8; 64];
        // The one-shot helper measures the input
        assert!(stream.decode(&input, &mut out).unwrap().is_finished());

        let mut header = input[..13].to_vec();
        header[5..13].copy_from_slice(&[0xFF; 8]);
        let mut stream = Stream::new();
        assert_eq!(
            stream.decode(&header, &mut out),
            Err(Unsupported::UnknownUnpackedSize.into())
        );
        // Sticky
        assert_eq!(
            stream.decode(&[], &mut out),
            Err(Unsupported::UnknownUnpackedSize.into())
        );
    }

    #[test]
    fn test_stream_memlimit() {
        let input = compressed(HELLO, &compress::Options::default());
        let options = Options {
            memlimit: Some(1 << 16),
            ..Options::default()
        };
        let mut stream = Stream::new_with_options(&options);
        let mut sink = Vec::new();
        match stream.write_all(&mut sink, &input).unwrap_err() {
            error::Error::Codec(CodecError::Lzma(LzmaError::DictionaryTooLarge {
                dict_size: 0x0080_0000,
                memlimit: 0x1_0000,
            })) => {}
            err => panic!("Unexpected error: {:#?}", err),
        }
    }

    /// Test resetting capability of `Stream`
    #[test]
    fn test_stream_resetting() {
        let input = compressed(HELLO, &compress::Options::default());
        let mut sink = Vec::new();
        let mut stream = Stream::new();
        stream.write_all(&mut sink, &input[..]).unwrap();
        stream.finish().unwrap();
        assert_eq!(HELLO, &sink[..]);
        sink.truncate(0);
        stream.write_all(&mut sink, &input[..]).unwrap();
        stream.finish().unwrap();
        assert_eq!(HELLO, &sink[..]);
        sink.truncate(0);
        let (first_half, second_half) = input.split_at(input.len() / 2);
        stream.write_all(&mut sink, first_half).unwrap();
        stream.write_all(&mut sink, second_half).unwrap();
        stream.finish().unwrap();
        assert_eq!(HELLO, &sink[..]);
    }

    /// Test processing only partial data
    #[test]
    fn test_stream_incomplete() {
        let input = compressed(HELLO, &compress::Options::default());

        for end in 1..13 {
            let mut sink = Vec::new();
            let mut stream = Stream::new();
            stream.write_all(&mut sink, &input[..end]).unwrap();
            assert_eq!(stream.get_stream_status(), StreamStatus::ProcessingHeader);
            match stream.finish().unwrap_err() {
                error::Error::StreamError(error::stream::StreamError::FailedToReadLzmaHeader) => {}
                err => panic!("Unexpected error: {:#?}", err),
            }
            // After `Stream::finish` call, stream state is reset
            assert_eq!(stream.get_stream_status(), StreamStatus::ProcessingHeader);
        }

        for end in 13..input.len() {
            let mut sink = Vec::new();
            let mut stream = Stream::new();
            stream.write_all(&mut sink, &input[..end]).unwrap();
            match stream.get_stream_status() {
                StreamStatus::ProcessingData {
                    unpacked_size: Some(size),
                    unpacked_data_processed,
                } => {
                    assert_eq!(size, HELLO.len() as u64);
                    assert_eq!(unpacked_data_processed, sink.len() as u64);
                }
                status => panic!("Unexpected status: {:#?}", status),
            }
            match stream.finish().unwrap_err() {
                error::Error::StreamError(error::stream::StreamError::StreamNotFinished) => {}
                err => panic!("Unexpected error: {:#?}", err),
            }
        }

        let mut sink = Vec::new();
        let mut stream = Stream::new();
        stream.write_all(&mut sink, &input).unwrap();
        assert_eq!(stream.get_stream_status(), StreamStatus::EosReached);
        stream.finish().unwrap();
        assert_eq!(stream.get_stream_status(), StreamStatus::ProcessingHeader);
    }

    /// Test processing all chunk sizes
    #[test]
    fn test_stream_chunked() {
        let data: Vec<u8> = HELLO.iter().cycle().take(3000).copied().collect();
        let input = compressed(&data, &compress::Options::default());
        for chunk in 1..40 {
            let mut sink = Vec::new();
            let mut stream = Stream::new();
            for piece in input.chunks(chunk) {
                stream.write_all(&mut sink, piece).unwrap();
            }
            stream.finish().unwrap();
            assert_eq!(data, sink);
        }
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut input = compressed(HELLO, &compress::Options::default());
        input.extend_from_slice(b"trailer");
        let mut sink = Vec::new();
        let mut stream = Stream::new();
        stream.write_all(&mut sink, &input).unwrap();
        stream.finish().unwrap();
        assert_eq!(HELLO, &sink[..]);
    }

    #[test]
    fn test_provided_size_without_header_field() {
        let input = compressed(
            HELLO,
            &compress::Options {
                unpacked_size: compress::UnpackedSize::SkipWritingToHeader,
                ..compress::Options::default()
            },
        );
        let options = Options {
            unpacked_size: UnpackedSize::UseProvided(Some(HELLO.len() as u64)),
            ..Options::default()
        };
        let mut sink = Vec::new();
        let mut stream = Stream::new_with_options(&options);
        stream.write_all(&mut sink, &input).unwrap();
        stream.finish().unwrap();
        assert_eq!(HELLO, &sink[..]);
    }

    #[test]
    fn test_stream_corrupted() {
        let mut sink = Vec::new();
        let mut stream = Stream::new();
        let _ = stream
            .write_all(&mut sink, b"corrupted bytes here corrupted bytes here")
            .unwrap_err();

        match stream.finish().unwrap_err() {
            error::Error::StreamError(error::stream::StreamError::InvalidState) => {}
            err => panic!("Unexpected error: {:#?}", err),
        }
    }
}
