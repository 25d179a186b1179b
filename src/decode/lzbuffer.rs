use crate::error::lzma::LzmaError;
use alloc::vec::Vec;

/// Sliding window over the most recent `dict_size` bytes.
///
/// Bytes are written at `pos` and handed to the caller with [`flush`], which
/// copies everything written since the previous flush. `limit` bounds how far
/// `pos` may advance before the next flush, so the decoder never produces
/// more than the caller's output window can take.
///
/// The backing storage grows on demand up to `dict_size`, which makes huge
/// declared dictionaries cost only as much memory as the stream really uses.
///
/// [`flush`]: LzCircularBuffer::flush
#[derive(Debug)]
pub struct LzCircularBuffer {
    buf: Vec<u8>,
    dict_size: usize,
    pos: usize,
    start: usize,
    limit: usize,
    len: u64,
}

impl LzCircularBuffer {
    pub fn new(dict_size: usize) -> Self {
        lzma_info!("Dict size in LZ buffer: {}", dict_size);
        Self {
            buf: Vec::new(),
            dict_size,
            pos: 0,
            start: 0,
            limit: 0,
            len: 0,
        }
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.start = 0;
        self.limit = 0;
        self.len = 0;
    }

    /// Total number of bytes written since the last reset.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Allow at most `out_max` more bytes before the next flush.
    pub fn set_limit(&mut self, out_max: usize) {
        self.limit = if self.dict_size - self.pos <= out_max {
            self.dict_size
        } else {
            self.pos + out_max
        };
    }

    pub fn has_space(&self) -> bool {
        self.pos < self.limit
    }

    /// Number of bytes that may still be written before the next flush.
    pub fn space(&self) -> usize {
        self.limit - self.pos
    }

    /// Number of written bytes waiting for a flush.
    pub fn pending(&self) -> usize {
        self.pos - self.start
    }

    // Retrieve the last byte or return a default
    pub fn last_or(&self, lit: u8) -> u8 {
        if self.len == 0 {
            lit
        } else if self.pos == 0 {
            self.buf[self.buf.len() - 1]
        } else {
            self.buf[self.pos - 1]
        }
    }

    fn check_distance(&self, dist: usize) -> Result<(), LzmaError> {
        if dist > self.dict_size {
            return Err(LzmaError::MatchDistanceIsBeyondDictionarySize {
                distance: dist,
                dict_size: self.dict_size,
            });
        }
        if dist as u64 > self.len {
            return Err(LzmaError::MatchDistanceIsBeyondOutputSize {
                distance: dist,
                output_len: self.len as usize,
            });
        }
        Ok(())
    }

    fn index_of(&self, dist: usize) -> usize {
        if dist <= self.pos {
            self.pos - dist
        } else {
            self.buf.len() + self.pos - dist
        }
    }

    // Retrieve the n-th last byte, `dist` being 1-based
    pub fn last_n(&self, dist: usize) -> Result<u8, LzmaError> {
        self.check_distance(dist)?;
        Ok(self.buf[self.index_of(dist)])
    }

    fn write(&mut self, byte: u8) {
        if self.pos == self.buf.len() {
            self.buf.push(byte);
        } else {
            self.buf[self.pos] = byte;
        }
        self.pos += 1;
        self.len += 1;
    }

    /// Append one byte. The caller checks [`has_space`] first.
    ///
    /// [`has_space`]: LzCircularBuffer::has_space
    pub fn put_byte(&mut self, byte: u8) {
        debug_assert!(self.has_space());
        self.write(byte);
    }

    /// Append as much of `data` as fits and return how many bytes were taken.
    pub fn put_slice(&mut self, data: &[u8]) -> usize {
        let count = core::cmp::min(data.len(), self.space());
        for &byte in &data[..count] {
            self.write(byte);
        }
        count
    }

    /// Repeat `len` bytes found `dist` bytes back. Source and destination may
    /// overlap. Returns how many bytes were copied before reaching the limit.
    pub fn copy_match(&mut self, dist: usize, len: usize) -> Result<usize, LzmaError> {
        self.check_distance(dist)?;
        let count = core::cmp::min(len, self.space());
        let mut offset = self.index_of(dist);
        for _ in 0..count {
            let byte = self.buf[offset];
            self.write(byte);
            offset += 1;
            if offset == self.dict_size {
                offset = 0;
            }
        }
        Ok(count)
    }

    /// Move the bytes written since the previous flush into `out`, which
    /// must have room for [`pending`] bytes.
    ///
    /// [`pending`]: LzCircularBuffer::pending
    pub fn flush(&mut self, out: &mut [u8]) -> usize {
        let count = self.pending();
        out[..count].copy_from_slice(&self.buf[self.start..self.pos]);
        self.wrap();
        count
    }

    /// Drop the bytes written since the previous flush.
    pub fn discard(&mut self) -> usize {
        let count = self.pending();
        self.wrap();
        count
    }

    fn wrap(&mut self) {
        if self.pos == self.dict_size {
            self.pos = 0;
        }
        self.start = self.pos;
    }
}
