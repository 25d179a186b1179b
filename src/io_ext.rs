//! Byte-level helpers over the `BufRead` trait.

use core2::io::{self, BufRead};

/// Extension methods for buffered readers.
pub trait BufReadExt: BufRead {
    /// Read a single byte, failing with `UnexpectedEof` when the reader is
    /// exhausted.
    fn read_u8(&mut self) -> io::Result<u8> {
        let byte = match self.fill_buf()?.first() {
            Some(&byte) => byte,
            None => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
        };
        self.consume(1);
        Ok(byte)
    }

    /// Whether the reader has no more data.
    fn is_eof(&mut self) -> io::Result<bool> {
        Ok(self.fill_buf()?.is_empty())
    }
}

impl<R: BufRead + ?Sized> BufReadExt for R {}
