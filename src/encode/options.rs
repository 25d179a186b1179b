use crate::params::LzmaProperties;

/// Options for LZMA-Alone compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// Literal and position context bits.
    pub properties: LzmaProperties,
    /// Dictionary size written to the header and used to bound match
    /// distances.
    /// The default is 8 MiB.
    pub dict_size: u32,
    /// Defines whether the unpacked size should be written to the header.
    /// The default is
    /// [`UnpackedSize::WriteToHeader(None)`](enum.UnpackedSize.html#variant.WriteToHeader)
    pub unpacked_size: UnpackedSize,
    /// Write the end of stream marker even when the unpacked size is known.
    /// The marker is always written when the size is unknown.
    pub write_end_marker: bool,
}

/// Alternatives for handling unpacked size
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnpackedSize {
    /// If the value is `Some(u64)`, write the provided u64 value to the
    /// header. The stream must then hold exactly that many bytes.
    ///
    /// With `None`, the one-shot helpers measure the input and write its
    /// length; [`AloneEncoder`](struct.AloneEncoder.html) writes the unknown
    /// size marker and ends the stream with an end marker.
    WriteToHeader(Option<u64>),
    /// Do not write anything to the header. The unpacked size must then be
    /// provided to the decoder out of band.
    SkipWritingToHeader,
}

impl Default for UnpackedSize {
    fn default() -> Self {
        UnpackedSize::WriteToHeader(None)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            properties: LzmaProperties::default(),
            dict_size: 0x0080_0000,
            unpacked_size: UnpackedSize::default(),
            write_end_marker: false,
        }
    }
}

/// How an [`Lzma2Encoder`](struct.Lzma2Encoder.html) stores its data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkMode {
    /// LZMA chunks, falling back to copy chunks for data that does not
    /// shrink.
    Lzma,
    /// Uncompressed chunks only.
    Copy,
}

/// Options for LZMA2 compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lzma2Options {
    /// Literal and position context bits of the LZMA chunks.
    pub properties: LzmaProperties,
    /// Dictionary size. The default is 8 MiB.
    pub dict_size: u32,
    /// Chunk kind to produce.
    pub mode: ChunkMode,
    /// Largest number of unpacked bytes per chunk, clamped to 273..=2^21.
    /// Copy chunks never hold more than 2^16 bytes.
    pub chunk_size: usize,
}

impl Default for Lzma2Options {
    fn default() -> Self {
        Self {
            properties: LzmaProperties::default(),
            dict_size: 0x0080_0000,
            mode: ChunkMode::Lzma,
            chunk_size: 1 << 21,
        }
    }
}
