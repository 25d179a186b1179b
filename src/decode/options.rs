/// Options to tweak decompression behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Options {
    /// Defines whether the unpacked size should be read from the header or
    /// provided.
    ///
    /// The default is
    /// [`UnpackedSize::ReadFromHeader`](enum.UnpackedSize.html#variant.ReadFromHeader).
    pub unpacked_size: UnpackedSize,
    /// Defines whether the dictionary's dynamic size should be limited during
    /// decompression.
    ///
    /// The default is unlimited.
    pub memlimit: Option<usize>,
}

impl Options {
    /// Default options, usable in constant contexts.
    pub const fn new() -> Self {
        Self {
            unpacked_size: UnpackedSize::ReadFromHeader,
            memlimit: None,
        }
    }
}

/// Alternatives for defining the unpacked size of the decoded data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnpackedSize {
    /// Assume that the 8 bytes used to specify the unpacked size are present
    /// in the header. If the bytes are `0xFFFF_FFFF_FFFF_FFFF`, the size is
    /// unknown, which is not supported.
    ReadFromHeader,
    /// Assume that there are 8 bytes representing the unpacked size present
    /// in the header. Read it but ignore it and use the provided value
    /// instead.
    ReadHeaderButUseProvided(Option<u64>),
    /// Assume that the 8 bytes typically used to represent the unpacked size
    /// are not present in the header. Use the provided value.
    UseProvided(Option<u64>),
}

impl Default for UnpackedSize {
    fn default() -> Self {
        UnpackedSize::ReadFromHeader
    }
}
