//! Stream parameters: the `lc`/`lp`/`pb` properties byte, LZMA2 dictionary
//! size properties and the 13-byte LZMA-Alone header.

use crate::decompress::{Options, UnpackedSize};
use crate::error::lzma::LzmaError;
use crate::error::lzma2::Lzma2Error;
use crate::error::{CodecResult, Unsupported};
use byteorder::{ByteOrder, LittleEndian};

/// Length of an LZMA-Alone header carrying the unpacked size.
pub const ALONE_HEADER_LEN: usize = 13;

/// Length of an LZMA-Alone header without the unpacked size field.
pub const ALONE_HEADER_LEN_WITHOUT_SIZE: usize = 5;

/// Largest valid LZMA2 dictionary size property.
pub const LZMA2_DICT_SIZE_PROP_MAX: u8 = 40;

/// Literal context bits, literal position bits and position bits of an LZMA
/// stream.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LzmaProperties {
    /// Number of high bits of the previous byte used as literal context
    /// (0..=8).
    pub lc: u32,
    /// Number of low bits of the position used as literal context (0..=4).
    pub lp: u32,
    /// Number of low bits of the position used as match context (0..=4).
    pub pb: u32,
}

impl Default for LzmaProperties {
    fn default() -> Self {
        LzmaProperties {
            lc: 3,
            lp: 0,
            pb: 2,
        }
    }
}

impl LzmaProperties {
    /// Build properties, checking `lc <= 8`, `lp <= 4`, `pb <= 4` and
    /// `lc + lp <= 8`.
    pub fn new(lc: u32, lp: u32, pb: u32) -> Result<Self, LzmaError> {
        if lc > 8 || lp > 4 || pb > 4 {
            return Err(LzmaError::InvalidProperties {
                invalid_properties: ((pb * 5 + lp) * 9 + lc).min(0xFF) as u8,
            });
        }
        if lc + lp > 8 {
            return Err(LzmaError::InvalidLiteralBits { lc, lp });
        }
        Ok(LzmaProperties { lc, lp, pb })
    }

    /// Unpack the properties byte `(pb * 5 + lp) * 9 + lc`.
    pub fn from_byte(props: u8) -> Result<Self, LzmaError> {
        if props >= (9 * 5 * 5) {
            return Err(LzmaError::InvalidProperties {
                invalid_properties: props,
            });
        }
        let mut props = props as u32;
        let lc = props % 9;
        props /= 9;
        let lp = props % 5;
        props /= 5;
        let pb = props;
        LzmaProperties::new(lc, lp, pb)
    }

    /// Pack the properties into one byte.
    pub fn to_byte(&self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }
}

/// Dictionary size encoded by an LZMA2 dictionary size property.
///
/// Property 40 stands for `0xFFFF_FFFF`.
pub fn lzma2_dict_size(prop: u8) -> Result<u32, Lzma2Error> {
    match prop {
        0..=39 => Ok((2 | (prop as u32 & 1)) << (prop / 2 + 11)),
        LZMA2_DICT_SIZE_PROP_MAX => Ok(0xFFFF_FFFF),
        _ => Err(Lzma2Error::InvalidDictionarySizeProperty { property: prop }),
    }
}

/// Smallest LZMA2 dictionary size property whose size is at least
/// `dict_size`.
pub fn lzma2_dict_size_prop(dict_size: u32) -> u8 {
    (0..LZMA2_DICT_SIZE_PROP_MAX)
        .find(|&prop| (2 | (prop as u32 & 1)) << (prop / 2 + 11) >= dict_size)
        .unwrap_or(LZMA2_DICT_SIZE_PROP_MAX)
}

/// Parameters found in an LZMA-Alone header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LzmaParams {
    /// Literal and position context properties.
    pub properties: LzmaProperties,
    /// Size of the sliding window.
    pub dict_size: u32,
    /// Number of bytes the stream decodes to, if known.
    pub unpacked_size: Option<u64>,
}

impl LzmaParams {
    /// Number of header bytes `options` expects.
    pub fn header_len(options: &Options) -> usize {
        match options.unpacked_size {
            UnpackedSize::UseProvided(_) => ALONE_HEADER_LEN_WITHOUT_SIZE,
            _ => ALONE_HEADER_LEN,
        }
    }

    /// Parse a complete header. `header` must hold exactly
    /// [`LzmaParams::header_len`] bytes.
    pub fn read_header(header: &[u8], options: &Options) -> CodecResult<Self> {
        debug_assert_eq!(header.len(), Self::header_len(options));
        let properties = LzmaProperties::from_byte(header[0])?;
        let dict_size = LittleEndian::read_u32(&header[1..5]);

        let unpacked_size = match options.unpacked_size {
            UnpackedSize::ReadFromHeader => {
                let size = LittleEndian::read_u64(&header[5..13]);
                if size == u64::MAX {
                    None
                } else {
                    Some(size)
                }
            }
            UnpackedSize::ReadHeaderButUseProvided(size) | UnpackedSize::UseProvided(size) => size,
        };

        lzma_info!(
            "LZMA header: {:?}, dict size {}, unpacked size {:?}",
            properties,
            dict_size,
            unpacked_size
        );

        match unpacked_size {
            Some(_) => Ok(LzmaParams {
                properties,
                dict_size,
                unpacked_size,
            }),
            None => Err(Unsupported::UnknownUnpackedSize.into()),
        }
    }

    /// Serialize the full 13-byte header; an unknown size is written as all
    /// ones.
    pub fn header_bytes(&self) -> [u8; ALONE_HEADER_LEN] {
        let mut header = [0u8; ALONE_HEADER_LEN];
        header[0] = self.properties.to_byte();
        LittleEndian::write_u32(&mut header[1..5], self.dict_size);
        LittleEndian::write_u64(&mut header[5..13], self.unpacked_size.unwrap_or(u64::MAX));
        header
    }
}
