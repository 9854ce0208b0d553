//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Length codecs and the config registry.
//!
//! A DATO config is a named tuple of four interchangeable length codecs: one
//! for key lengths, one for object sizes, one for array lengths and one for
//! value (string/bytes/typed-array) lengths. Five configs are pre-registered;
//! see `spec.md` section 4.2.

use nom::{
    IResult,
    number::complete::{le_u8, le_u16, le_u32},
};

use crate::error::{Error, Result};
use crate::format::round_up;

/// One of the four interchangeable length codecs (`spec.md` section 4.1).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LengthEncoding {
    U8,
    U16,
    U32,
    U8X32,
}

impl LengthEncoding {
    /// The fixed byte size of this codec, or `None` for the variable `U8X32` codec.
    fn fixed_size(self) -> Option<usize> {
        match self {
            LengthEncoding::U8 => Some(1),
            LengthEncoding::U16 => Some(2),
            LengthEncoding::U32 => Some(4),
            LengthEncoding::U8X32 => None,
        }
    }

    /// Encodes `n` into `buf`, optionally padding first so the *end* of the
    /// encoded length lands on a multiple of `alignment`. Returns the
    /// absolute position at which the encoded length begins.
    pub fn write(self, buf: &mut Vec<u8>, n: u64, alignment: Option<usize>) -> Result<usize> {
        match self {
            LengthEncoding::U8 => {
                if n > 0xFF {
                    return Err(Error::OutOfRange);
                }
                let pos = Self::pad_for(buf, 1, alignment, 1);
                buf.push(n as u8);
                Ok(pos)
            }
            LengthEncoding::U16 => {
                if n > 0xFFFF {
                    return Err(Error::OutOfRange);
                }
                let pos = Self::pad_for(buf, 2, alignment, 2);
                buf.extend_from_slice(&(n as u16).to_le_bytes());
                Ok(pos)
            }
            LengthEncoding::U32 => {
                if n > u32::max_value() as u64 {
                    return Err(Error::OutOfRange);
                }
                let pos = Self::pad_for(buf, 4, alignment, 4);
                buf.extend_from_slice(&(n as u32).to_le_bytes());
                Ok(pos)
            }
            LengthEncoding::U8X32 => {
                if n > u32::max_value() as u64 {
                    return Err(Error::OutOfRange);
                }
                if n < 255 {
                    let pos = Self::pad_for(buf, 1, alignment, 1);
                    buf.push(n as u8);
                    Ok(pos)
                } else {
                    let pos = Self::pad_for(buf, 5, alignment, 4);
                    buf.push(255);
                    buf.extend_from_slice(&(n as u32).to_le_bytes());
                    Ok(pos)
                }
            }
        }
    }

    /// Pads `buf` so that `buf.len() + field_size` is a multiple of `alignment`
    /// (clamped to at least `natural_minimum`), then returns the position the
    /// field will begin at.
    fn pad_for(buf: &mut Vec<u8>, field_size: usize, alignment: Option<usize>, natural_minimum: usize) -> usize {
        match alignment {
            None => buf.len(),
            Some(requested) => {
                let alignment = requested.max(natural_minimum);
                let target_end = round_up(buf.len() + field_size, alignment);
                let pos = target_end - field_size;
                while buf.len() < pos {
                    buf.push(0);
                }
                pos
            }
        }
    }

    /// Decodes a length from the start of `input`, returning the value and
    /// the number of bytes consumed.
    pub fn parse(self, input: &[u8]) -> Result<(u64, usize)> {
        let result: IResult<&[u8], u64> = match self {
            LengthEncoding::U8 => nom::combinator::map(le_u8, |v| v as u64)(input),
            LengthEncoding::U16 => nom::combinator::map(le_u16, |v| v as u64)(input),
            LengthEncoding::U32 => nom::combinator::map(le_u32, |v| v as u64)(input),
            LengthEncoding::U8X32 => parse_u8x32(input),
        };
        match result {
            Ok((rest, value)) => Ok((value, input.len() - rest.len())),
            Err(_) => Err(Error::Eof),
        }
    }
}

fn parse_u8x32(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, marker) = le_u8(input)?;
    if marker != 255 {
        Ok((input, marker as u64))
    } else {
        let (input, value) = le_u32(input)?;
        Ok((input, value as u64))
    }
}

/// A named tuple of four length codecs plus the identifier byte that selects
/// them on the wire (`spec.md` section 4.2).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Config {
    pub identifier: u8,
    pub key_length: LengthEncoding,
    pub object_size: LengthEncoding,
    pub array_length: LengthEncoding,
    pub value_length: LengthEncoding,
}

impl Config {
    /// Config 0: speed-first, full range.
    pub const SPEED_FIRST: Config = Config {
        identifier: 0,
        key_length: LengthEncoding::U32,
        object_size: LengthEncoding::U32,
        array_length: LengthEncoding::U32,
        value_length: LengthEncoding::U32,
    };

    /// Config 1: speed-first, small values often take 1 byte.
    pub const SPEED_FIRST_SMALL_VALUES: Config = Config {
        identifier: 1,
        key_length: LengthEncoding::U32,
        object_size: LengthEncoding::U32,
        array_length: LengthEncoding::U32,
        value_length: LengthEncoding::U8X32,
    };

    /// Config 2: size-first, full range.
    pub const SIZE_FIRST: Config = Config {
        identifier: 2,
        key_length: LengthEncoding::U8X32,
        object_size: LengthEncoding::U8X32,
        array_length: LengthEncoding::U8X32,
        value_length: LengthEncoding::U8X32,
    };

    /// Config 3: speed-first, limited keys/objects.
    pub const SPEED_FIRST_LIMITED: Config = Config {
        identifier: 3,
        key_length: LengthEncoding::U8,
        object_size: LengthEncoding::U8,
        array_length: LengthEncoding::U32,
        value_length: LengthEncoding::U32,
    };

    /// Config 4: size-first, limited keys/objects.
    pub const SIZE_FIRST_LIMITED: Config = Config {
        identifier: 4,
        key_length: LengthEncoding::U8,
        object_size: LengthEncoding::U8,
        array_length: LengthEncoding::U8X32,
        value_length: LengthEncoding::U8X32,
    };

    /// Resolves a built-in config identifier (0-4).
    ///
    /// Identifiers 5-127 are reserved and rejected with `Error::ReservedConfig`.
    /// Identifiers 128 and above are available for user extension, but this
    /// registry has no codecs to vend for them: a user config must be
    /// constructed directly as a `Config` value rather than looked up here.
    pub fn by_id(id: u8) -> Result<Config> {
        match id {
            0 => Ok(Config::SPEED_FIRST),
            1 => Ok(Config::SPEED_FIRST_SMALL_VALUES),
            2 => Ok(Config::SIZE_FIRST),
            3 => Ok(Config::SPEED_FIRST_LIMITED),
            4 => Ok(Config::SIZE_FIRST_LIMITED),
            _ => Err(Error::ReservedConfig),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_roundtrip() {
        let mut buf = Vec::new();
        let pos = LengthEncoding::U8.write(&mut buf, 200, None).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(buf, vec![200]);
        assert_eq!(LengthEncoding::U8.parse(&buf).unwrap(), (200, 1));
    }

    #[test]
    fn test_u8_out_of_range() {
        let mut buf = Vec::new();
        assert_eq!(LengthEncoding::U8.write(&mut buf, 256, None), Err(Error::OutOfRange));
    }

    #[test]
    fn test_u8x32_short_form() {
        let mut buf = Vec::new();
        let pos = LengthEncoding::U8X32.write(&mut buf, 254, None).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(buf, vec![254]);
        assert_eq!(LengthEncoding::U8X32.parse(&buf).unwrap(), (254, 1));
    }

    #[test]
    fn test_u8x32_long_form_boundary() {
        let mut buf = Vec::new();
        let pos = LengthEncoding::U8X32.write(&mut buf, 255, None).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(buf, vec![255, 255, 0, 0, 0]);
        assert_eq!(LengthEncoding::U8X32.parse(&buf).unwrap(), (255, 5));
    }

    #[test]
    fn test_u8x32_max_value() {
        let mut buf = Vec::new();
        LengthEncoding::U8X32.write(&mut buf, 0xFFFF_FFFF, None).unwrap();
        assert_eq!(LengthEncoding::U8X32.parse(&buf).unwrap(), (0xFFFF_FFFF, 5));
    }

    #[test]
    fn test_alignment_pads_short_form() {
        let mut buf = vec![0u8; 3];
        // end of a 1-byte field at offset 3 must land on a multiple of 4: pad one byte.
        let pos = LengthEncoding::U8X32.write(&mut buf, 10, Some(4)).unwrap();
        assert_eq!(pos, 4);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_alignment_pads_long_form() {
        let mut buf = vec![0u8; 3];
        let pos = LengthEncoding::U8X32.write(&mut buf, 300, Some(4)).unwrap();
        // long form is 5 bytes; end must be a multiple of 4 -> pos + 5 = 8 -> pos = 3 (clamped to 4 minimum already satisfied)
        assert_eq!((pos + 5) % 4, 0);
        assert_eq!(LengthEncoding::U8X32.parse(&buf[pos..]).unwrap(), (300, 5));
    }

    #[test]
    fn test_u32_alignment_clamped_to_4() {
        let mut buf = vec![0u8; 1];
        // requesting alignment 1 is clamped up to the codec's natural size of 4.
        let pos = LengthEncoding::U32.write(&mut buf, 7, Some(1)).unwrap();
        assert_eq!(pos, 4);
    }

    #[test]
    fn test_config_by_id() {
        assert_eq!(Config::by_id(0).unwrap(), Config::SPEED_FIRST);
        assert_eq!(Config::by_id(4).unwrap(), Config::SIZE_FIRST_LIMITED);
        assert_eq!(Config::by_id(5), Err(Error::ReservedConfig));
        assert_eq!(Config::by_id(127), Err(Error::ReservedConfig));
    }

    #[test]
    fn test_parse_eof() {
        assert_eq!(LengthEncoding::U32.parse(&[1, 2]), Err(Error::Eof));
    }
}
