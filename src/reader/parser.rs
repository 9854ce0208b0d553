//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Low-level nom combinators for the fixed-width fields of a DATO document.
//! Every function here takes a slice beginning at the field it parses; none
//! of them know about configs, offsets elsewhere in the buffer, or flags.
//! That stitching happens one level up, in `reader::mod`.

use nom::{
    IResult,
    bytes::complete::{tag, take},
    multi::count,
    number::complete::{le_f64, le_i64, le_u32, le_u64, le_u8},
    sequence::tuple,
};

/// Recognizes the literal prefix bytes at the start of a document.
pub fn prefix<'a>(input: &'a [u8], expected: &[u8]) -> IResult<&'a [u8], &'a [u8]> {
    tag(expected)(input)
}

/// Parses the config identifier and flags bytes that follow the prefix.
pub fn config_and_flags(input: &[u8]) -> IResult<&[u8], (u8, u8)> {
    tuple((le_u8, le_u8))(input)
}

/// Parses a 4-byte little-endian payload slot, used both for inline values
/// and for reference offsets.
pub fn u32_field(input: &[u8]) -> IResult<&[u8], u32> {
    le_u32(input)
}

/// Parses `n` consecutive 4-byte little-endian fields.
pub fn u32_array(input: &[u8], n: usize) -> IResult<&[u8], Vec<u32>> {
    count(le_u32, n)(input)
}

/// Parses `n` consecutive type code bytes.
pub fn type_byte_array(input: &[u8], n: usize) -> IResult<&[u8], &[u8]> {
    take(n)(input)
}

/// Parses a heap `S64` scalar.
pub fn heap_i64(input: &[u8]) -> IResult<&[u8], i64> {
    le_i64(input)
}

/// Parses a heap `U64` scalar.
pub fn heap_u64(input: &[u8]) -> IResult<&[u8], u64> {
    le_u64(input)
}

/// Parses a heap `F64` scalar.
pub fn heap_f64(input: &[u8]) -> IResult<&[u8], f64> {
    le_f64(input)
}

/// Takes exactly `n` raw bytes, e.g. the content of a string or byte array record.
pub fn fixed_bytes(input: &[u8], n: usize) -> IResult<&[u8], &[u8]> {
    take(n)(input)
}
