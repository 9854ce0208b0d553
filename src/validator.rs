//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Structural validation.
//!
//! [`validate`] sweeps every record reachable from the root and rejects any
//! buffer a [`crate::reader::Reader`] could misinterpret or read out of
//! bounds. Unlike the reader, it assumes nothing about the input: every
//! length, offset and type code is bound-checked before it is trusted.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::{Flags, TypeCode, MIN_USER_TYPE_CODE};
use crate::reader::{parse_header, ReaderOptions};
use std::convert::TryInto;

/// Recursion ceiling used to reject self-referential or pathologically deep
/// documents without risking a stack overflow. A document produced by
/// `Builder`/`LinearWriter` never nests this deep in practice.
const MAX_DEPTH: usize = 256;

enum TypeClass {
    Known(TypeCode),
    UserExtension,
    Reserved(u8),
}

fn classify(byte: u8) -> TypeClass {
    match TypeCode::from_byte(byte) {
        Some(code) => TypeClass::Known(code),
        None if byte >= MIN_USER_TYPE_CODE => TypeClass::UserExtension,
        None => TypeClass::Reserved(byte),
    }
}

/// Validates an entire document, starting from its root object.
pub fn validate(input: &[u8], options: &ReaderOptions) -> Result<()> {
    let (config, flags, root_offset) = parse_header(input, options)?;
    validate_object(input, config, flags, root_offset, 0)
}

fn validate_object(input: &[u8], config: Config, flags: Flags, offset: u32, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::BadData);
    }
    let start = offset as usize;
    let rest = input.get(start..).ok_or(Error::Eof)?;
    let (count, consumed) = config.object_size.parse(rest)?;
    let count = count as usize;

    let entries_start = start + consumed;
    if flags.aligned() && entries_start % 4 != 0 {
        return Err(Error::Unaligned);
    }
    let entries_size = count.checked_mul(9).ok_or(Error::Eof)?;
    let end = entries_start.checked_add(entries_size).ok_or(Error::Eof)?;
    if end > input.len() {
        return Err(Error::Eof);
    }

    let keys_offset = entries_start;
    let values_offset = entries_start + count * 4;
    let types_offset = entries_start + count * 8;

    let mut prev_int_key: Option<u32> = None;
    let mut prev_str_key: Option<Vec<u8>> = None;

    for i in 0..count {
        let key_slot = u32::from_le_bytes(input[keys_offset + i * 4..keys_offset + i * 4 + 4].try_into().unwrap());

        if flags.integer_keys() {
            if flags.sorted_keys() {
                if let Some(prev) = prev_int_key {
                    if key_slot <= prev {
                        return Err(Error::BadKeyOrder);
                    }
                }
                prev_int_key = Some(key_slot);
            }
        } else {
            let key_bytes = validate_key_record(input, config, key_slot)?;
            if flags.sorted_keys() {
                if let Some(prev) = &prev_str_key {
                    if key_bytes <= prev.as_slice() {
                        return Err(Error::BadKeyOrder);
                    }
                }
                prev_str_key = Some(key_bytes.to_vec());
            }
        }

        let raw_payload = u32::from_le_bytes(input[values_offset + i * 4..values_offset + i * 4 + 4].try_into().unwrap());
        let type_byte = input[types_offset + i];

        match classify(type_byte) {
            TypeClass::Reserved(code) => return Err(Error::UnknownBuiltInType { code }),
            TypeClass::UserExtension => continue,
            TypeClass::Known(code) => {
                let payload = if flags.relative_object_refs() && code.is_reference() {
                    offset.wrapping_sub(raw_payload)
                } else {
                    raw_payload
                };
                validate_value(input, config, flags, code, payload, depth + 1)?;
            }
        }
    }

    Ok(())
}

fn validate_key_record<'a>(input: &'a [u8], config: Config, offset: u32) -> Result<&'a [u8]> {
    let start = offset as usize;
    let rest = input.get(start..).ok_or(Error::Eof)?;
    let (len, consumed) = config.key_length.parse(rest)?;
    let content_start = start + consumed;
    let len = len as usize;
    let end = content_start.checked_add(len + 1).ok_or(Error::Eof)?;
    if end > input.len() {
        return Err(Error::Eof);
    }
    let content = &input[content_start..content_start + len];
    if input[content_start + len] != 0 {
        return Err(Error::MissingNullTerminator);
    }
    Ok(content)
}

fn validate_array(input: &[u8], config: Config, flags: Flags, offset: u32, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::BadData);
    }
    let start = offset as usize;
    let rest = input.get(start..).ok_or(Error::Eof)?;
    let (count, consumed) = config.array_length.parse(rest)?;
    let count = count as usize;

    let entries_start = start + consumed;
    if flags.aligned() && entries_start % 4 != 0 {
        return Err(Error::Unaligned);
    }
    let entries_size = count.checked_mul(5).ok_or(Error::Eof)?;
    let end = entries_start.checked_add(entries_size).ok_or(Error::Eof)?;
    if end > input.len() {
        return Err(Error::Eof);
    }

    let values_offset = entries_start;
    let types_offset = entries_start + count * 4;

    for i in 0..count {
        let raw_payload = u32::from_le_bytes(input[values_offset + i * 4..values_offset + i * 4 + 4].try_into().unwrap());
        let type_byte = input[types_offset + i];

        match classify(type_byte) {
            TypeClass::Reserved(code) => return Err(Error::UnknownBuiltInType { code }),
            TypeClass::UserExtension => continue,
            TypeClass::Known(code) => {
                // Array entries are always absolute, regardless of RelativeObjectRefs.
                validate_value(input, config, flags, code, raw_payload, depth + 1)?;
            }
        }
    }

    Ok(())
}

fn validate_value(input: &[u8], config: Config, flags: Flags, code: TypeCode, payload: u32, depth: usize) -> Result<()> {
    use TypeCode::*;
    match code {
        Null => {
            if payload != 0 {
                return Err(Error::BadData);
            }
            Ok(())
        }
        Bool => {
            if payload > 1 {
                return Err(Error::BadData);
            }
            Ok(())
        }
        S32 | U32 | F32 => Ok(()),
        S64 | U64 | F64 => {
            let p = payload as usize;
            let end = p.checked_add(8).ok_or(Error::Eof)?;
            if end > input.len() {
                return Err(Error::Eof);
            }
            if flags.aligned() && p % 8 != 0 {
                return Err(Error::Unaligned);
            }
            Ok(())
        }
        Array => validate_array(input, config, flags, payload, depth),
        Object => validate_object(input, config, flags, payload, depth),
        String8 | String16 | String32 => {
            let unit = code.string_unit_size().unwrap();
            let p = payload as usize;
            let rest = input.get(p..).ok_or(Error::Eof)?;
            let (len, consumed) = config.value_length.parse(rest)?;
            let content_start = p + consumed;
            if flags.aligned() && content_start % unit != 0 {
                return Err(Error::Unaligned);
            }
            let len = len as usize;
            let end = content_start.checked_add((len + 1) * unit).ok_or(Error::Eof)?;
            if end > input.len() {
                return Err(Error::Eof);
            }
            let terminator = &input[content_start + len * unit..end];
            if terminator.iter().any(|&b| b != 0) {
                return Err(Error::MissingNullTerminator);
            }
            Ok(())
        }
        ByteArray | TypedArrayS8 | TypedArrayU8 | TypedArrayS16 | TypedArrayU16 | TypedArrayS32 | TypedArrayU32
        | TypedArrayS64 | TypedArrayU64 | TypedArrayF32 | TypedArrayF64 => {
            let esize = code.typed_array_element_size().unwrap();
            let p = payload as usize;
            let rest = input.get(p..).ok_or(Error::Eof)?;
            let (len, consumed) = config.value_length.parse(rest)?;
            let content_start = p + consumed;
            if flags.aligned() && content_start % esize != 0 {
                return Err(Error::Unaligned);
            }
            let end = content_start.checked_add(len as usize * esize).ok_or(Error::Eof)?;
            if end > input.len() {
                return Err(Error::Eof);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Builder, WriterOptions};

    fn build_valid() -> Vec<u8> {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let key = b.append_key("a").unwrap();
        let value = b.append_string_utf8("hello").unwrap();
        let root = b.append_object(&[(key, value)]).unwrap();
        b.finish(root).unwrap();
        b.get_encoded()
    }

    #[test]
    fn test_valid_document() {
        let buf = build_valid();
        assert!(validate(&buf, &ReaderOptions::default()).is_ok());
    }

    #[test]
    fn test_missing_prefix() {
        let mut buf = build_valid();
        buf[0] = b'X';
        assert_eq!(validate(&buf, &ReaderOptions::default()), Err(Error::MissingPrefix));
    }

    #[test]
    fn test_truncated_buffer() {
        let buf = build_valid();
        let truncated = &buf[..buf.len() - 4];
        assert_eq!(validate(truncated, &ReaderOptions::default()), Err(Error::Eof));
    }

    #[test]
    fn test_unknown_built_in_type_rejected() {
        let mut buf = build_valid();
        // The root object has one entry; its type byte is the last byte of the buffer.
        let last = buf.len() - 1;
        buf[last] = 50;
        assert_eq!(validate(&buf, &ReaderOptions::default()), Err(Error::UnknownBuiltInType { code: 50 }));
    }

    #[test]
    fn test_user_extension_type_skipped() {
        let mut buf = build_valid();
        let last = buf.len() - 1;
        buf[last] = 200;
        assert!(validate(&buf, &ReaderOptions::default()).is_ok());
    }

    #[test]
    fn test_bad_bool_payload() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let key = b.append_key("a").unwrap();
        let value = b.append_bool(true);
        let root = b.append_object(&[(key, value)]).unwrap();
        b.finish(root).unwrap();
        let mut buf = b.get_encoded();
        // Overwrite the Bool payload (the 4 bytes before this entry's type byte) with 7.
        let last = buf.len() - 1;
        buf[last - 4] = 7;
        assert_eq!(validate(&buf, &ReaderOptions::default()), Err(Error::BadData));
    }

    #[test]
    fn test_unsorted_keys_rejected_when_claimed_sorted() {
        let mut options = WriterOptions::default();
        options.sort_keys = true;
        let mut b = Builder::new(options).unwrap();
        let k1 = b.append_key("b").unwrap();
        let v1 = b.append_null();
        let k2 = b.append_key("a").unwrap();
        let v2 = b.append_null();
        let root = b.append_object(&[(k1, v1), (k2, v2)]).unwrap();
        b.finish(root).unwrap();
        let buf = b.get_encoded();
        assert_eq!(validate(&buf, &ReaderOptions::default()), Err(Error::BadKeyOrder));
    }
}
