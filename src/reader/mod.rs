//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Reading a DATO document.
//!
//! [`Reader`] validates the header and hands back a [`DatoObject`] for the
//! root. From there, [`DatoObject`] and [`DatoArray`] decode entries lazily:
//! opening a document never walks its full contents, and a string or typed
//! array's bytes are borrowed from the input rather than copied.

mod parser;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::convert::TryInto;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::{round_up, Flags, Handle, TypeCode, DEFAULT_PREFIX, MAX_BUILT_IN_CONFIG};

/// Construction options for [`Reader`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ReaderOptions {
    /// The prefix the document is expected to start with.
    pub expected_prefix: Vec<u8>,
    /// A config to accept for identifiers in the user range (128-255). A
    /// document using a built-in identifier (0-4) always resolves against
    /// the built-in registry regardless of this field.
    pub user_config: Option<Config>,
    /// When set, `get` falls back to a linear scan even if the document
    /// claims `SortedKeys`, instead of trusting the claim for a binary search.
    pub ignore_key_sorting: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            expected_prefix: DEFAULT_PREFIX.to_vec(),
            user_config: None,
            ignore_key_sorting: false,
        }
    }
}

/// Entry point for reading a document: validates the header and exposes the
/// root object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reader<'a> {
    input: &'a [u8],
    config: Config,
    flags: Flags,
    root_offset: u32,
}

/// Validates the prefix, config identifier and flags byte common to
/// [`Reader::new`] and [`crate::validator::validate`], returning the
/// resolved config, flags and root offset.
pub(crate) fn parse_header(input: &[u8], options: &ReaderOptions) -> Result<(Config, Flags, u32)> {
    let (rest, _) = parser::prefix(input, &options.expected_prefix).map_err(|_| Error::MissingPrefix)?;
    let (rest, (config_id, flags_byte)) = parser::config_and_flags(rest).map_err(|_| Error::Eof)?;
    let flags = Flags(flags_byte);

    let config = if config_id <= MAX_BUILT_IN_CONFIG {
        Config::by_id(config_id)?
    } else {
        match options.user_config {
            Some(cfg) if cfg.identifier == config_id => cfg,
            Some(cfg) => return Err(Error::WrongConfig { found: cfg.identifier }),
            None => return Err(Error::ReservedConfig),
        }
    };

    let mut pos = input.len() - rest.len();
    if flags.aligned() {
        pos = round_up(pos, 4);
    }
    let slot = input.get(pos..pos + 4).ok_or(Error::Eof)?;
    let (_, root_offset) = parser::u32_field(slot).map_err(|_| Error::Eof)?;

    Ok((config, flags, root_offset))
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a [u8], options: &ReaderOptions) -> Result<Reader<'a>> {
        let (config, flags, root_offset) = parse_header(input, options)?;
        Ok(Reader { input, config, flags, root_offset })
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Returns the root object. A DATO document's root is always an object.
    pub fn root(&self) -> Result<DatoObject<'a>> {
        DatoObject::parse(self.input, self.config, self.flags, self.root_offset)
    }
}

/// The decoded identifier of an object entry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Key<'a> {
    Str(&'a str),
    Int(u32),
}

/// A value read back from a document. Borrows from the original buffer
/// wherever the wire format allows it.
#[derive(Clone, Debug)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Float32(f32),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Object(DatoObject<'a>),
    Array(DatoArray<'a>),
    String(Cow<'a, str>),
    Bytes(&'a [u8]),
    TypedArray(TypedArrayView<'a>),
}

/// A lazily-decoded view over a typed array or byte array record: holds the
/// raw element bytes and decodes individual elements on access rather than
/// eagerly materializing a `Vec`.
#[derive(Copy, Clone, Debug)]
pub struct TypedArrayView<'a> {
    bytes: &'a [u8],
    element_size: usize,
    count: usize,
    element_type: TypeCode,
}

impl<'a> TypedArrayView<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn element_type(&self) -> TypeCode {
        self.element_type
    }

    fn element(&self, i: usize) -> Result<&'a [u8]> {
        if i >= self.count {
            return Err(Error::IndexOutOfRange);
        }
        let start = i * self.element_size;
        Ok(&self.bytes[start..start + self.element_size])
    }

    pub fn get_i8(&self, i: usize) -> Result<i8> {
        self.expect(TypeCode::TypedArrayS8)?;
        Ok(self.element(i)?[0] as i8)
    }

    pub fn get_u8(&self, i: usize) -> Result<u8> {
        self.expect(TypeCode::TypedArrayU8)?;
        Ok(self.element(i)?[0])
    }

    pub fn get_i16(&self, i: usize) -> Result<i16> {
        self.expect(TypeCode::TypedArrayS16)?;
        let b = self.element(i)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u16(&self, i: usize) -> Result<u16> {
        self.expect(TypeCode::TypedArrayU16)?;
        let b = self.element(i)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_i32(&self, i: usize) -> Result<i32> {
        self.expect(TypeCode::TypedArrayS32)?;
        let b = self.element(i)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u32(&self, i: usize) -> Result<u32> {
        self.expect(TypeCode::TypedArrayU32)?;
        let b = self.element(i)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i64(&self, i: usize) -> Result<i64> {
        self.expect(TypeCode::TypedArrayS64)?;
        let b = self.element(i)?;
        Ok(i64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn get_u64(&self, i: usize) -> Result<u64> {
        self.expect(TypeCode::TypedArrayU64)?;
        let b = self.element(i)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn get_f32(&self, i: usize) -> Result<f32> {
        self.expect(TypeCode::TypedArrayF32)?;
        let b = self.element(i)?;
        Ok(f32::from_bits(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
    }

    pub fn get_f64(&self, i: usize) -> Result<f64> {
        self.expect(TypeCode::TypedArrayF64)?;
        let b = self.element(i)?;
        Ok(f64::from_bits(u64::from_le_bytes(b.try_into().unwrap())))
    }

    fn expect(&self, wanted: TypeCode) -> Result<()> {
        if self.element_type == wanted {
            Ok(())
        } else {
            Err(Error::BadData)
        }
    }
}

fn decode_string(input: &[u8], offset: usize, unit_size: usize, code_units: usize) -> Result<&[u8]> {
    let byte_len = code_units * unit_size;
    let content = input.get(offset..offset + byte_len).ok_or(Error::Eof)?;
    let terminator = input.get(offset + byte_len..offset + byte_len + unit_size).ok_or(Error::Eof)?;
    if terminator.iter().any(|&b| b != 0) {
        return Err(Error::MissingNullTerminator);
    }
    Ok(content)
}

fn decode_value<'a>(input: &'a [u8], config: Config, flags: Flags, handle: Handle) -> Result<Value<'a>> {
    use TypeCode::*;
    match handle.type_code {
        Null => Ok(Value::Null),
        Bool => match handle.payload {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            _ => Err(Error::BadData),
        },
        S32 => Ok(Value::Int32(handle.payload as i32)),
        U32 => Ok(Value::UInt32(handle.payload)),
        F32 => Ok(Value::Float32(f32::from_bits(handle.payload))),
        S64 | U64 | F64 => {
            let offset = handle.payload as usize;
            if flags.aligned() && offset % 8 != 0 {
                return Err(Error::Unaligned);
            }
            let slice = input.get(offset..offset + 8).ok_or(Error::Eof)?;
            match handle.type_code {
                S64 => Ok(Value::Int64(parser::heap_i64(slice).map_err(|_| Error::Eof)?.1)),
                U64 => Ok(Value::UInt64(parser::heap_u64(slice).map_err(|_| Error::Eof)?.1)),
                F64 => Ok(Value::Float64(parser::heap_f64(slice).map_err(|_| Error::Eof)?.1)),
                _ => unreachable!(),
            }
        }
        String8 | String16 | String32 => {
            let offset = handle.payload as usize;
            let unit_size = handle.type_code.string_unit_size().unwrap();
            let rest = input.get(offset..).ok_or(Error::Eof)?;
            let (code_units, consumed) = config.value_length.parse(rest)?;
            let content = decode_string(input, offset + consumed, unit_size, code_units as usize)?;
            let text = match handle.type_code {
                String8 => Cow::Borrowed(std::str::from_utf8(content).map_err(|_| Error::BadData)?),
                String16 => {
                    let units: Vec<u16> = content.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
                    Cow::Owned(String::from_utf16(&units).map_err(|_| Error::BadData)?)
                }
                String32 => {
                    let mut out = String::with_capacity(content.len() / 4);
                    for c in content.chunks_exact(4) {
                        let scalar = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                        out.push(char::from_u32(scalar).ok_or(Error::BadData)?);
                    }
                    Cow::Owned(out)
                }
                _ => unreachable!(),
            };
            Ok(Value::String(text))
        }
        ByteArray => {
            let offset = handle.payload as usize;
            let rest = input.get(offset..).ok_or(Error::Eof)?;
            let (len, consumed) = config.value_length.parse(rest)?;
            let content = input.get(offset + consumed..offset + consumed + len as usize).ok_or(Error::Eof)?;
            Ok(Value::Bytes(content))
        }
        Array => Ok(Value::Array(DatoArray::parse(input, config, flags, handle.payload)?)),
        Object => Ok(Value::Object(DatoObject::parse(input, config, flags, handle.payload)?)),
        code => {
            let element_size = code.typed_array_element_size().ok_or(Error::BadData)?;
            let offset = handle.payload as usize;
            let rest = input.get(offset..).ok_or(Error::Eof)?;
            let (count, consumed) = config.value_length.parse(rest)?;
            let count = count as usize;
            let bytes = input.get(offset + consumed..offset + consumed + count * element_size).ok_or(Error::Eof)?;
            Ok(Value::TypedArray(TypedArrayView { bytes, element_size, count, element_type: code }))
        }
    }
}

fn read_handle(input: &[u8], apply_relative: bool, container_offset: u32, values_offset: usize, types_offset: usize, i: usize) -> Result<Handle> {
    let value_slot = input.get(values_offset + i * 4..values_offset + i * 4 + 4).ok_or(Error::Eof)?;
    let (_, raw_payload) = parser::u32_field(value_slot).map_err(|_| Error::Eof)?;
    let type_byte = *input.get(types_offset + i).ok_or(Error::Eof)?;
    let type_code = TypeCode::from_byte(type_byte).ok_or(Error::UnknownBuiltInType { code: type_byte })?;

    let payload = if apply_relative && type_code.is_reference() {
        container_offset.wrapping_sub(raw_payload)
    } else {
        raw_payload
    };
    Ok(Handle::new(type_code, payload))
}

/// A decoded object record. Keys and values are resolved on demand.
#[derive(Clone, Copy, Debug)]
pub struct DatoObject<'a> {
    input: &'a [u8],
    config: Config,
    flags: Flags,
    container_offset: u32,
    count: usize,
    keys_offset: usize,
    values_offset: usize,
    types_offset: usize,
}

impl<'a> DatoObject<'a> {
    fn parse(input: &'a [u8], config: Config, flags: Flags, offset: u32) -> Result<DatoObject<'a>> {
        let start = offset as usize;
        let rest = input.get(start..).ok_or(Error::Eof)?;
        let (count, consumed) = config.object_size.parse(rest)?;
        let count = count as usize;

        let keys_offset = start + consumed;
        let values_offset = keys_offset + count * 4;
        let types_offset = values_offset + count * 4;
        let end = types_offset + count;
        if end > input.len() {
            return Err(Error::Eof);
        }

        Ok(DatoObject {
            input,
            config,
            flags,
            container_offset: offset,
            count,
            keys_offset,
            values_offset,
            types_offset,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn key_slot(&self, i: usize) -> Result<u32> {
        let slot = self.input.get(self.keys_offset + i * 4..self.keys_offset + i * 4 + 4).ok_or(Error::Eof)?;
        Ok(parser::u32_field(slot).map_err(|_| Error::Eof)?.1)
    }

    /// Resolves the key of entry `i`.
    pub fn key_at(&self, i: usize) -> Result<Key<'a>> {
        if i >= self.count {
            return Err(Error::IndexOutOfRange);
        }
        let slot = self.key_slot(i)?;
        if self.flags.integer_keys() {
            Ok(Key::Int(slot))
        } else {
            let offset = slot as usize;
            let rest = self.input.get(offset..).ok_or(Error::Eof)?;
            let (len, consumed) = self.config.key_length.parse(rest)?;
            let content = decode_string(self.input, offset + consumed, 1, len as usize)?;
            Ok(Key::Str(std::str::from_utf8(content).map_err(|_| Error::BadData)?))
        }
    }

    /// Resolves the value of entry `i`.
    pub fn value_at(&self, i: usize) -> Result<Value<'a>> {
        if i >= self.count {
            return Err(Error::IndexOutOfRange);
        }
        let handle = read_handle(self.input, self.flags.relative_object_refs(), self.container_offset, self.values_offset, self.types_offset, i)?;
        decode_value(self.input, self.config, self.flags, handle)
    }

    pub fn entry_at(&self, i: usize) -> Result<(Key<'a>, Value<'a>)> {
        Ok((self.key_at(i)?, self.value_at(i)?))
    }

    pub fn iter(&self) -> ObjectIter<'a> {
        ObjectIter { object: *self, next: 0 }
    }

    /// Looks up a string key. Uses a binary search when the document claims
    /// `SortedKeys` (unless the reader was configured to ignore that claim),
    /// otherwise scans linearly. Returns `Err(BadData)` on an `IntegerKeys`
    /// document; use [`DatoObject::get_by_int`] there instead.
    pub fn get(&self, key: &str, ignore_key_sorting: bool) -> Result<Option<Value<'a>>> {
        if self.flags.integer_keys() {
            return Err(Error::BadData);
        }
        if self.flags.sorted_keys() && !ignore_key_sorting {
            let mut lo = 0usize;
            let mut hi = self.count;
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let candidate = match self.key_at(mid)? {
                    Key::Str(s) => s,
                    Key::Int(_) => unreachable!(),
                };
                match candidate.cmp(key) {
                    Ordering::Equal => return Ok(Some(self.value_at(mid)?)),
                    Ordering::Less => lo = mid + 1,
                    Ordering::Greater => hi = mid,
                }
            }
            Ok(None)
        } else {
            for i in 0..self.count {
                if let Key::Str(s) = self.key_at(i)? {
                    if s == key {
                        return Ok(Some(self.value_at(i)?));
                    }
                }
            }
            Ok(None)
        }
    }

    /// Looks up an integer key, honoring `SortedKeys` the same way `get` does.
    pub fn get_by_int(&self, key: u32, ignore_key_sorting: bool) -> Result<Option<Value<'a>>> {
        if !self.flags.integer_keys() {
            return Err(Error::BadData);
        }
        if self.flags.sorted_keys() && !ignore_key_sorting {
            let mut lo = 0usize;
            let mut hi = self.count;
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let candidate = match self.key_at(mid)? {
                    Key::Int(n) => n,
                    Key::Str(_) => unreachable!(),
                };
                match candidate.cmp(&key) {
                    Ordering::Equal => return Ok(Some(self.value_at(mid)?)),
                    Ordering::Less => lo = mid + 1,
                    Ordering::Greater => hi = mid,
                }
            }
            Ok(None)
        } else {
            for i in 0..self.count {
                if let Key::Int(n) = self.key_at(i)? {
                    if n == key {
                        return Ok(Some(self.value_at(i)?));
                    }
                }
            }
            Ok(None)
        }
    }
}

/// Iterator over an object's entries, in wire order.
pub struct ObjectIter<'a> {
    object: DatoObject<'a>,
    next: usize,
}

impl<'a> Iterator for ObjectIter<'a> {
    type Item = Result<(Key<'a>, Value<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.object.count {
            return None;
        }
        let result = self.object.entry_at(self.next);
        self.next += 1;
        Some(result)
    }
}

/// A decoded array record.
#[derive(Clone, Copy, Debug)]
pub struct DatoArray<'a> {
    input: &'a [u8],
    config: Config,
    flags: Flags,
    count: usize,
    values_offset: usize,
    types_offset: usize,
}

impl<'a> DatoArray<'a> {
    fn parse(input: &'a [u8], config: Config, flags: Flags, offset: u32) -> Result<DatoArray<'a>> {
        let start = offset as usize;
        let rest = input.get(start..).ok_or(Error::Eof)?;
        let (count, consumed) = config.array_length.parse(rest)?;
        let count = count as usize;

        let values_offset = start + consumed;
        let types_offset = values_offset + count * 4;
        let end = types_offset + count;
        if end > input.len() {
            return Err(Error::Eof);
        }

        Ok(DatoArray { input, config, flags, count, values_offset, types_offset })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, i: usize) -> Result<Value<'a>> {
        if i >= self.count {
            return Err(Error::IndexOutOfRange);
        }
        // Arrays are always absolute, regardless of the RelativeObjectRefs flag.
        let handle = read_handle(self.input, false, 0, self.values_offset, self.types_offset, i)?;
        decode_value(self.input, self.config, self.flags, handle)
    }

    pub fn iter(&self) -> ArrayIter<'a> {
        ArrayIter { array: *self, next: 0 }
    }
}

pub struct ArrayIter<'a> {
    array: DatoArray<'a>,
    next: usize,
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = Result<Value<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.array.count {
            return None;
        }
        let result = self.array.get(self.next);
        self.next += 1;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Builder, WriterOptions};

    #[test]
    fn test_read_empty_object() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let root = b.append_object(&[]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();

        let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
        let obj = reader.root().unwrap();
        assert_eq!(obj.len(), 0);
    }

    #[test]
    fn test_read_scalars_roundtrip() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let k_a = b.append_key("a").unwrap();
        let v_a = b.append_bool(true);
        let k_b = b.append_key("b").unwrap();
        let v_b = b.append_int64(-42).unwrap();
        let root = b.append_object(&[(k_a, v_a), (k_b, v_b)]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();

        let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
        let obj = reader.root().unwrap();
        assert_eq!(obj.len(), 2);
        match obj.get("a", false).unwrap().unwrap() {
            Value::Bool(true) => {}
            other => panic!("unexpected {:?}", other),
        }
        match obj.get("b", false).unwrap().unwrap() {
            Value::Int64(-42) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(obj.get("c", false).unwrap().is_none());
    }

    #[test]
    fn test_read_string_and_array() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let s = b.append_string_utf8("hi").unwrap();
        let n1 = b.append_int32(1);
        let n2 = b.append_int32(2);
        let arr = b.append_array(&[n1, n2]).unwrap();
        let k1 = b.append_key("s").unwrap();
        let k2 = b.append_key("nums").unwrap();
        let root = b.append_object(&[(k1, s), (k2, arr)]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();

        let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
        let obj = reader.root().unwrap();
        match obj.get("s", false).unwrap().unwrap() {
            Value::String(s) => assert_eq!(s, "hi"),
            other => panic!("unexpected {:?}", other),
        }
        match obj.get("nums", false).unwrap().unwrap() {
            Value::Array(arr) => {
                assert_eq!(arr.len(), 2);
                match arr.get(0).unwrap() {
                    Value::Int32(1) => {}
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_typed_array() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let ta = b.append_typed_array_f32(&[1.5, 2.5, 3.5]).unwrap();
        let k = b.append_key("v").unwrap();
        let root = b.append_object(&[(k, ta)]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();

        let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
        let obj = reader.root().unwrap();
        match obj.get("v", false).unwrap().unwrap() {
            Value::TypedArray(view) => {
                assert_eq!(view.len(), 3);
                assert_eq!(view.get_f32(1).unwrap(), 2.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let data = b"NOPE\x00\x01\x00\x00\x0c\x00\x00\x00\x00\x00\x00\x00".to_vec();
        assert_eq!(Reader::new(&data, &ReaderOptions::default()), Err(Error::MissingPrefix));
    }

    #[test]
    fn test_relative_object_refs_roundtrip() {
        let mut options = WriterOptions::default();
        options.relative_object_refs = true;
        let mut b = Builder::new(options).unwrap();
        let inner_key = b.append_key("x").unwrap();
        let inner_val = b.append_int32(7);
        let inner = b.append_object(&[(inner_key, inner_val)]).unwrap();
        let outer_key = b.append_key("inner").unwrap();
        let root = b.append_object(&[(outer_key, inner)]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();

        let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
        let obj = reader.root().unwrap();
        match obj.get("inner", false).unwrap().unwrap() {
            Value::Object(inner) => match inner.get("x", false).unwrap().unwrap() {
                Value::Int32(7) => {}
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
