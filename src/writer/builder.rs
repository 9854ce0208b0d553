//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::format::{require_u32, round_up, TypeCode};
use crate::writer::{patch_root, write_header, Handle, WriterOptions};

/// Bottom-up builder: the caller writes leaves first, collects `Handle`s,
/// then aggregates them into objects and arrays, finishing with a call to
/// [`Builder::finish`] once the root object's handle is known.
///
/// # Notes
///
/// 1. The order in which leaves are written determines their position in the
///    buffer; a child must be written before any object/array that contains it.
/// 2. Dropped midway through (e.g. because an `append_*` call returned an
///    error), a `Builder`'s buffer is not meaningful and should be discarded.
#[derive(Debug)]
pub struct Builder {
    options: WriterOptions,
    data: Vec<u8>,
    root_pos_off: usize,
    written_keys: HashMap<Vec<u8>, u32>,
}

impl Builder {
    /// Creates a new builder, writing the header immediately.
    pub fn new(options: WriterOptions) -> Result<Builder> {
        let mut data = Vec::new();
        let root_pos_off = write_header(&mut data, &options)?;
        Ok(Builder {
            options,
            data,
            root_pos_off,
            written_keys: HashMap::new(),
        })
    }

    fn align8(&mut self) -> usize {
        if self.options.aligned {
            let pos = round_up(self.data.len(), 8);
            while self.data.len() < pos {
                self.data.push(0);
            }
        }
        self.data.len()
    }

    /// Writes a key record (or reuses an identical prior one), returning its
    /// absolute offset.
    pub fn append_key(&mut self, key: &str) -> Result<u32> {
        let bytes = key.as_bytes();
        if self.options.skip_duplicate_keys {
            if let Some(&pos) = self.written_keys.get(bytes) {
                return Ok(pos);
            }
        }
        let alignment = if self.options.aligned { Some(1) } else { None };
        let pos = self.options.config.key_length.write(&mut self.data, bytes.len() as u64, alignment)?;
        let pos = require_u32(pos)?;
        self.data.extend_from_slice(bytes);
        self.data.push(0);
        if self.options.skip_duplicate_keys {
            self.written_keys.insert(bytes.to_vec(), pos);
        }
        Ok(pos)
    }

    pub fn append_null(&self) -> Handle {
        Handle::new(TypeCode::Null, 0)
    }

    pub fn append_bool(&self, val: bool) -> Handle {
        Handle::new(TypeCode::Bool, if val { 1 } else { 0 })
    }

    pub fn append_int32(&self, val: i32) -> Handle {
        Handle::new(TypeCode::S32, val as u32)
    }

    pub fn append_uint32(&self, val: u32) -> Handle {
        Handle::new(TypeCode::U32, val)
    }

    pub fn append_float32(&self, val: f32) -> Handle {
        Handle::new(TypeCode::F32, val.to_bits())
    }

    pub fn append_int64(&mut self, val: i64) -> Result<Handle> {
        let pos = self.align8();
        self.data.extend_from_slice(&val.to_le_bytes());
        Ok(Handle::new(TypeCode::S64, require_u32(pos)?))
    }

    pub fn append_uint64(&mut self, val: u64) -> Result<Handle> {
        let pos = self.align8();
        self.data.extend_from_slice(&val.to_le_bytes());
        Ok(Handle::new(TypeCode::U64, require_u32(pos)?))
    }

    pub fn append_float64(&mut self, val: f64) -> Result<Handle> {
        let pos = self.align8();
        self.data.extend_from_slice(&val.to_le_bytes());
        Ok(Handle::new(TypeCode::F64, require_u32(pos)?))
    }

    fn append_string(&mut self, bytes: &[u8], unit_size: usize, type_code: TypeCode) -> Result<Handle> {
        let alignment = if self.options.aligned { Some(unit_size) } else { None };
        let code_units = bytes.len() / unit_size;
        let pos = self.options.config.value_length.write(&mut self.data, code_units as u64, alignment)?;
        let pos = require_u32(pos)?;
        self.data.extend_from_slice(bytes);
        self.data.extend(std::iter::repeat(0u8).take(unit_size));
        Ok(Handle::new(type_code, pos))
    }

    /// Encodes `val` as a UTF-8 string record.
    pub fn append_string_utf8(&mut self, val: &str) -> Result<Handle> {
        self.append_string(val.as_bytes(), 1, TypeCode::String8)
    }

    /// Encodes `val` as a UTF-16LE string record.
    pub fn append_string_utf16(&mut self, val: &str) -> Result<Handle> {
        let units: Vec<u8> = val.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        self.append_string(&units, 2, TypeCode::String16)
    }

    /// Encodes `val` as a UTF-32LE string record.
    pub fn append_string_utf32(&mut self, val: &str) -> Result<Handle> {
        let units: Vec<u8> = val.chars().flat_map(|c| (c as u32).to_le_bytes()).collect();
        self.append_string(&units, 4, TypeCode::String32)
    }

    /// Encodes `val` as a raw byte array (no terminator).
    pub fn append_bytes(&mut self, val: &[u8]) -> Result<Handle> {
        let alignment = if self.options.aligned { Some(1) } else { None };
        let pos = self.options.config.value_length.write(&mut self.data, val.len() as u64, alignment)?;
        let pos = require_u32(pos)?;
        self.data.extend_from_slice(val);
        Ok(Handle::new(TypeCode::ByteArray, pos))
    }

    fn append_typed_array<T, F>(&mut self, val: &[T], element_size: usize, type_code: TypeCode, pack: F) -> Result<Handle>
    where
        F: Fn(&T) -> Vec<u8>,
    {
        let alignment = if self.options.aligned { Some(element_size) } else { None };
        let pos = self.options.config.value_length.write(&mut self.data, val.len() as u64, alignment)?;
        let pos = require_u32(pos)?;
        for v in val {
            self.data.extend_from_slice(&pack(v));
        }
        Ok(Handle::new(type_code, pos))
    }

    pub fn append_typed_array_s8(&mut self, val: &[i8]) -> Result<Handle> {
        self.append_typed_array(val, 1, TypeCode::TypedArrayS8, |v| vec![*v as u8])
    }
    pub fn append_typed_array_u8(&mut self, val: &[u8]) -> Result<Handle> {
        self.append_typed_array(val, 1, TypeCode::TypedArrayU8, |v| vec![*v])
    }
    pub fn append_typed_array_s16(&mut self, val: &[i16]) -> Result<Handle> {
        self.append_typed_array(val, 2, TypeCode::TypedArrayS16, |v| v.to_le_bytes().to_vec())
    }
    pub fn append_typed_array_u16(&mut self, val: &[u16]) -> Result<Handle> {
        self.append_typed_array(val, 2, TypeCode::TypedArrayU16, |v| v.to_le_bytes().to_vec())
    }
    pub fn append_typed_array_s32(&mut self, val: &[i32]) -> Result<Handle> {
        self.append_typed_array(val, 4, TypeCode::TypedArrayS32, |v| v.to_le_bytes().to_vec())
    }
    pub fn append_typed_array_u32(&mut self, val: &[u32]) -> Result<Handle> {
        self.append_typed_array(val, 4, TypeCode::TypedArrayU32, |v| v.to_le_bytes().to_vec())
    }
    pub fn append_typed_array_s64(&mut self, val: &[i64]) -> Result<Handle> {
        self.append_typed_array(val, 8, TypeCode::TypedArrayS64, |v| v.to_le_bytes().to_vec())
    }
    pub fn append_typed_array_u64(&mut self, val: &[u64]) -> Result<Handle> {
        self.append_typed_array(val, 8, TypeCode::TypedArrayU64, |v| v.to_le_bytes().to_vec())
    }
    pub fn append_typed_array_f32(&mut self, val: &[f32]) -> Result<Handle> {
        self.append_typed_array(val, 4, TypeCode::TypedArrayF32, |v| v.to_le_bytes().to_vec())
    }
    pub fn append_typed_array_f64(&mut self, val: &[f64]) -> Result<Handle> {
        self.append_typed_array(val, 8, TypeCode::TypedArrayF64, |v| v.to_le_bytes().to_vec())
    }

    /// Assembles `entries` (key slot, value handle) into an object record.
    /// Keys are raw integers if `integer_keys` was set, otherwise offsets
    /// previously returned by [`Builder::append_key`]. Entries must already
    /// be in ascending key order when `sort_keys` was set.
    pub fn append_object(&mut self, entries: &[(u32, Handle)]) -> Result<Handle> {
        let alignment = if self.options.aligned { Some(4) } else { None };
        let pos = self.options.config.object_size.write(&mut self.data, entries.len() as u64, alignment)?;
        let container_offset = require_u32(pos)?;

        for (key, _) in entries {
            self.data.extend_from_slice(&key.to_le_bytes());
        }
        for (_, value) in entries {
            let payload = if self.options.relative_object_refs && value.type_code.is_reference() {
                container_offset.wrapping_sub(value.payload)
            } else {
                value.payload
            };
            self.data.extend_from_slice(&payload.to_le_bytes());
        }
        for (_, value) in entries {
            self.data.push(value.type_code.to_byte());
        }

        Ok(Handle::new(TypeCode::Object, container_offset))
    }

    /// Convenience over [`Builder::append_key`] + [`Builder::append_object`]
    /// for string-keyed objects.
    pub fn append_object_with_keys(&mut self, entries: &[(&str, Handle)]) -> Result<Handle> {
        let mut resolved = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            resolved.push((self.append_key(key)?, *value));
        }
        self.append_object(&resolved)
    }

    /// Assembles `elements` into an array record.
    pub fn append_array(&mut self, elements: &[Handle]) -> Result<Handle> {
        let alignment = if self.options.aligned { Some(4) } else { None };
        let pos = self.options.config.array_length.write(&mut self.data, elements.len() as u64, alignment)?;
        let container_offset = require_u32(pos)?;

        for value in elements {
            self.data.extend_from_slice(&value.payload.to_le_bytes());
        }
        for value in elements {
            self.data.push(value.type_code.to_byte());
        }

        Ok(Handle::new(TypeCode::Array, container_offset))
    }

    /// Writes `root`'s offset into the header's reserved slot. `root` must
    /// be a handle previously returned by `append_object`.
    pub fn finish(&mut self, root: Handle) -> Result<()> {
        if root.type_code != TypeCode::Object {
            return Err(Error::BadData);
        }
        patch_root(&mut self.data, self.root_pos_off, root.payload);
        Ok(())
    }

    /// Consumes the builder, returning the finished buffer.
    pub fn get_encoded(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let root = b.append_object(&[]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();
        let mut expected = b"DATO\x00\x01\x00\x00".to_vec();
        expected.extend_from_slice(&12u32.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_object_with_null() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let key = b.append_key("a").unwrap();
        let value = b.append_null();
        let root = b.append_object(&[(key, value)]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();

        let mut expected = b"DATO\x00\x01\x00\x00".to_vec();
        expected.extend_from_slice(&20u32.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(b"a\0\0\0");
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&12u32.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.push(0);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_duplicate_key_dedup() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let k1 = b.append_key("dup").unwrap();
        let k2 = b.append_key("dup").unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_int64_scalar() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        let value = b.append_int64(-12345654321).unwrap();
        let key = b.append_key("def").unwrap();
        let root = b.append_object(&[(key, value)]).unwrap();
        b.finish(root).unwrap();
        let encoded = b.get_encoded();

        let mut expected = b"DATO\x00\x01\x00\x00".to_vec();
        expected.extend_from_slice(&32u32.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&(-12345654321i64).to_le_bytes());
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(b"def\0");
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&24u32.to_le_bytes());
        expected.extend_from_slice(&16u32.to_le_bytes());
        expected.push(5);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_finish_rejects_non_object_root() {
        let mut b = Builder::new(WriterOptions::default()).unwrap();
        assert_eq!(b.finish(b.append_null()), Err(Error::BadData));
    }
}
