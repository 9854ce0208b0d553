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

enum FrameKind {
    Object,
    Array,
}

struct Frame {
    kind: FrameKind,
    /// The key this frame's record will be filed under in its parent object
    /// once closed, captured from `pending_key` at `begin_*` time. `None` for
    /// an array element or for the frame that becomes the root.
    key: Option<u32>,
    keys: Vec<u32>,
    values: Vec<Handle>,
}

/// Stack-based writer: the caller opens an object or array with `begin_*`,
/// writes its entries (nesting further `begin_*`/`end_*` pairs as needed),
/// then closes it with the matching `end_*`. Calling [`LinearWriter::get_encoded`]
/// auto-closes any frames still open, treating the outermost one as the root.
pub struct LinearWriter {
    options: WriterOptions,
    data: Vec<u8>,
    root_pos_off: usize,
    written_keys: HashMap<Vec<u8>, u32>,
    stack: Vec<Frame>,
    pending_key: Option<u32>,
}

impl LinearWriter {
    pub fn new(options: WriterOptions) -> Result<LinearWriter> {
        let mut data = Vec::new();
        let root_pos_off = write_header(&mut data, &options)?;
        Ok(LinearWriter {
            options,
            data,
            root_pos_off,
            written_keys: HashMap::new(),
            stack: Vec::new(),
            pending_key: None,
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

    /// Declares the key for the next value written inside the current object.
    pub fn key(&mut self, key: &str) -> Result<()> {
        let offset = {
            let bytes = key.as_bytes();
            if self.options.skip_duplicate_keys {
                if let Some(&pos) = self.written_keys.get(bytes) {
                    pos
                } else {
                    let alignment = if self.options.aligned { Some(1) } else { None };
                    let pos = self.options.config.key_length.write(&mut self.data, bytes.len() as u64, alignment)?;
                    let pos = require_u32(pos)?;
                    self.data.extend_from_slice(bytes);
                    self.data.push(0);
                    self.written_keys.insert(bytes.to_vec(), pos);
                    pos
                }
            } else {
                let alignment = if self.options.aligned { Some(1) } else { None };
                let pos = self.options.config.key_length.write(&mut self.data, bytes.len() as u64, alignment)?;
                let pos = require_u32(pos)?;
                self.data.extend_from_slice(bytes);
                self.data.push(0);
                pos
            }
        };
        self.pending_key = Some(offset);
        Ok(())
    }

    fn push_value(&mut self, handle: Handle) -> Result<()> {
        match self.stack.last_mut() {
            None => Err(Error::BadData),
            Some(frame) => {
                match frame.kind {
                    FrameKind::Object => {
                        let key = self.pending_key.take().ok_or(Error::BadData)?;
                        frame.keys.push(key);
                    }
                    FrameKind::Array => {
                        if self.pending_key.is_some() {
                            return Err(Error::BadData);
                        }
                    }
                }
                frame.values.push(handle);
                Ok(())
            }
        }
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.push_value(Handle::new(TypeCode::Null, 0))
    }

    pub fn write_bool(&mut self, val: bool) -> Result<()> {
        self.push_value(Handle::new(TypeCode::Bool, if val { 1 } else { 0 }))
    }

    pub fn write_int32(&mut self, val: i32) -> Result<()> {
        self.push_value(Handle::new(TypeCode::S32, val as u32))
    }

    pub fn write_uint32(&mut self, val: u32) -> Result<()> {
        self.push_value(Handle::new(TypeCode::U32, val))
    }

    pub fn write_float32(&mut self, val: f32) -> Result<()> {
        self.push_value(Handle::new(TypeCode::F32, val.to_bits()))
    }

    pub fn write_int64(&mut self, val: i64) -> Result<()> {
        let pos = self.align8();
        self.data.extend_from_slice(&val.to_le_bytes());
        let handle = Handle::new(TypeCode::S64, require_u32(pos)?);
        self.push_value(handle)
    }

    pub fn write_uint64(&mut self, val: u64) -> Result<()> {
        let pos = self.align8();
        self.data.extend_from_slice(&val.to_le_bytes());
        let handle = Handle::new(TypeCode::U64, require_u32(pos)?);
        self.push_value(handle)
    }

    pub fn write_float64(&mut self, val: f64) -> Result<()> {
        let pos = self.align8();
        self.data.extend_from_slice(&val.to_le_bytes());
        let handle = Handle::new(TypeCode::F64, require_u32(pos)?);
        self.push_value(handle)
    }

    fn write_string_record(&mut self, bytes: &[u8], unit_size: usize, type_code: TypeCode) -> Result<()> {
        let alignment = if self.options.aligned { Some(unit_size) } else { None };
        let code_units = bytes.len() / unit_size;
        let pos = self.options.config.value_length.write(&mut self.data, code_units as u64, alignment)?;
        let pos = require_u32(pos)?;
        self.data.extend_from_slice(bytes);
        self.data.extend(std::iter::repeat(0u8).take(unit_size));
        self.push_value(Handle::new(type_code, pos))
    }

    pub fn write_string_utf8(&mut self, val: &str) -> Result<()> {
        self.write_string_record(val.as_bytes(), 1, TypeCode::String8)
    }

    pub fn write_string_utf16(&mut self, val: &str) -> Result<()> {
        let units: Vec<u8> = val.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        self.write_string_record(&units, 2, TypeCode::String16)
    }

    pub fn write_string_utf32(&mut self, val: &str) -> Result<()> {
        let units: Vec<u8> = val.chars().flat_map(|c| (c as u32).to_le_bytes()).collect();
        self.write_string_record(&units, 4, TypeCode::String32)
    }

    pub fn write_bytes(&mut self, val: &[u8]) -> Result<()> {
        let alignment = if self.options.aligned { Some(1) } else { None };
        let pos = self.options.config.value_length.write(&mut self.data, val.len() as u64, alignment)?;
        let pos = require_u32(pos)?;
        self.data.extend_from_slice(val);
        self.push_value(Handle::new(TypeCode::ByteArray, pos))
    }

    fn write_typed_array<T, F>(&mut self, val: &[T], element_size: usize, type_code: TypeCode, pack: F) -> Result<()>
    where
        F: Fn(&T) -> Vec<u8>,
    {
        let alignment = if self.options.aligned { Some(element_size) } else { None };
        let pos = self.options.config.value_length.write(&mut self.data, val.len() as u64, alignment)?;
        let pos = require_u32(pos)?;
        for v in val {
            self.data.extend_from_slice(&pack(v));
        }
        self.push_value(Handle::new(type_code, pos))
    }

    pub fn write_typed_array_s8(&mut self, val: &[i8]) -> Result<()> {
        self.write_typed_array(val, 1, TypeCode::TypedArrayS8, |v| vec![*v as u8])
    }
    pub fn write_typed_array_u8(&mut self, val: &[u8]) -> Result<()> {
        self.write_typed_array(val, 1, TypeCode::TypedArrayU8, |v| vec![*v])
    }
    pub fn write_typed_array_s16(&mut self, val: &[i16]) -> Result<()> {
        self.write_typed_array(val, 2, TypeCode::TypedArrayS16, |v| v.to_le_bytes().to_vec())
    }
    pub fn write_typed_array_u16(&mut self, val: &[u16]) -> Result<()> {
        self.write_typed_array(val, 2, TypeCode::TypedArrayU16, |v| v.to_le_bytes().to_vec())
    }
    pub fn write_typed_array_s32(&mut self, val: &[i32]) -> Result<()> {
        self.write_typed_array(val, 4, TypeCode::TypedArrayS32, |v| v.to_le_bytes().to_vec())
    }
    pub fn write_typed_array_u32(&mut self, val: &[u32]) -> Result<()> {
        self.write_typed_array(val, 4, TypeCode::TypedArrayU32, |v| v.to_le_bytes().to_vec())
    }
    pub fn write_typed_array_s64(&mut self, val: &[i64]) -> Result<()> {
        self.write_typed_array(val, 8, TypeCode::TypedArrayS64, |v| v.to_le_bytes().to_vec())
    }
    pub fn write_typed_array_u64(&mut self, val: &[u64]) -> Result<()> {
        self.write_typed_array(val, 8, TypeCode::TypedArrayU64, |v| v.to_le_bytes().to_vec())
    }
    pub fn write_typed_array_f32(&mut self, val: &[f32]) -> Result<()> {
        self.write_typed_array(val, 4, TypeCode::TypedArrayF32, |v| v.to_le_bytes().to_vec())
    }
    pub fn write_typed_array_f64(&mut self, val: &[f64]) -> Result<()> {
        self.write_typed_array(val, 8, TypeCode::TypedArrayF64, |v| v.to_le_bytes().to_vec())
    }

    /// Captures the key a new container frame will be filed under in its
    /// parent, consuming `pending_key` immediately so a nested frame's own
    /// `key()` calls can't clobber it before the container closes.
    fn capture_key_for_new_frame(&mut self) -> Result<Option<u32>> {
        match self.stack.last() {
            None => {
                if self.pending_key.is_some() {
                    return Err(Error::BadData);
                }
                Ok(None)
            }
            Some(frame) => match frame.kind {
                FrameKind::Object => self.pending_key.take().map(Some).ok_or(Error::BadData),
                FrameKind::Array => {
                    if self.pending_key.is_some() {
                        return Err(Error::BadData);
                    }
                    Ok(None)
                }
            },
        }
    }

    /// Opens a new object; subsequent `key`/`write_*`/`begin_*` calls populate
    /// it until the matching [`LinearWriter::end_object`].
    pub fn begin_object(&mut self) -> Result<()> {
        let key = self.capture_key_for_new_frame()?;
        self.stack.push(Frame {
            kind: FrameKind::Object,
            key,
            keys: Vec::new(),
            values: Vec::new(),
        });
        Ok(())
    }

    /// Closes the innermost object, emitting its record and pushing its
    /// handle as a value of the enclosing frame (under the key captured when
    /// it was opened), or leaving it as the root if the stack becomes empty.
    pub fn end_object(&mut self) -> Result<()> {
        let frame = self.stack.pop().ok_or(Error::BadData)?;
        if !matches!(frame.kind, FrameKind::Object) {
            return Err(Error::BadData);
        }
        let key = frame.key;
        let handle = self.emit_object(&frame.keys, &frame.values)?;
        if self.stack.is_empty() {
            self.finish(handle)
        } else {
            self.pending_key = key;
            self.push_value(handle)
        }
    }

    pub fn begin_array(&mut self) -> Result<()> {
        let key = self.capture_key_for_new_frame()?;
        self.stack.push(Frame {
            kind: FrameKind::Array,
            key,
            keys: Vec::new(),
            values: Vec::new(),
        });
        Ok(())
    }

    pub fn end_array(&mut self) -> Result<()> {
        let frame = self.stack.pop().ok_or(Error::BadData)?;
        if !matches!(frame.kind, FrameKind::Array) {
            return Err(Error::BadData);
        }
        let key = frame.key;
        let handle = self.emit_array(&frame.values)?;
        if self.stack.is_empty() {
            self.finish(handle)
        } else {
            self.pending_key = key;
            self.push_value(handle)
        }
    }

    fn emit_object(&mut self, keys: &[u32], values: &[Handle]) -> Result<Handle> {
        let alignment = if self.options.aligned { Some(4) } else { None };
        let pos = self.options.config.object_size.write(&mut self.data, values.len() as u64, alignment)?;
        let container_offset = require_u32(pos)?;

        for key in keys {
            self.data.extend_from_slice(&key.to_le_bytes());
        }
        for value in values {
            let payload = if self.options.relative_object_refs && value.type_code.is_reference() {
                container_offset.wrapping_sub(value.payload)
            } else {
                value.payload
            };
            self.data.extend_from_slice(&payload.to_le_bytes());
        }
        for value in values {
            self.data.push(value.type_code.to_byte());
        }

        Ok(Handle::new(TypeCode::Object, container_offset))
    }

    fn emit_array(&mut self, values: &[Handle]) -> Result<Handle> {
        let alignment = if self.options.aligned { Some(4) } else { None };
        let pos = self.options.config.array_length.write(&mut self.data, values.len() as u64, alignment)?;
        let container_offset = require_u32(pos)?;

        for value in values {
            self.data.extend_from_slice(&value.payload.to_le_bytes());
        }
        for value in values {
            self.data.push(value.type_code.to_byte());
        }

        Ok(Handle::new(TypeCode::Array, container_offset))
    }

    fn finish(&mut self, root: Handle) -> Result<()> {
        if root.type_code != TypeCode::Object {
            return Err(Error::BadData);
        }
        patch_root(&mut self.data, self.root_pos_off, root.payload);
        Ok(())
    }

    /// Auto-closes any frames still open (outermost becomes the root object)
    /// and returns the finished buffer.
    pub fn get_encoded(mut self) -> Result<Vec<u8>> {
        while !self.stack.is_empty() {
            match self.stack.last().unwrap().kind {
                FrameKind::Object => self.end_object()?,
                FrameKind::Array => self.end_array()?,
            }
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object() {
        let mut w = LinearWriter::new(WriterOptions::default()).unwrap();
        w.begin_object().unwrap();
        let encoded = w.get_encoded().unwrap();

        let mut expected = b"DATO\x00\x01\x00\x00".to_vec();
        expected.extend_from_slice(&12u32.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_nested_object_with_array() {
        let mut w = LinearWriter::new(WriterOptions::default()).unwrap();
        w.begin_object().unwrap();
        w.key("nums").unwrap();
        w.begin_array().unwrap();
        w.write_int32(1).unwrap();
        w.write_int32(2).unwrap();
        w.end_array().unwrap();
        let encoded = w.get_encoded().unwrap();

        let reader = crate::reader::Reader::new(&encoded, &crate::reader::ReaderOptions::default()).unwrap();
        let root = reader.root().unwrap();
        match root.get("nums", false).unwrap().unwrap() {
            crate::reader::Value::Array(arr) => {
                assert_eq!(arr.len(), 2);
                match arr.get(0).unwrap() {
                    crate::reader::Value::Int32(1) => {}
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_keyed_nested_object() {
        let mut w = LinearWriter::new(WriterOptions::default()).unwrap();
        w.begin_object().unwrap();
        w.key("inner").unwrap();
        w.begin_object().unwrap();
        w.key("x").unwrap();
        w.write_int32(7).unwrap();
        w.end_object().unwrap();
        let encoded = w.get_encoded().unwrap();

        let reader = crate::reader::Reader::new(&encoded, &crate::reader::ReaderOptions::default()).unwrap();
        let root = reader.root().unwrap();
        match root.get("inner", false).unwrap().unwrap() {
            crate::reader::Value::Object(inner) => match inner.get("x", false).unwrap().unwrap() {
                crate::reader::Value::Int32(7) => {}
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_key_without_open_object_fails() {
        let mut w = LinearWriter::new(WriterOptions::default()).unwrap();
        w.begin_array().unwrap();
        w.key("oops").unwrap();
        assert_eq!(w.write_int32(1), Err(Error::BadData));
    }

    #[test]
    fn test_value_missing_key_in_object_fails() {
        let mut w = LinearWriter::new(WriterOptions::default()).unwrap();
        w.begin_object().unwrap();
        assert_eq!(w.write_int32(1), Err(Error::BadData));
    }

    #[test]
    fn test_mismatched_end_fails() {
        let mut w = LinearWriter::new(WriterOptions::default()).unwrap();
        w.begin_object().unwrap();
        assert_eq!(w.end_array(), Err(Error::BadData));
    }
}
