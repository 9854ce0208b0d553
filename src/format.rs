//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # The DATO document format.
//!
//! Constants and structures defined in this module represent the on-wire
//! layout of a DATO document.
//!
//! A DATO document is organized into:
//!
//! 1. Header (prefix, config identifier, flags, root offset)
//! 2. Records, laid out bottom-up by the writer (keys, scalars, strings,
//!    byte arrays, typed arrays, arrays, objects)
//!
//! Every record is reachable starting from the root object referenced by the
//! header; there is no separate offset table, unlike a bplist document.
//!
//! # References
//!
//! 1. `spec.md` sections 2 and 3.

use crate::error::{Error, Result};

/// Default byte string identifying a DATO document at offset 0.
pub const DEFAULT_PREFIX: &[u8] = b"DATO";

/// The highest config identifier reserved for built-in use by this revision.
pub const MAX_BUILT_IN_CONFIG: u8 = 4;

/// The first config identifier available for user extension.
pub const MIN_USER_CONFIG: u8 = 128;

/// The first type code available for user extension; 24-127 are reserved.
pub const MIN_USER_TYPE_CODE: u8 = 128;

/// A single byte identifying the wire representation of a value.
///
/// Codes 5-23 always carry a 32-bit byte offset to a separate record; codes
/// 0-4 carry their entire value inline in the 4-byte payload slot.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum TypeCode {
    Null,
    Bool,
    S32,
    U32,
    F32,
    S64,
    U64,
    F64,
    Array,
    Object,
    String8,
    String16,
    String32,
    ByteArray,
    TypedArrayS8,
    TypedArrayU8,
    TypedArrayS16,
    TypedArrayU16,
    TypedArrayS32,
    TypedArrayU32,
    TypedArrayS64,
    TypedArrayU64,
    TypedArrayF32,
    TypedArrayF64,
}

impl TypeCode {
    /// Returns the wire byte for this type code.
    pub fn to_byte(self) -> u8 {
        use TypeCode::*;
        match self {
            Null => 0,
            Bool => 1,
            S32 => 2,
            U32 => 3,
            F32 => 4,
            S64 => 5,
            U64 => 6,
            F64 => 7,
            Array => 8,
            Object => 9,
            String8 => 10,
            String16 => 11,
            String32 => 12,
            ByteArray => 13,
            TypedArrayS8 => 14,
            TypedArrayU8 => 15,
            TypedArrayS16 => 16,
            TypedArrayU16 => 17,
            TypedArrayS32 => 18,
            TypedArrayU32 => 19,
            TypedArrayS64 => 20,
            TypedArrayU64 => 21,
            TypedArrayF32 => 22,
            TypedArrayF64 => 23,
        }
    }

    /// Decodes a built-in type byte (0-23).
    ///
    /// Returns `None` for 24-127 (reserved) and for 128-255 (user extension);
    /// the caller must special-case the latter rather than dereferencing it.
    pub fn from_byte(byte: u8) -> Option<TypeCode> {
        use TypeCode::*;
        Some(match byte {
            0 => Null,
            1 => Bool,
            2 => S32,
            3 => U32,
            4 => F32,
            5 => S64,
            6 => U64,
            7 => F64,
            8 => Array,
            9 => Object,
            10 => String8,
            11 => String16,
            12 => String32,
            13 => ByteArray,
            14 => TypedArrayS8,
            15 => TypedArrayU8,
            16 => TypedArrayS16,
            17 => TypedArrayU16,
            18 => TypedArrayS32,
            19 => TypedArrayU32,
            20 => TypedArrayS64,
            21 => TypedArrayU64,
            22 => TypedArrayF32,
            23 => TypedArrayF64,
            _ => return None,
        })
    }

    /// True for a value whose entire content fits in the 4-byte payload slot.
    pub fn is_inline(self) -> bool {
        use TypeCode::*;
        matches!(self, Null | Bool | S32 | U32 | F32)
    }

    /// True for a value whose 4-byte payload is a byte offset to a record.
    pub fn is_reference(self) -> bool {
        !self.is_inline()
    }

    /// Byte length of the element type of a typed array, or of a `ByteArray` (1).
    pub fn typed_array_element_size(self) -> Option<usize> {
        use TypeCode::*;
        Some(match self {
            ByteArray | TypedArrayS8 | TypedArrayU8 => 1,
            TypedArrayS16 | TypedArrayU16 => 2,
            TypedArrayS32 | TypedArrayU32 | TypedArrayF32 => 4,
            TypedArrayS64 | TypedArrayU64 | TypedArrayF64 => 8,
            _ => return None,
        })
    }

    /// Alignment required for a heap scalar (`S64`/`U64`/`F64`) when `Aligned` is set.
    pub fn heap_scalar_alignment(self) -> Option<usize> {
        use TypeCode::*;
        match self {
            S64 | U64 | F64 => Some(8),
            _ => None,
        }
    }

    /// Code unit size, in bytes, of a string encoding.
    pub fn string_unit_size(self) -> Option<usize> {
        use TypeCode::*;
        match self {
            String8 => Some(1),
            String16 => Some(2),
            String32 => Some(4),
            _ => None,
        }
    }
}

/// Header flag bits (`spec.md` section 3.3).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Flags(pub u8);

impl Flags {
    pub const ALIGNED: u8 = 1;
    pub const INTEGER_KEYS: u8 = 2;
    pub const SORTED_KEYS: u8 = 4;
    pub const BIG_ENDIAN: u8 = 8;
    pub const RELATIVE_OBJECT_REFS: u8 = 16;

    pub fn new(aligned: bool, integer_keys: bool, sorted_keys: bool, relative_object_refs: bool) -> Flags {
        let mut bits = 0u8;
        if aligned {
            bits |= Self::ALIGNED;
        }
        if integer_keys {
            bits |= Self::INTEGER_KEYS;
        }
        if sorted_keys {
            bits |= Self::SORTED_KEYS;
        }
        if relative_object_refs {
            bits |= Self::RELATIVE_OBJECT_REFS;
        }
        Flags(bits)
    }

    fn has(self, bit: u8) -> bool {
        (self.0 & bit) != 0
    }

    pub fn aligned(self) -> bool {
        self.has(Self::ALIGNED)
    }

    pub fn integer_keys(self) -> bool {
        self.has(Self::INTEGER_KEYS)
    }

    pub fn sorted_keys(self) -> bool {
        self.has(Self::SORTED_KEYS)
    }

    pub fn big_endian(self) -> bool {
        self.has(Self::BIG_ENDIAN)
    }

    pub fn relative_object_refs(self) -> bool {
        self.has(Self::RELATIVE_OBJECT_REFS)
    }
}

/// An opaque reference to a value already written into (or read from) a
/// document buffer.
///
/// For an inline type (`Null`/`Bool`/`S32`/`U32`/`F32`) `payload` holds the
/// value's bits directly; for every other type it holds the absolute byte
/// offset of the record it refers to.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Handle {
    pub type_code: TypeCode,
    pub payload: u32,
}

impl Handle {
    pub fn new(type_code: TypeCode, payload: u32) -> Handle {
        Handle { type_code, payload }
    }
}

/// Rounds `pos` up to the next multiple of `alignment`.
pub fn round_up(pos: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);
    (pos + alignment - 1) / alignment * alignment
}

/// Narrows a buffer position to the `u32` the wire format can reference.
pub fn require_u32(pos: usize) -> Result<u32> {
    if pos > u32::max_value() as usize {
        Err(Error::OutOfRange)
    } else {
        Ok(pos as u32)
    }
}

/// Validates a config identifier is neither reserved (5-127) for writer use.
pub fn check_writer_config_id(id: u8) -> Result<()> {
    if id > MAX_BUILT_IN_CONFIG && id < MIN_USER_CONFIG {
        Err(Error::ReservedConfig)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_roundtrip() {
        for byte in 0u8..=23 {
            let code = TypeCode::from_byte(byte).unwrap();
            assert_eq!(code.to_byte(), byte);
        }
    }

    #[test]
    fn test_type_code_reserved_range() {
        for byte in 24u8..=127 {
            assert!(TypeCode::from_byte(byte).is_none());
        }
    }

    #[test]
    fn test_inline_vs_reference() {
        assert!(TypeCode::Null.is_inline());
        assert!(TypeCode::Bool.is_inline());
        assert!(TypeCode::S32.is_inline());
        assert!(TypeCode::U32.is_inline());
        assert!(TypeCode::F32.is_inline());
        assert!(TypeCode::S64.is_reference());
        assert!(TypeCode::Object.is_reference());
        assert!(TypeCode::TypedArrayF64.is_reference());
    }

    #[test]
    fn test_flags_bits() {
        let flags = Flags::new(true, false, true, false);
        assert!(flags.aligned());
        assert!(!flags.integer_keys());
        assert!(flags.sorted_keys());
        assert!(!flags.relative_object_refs());
        assert_eq!(flags.0, Flags::ALIGNED | Flags::SORTED_KEYS);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 4), 0);
        assert_eq!(round_up(1, 4), 4);
        assert_eq!(round_up(4, 4), 4);
        assert_eq!(round_up(5, 8), 8);
    }

    #[test]
    fn test_check_writer_config_id() {
        assert!(check_writer_config_id(0).is_ok());
        assert!(check_writer_config_id(4).is_ok());
        assert!(check_writer_config_id(128).is_ok());
        assert!(check_writer_config_id(5).is_err());
        assert!(check_writer_config_id(127).is_err());
    }
}
