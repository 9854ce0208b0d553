//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use std;
use std::fmt::{self, Display};

pub type Result<T> = std::result::Result<T, Error>;

/// DATO writer, reader and validator error.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Error {
    /// A numeric value or a length does not fit the codec or slot chosen to hold it.
    OutOfRange,
    /// A config identifier in the reserved range (5-127) was used.
    ReservedConfig,
    /// The buffer does not start with the expected prefix.
    MissingPrefix,
    /// The config identifier in the header differs from the one expected by the reader.
    WrongConfig { found: u8 },
    /// A read would go past the end of the buffer.
    Eof,
    /// An offset embedded in the buffer violates the alignment required by its type.
    Unaligned,
    /// `SortedKeys` is set but the keys of an object are not strictly ascending.
    BadKeyOrder,
    /// A type code in the reserved range (24-127) was encountered.
    UnknownBuiltInType { code: u8 },
    /// A string's null terminator bytes are not all zero.
    MissingNullTerminator,
    /// An inline payload holds a value outside its permitted set (e.g. a non-0/1 `Bool`).
    BadData,
    /// An array index, or an offset read back from the buffer, is out of range.
    IndexOutOfRange,
}

impl Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OutOfRange =>
                formatter.write_str("value does not fit in the chosen codec or slot"),
            Error::ReservedConfig =>
                formatter.write_str("config identifier is in the reserved range (5-127)"),
            Error::MissingPrefix =>
                formatter.write_str("missing or mismatched buffer prefix"),
            Error::WrongConfig { found } =>
                write!(formatter, "unexpected config identifier {} in header", found),
            Error::Eof =>
                formatter.write_str("unexpected end of buffer"),
            Error::Unaligned =>
                formatter.write_str("offset violates required alignment"),
            Error::BadKeyOrder =>
                formatter.write_str("keys declared sorted are not strictly ascending"),
            Error::UnknownBuiltInType { code } =>
                write!(formatter, "unknown built-in type code {}", code),
            Error::MissingNullTerminator =>
                formatter.write_str("string is missing its null terminator"),
            Error::BadData =>
                formatter.write_str("inline payload holds a value outside its permitted set"),
            Error::IndexOutOfRange =>
                formatter.write_str("index or offset is out of range"),
        }
    }
}

impl std::error::Error for Error {}
