//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! A native reader, writer and validator for the DATO self-describing,
//! random-access binary container format.
//!
//! A document is a header followed by records laid out bottom-up: every
//! value is reachable from a single root object, and strings and typed
//! numeric arrays are exposed as borrowed slices of the input buffer rather
//! than being copied out during parsing.
//!
//! ```
//! use dato::writer::{Builder, WriterOptions};
//! use dato::reader::{Reader, ReaderOptions};
//!
//! let mut builder = Builder::new(WriterOptions::default()).unwrap();
//! let key = builder.append_key("greeting").unwrap();
//! let value = builder.append_string_utf8("hello").unwrap();
//! let root = builder.append_object(&[(key, value)]).unwrap();
//! builder.finish(root).unwrap();
//! let encoded = builder.get_encoded();
//!
//! let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
//! let root = reader.root().unwrap();
//! assert_eq!(root.len(), 1);
//! ```

mod config;
mod error;
pub mod format;
pub mod reader;
pub mod validator;
pub mod writer;

pub use config::{Config, LengthEncoding};
pub use error::{Error, Result};
pub use format::{Flags, Handle, TypeCode};
