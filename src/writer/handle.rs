//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

pub use crate::format::Handle;

/// Shared construction options for `Builder` and `LinearWriter`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct WriterOptions {
    /// Byte string written at the start of the buffer.
    pub prefix: Vec<u8>,
    /// Selects the four length codecs used throughout the document.
    pub config: crate::config::Config,
    /// Whether offsets and length fields are padded to their type's alignment.
    pub aligned: bool,
    /// Whether a repeated key string reuses the offset of its first occurrence.
    pub skip_duplicate_keys: bool,
    /// Whether object keys are raw 32-bit integers instead of string records.
    pub integer_keys: bool,
    /// Sets the `SortedKeys` header flag. The caller is responsible for
    /// actually presenting entries in ascending key order; this flag only
    /// records the claim for the reader to trust (or for the validator to
    /// check).
    pub sort_keys: bool,
    /// Encodes object entry value offsets relative to their container.
    pub relative_object_refs: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            prefix: crate::format::DEFAULT_PREFIX.to_vec(),
            config: crate::config::Config::SPEED_FIRST,
            aligned: true,
            skip_duplicate_keys: true,
            integer_keys: false,
            sort_keys: false,
            relative_object_refs: false,
        }
    }
}
