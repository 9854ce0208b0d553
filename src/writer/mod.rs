//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! # Writers.
//!
//! Two builders assemble a DATO buffer bottom-up: [`Builder`] hands the
//! caller typed handles to aggregate explicitly, while [`LinearWriter`] tracks
//! a stack of open objects/arrays so the caller can nest `begin_*`/`end_*`
//! calls the way they would write literal struct syntax.

mod builder;
mod handle;
mod linear;

pub use builder::Builder;
pub use handle::{Handle, WriterOptions};
pub use linear::LinearWriter;

use crate::error::Result;
use crate::format::{round_up, Flags};

/// Writes the prefix, config identifier, flags byte and a reserved root
/// offset slot common to both writers. Returns the absolute position of the
/// reserved slot so the caller can patch it in once the root is known.
pub(crate) fn write_header(data: &mut Vec<u8>, options: &WriterOptions) -> Result<usize> {
    crate::format::check_writer_config_id(options.config.identifier)?;

    data.extend_from_slice(&options.prefix);
    data.push(options.config.identifier);

    let flags = Flags::new(
        options.aligned,
        options.integer_keys,
        options.sort_keys,
        options.relative_object_refs,
    );
    data.push(flags.0);

    if options.aligned {
        let pos = round_up(data.len(), 4);
        while data.len() < pos {
            data.push(0);
        }
    }

    let root_pos_off = data.len();
    data.extend_from_slice(&[0, 0, 0, 0]);
    Ok(root_pos_off)
}

/// Patches the reserved root offset slot with the final root position.
pub(crate) fn patch_root(data: &mut [u8], root_pos_off: usize, root_offset: u32) {
    let bytes = root_offset.to_le_bytes();
    data[root_pos_off..root_pos_off + 4].copy_from_slice(&bytes);
}
