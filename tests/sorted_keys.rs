//
// Copyright 2020 DATO Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use dato::reader::{Reader, ReaderOptions, Value};
use dato::writer::{Builder, WriterOptions};

fn build_sorted_string_keys() -> Vec<u8> {
    let mut options = WriterOptions::default();
    options.sort_keys = true;
    let mut b = Builder::new(options).unwrap();
    let pairs = [("apple", 1), ("banana", 2), ("cherry", 3), ("date", 4), ("fig", 5)];
    let mut entries = Vec::new();
    for (name, n) in pairs.iter() {
        let key = b.append_key(name).unwrap();
        let value = b.append_int32(*n);
        entries.push((key, value));
    }
    let root = b.append_object(&entries).unwrap();
    b.finish(root).unwrap();
    b.get_encoded()
}

fn build_sorted_int_keys() -> Vec<u8> {
    let mut options = WriterOptions::default();
    options.sort_keys = true;
    options.integer_keys = true;
    let mut b = Builder::new(options).unwrap();
    let mut entries = Vec::new();
    for n in [1u32, 5, 10, 42, 100].iter() {
        let key = *n;
        let value = b.append_int32(*n as i32);
        entries.push((key, value));
    }
    let root = b.append_object(&entries).unwrap();
    b.finish(root).unwrap();
    b.get_encoded()
}

#[test]
fn test_binary_search_matches_linear_scan_for_string_keys() {
    let encoded = build_sorted_string_keys();
    let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
    let obj = reader.root().unwrap();

    for name in ["apple", "banana", "cherry", "date", "fig", "missing"] {
        let via_binary_search = obj.get(name, false).unwrap();
        let via_linear_scan = obj.get(name, true).unwrap();
        match (via_binary_search, via_linear_scan) {
            (Some(Value::Int32(a)), Some(Value::Int32(b))) => assert_eq!(a, b),
            (None, None) => {}
            other => panic!("search strategies disagree: {:?}", other),
        }
    }
}

#[test]
fn test_binary_search_matches_linear_scan_for_int_keys() {
    let encoded = build_sorted_int_keys();
    let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
    let obj = reader.root().unwrap();

    for key in [1u32, 5, 10, 42, 100, 7] {
        let via_binary_search = obj.get_by_int(key, false).unwrap();
        let via_linear_scan = obj.get_by_int(key, true).unwrap();
        match (via_binary_search, via_linear_scan) {
            (Some(Value::Int32(a)), Some(Value::Int32(b))) => assert_eq!(a, b),
            (None, None) => {}
            other => panic!("search strategies disagree: {:?}", other),
        }
    }
}

#[test]
fn test_get_on_int_keyed_object_with_string_rejected() {
    let encoded = build_sorted_int_keys();
    let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
    let obj = reader.root().unwrap();
    assert!(obj.get("apple", false).is_err());
}

#[test]
fn test_get_by_int_on_string_keyed_object_rejected() {
    let encoded = build_sorted_string_keys();
    let reader = Reader::new(&encoded, &ReaderOptions::default()).unwrap();
    let obj = reader.root().unwrap();
    assert!(obj.get_by_int(1, false).is_err());
}
