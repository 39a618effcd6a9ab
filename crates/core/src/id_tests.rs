// SPDX-License-Identifier: MIT

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn new_ids_carry_the_prefix() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn new_ids_are_unique() {
    assert_ne!(TestId::new(), TestId::new());
}

#[test]
fn from_string_round_trips() {
    let id = TestId::from_string("tst-abc");
    assert_eq!(id.as_str(), "tst-abc");
    assert_eq!(id, "tst-abc");
}

#[test]
fn suffix_strips_the_prefix() {
    let id = TestId::from_string("tst-abcdef");
    assert_eq!(id.suffix(), "abcdef");
}

#[test]
fn suffix_is_unchanged_without_a_matching_prefix() {
    let id = TestId::from_string("nope");
    assert_eq!(id.suffix(), "nope");
}

#[test]
fn short_truncates_the_suffix() {
    let id = TestId::from_string("tst-abcdefghij");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn short_returns_full_suffix_when_shorter_than_n() {
    let id = TestId::from_string("tst-ab");
    assert_eq!(id.short(8), "ab");
}

#[test]
fn is_empty_is_false_for_generated_ids() {
    assert!(!TestId::new().is_empty());
}

#[test]
fn ids_are_usable_as_hash_map_keys() {
    let id = TestId::from_string("tst-k");
    let mut map = HashMap::new();
    map.insert(id, 42);
    assert_eq!(map.get("tst-k"), Some(&42));
}

#[test]
fn default_generates_a_fresh_id() {
    assert!(!TestId::default().is_empty());
}

// --- free function `short` ---

#[test]
fn short_fn_truncates() {
    assert_eq!(short("abcdefghijklmnop", 8), "abcdefgh");
}

#[test]
fn short_fn_returns_full_string_when_shorter_or_equal() {
    assert_eq!(short("abc", 8), "abc");
    assert_eq!(short("abcdefgh", 8), "abcdefgh");
}

// --- IdBuf ---

#[test]
fn id_buf_holds_strings_up_to_the_max_len() {
    let buf = IdBuf::new(&"a".repeat(ID_MAX_LEN));
    assert_eq!(buf.as_str().len(), ID_MAX_LEN);
}

#[test]
fn id_buf_empty_has_no_bytes() {
    assert!(IdBuf::empty().is_empty());
}
