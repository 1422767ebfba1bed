//! Canonical encoding and content addressing of [`Value`] trees.
//!
//! The encoding writes one tag byte per node followed by a length-prefixed
//! payload. Mapping entries are emitted in key order and set elements in
//! [`Value`] order, so insertion order never affects the address.
//!
//! ```text
//! map  := MAP  len (len:u64 key:bytes value)*
//! seq  := SEQ  len value*
//! set  := SET  len value*
//! str  := STR  len bytes
//! ```

use crate::hash::{ContentHash, ContentHasher, HashAlgorithm};
use crate::value::{Map, Value};

/// Tag bytes for the canonical encoding.
pub mod tags {
    /// [`Value::Null`](crate::Value::Null)
    pub const NULL: u8 = 0x00;
    /// [`Value::Bool`](crate::Value::Bool)
    pub const BOOL: u8 = 0x01;
    /// [`Value::Int`](crate::Value::Int)
    pub const INT: u8 = 0x02;
    /// A finite [`Value::Float`](crate::Value::Float), as IEEE bits.
    pub const FLOAT: u8 = 0x03;
    /// A non-finite float, as its textual form.
    pub const FLOAT_TEXT: u8 = 0x04;
    /// [`Value::Str`](crate::Value::Str)
    pub const STR: u8 = 0x05;
    /// [`Value::Seq`](crate::Value::Seq)
    pub const SEQ: u8 = 0x10;
    /// [`Value::Set`](crate::Value::Set)
    pub const SET: u8 = 0x11;
    /// [`Value::Map`](crate::Value::Map)
    pub const MAP: u8 = 0x12;
    /// A record of several values hashed together (see [`address_record`](super::address_record)).
    pub const RECORD: u8 = 0x20;
}

/// Computes the content address of a value.
///
/// Structurally equal values always produce equal addresses, regardless of
/// mapping insertion order or physical sharing.
pub fn address(value: &Value, algorithm: HashAlgorithm) -> ContentHash {
    let mut hasher = ContentHasher::new(algorithm);
    encode(value, &mut hasher);
    hasher.finish()
}

/// Computes the content address of a bare mapping, identical to addressing
/// the same entries wrapped in [`Value::Map`].
pub fn address_map(map: &Map, algorithm: HashAlgorithm) -> ContentHash {
    let mut hasher = ContentHasher::new(algorithm);
    encode_map(map, &mut hasher);
    hasher.finish()
}

/// Addresses a record of named fields: each field contributes its name and
/// an already computed hash.
///
/// Used to derive composite keys without re-encoding the underlying values.
pub fn address_record(algorithm: HashAlgorithm, fields: &[(&str, &ContentHash)]) -> ContentHash {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(&[tags::RECORD]);
    write_len(&mut hasher, fields.len());
    for (name, hash) in fields {
        write_str(&mut hasher, name);
        hasher.update_hash(hash);
    }
    hasher.finish()
}

/// A pending piece of the canonical encoding.
enum Step<'a> {
    Node(&'a Value),
    Key(&'a str),
}

/// Writes the canonical encoding of `value` into `hasher`.
///
/// Walks with an explicit stack, so arbitrarily deep trees cannot exhaust the
/// call stack.
pub fn encode(value: &Value, hasher: &mut ContentHasher) {
    drain(vec![Step::Node(value)], hasher);
}

fn encode_map(map: &Map, hasher: &mut ContentHasher) {
    let mut stack = Vec::new();
    open_map(map, hasher, &mut stack);
    drain(stack, hasher);
}

fn drain<'a>(mut stack: Vec<Step<'a>>, hasher: &mut ContentHasher) {
    while let Some(step) = stack.pop() {
        let node = match step {
            Step::Key(key) => {
                write_str(hasher, key);
                continue;
            }
            Step::Node(node) => node,
        };
        match node {
            Value::Null => hasher.update(&[tags::NULL]),
            Value::Bool(b) => hasher.update(&[tags::BOOL, u8::from(*b)]),
            Value::Int(i) => {
                hasher.update(&[tags::INT]);
                hasher.update(&i.to_le_bytes());
            }
            Value::Float(f) => encode_float(*f, hasher),
            Value::Str(s) => {
                hasher.update(&[tags::STR]);
                write_str(hasher, s);
            }
            Value::Seq(items) => {
                hasher.update(&[tags::SEQ]);
                write_len(hasher, items.len());
                stack.extend(items.iter().rev().map(Step::Node));
            }
            Value::Set(items) => {
                hasher.update(&[tags::SET]);
                write_len(hasher, items.len());
                stack.extend(items.iter().rev().map(Step::Node));
            }
            Value::Map(map) => open_map(map, hasher, &mut stack),
        }
    }
}

/// Writes a mapping header and queues its entries so they pop in key order.
fn open_map<'a>(map: &'a Map, hasher: &mut ContentHasher, stack: &mut Vec<Step<'a>>) {
    hasher.update(&[tags::MAP]);
    write_len(hasher, map.len());
    for (key, item) in map.iter().rev() {
        stack.push(Step::Node(item));
        stack.push(Step::Key(&**key));
    }
}

/// Writes a float scalar. Non-finite values fall back to their text form so
/// that every NaN payload addresses identically.
pub fn encode_float(f: f64, hasher: &mut ContentHasher) {
    if f.is_finite() {
        hasher.update(&[tags::FLOAT]);
        hasher.update(&f.to_bits().to_le_bytes());
    } else {
        hasher.update(&[tags::FLOAT_TEXT]);
        write_str(hasher, &f.to_string());
    }
}

/// Writes a collection or string length.
pub fn write_len(hasher: &mut ContentHasher, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

/// Writes a length-prefixed string.
pub fn write_str(hasher: &mut ContentHasher, s: &str) {
    write_len(hasher, s.len());
    hasher.update(s.as_bytes());
}
