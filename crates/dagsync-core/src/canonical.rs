//! Canonical CBOR encoding of message values.
//!
//! Values are encoded as a CBOR map with small integer keys, following RFC 8949
//! core deterministic encoding:
//! - map keys sorted by their encoded bytes
//! - integers in their shortest form
//! - definite lengths only
//! - no floats (timestamps are i64 milliseconds)
//!
//! Two peers that hold the same value always produce the same bytes, and so
//! the same [`MsgKey`](crate::types::MsgKey).

use ciborium::value::{Integer, Value};

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::error::CoreError;
use crate::msg::{MsgContent, MsgValue};
use crate::types::MsgKey;

/// Integer map keys. 0-23 encode as a single byte.
mod keys {
    pub const AUTHOR: u64 = 0;
    pub const SEQUENCE: u64 = 1;
    pub const PREVIOUS: u64 = 2;
    pub const TIMESTAMP: u64 = 3;
    pub const ROOT: u64 = 4;
    pub const BRANCH: u64 = 5;
    pub const TEXT: u64 = 6;
    pub const SIGNATURE: u64 = 7;
}

/// Bytes covered by the author's signature: every field except the signature.
pub fn signing_bytes(value: &MsgValue) -> Vec<u8> {
    encode(&to_cbor_value(value, false))
}

/// Full canonical encoding, signature included.
pub fn canonical_bytes(value: &MsgValue) -> Vec<u8> {
    encode(&to_cbor_value(value, true))
}

fn optional_key(key: &Option<MsgKey>) -> Value {
    match key {
        Some(k) => Value::Bytes(k.0.to_vec()),
        None => Value::Null,
    }
}

fn to_cbor_value(value: &MsgValue, with_signature: bool) -> Value {
    let int = |k: u64| Value::Integer(k.into());
    let mut entries = vec![
        (int(keys::AUTHOR), Value::Bytes(value.author.0.to_vec())),
        (int(keys::SEQUENCE), Value::Integer(value.sequence.into())),
        (int(keys::PREVIOUS), optional_key(&value.previous)),
        (int(keys::TIMESTAMP), Value::Integer(value.timestamp.into())),
        (int(keys::ROOT), optional_key(&value.content.root)),
        (int(keys::BRANCH), optional_key(&value.content.branch)),
        (int(keys::TEXT), Value::Text(value.content.text.clone())),
    ];
    if with_signature {
        entries.push((
            int(keys::SIGNATURE),
            Value::Bytes(value.signature.0.to_vec()),
        ));
    }
    Value::Map(entries)
}

fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            encode_uint(buf, 4, items.len() as u64);
            for item in items {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        // to_cbor_value never produces floats, tags or undefined
        other => unreachable!("unsupported value in canonical encoding: {:?}", other),
    }
}

fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n = i128::from(i);
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // major type 1 stores -1 - n
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Write a major type header with the shortest argument encoding.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | n as u8);
    } else if n <= u8::MAX as u64 {
        buf.extend_from_slice(&[mt | 24, n as u8]);
    } else if n <= u16::MAX as u64 {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_map(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut sorted: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| (encode(k), v))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, sorted.len() as u64);
    for (key_bytes, value) in sorted {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode a value previously produced by [`canonical_bytes`].
///
/// Input that decodes but is not in canonical form is rejected, so a decoded
/// value always hashes to the key of the bytes it came from.
pub fn decode_msg_value(bytes: &[u8]) -> Result<MsgValue, CoreError> {
    let parsed: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    let value = from_cbor_value(&parsed)?;
    if canonical_bytes(&value) != bytes {
        return Err(CoreError::MalformedMessage("non-canonical encoding".into()));
    }
    Ok(value)
}

fn from_cbor_value(value: &Value) -> Result<MsgValue, CoreError> {
    let Value::Map(map) = value else {
        return Err(CoreError::MalformedMessage("expected map".into()));
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };
    let malformed = |field: &str| CoreError::MalformedMessage(format!("invalid {}", field));

    let bytes32 = |key: u64, field: &str| -> Result<[u8; 32], CoreError> {
        match get(key) {
            Some(Value::Bytes(b)) => b.as_slice().try_into().map_err(|_| malformed(field)),
            _ => Err(malformed(field)),
        }
    };
    let optional_key = |key: u64, field: &str| -> Result<Option<MsgKey>, CoreError> {
        match get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(Value::Bytes(b)) => b
                .as_slice()
                .try_into()
                .map(|arr| Some(MsgKey(arr)))
                .map_err(|_| malformed(field)),
            _ => Err(malformed(field)),
        }
    };

    let author = Ed25519PublicKey(bytes32(keys::AUTHOR, "author")?);

    let sequence = match get(keys::SEQUENCE) {
        Some(Value::Integer(i)) => u64::try_from(*i).map_err(|_| malformed("sequence"))?,
        _ => return Err(malformed("sequence")),
    };

    let timestamp = match get(keys::TIMESTAMP) {
        Some(Value::Integer(i)) => i64::try_from(*i).map_err(|_| malformed("timestamp"))?,
        _ => return Err(malformed("timestamp")),
    };

    let text = match get(keys::TEXT) {
        Some(Value::Text(s)) => s.clone(),
        _ => return Err(malformed("text")),
    };

    let signature = match get(keys::SIGNATURE) {
        Some(Value::Bytes(b)) => {
            Ed25519Signature(b.as_slice().try_into().map_err(|_| malformed("signature"))?)
        }
        _ => return Err(malformed("signature")),
    };

    Ok(MsgValue {
        author,
        sequence,
        previous: optional_key(keys::PREVIOUS, "previous")?,
        timestamp,
        content: MsgContent {
            root: optional_key(keys::ROOT, "root")?,
            branch: optional_key(keys::BRANCH, "branch")?,
            text,
        },
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::msg::MsgBuilder;
    use proptest::prelude::*;

    fn reply(keypair: &Keypair) -> MsgValue {
        MsgBuilder::new(keypair.public_key(), 3)
            .previous(MsgKey([1; 32]))
            .root(MsgKey([2; 32]))
            .branch(MsgKey([3; 32]))
            .timestamp(-5)
            .text("negative clocks happen")
            .sign(keypair)
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let value = reply(&keypair);
        assert_eq!(canonical_bytes(&value), canonical_bytes(&value.clone()));
    }

    #[test]
    fn test_signing_bytes_exclude_signature() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let value = reply(&keypair);
        let mut resigned = value.clone();
        resigned.signature = Ed25519Signature::ZERO;
        assert_eq!(signing_bytes(&value), signing_bytes(&resigned));
        assert_ne!(canonical_bytes(&value), canonical_bytes(&resigned));
    }

    #[test]
    fn test_integer_encoding() {
        let cases: [(u64, &[u8]); 6] = [
            (0, &[0x00]),
            (23, &[0x17]),
            (24, &[0x18, 24]),
            (255, &[0x18, 0xff]),
            (256, &[0x19, 0x01, 0x00]),
            (65536, &[0x1a, 0x00, 0x01, 0x00, 0x00]),
        ];
        for (n, expected) in cases {
            let mut buf = Vec::new();
            encode_uint(&mut buf, 0, n);
            assert_eq!(buf, expected, "encoding of {}", n);
        }

        let mut buf = Vec::new();
        encode_integer(&mut buf, Integer::from(-1i64));
        assert_eq!(buf, vec![0x20]);
    }

    #[test]
    fn test_decode_roundtrip() {
        let keypair = Keypair::from_seed(&[7; 32]);
        let value = reply(&keypair);
        let decoded = decode_msg_value(&canonical_bytes(&value)).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.key(), value.key());
    }

    #[test]
    fn test_decode_rejects_non_canonical_input() {
        let keypair = Keypair::from_seed(&[7; 32]);
        let value = reply(&keypair);
        // serde's encoding uses text keys, which is not the canonical form
        let mut buf = Vec::new();
        ciborium::into_writer(&value, &mut buf).unwrap();
        assert!(decode_msg_value(&buf).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_msg_value(&[0xff, 0x00]),
            Err(CoreError::DecodingError(_))
        ));
        assert!(matches!(
            decode_msg_value(&[0x01]),
            Err(CoreError::MalformedMessage(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_key_determined_by_fields(seq in 1u64..1_000_000, ts in any::<i64>(), text in ".{0,64}") {
            let keypair = Keypair::from_seed(&[9; 32]);
            let a = MsgBuilder::new(keypair.public_key(), seq).timestamp(ts).text(text.clone()).sign(&keypair);
            let b = MsgBuilder::new(keypair.public_key(), seq).timestamp(ts).text(text).sign(&keypair);
            prop_assert_eq!(a.key(), b.key());
        }
    }
}
