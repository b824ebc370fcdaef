//! Strong identifier types for dagsync.
//!
//! Every identifier is a fixed-size byte newtype. They serialize as CBOR byte
//! strings rather than integer arrays so wire frames stay compact.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::crypto::Ed25519PublicKey;

/// The author of a feed is identified by their Ed25519 public key.
pub type AuthorId = Ed25519PublicKey;

macro_rules! byte_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let mut arr = [0u8; 32];
                hex::decode_to_slice(s, &mut arr)?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(slice.try_into()?))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde_bytes_array::serialize(&self.0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                serde_bytes_array::deserialize(deserializer).map(Self)
            }
        }
    };
}

byte_id!(
    /// Content address of a message: Blake3 over its canonical encoding.
    ///
    /// Keys are globally unique and immutable; two peers holding the same
    /// message always agree on its key.
    MsgKey,
    "MsgKey"
);

byte_id!(
    /// Identifier of a replicated log.
    ///
    /// For feeds this is the author's public key, for threads the key of the
    /// root message. Sync sessions are keyed 1:1 by this value per stream.
    LogId,
    "LogId"
);

impl From<AuthorId> for LogId {
    fn from(author: AuthorId) -> Self {
        Self(author.0)
    }
}

impl From<MsgKey> for LogId {
    fn from(key: MsgKey) -> Self {
        Self(key.0)
    }
}

impl From<LogId> for AuthorId {
    fn from(id: LogId) -> Self {
        Ed25519PublicKey(id.0)
    }
}

impl From<LogId> for MsgKey {
    fn from(id: LogId) -> Self {
        Self(id.0)
    }
}

/// Serde helpers for fixed-size byte arrays.
///
/// Arrays are written with `serialize_bytes` and accepted back either as a
/// byte string (CBOR) or as a sequence of integers (JSON).
pub(crate) mod serde_bytes_array {
    use serde::de::{Error, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        deserializer.deserialize_bytes(ArrayVisitor::<N>)
    }

    struct ArrayVisitor<const N: usize>;

    impl<'de, const N: usize> Visitor<'de> for ArrayVisitor<N> {
        type Value = [u8; N];

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} bytes", N)
        }

        fn visit_bytes<E: Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            v.try_into().map_err(|_| E::invalid_length(v.len(), &self))
        }

        fn visit_byte_buf<E: Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            self.visit_bytes(&v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = [0u8; N];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::invalid_length(i, &self))?;
            }
            if seq.next_element::<u8>()?.is_some() {
                return Err(A::Error::invalid_length(N + 1, &self));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_key_hex_roundtrip() {
        let key = MsgKey::from_bytes([0x42; 32]);
        let recovered = MsgKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, recovered);
    }

    #[test]
    fn test_from_hex_rejects_short_input() {
        assert!(LogId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_display_is_short_prefix() {
        let id = LogId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
        assert!(format!("{:?}", id).starts_with("LogId("));
    }

    #[test]
    fn test_log_id_conversions() {
        let key = MsgKey::from_bytes([7; 32]);
        let id = LogId::from(key);
        assert_eq!(MsgKey::from(id), key);

        let author = AuthorId::from_bytes([9; 32]);
        assert_eq!(AuthorId::from(LogId::from(author)), author);
    }

    #[test]
    fn test_serializes_as_byte_string() {
        let key = MsgKey::from_bytes([1; 32]);
        let mut buf = Vec::new();
        ciborium::into_writer(&key, &mut buf).unwrap();
        // major type 2, length 32 (one-byte length follows)
        assert_eq!(&buf[..2], &[0x58, 32]);
        let decoded: MsgKey = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_json_accepts_integer_arrays() {
        let key = MsgKey::from_bytes([3; 32]);
        let json = serde_json::to_string(&key).unwrap();
        let decoded: MsgKey = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, key);
    }
}
