//! Signed log messages.
//!
//! A message value is immutable once signed. Its key is the Blake3 hash of
//! its canonical encoding, so the key commits to every field including the
//! signature.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_bytes, signing_bytes};
use crate::crypto::{Blake3Hash, Ed25519Signature, Keypair};
use crate::types::{AuthorId, MsgKey};

/// Domain separator mixed into every message key.
const KEY_DOMAIN: &[u8] = b"dagsync/msg/v1";

/// Application content carried by a message.
///
/// `root` and `branch` are only set on thread replies: `root` names the
/// message that started the thread, `branch` the message being replied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgContent {
    pub root: Option<MsgKey>,
    pub branch: Option<MsgKey>,
    pub text: String,
}

/// The signed payload of a message plus its ordering metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgValue {
    pub author: AuthorId,
    /// Position in the author's feed, starting at 1.
    pub sequence: u64,
    /// Key of the author's message at `sequence - 1`.
    pub previous: Option<MsgKey>,
    /// Claimed creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub content: MsgContent,
    pub signature: Ed25519Signature,
}

impl MsgValue {
    /// Recompute the content address of this value.
    pub fn key(&self) -> MsgKey {
        MsgKey(Blake3Hash::hash_parts(&[KEY_DOMAIN, &canonical_bytes(self)]).0)
    }

    /// Thread root this value replies to, if any.
    pub fn root(&self) -> Option<MsgKey> {
        self.content.root
    }

    pub fn is_reply(&self) -> bool {
        self.content.root.is_some()
    }
}

/// A message as held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    pub key: MsgKey,
    pub value: MsgValue,
    /// Local receive time, milliseconds since the Unix epoch.
    pub received_at: i64,
}

impl Msg {
    /// Wrap a value, computing its key.
    pub fn new(value: MsgValue, received_at: i64) -> Self {
        Self {
            key: value.key(),
            value,
            received_at,
        }
    }

    pub fn author(&self) -> &AuthorId {
        &self.value.author
    }

    pub fn sequence(&self) -> u64 {
        self.value.sequence
    }
}

/// Builder for signed message values.
pub struct MsgBuilder {
    author: AuthorId,
    sequence: u64,
    previous: Option<MsgKey>,
    timestamp: i64,
    content: MsgContent,
}

impl MsgBuilder {
    pub fn new(author: AuthorId, sequence: u64) -> Self {
        Self {
            author,
            sequence,
            previous: None,
            timestamp: 0,
            content: MsgContent::default(),
        }
    }

    pub fn previous(mut self, previous: MsgKey) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content.text = text.into();
        self
    }

    /// Mark this message as a reply within the thread started by `root`.
    pub fn root(mut self, root: MsgKey) -> Self {
        self.content.root = Some(root);
        self
    }

    pub fn branch(mut self, branch: MsgKey) -> Self {
        self.content.branch = Some(branch);
        self
    }

    /// Sign and produce the final value.
    pub fn sign(self, keypair: &Keypair) -> MsgValue {
        let mut value = MsgValue {
            author: self.author,
            sequence: self.sequence,
            previous: self.previous,
            timestamp: self.timestamp,
            content: self.content,
            signature: Ed25519Signature::ZERO,
        };
        value.signature = keypair.sign(&signing_bytes(&value));
        value
    }
}
