//! Proptest generators for property-based testing.

use proptest::prelude::*;

use dagsync_core::{Keypair, LogId, MsgBuilder, MsgKey, MsgValue, Range};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random MsgKey.
pub fn msg_key() -> impl Strategy<Value = MsgKey> {
    any::<[u8; 32]>().prop_map(MsgKey::from_bytes)
}

/// Generate a random LogId.
pub fn log_id() -> impl Strategy<Value = LogId> {
    any::<[u8; 32]>().prop_map(LogId::from_bytes)
}

/// Generate a non-empty range inside `0..=bound`.
pub fn range(bound: u64) -> impl Strategy<Value = Range> {
    (0..=bound, 0..=bound).prop_map(|(a, b)| Range::new(a.min(b), a.max(b)))
}

/// Generate message text within the size limit.
pub fn text() -> impl Strategy<Value = String> {
    "[ -~]{0,64}".prop_map(String::from)
}

/// Parameters for a signed feed message.
#[derive(Debug, Clone)]
pub struct MsgParams {
    pub keypair: Keypair,
    pub sequence: u64,
    pub timestamp: i64,
    pub text: String,
    pub previous: Option<MsgKey>,
}

impl Arbitrary for MsgParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            1u64..=10_000u64,
            0i64..=1_700_000_000_000i64,
            text(),
            any::<[u8; 32]>(),
        )
            .prop_map(|(seed, sequence, timestamp, text, prev)| MsgParams {
                keypair: Keypair::from_seed(&seed),
                sequence,
                timestamp,
                text,
                previous: (sequence > 1).then(|| MsgKey::from_bytes(prev)),
            })
            .boxed()
    }
}

/// Sign a message from parameters.
pub fn msg_from_params(params: &MsgParams) -> MsgValue {
    let mut builder = MsgBuilder::new(params.keypair.public_key(), params.sequence)
        .timestamp(params.timestamp)
        .text(params.text.clone());
    if let Some(prev) = params.previous {
        builder = builder.previous(prev);
    }
    builder.sign(&params.keypair)
}

/// Two overlapping-or-not windows of one feed of length `1..=max_len`:
/// `(len, first_held, second_held)`, each window within `1..=len`.
pub fn feed_windows(max_len: u64) -> impl Strategy<Value = (u64, Range, Range)> {
    (1..=max_len).prop_flat_map(|len| {
        let window = (1..=len, 1..=len).prop_map(|(a, b)| Range::new(a.min(b), a.max(b)));
        (Just(len), window.clone(), window)
    })
}
