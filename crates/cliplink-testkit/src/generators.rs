//! Proptest generators for property-based testing.

use proptest::prelude::*;

use cliplink_core::{RoomId, UserId};

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a room id.
pub fn room_id() -> impl Strategy<Value = RoomId> {
    "[a-z0-9]{4,12}".prop_map(|s| RoomId::new(s).expect("non-empty room id"))
}

/// Generate a user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z][a-z0-9]{0,15}".prop_map(|s| UserId::from(s.as_str()))
}

/// A permutation of `0..n`.
pub fn chunk_order(n: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..n).collect::<Vec<_>>()).prop_shuffle()
}

/// Parameters for one transfer delivered out of order.
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub payload: Vec<u8>,
    pub chunk_size: usize,
    /// Frame delivery order.
    pub order: Vec<usize>,
    /// How many frames arrive before the start message.
    pub start_at: usize,
}

impl TransferParams {
    /// Frames the payload splits into.
    pub fn chunk_count(payload_len: usize, chunk_size: usize) -> usize {
        if payload_len == 0 {
            1
        } else {
            payload_len.div_ceil(chunk_size)
        }
    }
}

impl Arbitrary for TransferParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (payload(2048), 64usize..=512)
            .prop_flat_map(|(payload, chunk_size)| {
                let n = Self::chunk_count(payload.len(), chunk_size);
                (Just(payload), Just(chunk_size), chunk_order(n), 0..=n)
            })
            .prop_map(|(payload, chunk_size, order, start_at)| TransferParams {
                payload,
                chunk_size,
                order,
                start_at,
            })
            .boxed()
    }
}
