//! # Cliplink Testkit
//!
//! Testing utilities for Cliplink.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed frame headers and AEAD outputs that any
//!   compatible peer must reproduce byte for byte
//! - **Generators**: Proptest strategies for payloads, ids and delivery orders
//! - **Fixtures**: A room with its key, and ready-made sealed transfers
//!
//! ## Golden Vectors
//!
//! ```rust
//! use cliplink_testkit::vectors::verify_all_vectors;
//!
//! verify_all_vectors().unwrap();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cliplink_testkit::generators::TransferParams;
//!
//! proptest! {
//!     #[test]
//!     fn any_order_reassembles(params: TransferParams) {
//!         // feed params.order into a Reassembler
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use cliplink_testkit::fixtures::RoomFixture;
//!
//! let room = RoomFixture::new("abc123");
//! let transfer = room.transfer("report.pdf", &[7u8; 40_000], 16 * 1024);
//! assert_eq!(transfer.total, 3);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_room_fixtures, RoomFixture, TransferFixture};
pub use generators::{chunk_order, payload, room_id, user_id, TransferParams};
pub use vectors::{
    aead_vectors, frame_from_vector, frame_vectors, verify_aead_vector, verify_all_vectors,
    verify_frame_vector, AeadVector, FrameVector,
};
