//! Golden test vectors for wire compatibility.
//!
//! Frames are checked byte for byte, so any peer that lays out the header
//! or binds the associated data differently fails here first.

use bytes::Bytes;

use cliplink_core::TransferId;
use cliplink_crypto::{AuthTag, EncryptionNonce, RoomKey, KEY_SIZE, NONCE_SIZE};
use cliplink_sync::{ChunkFrame, HEADER_LEN};

/// A sealed chunk frame with its expected encoding.
#[derive(Debug, Clone)]
pub struct FrameVector {
    pub name: &'static str,
    pub key: [u8; KEY_SIZE],
    pub transfer_id: [u8; 16],
    pub index: u32,
    pub total: u32,
    pub nonce: [u8; NONCE_SIZE],
    /// Chunk bytes as handed to the cipher (already compressed).
    pub plaintext: &'static [u8],
    /// Expected encoded frame (hex).
    pub expected_frame: &'static str,
}

/// A raw ChaCha20-Poly1305 vector.
#[derive(Debug, Clone)]
pub struct AeadVector {
    pub name: &'static str,
    pub key: &'static str,
    pub nonce: &'static str,
    pub aad: &'static str,
    pub plaintext: &'static [u8],
    pub expected_ciphertext: &'static str,
    pub expected_tag: &'static str,
}

/// Get all frame vectors.
pub fn frame_vectors() -> Vec<FrameVector> {
    vec![
        FrameVector {
            name: "second of three chunks",
            key: [0x42; KEY_SIZE],
            transfer_id: [
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c,
                0x0d, 0x0e, 0x0f,
            ],
            index: 1,
            total: 3,
            nonce: [0x11; NONCE_SIZE],
            plaintext: b"chunk",
            expected_frame: concat!(
                "000102030405060708090a0b0c0d0e0f",
                "00000001",
                "00000003",
                "111111111111111111111111",
                "1f026161875c49b27f0c6485124cf6ca",
                "b82eddb90d",
            ),
        },
        FrameVector {
            name: "empty single chunk",
            key: [0x42; KEY_SIZE],
            transfer_id: [0xff; 16],
            index: 0,
            total: 1,
            nonce: [0x33; NONCE_SIZE],
            plaintext: b"",
            expected_frame: concat!(
                "ffffffffffffffffffffffffffffffff",
                "00000000",
                "00000001",
                "333333333333333333333333",
                "369487877aade2bb16bb81060b28e4c6",
            ),
        },
    ]
}

/// Get all AEAD vectors.
pub fn aead_vectors() -> Vec<AeadVector> {
    vec![AeadVector {
        name: "RFC 8439 section 2.8.2",
        key: "808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9f",
        nonce: "070000004041424344454647",
        aad: "50515253c0c1c2c3c4c5c6c7",
        plaintext: b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.",
        expected_ciphertext: concat!(
            "d31a8d34648e60db7b86afbc53ef7ec2a4aded51296e08fea9e2b5a736ee62d6",
            "3dbea45e8ca9671282fafb69da92728b1a71de0a9e060b2905d6a5b67ecd3b36",
            "92ddbd7f2d778b8c9803aee328091b58fab324e4fad675945585808b4831d7bc",
            "3ff4def08e4b7a9de576d26586cec64b6116",
        ),
        expected_tag: "1ae10b594f09e26a7e902ecbd0600691",
    }]
}

/// Build the frame a vector describes.
pub fn frame_from_vector(vector: &FrameVector) -> Result<ChunkFrame, String> {
    let key = RoomKey::from_bytes(vector.key);
    let nonce = EncryptionNonce::from_bytes(vector.nonce);

    let mut aad = Vec::with_capacity(20);
    aad.extend_from_slice(&vector.transfer_id);
    aad.extend_from_slice(&vector.index.to_be_bytes());

    let (ciphertext, tag) = key
        .seal_with_nonce(vector.plaintext, &aad, &nonce)
        .map_err(|e| e.to_string())?;

    Ok(ChunkFrame {
        transfer_id: TransferId::from_bytes(vector.transfer_id),
        index: vector.index,
        total: vector.total,
        nonce,
        tag,
        ciphertext: Bytes::from(ciphertext),
    })
}

/// Check one frame vector: encoding, decoding and opening.
pub fn verify_frame_vector(vector: &FrameVector) -> Result<(), String> {
    let frame = frame_from_vector(vector)?;
    let encoded = frame.encode();

    let actual = hex::encode(&encoded);
    if actual != vector.expected_frame {
        return Err(format!(
            "{}: expected {}, got {}",
            vector.name, vector.expected_frame, actual
        ));
    }
    if encoded.len() != HEADER_LEN + vector.plaintext.len() {
        return Err(format!("{}: unexpected length {}", vector.name, encoded.len()));
    }

    let decoded = ChunkFrame::decode(&encoded).map_err(|e| format!("{}: {}", vector.name, e))?;
    if decoded != frame {
        return Err(format!("{}: decode mismatch", vector.name));
    }
    let opened = decoded
        .open(&RoomKey::from_bytes(vector.key))
        .map_err(|e| format!("{}: {}", vector.name, e))?;
    if opened != vector.plaintext {
        return Err(format!("{}: opened wrong plaintext", vector.name));
    }
    Ok(())
}

/// Check one AEAD vector through [`RoomKey::seal_with_nonce`].
pub fn verify_aead_vector(vector: &AeadVector) -> Result<(), String> {
    let decode = |field: &str, value: &str| {
        hex::decode(value).map_err(|e| format!("{}: bad {} hex: {}", vector.name, field, e))
    };

    let key: [u8; KEY_SIZE] = decode("key", vector.key)?
        .try_into()
        .map_err(|_| format!("{}: key length", vector.name))?;
    let nonce: [u8; NONCE_SIZE] = decode("nonce", vector.nonce)?
        .try_into()
        .map_err(|_| format!("{}: nonce length", vector.name))?;
    let aad = decode("aad", vector.aad)?;

    let key = RoomKey::from_bytes(key);
    let nonce = EncryptionNonce::from_bytes(nonce);
    let (ciphertext, tag) = key
        .seal_with_nonce(vector.plaintext, &aad, &nonce)
        .map_err(|e| format!("{}: {}", vector.name, e))?;

    if hex::encode(&ciphertext) != vector.expected_ciphertext {
        return Err(format!("{}: ciphertext mismatch", vector.name));
    }
    if hex::encode(tag.as_bytes()) != vector.expected_tag {
        return Err(format!("{}: tag mismatch", vector.name));
    }

    let expected_tag: [u8; 16] = decode("tag", vector.expected_tag)?
        .try_into()
        .map_err(|_| format!("{}: tag length", vector.name))?;
    let opened = key
        .open(&ciphertext, &aad, &nonce, &AuthTag::from_bytes(expected_tag))
        .map_err(|e| format!("{}: {}", vector.name, e))?;
    if opened != vector.plaintext {
        return Err(format!("{}: round trip mismatch", vector.name));
    }
    Ok(())
}

/// Verify every vector, stopping at the first failure.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in frame_vectors() {
        verify_frame_vector(&vector)?;
    }
    for vector in aead_vectors() {
        verify_aead_vector(&vector)?;
    }
    Ok(())
}
