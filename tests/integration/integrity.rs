use crate::*;

use courier_core::commitment::CommitmentIndex;
use courier_core::error::TransferError;
use courier_core::fingerprint::fingerprint;
use courier_core::wire::{ChunkLabel, FrameWriter};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn output_paths(config: &CourierConfig, sender: &str) -> (PathBuf, PathBuf) {
    let final_path = config.storage.output_dir.join(format!("{sender}.recv"));
    let partial = config
        .storage
        .output_dir
        .join(format!("{sender}.recv.partial"));
    (final_path, partial)
}

/// Chunks 0 and 1 arrive intact, then the declared fingerprint for
/// chunk 2 does not match its bytes: the session aborts with an
/// integrity violation naming index 2 and no output is finalized.
#[tokio::test]
async fn mismatched_declaration_aborts_naming_the_chunk() {
    let dir = scratch_dir("tamper");
    let config = test_config(&dir, 64);
    let (addr, receiver) = spawn_receiver(config.clone()).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut w = FrameWriter::new(stream);
    w.handshake("tamperer").await.unwrap();

    for (i, payload) in [&b"chunk zero"[..], b"chunk one"].iter().enumerate() {
        let label = ChunkLabel {
            index: i as u64,
            fingerprint: fingerprint(payload),
        };
        w.chunk(&label, payload).await.unwrap();
    }
    let bad_label = ChunkLabel {
        index: 2,
        fingerprint: fingerprint(b"what was promised"),
    };
    // The receiver may already have hung up by the time these land.
    let _ = w.chunk(&bad_label, b"what actually arrived").await;
    let _ = w.flush().await;

    let err = receiver.await.unwrap().unwrap_err();
    match err {
        TransferError::Integrity { index, .. } => assert_eq!(index, 2),
        other => panic!("expected integrity violation, got {other:?}"),
    }

    let (final_path, partial) = output_paths(&config, "tamperer");
    assert!(!final_path.exists());
    assert!(!partial.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

/// A single flipped bit in a transmitted chunk is caught before the
/// output is marked complete.
#[tokio::test]
async fn flipped_bit_is_detected() {
    let dir = scratch_dir("bitflip");
    let config = test_config(&dir, 64);
    let (addr, receiver) = spawn_receiver(config.clone()).await;

    let original = patterned_bytes(64);
    let mut corrupted = original.clone();
    corrupted[37] ^= 0x01;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut w = FrameWriter::new(stream);
    w.handshake("flipper").await.unwrap();
    let label = ChunkLabel {
        index: 0,
        fingerprint: fingerprint(&original),
    };
    let _ = w.chunk(&label, &corrupted).await;
    let _ = w.flush().await;

    let err = receiver.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::Integrity { index: 0, .. }));

    let (final_path, _) = output_paths(&config, "flipper");
    assert!(!final_path.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

/// Valid chunks but a bogus final root: the commitment check fails and
/// the staging artifact is removed.
#[tokio::test]
async fn bogus_commitment_is_rejected() {
    let dir = scratch_dir("badroot");
    let config = test_config(&dir, 64);
    let (addr, receiver) = spawn_receiver(config.clone()).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut w = FrameWriter::new(stream);
    w.handshake("badroot").await.unwrap();
    let payload = b"perfectly fine chunk";
    let label = ChunkLabel {
        index: 0,
        fingerprint: fingerprint(payload),
    };
    w.chunk(&label, payload).await.unwrap();
    w.commitment(&[0xEE; 32]).await.unwrap();

    let err = receiver.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::CommitmentMismatch { .. }));

    let (final_path, partial) = output_paths(&config, "badroot");
    assert!(!final_path.exists());
    assert!(!partial.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

/// The connection dies mid-chunk: truncation, not a hang and not a
/// finalized file.
#[tokio::test]
async fn disconnect_mid_chunk_is_truncation() {
    let dir = scratch_dir("truncated");
    let config = test_config(&dir, 64);
    let (addr, receiver) = spawn_receiver(config.clone()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let label = ChunkLabel {
        index: 0,
        fingerprint: fingerprint(b"never fully sent"),
    };
    let mut bytes = b"SEND_FILE\nquitter\n".to_vec();
    bytes.extend_from_slice(format!("{label}\n").as_bytes());
    bytes.extend_from_slice(&1000u64.to_be_bytes());
    bytes.extend_from_slice(b"only this much");
    stream.write_all(&bytes).await.unwrap();
    drop(stream);

    let err = receiver.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::Truncated(_)));

    let (final_path, _) = output_paths(&config, "quitter");
    assert!(!final_path.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

/// The degraded legacy path: per-chunk verification off, so a tampered
/// chunk is only caught by the final commitment — but it is caught.
#[tokio::test]
async fn unverified_mode_still_fails_at_commitment() {
    let dir = scratch_dir("legacy");
    let mut config = test_config(&dir, 64);
    config.transfer.verify = false;
    let (addr, receiver) = spawn_receiver(config.clone()).await;

    let original = b"the bytes the sender hashed";
    let tampered = b"the bytes that were delivered";

    // Root over what the sender fingerprinted, not what arrived.
    let mut index = CommitmentIndex::new();
    index.add(0, fingerprint(original)).unwrap();
    let claimed = index.root();

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut w = FrameWriter::new(stream);
    w.handshake("legacy").await.unwrap();
    let label = ChunkLabel {
        index: 0,
        fingerprint: fingerprint(original),
    };
    w.chunk(&label, tampered).await.unwrap();
    w.commitment(&claimed).await.unwrap();

    let err = receiver.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::CommitmentMismatch { .. }));

    let (final_path, partial) = output_paths(&config, "legacy");
    assert!(!final_path.exists());
    assert!(!partial.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

/// An unexpected opening token aborts the session before any storage is
/// touched.
#[tokio::test]
async fn wrong_opening_token_is_protocol_violation() {
    let dir = scratch_dir("badtoken");
    let config = test_config(&dir, 64);
    let (addr, receiver) = spawn_receiver(config.clone()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"REQUEST_FILE\nsomeone\n").await.unwrap();
    drop(stream);

    let err = receiver.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::Protocol(_)));

    let _ = std::fs::remove_dir_all(&dir);
}
