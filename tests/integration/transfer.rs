use crate::*;

use courier_core::commitment::CommitmentIndex;
use courier_transfer::{send_file, ChunkManifest};
use tokio::net::TcpStream;

/// Full loopback round trip: 2.5 chunks worth at chunk size 100 must
/// arrive as 3 chunks and reproduce the source byte for byte.
#[tokio::test]
async fn round_trip_uneven_file() {
    let dir = scratch_dir("roundtrip");
    let config = test_config(&dir, 100);

    let source = patterned_bytes(250);
    let source_path = dir.join("source.bin");
    std::fs::write(&source_path, &source).unwrap();

    let (addr, receiver) = spawn_receiver(config.clone()).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let sent = send_file(stream, &source_path, "sender-uneven", &config)
        .await
        .unwrap();
    assert_eq!(sent.chunks, 3);
    assert_eq!(sent.bytes, 250);

    let received = receiver.await.unwrap().unwrap();
    assert_eq!(received.chunks, 3);
    assert_eq!(received.bytes, 250);
    assert_eq!(received.root, sent.root);
    assert_eq!(std::fs::read(&received.path).unwrap(), source);

    let _ = std::fs::remove_dir_all(&dir);
}

/// A source of exactly one chunk-size worth of bytes → exactly 1 chunk.
#[tokio::test]
async fn round_trip_single_full_chunk() {
    let dir = scratch_dir("single");
    let config = test_config(&dir, 64);

    let source = patterned_bytes(64);
    let source_path = dir.join("source.bin");
    std::fs::write(&source_path, &source).unwrap();

    let (addr, receiver) = spawn_receiver(config.clone()).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let sent = send_file(stream, &source_path, "sender-single", &config)
        .await
        .unwrap();
    assert_eq!(sent.chunks, 1);

    let received = receiver.await.unwrap().unwrap();
    assert_eq!(received.chunks, 1);
    assert_eq!(std::fs::read(&received.path).unwrap(), source);

    let _ = std::fs::remove_dir_all(&dir);
}

/// A zero-byte source yields zero chunks and a zero-length output.
#[tokio::test]
async fn round_trip_empty_file() {
    let dir = scratch_dir("empty");
    let config = test_config(&dir, 128);

    let source_path = dir.join("source.bin");
    std::fs::write(&source_path, b"").unwrap();

    let (addr, receiver) = spawn_receiver(config.clone()).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let sent = send_file(stream, &source_path, "sender-empty", &config)
        .await
        .unwrap();
    assert_eq!(sent.chunks, 0);

    let received = receiver.await.unwrap().unwrap();
    assert_eq!(received.chunks, 0);
    assert_eq!(received.bytes, 0);
    assert_eq!(std::fs::read(&received.path).unwrap(), b"");

    let _ = std::fs::remove_dir_all(&dir);
}

/// Something bigger than a handful of chunks, not a multiple of the
/// chunk size.
#[tokio::test]
async fn round_trip_many_chunks() {
    let dir = scratch_dir("many");
    let config = test_config(&dir, 512);

    let source = patterned_bytes(10_000);
    let source_path = dir.join("source.bin");
    std::fs::write(&source_path, &source).unwrap();

    let (addr, receiver) = spawn_receiver(config.clone()).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let sent = send_file(stream, &source_path, "sender-many", &config)
        .await
        .unwrap();
    assert_eq!(sent.chunks, 20); // 19 × 512 + 272

    let received = receiver.await.unwrap().unwrap();
    assert_eq!(std::fs::read(&received.path).unwrap(), source);
    assert_eq!(received.root, sent.root);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Both sides mirror chunks into their per-peer store namespaces, and
/// the sender's sealed manifest proves membership against the root the
/// receiver independently computed.
#[tokio::test]
async fn stores_and_manifest_line_up() {
    let dir = scratch_dir("stores");
    let config = test_config(&dir, 100);

    let source = patterned_bytes(350);
    let source_path = dir.join("source.bin");
    std::fs::write(&source_path, &source).unwrap();

    let (addr, receiver) = spawn_receiver(config.clone()).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let sent = send_file(stream, &source_path, "sender-stores", &config)
        .await
        .unwrap();
    let received = receiver.await.unwrap().unwrap();

    // Sender-side mirror: 4 chunks + sealed manifest sidecar.
    let sender_ns = config.storage.chunk_root.join("sender-stores");
    let manifest = ChunkManifest::load(&sender_ns.join("manifest.json")).unwrap();
    assert_eq!(manifest.len(), 4);
    assert_eq!(manifest.total_size(), 350);

    // Membership proofs from the sealed manifest verify against the
    // receiver's root — no file re-read involved.
    let index = manifest.commitment().unwrap();
    for i in 0..manifest.len() {
        let proof = index.prove(i).unwrap();
        assert!(proof.existence);
        assert!(CommitmentIndex::verify(
            &proof,
            &received.root,
            i,
            manifest.get(i).unwrap()
        ));
    }
    // An index never inserted yields a non-membership proof.
    let absent = index.prove(manifest.len() + 7).unwrap();
    assert!(!absent.existence);
    assert!(absent.verify(&received.root));

    assert_eq!(sent.root, received.root);

    let _ = std::fs::remove_dir_all(&dir);
}
