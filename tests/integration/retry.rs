use crate::*;

use std::time::Duration;

use courier_transfer::{dial_with_retry, send_file, RetryPolicy};
use tokio::net::TcpStream;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        backoff: Duration::from_millis(20),
        backoff_cap: Duration::from_millis(100),
        max_attempts: 0,
    }
}

/// The client dials before anyone listens, backs off, and completes the
/// transfer once the server comes up within the retry window.
#[tokio::test]
async fn dial_retry_survives_late_server_start() {
    let dir = scratch_dir("lateserver");
    let config = test_config(&dir, 64);

    let source = patterned_bytes(200);
    let source_path = dir.join("source.bin");
    std::fs::write(&source_path, &source).unwrap();

    // Reserve a port, then free it so early dials are refused.
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let server_config = config.clone();
    let receiver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        courier_transfer::receive_file(stream, &server_config).await
    });

    let stream = dial_with_retry(&addr.to_string(), &fast_policy())
        .await
        .unwrap();
    let sent = send_file(stream, &source_path, "late-dialer", &config)
        .await
        .unwrap();

    let received = receiver.await.unwrap().unwrap();
    assert_eq!(received.root, sent.root);
    assert_eq!(std::fs::read(&received.path).unwrap(), source);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Two transfers run concurrently through one server; each session owns
/// its own manifest and output, and neither sees the other's bytes.
#[tokio::test]
async fn concurrent_sessions_stay_isolated() {
    let dir = scratch_dir("concurrent");
    let config = test_config(&dir, 64);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_config = config.clone();
    let server = tokio::spawn(async move {
        let mut handles = Vec::new();
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let config = server_config.clone();
            handles.push(tokio::spawn(async move {
                courier_transfer::receive_file(stream, &config).await
            }));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }
        outcomes
    });

    let content_a = patterned_bytes(500);
    let content_b: Vec<u8> = patterned_bytes(300).into_iter().rev().collect();
    let path_a = dir.join("a.bin");
    let path_b = dir.join("b.bin");
    std::fs::write(&path_a, &content_a).unwrap();
    std::fs::write(&path_b, &content_b).unwrap();

    let (config_a, config_b) = (config.clone(), config.clone());
    let send_a = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        send_file(stream, &path_a, "peer-a", &config_a).await.unwrap()
    });
    let send_b = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        send_file(stream, &path_b, "peer-b", &config_b).await.unwrap()
    });

    let sent_a = send_a.await.unwrap();
    let sent_b = send_b.await.unwrap();
    let outcomes = server.await.unwrap();

    let by_sender = |id: &str| {
        outcomes
            .iter()
            .find(|o| o.sender_id == id)
            .unwrap_or_else(|| panic!("no outcome for {id}"))
    };

    let got_a = by_sender("peer-a");
    let got_b = by_sender("peer-b");
    assert_eq!(got_a.root, sent_a.root);
    assert_eq!(got_b.root, sent_b.root);
    assert_ne!(got_a.root, got_b.root);
    assert_eq!(std::fs::read(&got_a.path).unwrap(), content_a);
    assert_eq!(std::fs::read(&got_b.path).unwrap(), content_b);

    let _ = std::fs::remove_dir_all(&dir);
}

/// One failing session never takes the server loop down: a protocol
/// violation on the first connection, then a clean transfer succeeds on
/// the second.
#[tokio::test]
async fn bad_session_does_not_poison_the_server() {
    use tokio::io::AsyncWriteExt;

    let dir = scratch_dir("poison");
    let config = test_config(&dir, 64);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_config = config.clone();
    let server = tokio::spawn(async move {
        let mut last = None;
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            last = Some(courier_transfer::receive_file(stream, &server_config).await);
        }
        last.unwrap()
    });

    // Session 1: garbage handshake.
    let mut bad = TcpStream::connect(addr).await.unwrap();
    bad.write_all(b"GARBAGE\n\n").await.unwrap();
    drop(bad);

    // Session 2: a real transfer.
    let source = patterned_bytes(128);
    let source_path = dir.join("source.bin");
    std::fs::write(&source_path, &source).unwrap();

    let stream = TcpStream::connect(addr).await.unwrap();
    let sent = send_file(stream, &source_path, "survivor", &config)
        .await
        .unwrap();

    let received = server.await.unwrap().unwrap();
    assert_eq!(received.root, sent.root);
    assert_eq!(std::fs::read(&received.path).unwrap(), source);

    let _ = std::fs::remove_dir_all(&dir);
}
