//! Integration tests for ovsdb-wire
//!
//! These run against an in-process OVSDB stand-in on a loopback socket that
//! answers every request with `{"id": <id>, "result": <params>, "error": null}`.

use ovsdb_wire::protocol::MessageDecoder;
use ovsdb_wire::{Connection, ConnectionConfig, ConnectionState, Endpoint, Error, Message};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Accepts one client, reports every request it receives and echoes a reply
async fn spawn_echo_server() -> (Endpoint, mpsc::UnboundedReceiver<Message>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        serve(socket, tx).await;
    });

    (Endpoint::new("127.0.0.1", port), rx, handle)
}

async fn serve(mut socket: TcpStream, requests: mpsc::UnboundedSender<Message>) {
    let mut decoder = MessageDecoder::new();
    loop {
        match socket.read_buf(decoder.buffer_mut()).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        while let Some(request) = decoder.decode().expect("client sent malformed JSON") {
            let reply = Message::try_from(json!({
                "id": request.id().cloned().unwrap_or(Value::Null),
                "result": request.get("params").cloned().unwrap_or(Value::Null),
                "error": null,
            }))
            .unwrap();
            let _ = requests.send(request);
            let bytes = serde_json::to_vec(&reply).unwrap();
            if socket.write_all(&bytes).await.is_err() {
                return;
            }
        }
    }
}

/// Minimal receive loop: decode, hand to callbacks, buffer the rest
fn spawn_receive_loop(conn: &Connection) -> JoinHandle<()> {
    let mut reader = conn.take_reader().expect("reader already taken");
    let responses = conn.responses();
    let callbacks = conn.callbacks();

    tokio::spawn(async move {
        let mut decoder = MessageDecoder::new();
        loop {
            match reader.read_buf(decoder.buffer_mut()).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            while let Ok(Some(msg)) = decoder.decode() {
                if let Some(unclaimed) = callbacks.dispatch(msg) {
                    responses.push(unclaimed);
                }
            }
        }
    })
}

fn config(endpoint: Endpoint) -> ConnectionConfig {
    ConnectionConfig::builder(endpoint)
        .max_connection_retries(2)
        .retry_delay(Duration::from_millis(10))
        .connect_timeout(Duration::from_secs(5))
        .build()
}

#[tokio::test]
async fn test_establish_send_and_correlate() {
    init_tracing();
    let (endpoint, mut requests, _server) = spawn_echo_server().await;

    let conn = Connection::establish(&config(endpoint.clone()))
        .await
        .expect("establish");
    assert_eq!(conn.state().await, ConnectionState::Connected);
    assert_eq!(conn.endpoint(), &endpoint);
    let _receiver = spawn_receive_loop(&conn);

    let request = Message::with_id(1)
        .field("method", "list_dbs")
        .field("params", json!([]));
    assert!(conn.send(&request).await);

    let seen = requests.recv().await.expect("server got request");
    assert_eq!(seen, request);

    let reply = tokio::time::timeout(Duration::from_secs(5), conn.responses().wait_take(&json!(1)))
        .await
        .expect("reply within deadline");
    assert_eq!(reply.get("result"), Some(&json!([])));
    assert!(conn.take_response(&json!(1)).is_none());

    conn.disconnect().await;
}

#[tokio::test]
async fn test_callback_receives_response() {
    init_tracing();
    let (endpoint, _requests, _server) = spawn_echo_server().await;
    let conn = Connection::establish(&config(endpoint)).await.expect("establish");
    let _receiver = spawn_receive_loop(&conn);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let request = Message::with_id("echo-1")
        .field("method", "echo")
        .field("params", json!(["ping"]));
    let sent = conn
        .send_with_callback(&request, move |reply| {
            let _ = tx.send(reply);
        })
        .await
        .expect("request has an id");
    assert!(sent);

    let reply = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("callback within deadline")
        .expect("callback invoked");
    assert_eq!(reply.get("result"), Some(&json!(["ping"])));
    assert!(conn.callbacks().is_empty());
    assert!(conn.responses().is_empty());
}

#[tokio::test]
async fn test_establish_unreachable_server_fails_after_retries() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let start = Instant::now();
    let err = Connection::establish(&config(Endpoint::new("127.0.0.1", port)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connect { .. }), "got {:?}", err);
    // Two retries, each preceded by the 10ms delay
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[tokio::test]
async fn test_concurrent_sends_do_not_interleave() {
    init_tracing();
    let (endpoint, mut requests, _server) = spawn_echo_server().await;
    let conn = Arc::new(Connection::establish(&config(endpoint)).await.expect("establish"));
    let _receiver = spawn_receive_loop(&conn);

    let payload = "x".repeat(16 * 1024);
    let sends = (0..32).map(|i| {
        let conn = Arc::clone(&conn);
        let msg = Message::with_id(i)
            .field("method", "transact")
            .field("params", json!([payload.clone()]));
        async move { conn.send(&msg).await }
    });
    let results = futures::future::join_all(sends).await;
    assert!(results.into_iter().all(|ok| ok));

    let mut ids = Vec::new();
    for _ in 0..32 {
        let msg = tokio::time::timeout(Duration::from_secs(5), requests.recv())
            .await
            .expect("request within deadline")
            .expect("server alive");
        assert_eq!(msg.get("params"), Some(&json!([payload.clone()])));
        ids.push(msg.id().and_then(Value::as_u64).unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, (0..32).collect::<Vec<u64>>());

    for i in 0..32 {
        let reply = tokio::time::timeout(
            Duration::from_secs(5),
            conn.responses().wait_take(&json!(i)),
        )
        .await
        .expect("reply within deadline");
        assert_eq!(reply.id(), Some(&json!(i)));
    }
}

#[tokio::test]
async fn test_disconnect_closes_socket_and_rejects_sends() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let eof = Arc::new(Mutex::new(false));

    let server = {
        let eof = Arc::clone(&eof);
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let n = socket.read_to_end(&mut buf).await.unwrap_or(0);
            *eof.lock().unwrap() = n == 0;
        })
    };

    let conn = Connection::establish(&config(Endpoint::new("127.0.0.1", port)))
        .await
        .expect("establish");
    conn.disconnect().await;
    conn.disconnect().await;

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server saw the close")
        .unwrap();
    assert!(*eof.lock().unwrap());

    assert_eq!(conn.state().await, ConnectionState::Disconnected);
    assert!(!conn.send(&Message::with_id(1)).await);
}

#[tokio::test]
async fn test_disconnect_releases_socket_while_peer_keeps_writing() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (failed_tx, failed_rx) = tokio::sync::oneshot::channel();

    // Pushes unsolicited updates and never closes on its own
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        for n in 0u64.. {
            let update = json!({"id": n, "result": {}, "error": null});
            let update = serde_json::to_vec(&update).unwrap();
            if let Err(e) = socket.write_all(&update).await {
                let _ = failed_tx.send(e.kind());
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let conn = Connection::establish(&config(Endpoint::new("127.0.0.1", port)))
        .await
        .expect("establish");
    let receiver = spawn_receive_loop(&conn);
    let responses = conn.responses();

    let deadline = Instant::now() + Duration::from_secs(5);
    while responses.len() < 3 {
        assert!(Instant::now() < deadline, "no updates from server");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    conn.disconnect().await;
    tokio::time::timeout(Duration::from_secs(5), receiver)
        .await
        .expect("receive loop saw end of stream")
        .unwrap();
    let buffered = responses.len();

    // Writes start failing once the client side of the socket is gone
    tokio::time::timeout(Duration::from_secs(5), failed_rx)
        .await
        .expect("server writes fail after disconnect")
        .unwrap();
    assert_eq!(responses.len(), buffered);
    assert_eq!(conn.state().await, ConnectionState::Disconnected);
}
