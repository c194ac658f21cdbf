// ABOUTME: Integration tests for the framed-TCP RPC agent session.
// ABOUTME: Runs a scripted in-process agent and checks wire documents and acks.

mod support;

use p4bridge::backend::{BackendSession, ThriftSession};
use p4bridge::config::{SwitchApiConfig, ThriftApiConfig};
use p4bridge::{BridgeFactory, SessionError, SwitchDescriptor, TableError};
use std::net::SocketAddr;
use std::time::Duration;
use support::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn read_frame(stream: &mut TcpStream) -> Option<serde_json::Value> {
    let mut len = [0u8; 4];
    if stream.read_exact(&mut len).await.is_err() {
        return None;
    }
    let mut payload = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut payload).await.ok()?;
    serde_json::from_slice(&payload).ok()
}

async fn write_frame(stream: &mut TcpStream, reply: &str) {
    let mut buf = (reply.len() as u32).to_be_bytes().to_vec();
    buf.extend_from_slice(reply.as_bytes());
    stream.write_all(&buf).await.unwrap();
}

/// One-connection agent: consumes the hello unacknowledged, then answers
/// each command with the next scripted reply until the peer hangs up.
/// Resolves to every document it received, hello included.
async fn spawn_agent(replies: Vec<&'static str>) -> (SocketAddr, JoinHandle<Vec<serde_json::Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let Some(hello) = read_frame(&mut stream).await else {
            return received;
        };
        received.push(hello);
        let mut replies = replies.into_iter();
        while let Some(doc) = read_frame(&mut stream).await {
            received.push(doc);
            match replies.next() {
                Some(reply) => write_frame(&mut stream, reply).await,
                None => break,
            }
        }
        received
    });
    (addr, handle)
}

fn session_for(addr: SocketAddr) -> ThriftSession {
    ThriftSession::new(
        switch_name("s1"),
        ThriftApiConfig {
            thrift_port: addr.port(),
            host: addr.ip().to_string(),
            interface_to_port: Default::default(),
            connect_timeout: Duration::from_secs(5),
        },
    )
}

#[tokio::test]
async fn connect_sends_the_hello() {
    init_tracing();
    let (addr, agent) = spawn_agent(vec![]).await;
    let session = session_for(addr);

    session.connect().await.unwrap();
    session.close().await.unwrap();

    let received = agent.await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["switch"], "s1");
    assert_eq!(received[0]["acknowledgments"], true);
}

#[tokio::test]
async fn an_acknowledged_add_round_trips() {
    let (addr, agent) = spawn_agent(vec!["OK"]).await;
    let session = session_for(addr);
    session.connect().await.unwrap();

    session
        .table_add(
            "MyIngress.ipv4_lpm",
            &["10.1.1.2/24".to_string()],
            "MyIngress.forward",
            &["1".to_string()],
        )
        .await
        .unwrap();
    session.close().await.unwrap();

    let received = agent.await.unwrap();
    let doc = &received[1];
    assert_eq!(doc["op"], "table_add");
    assert_eq!(doc["table"], "MyIngress.ipv4_lpm");
    assert_eq!(doc["keys"][0], "10.1.1.2/24");
    assert_eq!(doc["action"], "MyIngress.forward");
    assert_eq!(doc["params"][0], "1");
}

#[tokio::test]
async fn agent_error_classes_map_onto_the_taxonomy() {
    let (addr, _agent) = spawn_agent(vec![
        "ERR DUPLICATE: entry exists",
        "ERR NOT_FOUND: no such entry",
    ])
    .await;
    let session = session_for(addr);
    session.connect().await.unwrap();

    let err = session
        .table_add("MyIngress.t", &[], "MyIngress.a", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, TableError::DuplicateEntry(m) if m == "entry exists"));

    let err = session
        .table_delete("MyIngress.t", &["1".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, TableError::NotFound(_)));

    session.close().await.unwrap();
}

#[tokio::test]
async fn a_register_write_is_one_document() {
    let (addr, agent) = spawn_agent(vec!["OK"]).await;
    let session = session_for(addr);
    session.connect().await.unwrap();

    session
        .register_set("MyIngress.counts", 3, "7")
        .await
        .unwrap();
    session.close().await.unwrap();

    let received = agent.await.unwrap();
    let doc = &received[1];
    assert_eq!(doc["op"], "register_set");
    assert_eq!(doc["register"], "MyIngress.counts");
    assert_eq!(doc["index"], 3);
    assert_eq!(doc["value"], "7");
}

#[tokio::test]
async fn a_batch_travels_as_one_document() {
    use p4bridge::TableOp;

    let (addr, agent) = spawn_agent(vec!["OK"]).await;
    let session = session_for(addr);
    session.connect().await.unwrap();

    session
        .commit_batch(&[
            TableOp::Clear {
                table: "MyIngress.t".to_string(),
            },
            TableOp::SetDefault {
                table: "MyIngress.t".to_string(),
                action: "MyIngress.drop".to_string(),
                params: vec![],
            },
        ])
        .await
        .unwrap();
    session.close().await.unwrap();

    let received = agent.await.unwrap();
    let doc = &received[1];
    assert_eq!(doc["op"], "batch");
    assert_eq!(doc["ops"].as_array().unwrap().len(), 2);
    assert_eq!(doc["ops"][0]["op"], "table_clear");
    assert_eq!(doc["ops"][1]["op"], "table_set_default");
}

#[tokio::test]
async fn refused_connection_is_a_connect_failure() {
    // Grab a free port, then close the listener so nothing answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = session_for(addr);
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectionFailed(_)));
}

#[tokio::test]
async fn operations_on_a_closed_session_fail_cleanly() {
    let (addr, _agent) = spawn_agent(vec![]).await;
    let session = session_for(addr);
    session.connect().await.unwrap();
    session.close().await.unwrap();
    session.close().await.unwrap();

    let err = session.table_clear("MyIngress.t").await.unwrap_err();
    assert!(matches!(err, TableError::Backend(m) if m.contains("not connected")));
}

/// The factory path end to end: one descriptor, one TCP connection,
/// repeated gets reuse it, close_all hangs up.
#[tokio::test]
async fn factory_reuses_the_agent_connection() {
    let (addr, agent) = spawn_agent(vec![]).await;
    let descriptor = SwitchDescriptor::new(
        "s1",
        SwitchApiConfig::Thrift(ThriftApiConfig {
            thrift_port: addr.port(),
            host: addr.ip().to_string(),
            interface_to_port: Default::default(),
            connect_timeout: Duration::from_secs(5),
        }),
    )
    .unwrap();

    let factory = BridgeFactory::new();
    let first = factory.get(&descriptor).await.unwrap();
    let second = factory.get(&descriptor).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert!(first.supports_batch());

    factory.close_all().await.unwrap();
    let received = agent.await.unwrap();
    assert_eq!(received.len(), 1, "one hello, one connection");
}
