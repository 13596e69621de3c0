use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dkv_client::{CacheClient, ClientConfig};
use dkv_common::{
    decode_frame, encode_frame, DkvError, GetResponse, Request, Response, StatusCode,
    DEFAULT_MAX_MSG_SIZE,
};

async fn read_request(stream: &mut TcpStream, buf: &mut BytesMut) -> Option<Request> {
    loop {
        if let Some(request) = decode_frame(buf, DEFAULT_MAX_MSG_SIZE).expect("decode") {
            return Some(request);
        }
        let read = stream.read_buf(buf).await.expect("read");
        if read == 0 {
            return None;
        }
    }
}

async fn write_response(stream: &mut TcpStream, response: &Response) {
    let mut out = BytesMut::new();
    encode_frame(response, &mut out, DEFAULT_MAX_MSG_SIZE).expect("encode");
    stream.write_all(&out).await.expect("write");
}

fn client_for(addr: String) -> CacheClient {
    CacheClient::with_config(ClientConfig {
        addr,
        max_msg_size: DEFAULT_MAX_MSG_SIZE,
        timeout: Duration::from_secs(1),
    })
}

#[tokio::test]
async fn set_get_roundtrip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = BytesMut::new();

        match read_request(&mut stream, &mut buf).await.expect("request") {
            Request::Set(set) => {
                assert_eq!(set.key, "alpha");
                assert_eq!(set.value, "one");
                assert!(set.source_node.is_empty());
            }
            other => panic!("expected set, got {other:?}"),
        }
        write_response(&mut stream, &Response::Set).await;

        match read_request(&mut stream, &mut buf).await.expect("request") {
            Request::Get(get) => assert_eq!(get.key, "alpha"),
            other => panic!("expected get, got {other:?}"),
        }
        write_response(
            &mut stream,
            &Response::Get(GetResponse {
                value: "one".to_string(),
                version: 0,
            }),
        )
        .await;
    });

    let client = client_for(addr);
    client.set("alpha", "one").await.expect("set");
    let response = client.get("alpha").await.expect("get");
    assert_eq!(response.value, "one");
    assert_eq!(response.version, 0);
}

#[tokio::test]
async fn error_statuses_map_back_to_variants() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = BytesMut::new();

        read_request(&mut stream, &mut buf).await.expect("request");
        write_response(
            &mut stream,
            &Response::Error {
                code: StatusCode::NotFound,
                message: "key not found".to_string(),
            },
        )
        .await;

        read_request(&mut stream, &mut buf).await.expect("request");
        write_response(
            &mut stream,
            &Response::Error {
                code: StatusCode::InvalidArgument,
                message: "empty key".to_string(),
            },
        )
        .await;
    });

    let client = client_for(addr);
    assert!(matches!(client.get("missing").await, Err(DkvError::NotFound)));
    assert!(matches!(
        client.set("", "value").await,
        Err(DkvError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn client_redials_after_the_server_drops_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    // Serve exactly one request per connection, then hang up.
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = BytesMut::new();
            if read_request(&mut stream, &mut buf).await.is_some() {
                write_response(&mut stream, &Response::Set).await;
            }
        }
    });

    let client = client_for(addr);
    client.set("alpha", "one").await.expect("first call");

    // The server hung up after the first response; this call fails and
    // poisons the cached connection.
    let second = client.set("alpha", "two").await;
    assert!(second.is_err());

    // The poisoned slot forces a redial, which reaches a fresh connection.
    client.set("alpha", "three").await.expect("redialed call");
}

#[tokio::test]
async fn unresponsive_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = BytesMut::new();
        read_request(&mut stream, &mut buf).await;
        // Never respond; keep the connection open past the deadline.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let client = CacheClient::with_config(ClientConfig {
        addr,
        max_msg_size: DEFAULT_MAX_MSG_SIZE,
        timeout: Duration::from_millis(100),
    });
    assert!(matches!(
        client.get("alpha").await,
        Err(DkvError::Timeout)
    ));
}
