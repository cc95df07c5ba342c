// End-to-end tests: real sockets against a scripted stub origin.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use nakadachi::config::Config;
use nakadachi::http::date::format_http_date;
use nakadachi::logging::AccessLog;
use nakadachi::server::Server;

/// Start the proxy on an ephemeral port with a captured request log.
async fn spawn_proxy() -> (SocketAddr, Arc<Mutex<Vec<u8>>>) {
    let mut config = Config::default();
    config.server.address = "127.0.0.1".to_string();
    config.server.port = 0;
    let (log, buffer) = AccessLog::capture();
    let server = Server::bind_with_log(&config, log).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, buffer)
}

/// A stub origin that answers one connection per scripted response and
/// records the request head it received on each.
async fn spawn_origin(responses: Vec<Vec<u8>>) -> (SocketAddr, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let hit_counter = hits.clone();
    let request_log = requests.clone();
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            hit_counter.fetch_add(1, Ordering::SeqCst);
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                match stream.read_exact(&mut byte).await {
                    Ok(_) => head.push(byte[0]),
                    Err(_) => break,
                }
            }
            request_log
                .lock()
                .push(String::from_utf8_lossy(&head).into_owned());
            let _ = stream.write_all(&response).await;
        }
    });
    (addr, hits, requests)
}

/// An echo server for tunnel tests.
async fn spawn_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

fn origin_200(body: &str, extra_headers: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nDate: {}\r\n{}\r\n{}",
        body.len(),
        format_http_date(Utc::now()),
        extra_headers,
        body
    )
    .into_bytes()
}

/// Read one response with Content-Length framing (0 when absent).
async fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    let status = head.split_whitespace().nth(1).unwrap_or("");
    let has_body = !(status.starts_with('1') || status == "204" || status == "304");
    let content_length = if has_body {
        head.lines()
            .find_map(|line| line.strip_prefix("Content-Length: "))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0)
    } else {
        0
    };
    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).await.unwrap();
    (head, body)
}

fn log_text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buffer.lock()).into_owned()
}

/// Log records written after the response reaches the client need a
/// moment to land.
async fn wait_for_log(buffer: &Arc<Mutex<Vec<u8>>>, needle: &str) {
    for _ in 0..100 {
        if log_text(buffer).contains(needle) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("log never contained {:?}; log was:\n{}", needle, log_text(buffer));
}

#[tokio::test]
async fn test_get_is_proxied_and_second_request_served_from_cache() {
    let (origin_addr, hits, _) = spawn_origin(vec![origin_200(
        "1234567890",
        "Cache-Control: max-age=60\r\n",
    )])
    .await;
    let (proxy_addr, log) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n",
        origin = origin_addr
    );

    client.write_all(request.as_bytes()).await.unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"1234567890");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // the same request again: served from cache, origin not contacted
    client.write_all(request.as_bytes()).await.unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"1234567890");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let text = log_text(&log);
    assert!(text.contains("not in cache"));
    assert!(text.contains("in cache, valid"));
}

#[tokio::test]
async fn test_no_store_response_is_forwarded_but_not_cached() {
    let (origin_addr, hits, _) = spawn_origin(vec![
        origin_200("payload-one", "Cache-Control: no-store\r\n"),
        origin_200("payload-two", "Cache-Control: no-store\r\n"),
    ])
    .await;
    let (proxy_addr, log) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n",
        origin = origin_addr
    );

    client.write_all(request.as_bytes()).await.unwrap();
    let (_, body) = read_response(&mut client).await;
    assert_eq!(body, b"payload-one");

    client.write_all(request.as_bytes()).await.unwrap();
    let (_, body) = read_response(&mut client).await;
    assert_eq!(body, b"payload-two");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    wait_for_log(&log, "not cachable because no-store and/or private is set").await;
}

#[tokio::test]
async fn test_client_no_cache_forces_revalidation() {
    let (origin_addr, hits, _) = spawn_origin(vec![
        origin_200("fresh", "Cache-Control: max-age=60\r\n"),
        origin_200("fresher", "Cache-Control: max-age=60\r\n"),
    ])
    .await;
    let (proxy_addr, log) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let plain = format!(
        "GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n",
        origin = origin_addr
    );
    let no_cache = format!(
        "GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\nCache-Control: no-cache\r\n\r\n",
        origin = origin_addr
    );

    client.write_all(plain.as_bytes()).await.unwrap();
    let (_, body) = read_response(&mut client).await;
    assert_eq!(body, b"fresh");

    // a fresh entry exists, but the client insists on revalidation
    client.write_all(no_cache.as_bytes()).await.unwrap();
    let (_, body) = read_response(&mut client).await;
    assert_eq!(body, b"fresher");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let text = log_text(&log);
    assert!(text.contains("requires validation"));
}

#[tokio::test]
async fn test_client_validators_are_stripped_on_cache_miss() {
    let (origin_addr, _, requests) = spawn_origin(vec![origin_200("data", "")]).await;
    let (proxy_addr, _) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://{origin}/page HTTP/1.1\r\nHost: {origin}\r\nIf-None-Match: \"zzz\"\r\nIf-Modified-Since: Wed, 28 Feb 2018 20:51:55 GMT\r\n\r\n",
        origin = origin_addr
    );
    client.write_all(request.as_bytes()).await.unwrap();
    let _ = read_response(&mut client).await;

    let recorded = requests.lock();
    assert_eq!(recorded.len(), 1);
    // origin-form request line, with the client's conditionals removed
    assert!(recorded[0].starts_with("GET /page HTTP/1.1\r\n"));
    assert!(!recorded[0].contains("If-None-Match"));
    assert!(!recorded[0].contains("If-Modified-Since"));
    assert!(recorded[0].contains(&format!("Host: {}", origin_addr)));
}

#[tokio::test]
async fn test_expired_entry_is_revalidated_with_304() {
    let now = format_http_date(Utc::now());
    let first = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nDate: {now}\r\nEtag: \"v1\"\r\nCache-Control: max-age=0\r\n\r\n1234567890"
    );
    let not_modified = format!(
        "HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\nDate: {now}\r\nEtag: \"v1\"\r\nCache-Control: max-age=60\r\n\r\n"
    );
    let (origin_addr, hits, requests) =
        spawn_origin(vec![first.into_bytes(), not_modified.into_bytes()]).await;
    let (proxy_addr, log) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n",
        origin = origin_addr
    );

    client.write_all(request.as_bytes()).await.unwrap();
    let (_, body) = read_response(&mut client).await;
    assert_eq!(body, b"1234567890");

    // max-age=0 made the entry immediately stale: the proxy revalidates
    // with the stored validator and relays the 304
    client.write_all(request.as_bytes()).await.unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 304 Not Modified\r\n"));
    assert!(body.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(requests.lock()[1].contains("If-None-Match: \"v1\""));

    // the 304 refreshed the entry: now it serves straight from cache
    client.write_all(request.as_bytes()).await.unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"1234567890");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let text = log_text(&log);
    assert!(text.contains("in cache, but expired at"));
    assert!(text.contains("in cache, valid"));
}

#[tokio::test]
async fn test_post_is_forwarded_and_not_cached() {
    let (origin_addr, hits, requests) = spawn_origin(vec![origin_200("created", "")]).await;
    let (proxy_addr, log) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "POST http://{origin}/submit HTTP/1.1\r\nHost: {origin}\r\nContent-Length: 0\r\n\r\n",
        origin = origin_addr
    );
    client.write_all(request.as_bytes()).await.unwrap();
    let (_, body) = read_response(&mut client).await;
    assert_eq!(body, b"created");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(requests.lock()[0].starts_with("POST /submit HTTP/1.1\r\n"));

    wait_for_log(&log, "not cachable because request method is POST").await;
}

#[tokio::test]
async fn test_chunked_response_is_forwarded_verbatim() {
    let now = format_http_date(Utc::now());
    let chunked = format!(
        "HTTP/1.1 200 OK\r\nDate: {now}\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n"
    );
    let (origin_addr, _, _) = spawn_origin(vec![chunked.into_bytes()]).await;
    let (proxy_addr, _) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n",
        origin = origin_addr
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        client.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    assert!(head.contains("Transfer-Encoding: chunked"));

    // the raw chunk framing comes through untouched
    let mut body = vec![0u8; 15];
    client.read_exact(&mut body).await.unwrap();
    assert_eq!(body, b"5\r\nhello\r\n0\r\n\r\n");
}

#[tokio::test]
async fn test_connect_tunnels_bytes_both_ways() {
    let echo_addr = spawn_echo().await;
    let (proxy_addr, log) = spawn_proxy().await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n", echo = echo_addr);
    client.write_all(request.as_bytes()).await.unwrap();

    let mut reply = [0u8; 19];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"HTTP/1.1 200 OK\r\n\r\n");

    // opaque bytes, not HTTP, relayed in both directions
    client.write_all(b"ping through tunnel").await.unwrap();
    let mut echoed = [0u8; 19];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping through tunnel");

    wait_for_log(&log, "NOTE Tunnel established").await;
}

#[tokio::test]
async fn test_malformed_start_line_gets_stock_400() {
    let (proxy_addr, _) = spawn_proxy().await;
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(b"PURPLE /\r\n\r\n").await.unwrap();
    let (head, body) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 400 Invalid Request\r\n"));
    assert!(head.contains("Content-Length: 0"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_unreachable_origin_gets_stock_502() {
    // bind then drop to get a port with nothing listening
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let (proxy_addr, _) = spawn_proxy().await;
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!(
        "GET http://{dead}/ HTTP/1.1\r\nHost: {dead}\r\n\r\n",
        dead = dead_addr
    );
    client.write_all(request.as_bytes()).await.unwrap();
    let (head, _) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
}

#[tokio::test]
async fn test_unsupported_protocol_gets_stock_400() {
    let (proxy_addr, _) = spawn_proxy().await;
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(b"GET http://example.com/ HTTP/2.0\r\n\r\n")
        .await
        .unwrap();
    let (head, _) = read_response(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 400 Invalid Request\r\n"));
}
