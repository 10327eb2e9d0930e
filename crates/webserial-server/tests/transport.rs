//! HTTP and WebSocket over a real listener, spoken by hand.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use webserial_core::auth::{DigestVerifier, PasswordStore, digest_response, ha1};
use webserial_server::{AppContext, Server, serve_with_shutdown};
use webserial_test_utils::FakeSerialBackend;

const WAIT: Duration = Duration::from_secs(2);

struct Running {
    addr: std::net::SocketAddr,
    ctx: Arc<AppContext>,
    _stop: oneshot::Sender<()>,
    _dir: tempfile::TempDir,
}

async fn start() -> Running {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("pages")).unwrap();
    std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
    std::fs::write(dir.path().join("pages/loggedout.html"), "bye").unwrap();

    let mut store = PasswordStore::new();
    store.insert("alice", "webserial", &ha1("alice", "webserial", "secret"));
    let verifier = Arc::new(DigestVerifier::new("webserial", store));
    let ctx = Arc::new(AppContext::new(
        Arc::new(FakeSerialBackend::with_devices(&["/dev/ttyUSB0"])),
        0x11,
    ));
    ctx.load_ports(true);
    let server = Server::new(ctx.clone(), verifier, dir.path()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(serve_with_shutdown(listener, Arc::new(server), async {
        let _ = stopped.await;
    }));
    Running {
        addr,
        ctx,
        _stop: stop,
        _dir: dir,
    }
}

fn authorization(uri: &str) -> String {
    let response = digest_response(&ha1("alice", "webserial", "secret"), "n0", "GET", uri);
    format!(r#"Digest username="alice", realm="webserial", nonce="n0", uri="{uri}", response="{response}""#)
}

async fn request(addr: std::net::SocketAddr, head: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test]
async fn logout_over_tcp() {
    let running = start().await;
    let resp = request(
        running.addr,
        "GET /logout HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    let lower = resp.to_ascii_lowercase();
    assert!(resp.starts_with("HTTP/1.1 401"), "{resp}");
    assert!(lower.contains("www-authenticate: digest "));
    assert!(lower.contains("x-clacks-overhead: gnu terry pratchett"));
    assert!(resp.ends_with("bye"));
}

#[tokio::test]
async fn index_with_credentials() {
    let running = start().await;
    let head = format!(
        "GET / HTTP/1.1\r\nHost: localhost\r\nAuthorization: {}\r\nConnection: close\r\n\r\n",
        authorization("/")
    );
    let resp = request(running.addr, &head).await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");
    assert!(resp.to_ascii_lowercase().contains("content-type: text/html"));
    assert!(resp.ends_with("<html></html>"));
}

const UPGRADE_HEADERS: &str = "Connection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n";

#[tokio::test]
async fn upgrade_requires_credentials() {
    let running = start().await;
    let head = format!("GET / HTTP/1.1\r\nHost: localhost\r\n{UPGRADE_HEADERS}\r\n");
    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(WAIT, stream.read(&mut buf)).await.unwrap().unwrap();
    let resp = String::from_utf8_lossy(&buf[..n]);
    assert!(resp.starts_with("HTTP/1.1 401"), "{resp}");
    assert!(running.ctx.sessions.is_empty());
}

/// Minimal client side of RFC 6455 framing.
struct WsClient {
    stream: TcpStream,
    buf: Vec<u8>,
    text: String,
}

impl WsClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let head = format!(
            "GET / HTTP/1.1\r\nHost: localhost\r\nAuthorization: {}\r\n{UPGRADE_HEADERS}\r\n",
            authorization("/")
        );
        stream.write_all(head.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = tokio::time::timeout(WAIT, stream.read(&mut chunk)).await.unwrap().unwrap();
            assert!(n > 0, "connection closed during handshake");
            buf.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8_lossy(&buf[..end]).into_owned();
        assert!(head.starts_with("HTTP/1.1 101"), "{head}");
        buf.drain(..end);
        Self {
            stream,
            buf,
            text: String::new(),
        }
    }

    async fn send_text(&mut self, text: &str) {
        let payload = text.as_bytes();
        assert!(payload.len() < 126);
        let mask = [0x12u8, 0x34, 0x56, 0x78];
        let mut frame = vec![0x81, 0x80 | payload.len() as u8];
        frame.extend_from_slice(&mask);
        frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn fill(&mut self, want: usize) -> bool {
        let mut chunk = [0u8; 4096];
        while self.buf.len() < want {
            match self.stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return false,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            }
        }
        true
    }

    /// Next data frame payload, or `None` on close.
    async fn frame(&mut self) -> Option<(u8, Vec<u8>)> {
        if !self.fill(2).await {
            return None;
        }
        let opcode = self.buf[0] & 0x0f;
        let (len, header) = match self.buf[1] & 0x7f {
            126 => {
                if !self.fill(4).await {
                    return None;
                }
                (u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize, 4)
            }
            127 => {
                if !self.fill(10).await {
                    return None;
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&self.buf[2..10]);
                (u64::from_be_bytes(raw) as usize, 10)
            }
            n => (n as usize, 2),
        };
        if !self.fill(header + len).await {
            return None;
        }
        let payload = self.buf[header..header + len].to_vec();
        self.buf.drain(..header + len);
        if opcode == 0x8 {
            return None;
        }
        Some((opcode, payload))
    }

    async fn expect(&mut self, needle: &str) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(pos) = self.text.find(needle) {
                self.text.drain(..pos + needle.len());
                return true;
            }
            match tokio::time::timeout_at(deadline, self.frame()).await {
                Ok(Some((opcode, payload))) => {
                    assert_eq!(opcode, 0x2, "terminal output is sent as binary frames");
                    self.text.push_str(&String::from_utf8_lossy(&payload));
                }
                Ok(None) | Err(_) => return false,
            }
        }
    }
}

#[tokio::test]
async fn terminal_session_over_websocket() {
    let running = start().await;
    let mut ws = WsClient::connect(running.addr).await;

    assert!(ws.expect("Controller Session").await);
    assert!(ws.expect("webserial\x1b[37m>").await);
    assert_eq!(running.ctx.sessions.len(), 1);
    assert_eq!(running.ctx.sessions.list()[0].username, "alice");

    ws.send_text("list\r").await;
    assert!(ws.expect("/dev/ttyUSB0").await);

    ws.send_text("connect 1\r").await;
    assert!(ws.expect("Connected.").await);
    assert!(running.ctx.ports.get(1).unwrap().in_use);

    drop(ws);
    let deadline = tokio::time::Instant::now() + WAIT;
    while !running.ctx.sessions.is_empty() || running.ctx.ports.get(1).unwrap().in_use {
        assert!(tokio::time::Instant::now() < deadline, "session was not torn down");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
