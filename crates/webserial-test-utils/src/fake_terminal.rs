//! Scripted browser terminal.
//!
//! Stands in for the websocket: tests type into it and read what the session
//! wrote back, while the session side gets plain channel ends.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Channel ends handed to the session under test.
#[derive(Debug)]
pub struct TerminalChannels {
    /// Frames typed by the user.
    pub inbound: mpsc::Receiver<Bytes>,
    /// Where the session writes terminal output.
    pub outbound: mpsc::Sender<Bytes>,
}

/// Test-side view of a terminal connection.
#[derive(Debug)]
pub struct FakeTerminal {
    input_tx: Option<mpsc::Sender<Bytes>>,
    output_rx: mpsc::Receiver<Bytes>,
    /// Everything received so far, including already-matched output.
    transcript: Vec<u8>,
    /// Offset into `transcript` consumed by `expect`.
    cursor: usize,
}

impl FakeTerminal {
    pub fn new() -> (Self, TerminalChannels) {
        Self::with_output_capacity(256)
    }

    /// Terminal whose output queue holds only `capacity` frames, for
    /// simulating a browser that stops reading.
    pub fn with_output_capacity(capacity: usize) -> (Self, TerminalChannels) {
        let (input_tx, inbound) = mpsc::channel(64);
        let (outbound, output_rx) = mpsc::channel(capacity);
        (
            Self {
                input_tx: Some(input_tx),
                output_rx,
                transcript: Vec::new(),
                cursor: 0,
            },
            TerminalChannels { inbound, outbound },
        )
    }

    /// Send one frame of raw input.
    pub async fn send(&self, data: &[u8]) {
        if let Some(tx) = &self.input_tx {
            let _ = tx.send(Bytes::copy_from_slice(data)).await;
        }
    }

    /// Type a string (one frame).
    pub async fn type_string(&self, s: &str) {
        self.send(s.as_bytes()).await;
    }

    /// Type a command followed by Enter.
    pub async fn run_command(&self, line: &str) {
        self.type_string(line).await;
        self.press_enter().await;
    }

    pub async fn press_enter(&self) {
        self.send(b"\r").await;
    }

    pub async fn press_ctrl_c(&self) {
        self.send(&[0x03]).await;
    }

    pub async fn press_ctrl_q(&self) {
        self.send(&[0x11]).await;
    }

    pub async fn press_backspace(&self) {
        self.send(&[0x7f]).await;
    }

    pub async fn press_up(&self) {
        self.send(b"\x1b[A").await;
    }

    pub async fn press_down(&self) {
        self.send(b"\x1b[B").await;
    }

    /// Send an APC directive, e.g. `open_port=1`.
    pub async fn send_apc(&self, content: &str) {
        self.send(format!("\x1b_{content}\x1b\\").as_bytes()).await;
    }

    /// Close the input side, as if the browser went away.
    pub fn disconnect(&mut self) {
        self.input_tx = None;
    }

    /// Wait until `needle` appears in output not yet consumed. Consumes
    /// output up to and including the match. Returns false on timeout.
    pub async fn expect(&mut self, needle: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(pos) = find(&self.transcript[self.cursor..], needle.as_bytes()) {
                self.cursor += pos + needle.len();
                return true;
            }
            match tokio::time::timeout_at(deadline, self.output_rx.recv()).await {
                Ok(Some(chunk)) => self.transcript.extend_from_slice(&chunk),
                Ok(None) | Err(_) => return false,
            }
        }
    }

    /// Collect output until nothing arrives for `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> String {
        while let Ok(Some(chunk)) = tokio::time::timeout(quiet, self.output_rx.recv()).await {
            self.transcript.extend_from_slice(&chunk);
        }
        let out = String::from_utf8_lossy(&self.transcript[self.cursor..]).into_owned();
        self.cursor = self.transcript.len();
        out
    }

    /// True once the session dropped its outbound sender.
    pub async fn closed(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.output_rx.recv()).await {
                Ok(Some(chunk)) => self.transcript.extend_from_slice(&chunk),
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    pub fn transcript(&self) -> String {
        String::from_utf8_lossy(&self.transcript).into_owned()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn input_reaches_session_side() {
        let (term, mut chans) = FakeTerminal::new();
        term.run_command("help").await;
        assert_eq!(chans.inbound.recv().await.unwrap(), Bytes::from_static(b"help"));
        assert_eq!(chans.inbound.recv().await.unwrap(), Bytes::from_static(b"\r"));
    }

    #[tokio::test]
    async fn expect_consumes_output() {
        let (mut term, chans) = FakeTerminal::new();
        chans.outbound.send(Bytes::from_static(b"abc")).await.unwrap();
        chans.outbound.send(Bytes::from_static(b"def")).await.unwrap();
        assert!(term.expect("cd", Duration::from_secs(1)).await);
        assert!(!term.expect("abc", Duration::from_millis(20)).await);
        assert!(term.expect("ef", Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn closed_after_sender_dropped() {
        let (mut term, chans) = FakeTerminal::new();
        drop(chans);
        assert!(term.closed(Duration::from_secs(1)).await);
    }
}
