//! Protocol and configuration constants for webserial.

// =============================================================================
// Network Defaults
// =============================================================================

/// Default HTTP listen port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default digest realm; also the realm written by `wspasswd`.
pub const DEFAULT_REALM: &str = "webserial";

/// Value of the injected `X-Clacks-Overhead` response header.
pub const CLACKS_OVERHEAD: &str = "GNU Terry Pratchett";

/// Content type used when a file extension is not recognized.
pub const DEFAULT_MIME_TYPE: &str = "application/text";

/// Length in bytes of a generated digest nonce (hex-encoded on the wire).
pub const NONCE_LEN: usize = 16;

// =============================================================================
// Terminal Protocol
// =============================================================================

/// Longest escape sequence body kept in memory before it is discarded.
pub const MAX_SEQUENCE_LEN: usize = 4096;

/// Default keystroke that leaves serial pass-through (Ctrl-Q, DC1).
pub const DEFAULT_ESCAPE_KEY: u8 = 0x11;

/// Mode name announced over DCS when the command shell is active.
pub const CONTROL_MODE_NAME: &str = "control";

/// Mode name announced over DCS when serial pass-through is active.
pub const SERIAL_MODE_NAME: &str = "serial";

/// Prompt label shown in the command shell.
pub const PROMPT_LABEL: &str = "webserial";

// =============================================================================
// Serial Defaults
// =============================================================================

/// Baud rate assigned to explicitly registered ports.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Directory scanned for stable serial device links.
pub const SERIAL_BY_PATH_DIR: &str = "/dev/serial/by-path";

/// Read buffer size for serial devices.
pub const SERIAL_READ_BUFFER: usize = 4096;

// =============================================================================
// Queue Depths
// =============================================================================

/// Pending chunks allowed on a session's outbound (websocket) queue.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Pending chunks allowed on a serial port's write queue.
pub const SERIAL_QUEUE_DEPTH: usize = 256;

/// Pending inbound frames from the websocket reader.
pub const INBOUND_QUEUE_DEPTH: usize = 64;
