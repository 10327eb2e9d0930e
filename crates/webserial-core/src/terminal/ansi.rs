//! Control bytes and output sequences written to the browser terminal.

pub const ETX: u8 = 0x03;
pub const BEL: u8 = 0x07;
pub const BS: u8 = 0x08;
pub const TAB: u8 = 0x09;
pub const LF: u8 = 0x0a;
pub const CR: u8 = 0x0d;
/// Ctrl-Q.
pub const DC1: u8 = 0x11;
pub const ESC: u8 = 0x1b;
pub const DEL: u8 = 0x7f;
/// Second byte of the string terminator `ESC \`.
pub const ST_FINAL: u8 = b'\\';

pub const CRLF: &str = "\r\n";
pub const CLEAR_SCREEN: &str = "\x1b[2J";
pub const CURSOR_HOME: &str = "\x1b[0;0H";
/// Erase one character to the left of the cursor.
pub const RUBOUT: &str = "\x08 \x08";

/// Select Graphic Rendition attributes used by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sgr {
    Reset,
    Bold,
    Dim,
    Italic,
    Red,
    Cyan,
    White,
}

impl Sgr {
    fn code(self) -> &'static str {
        match self {
            Sgr::Reset => "0",
            Sgr::Bold => "1",
            Sgr::Dim => "2",
            Sgr::Italic => "3",
            Sgr::Red => "31",
            Sgr::Cyan => "36",
            Sgr::White => "37",
        }
    }
}

/// `ESC [ a;b;...m`
pub fn sgr(attrs: &[Sgr]) -> String {
    let codes: Vec<&str> = attrs.iter().map(|a| a.code()).collect();
    format!("\x1b[{}m", codes.join(";"))
}

/// Wrap `text` in the given attributes followed by a reset.
pub fn styled(attrs: &[Sgr], text: &str) -> String {
    format!("{}{}{}", sgr(attrs), text, sgr(&[Sgr::Reset]))
}

/// `ESC P <final><message> ESC \`, used to announce the session mode.
pub fn dcs(final_byte: char, message: &str) -> String {
    format!("\x1bP{final_byte}{message}\x1b\\")
}

/// Window title via OSC 2.
pub fn set_title(title: &str) -> String {
    format!("\x1b]2;{title}\x1b\\")
}

/// Move the cursor to a 0-based position.
pub fn cursor_to(row: u16, col: u16) -> String {
    format!("\x1b[{row};{col}H")
}
