//! Pass-through exit keystroke.

/// Parse a `ctrl+<key>` specification into the control byte it produces.
///
/// Keys that the shell or the escape parser already give meaning to are
/// rejected: `ctrl+[` is ESC, `ctrl+c` aborts lines, `ctrl+h`, `ctrl+i`,
/// `ctrl+j` and `ctrl+m` are backspace, tab and line endings.
pub fn parse_escape_key(spec: &str) -> Result<u8, String> {
    let spec = spec.to_ascii_lowercase();
    let suffix = spec
        .strip_prefix("ctrl+")
        .or_else(|| spec.strip_prefix("ctrl-"))
        .or_else(|| spec.strip_prefix('^'))
        .ok_or_else(|| format!("escape key must look like ctrl+<key>, got '{spec}'"))?;

    let byte = match suffix {
        "]" => 0x1d,
        "\\" => 0x1c,
        "^" | "6" => 0x1e,
        "_" => 0x1f,
        c if c.len() == 1 && c.as_bytes()[0].is_ascii_lowercase() => c.as_bytes()[0] - b'a' + 1,
        _ => return Err(format!("unsupported escape key '{spec}'")),
    };

    match byte {
        0x03 | 0x08 | 0x09 | 0x0a | 0x0d => {
            Err(format!("'{spec}' is reserved by the command shell"))
        }
        b => Ok(b),
    }
}

/// Human-readable name for a control byte, e.g. `Ctrl + q`.
pub fn describe_escape_key(byte: u8) -> String {
    match byte {
        0x01..=0x1a => format!("Ctrl + {}", (byte - 1 + b'a') as char),
        0x1c => "Ctrl + \\".to_string(),
        0x1d => "Ctrl + ]".to_string(),
        0x1e => "Ctrl + ^".to_string(),
        0x1f => "Ctrl + _".to_string(),
        other => format!("0x{other:02x}"),
    }
}
