//! GRBL command bytes and line preparation

/// Realtime status query
pub const STATUS_QUERY: u8 = b'?';
/// Realtime feed hold
pub const FEED_HOLD: u8 = b'!';
/// Realtime cycle start / resume
pub const CYCLE_START: u8 = b'~';
/// Realtime soft reset (Ctrl-X)
pub const SOFT_RESET: u8 = 0x18;

/// Clear an alarm lock
pub const UNLOCK: &str = "$X";
/// Run the homing cycle
pub const HOME: &str = "$H";

/// Strip `;` and `( )` comments and surrounding whitespace.
///
/// Returns `None` for lines with nothing left to send.
pub fn clean_line(raw: &str) -> Option<String> {
    let code = raw.split(';').next().unwrap_or("");
    let mut cleaned = String::with_capacity(code.len());
    let mut depth = 0usize;
    for ch in code.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => cleaned.push(ch),
            _ => {}
        }
    }
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Single-byte realtime command, if `command` is one
pub fn realtime_byte(command: &str) -> Option<u8> {
    match command.as_bytes() {
        [b] if matches!(*b, STATUS_QUERY | FEED_HOLD | CYCLE_START | SOFT_RESET) => Some(*b),
        _ => None,
    }
}

/// Whether `command` is a homing or unlock request, which the channel
/// routes through its recovery operations
pub fn is_recovery(command: &str) -> Option<&'static str> {
    let upper = command.trim().to_ascii_uppercase();
    match upper.as_str() {
        UNLOCK => Some(UNLOCK),
        HOME => Some(HOME),
        _ => None,
    }
}
