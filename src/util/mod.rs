//! Utility module
//!
//! Helpers shared by the transports and the engine.

use std::fmt::Write;

/// Formats octets as offset-prefixed hex lines, 16 octets per line
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + (data.len() / 16 + 1) * 6);
    for (line, chunk) in data.chunks(16).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:04x}:", line * 16);
        for octet in chunk {
            let _ = write!(out, " {:02x}", octet);
        }
    }
    out
}
