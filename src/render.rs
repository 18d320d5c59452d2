//! Lossy rendering of raw bytes for diagnostics
//!
//! All on-the-wire data in this crate is bytes. Error messages and
//! violation reports render those bytes as UTF-8 where possible and
//! backslash-escape everything else, so a report line is always a valid
//! single-line string no matter what the input contained.

use std::fmt::Write;

/// Render bytes as UTF-8, escaping invalid sequences as `\xNN`.
pub fn lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
        for b in chunk.invalid() {
            let _ = write!(out, "\\x{b:02x}");
        }
    }
    out
}

/// Render a sequence of byte strings, space-joined.
pub fn lossy_join<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut out = String::new();
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&lossy(item));
    }
    out
}
