// src/codec/framing.rs
//! Byte stuffing for the delimited serial layout

use crate::config::constants::framing::{SERIAL_ESCAPED_ESCAPE, SERIAL_ESCAPED_HEAD, SERIAL_ESCAPED_TAIL};

/// Delimiter bytes of one delimited layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub head: u8,
    pub tail: u8,
    pub escape: u8,
}

impl Delimiters {
    /// Reverse byte stuffing of `payload` into `out`
    ///
    /// An unknown escape code decodes to the escape byte itself and a dangling escape is
    /// dropped, matching the firmware's receiver. A damaged frame then surfaces as a length
    /// mismatch.
    pub fn unescape_into(&self, payload: &[u8], out: &mut Vec<u8>) {
        out.clear();
        let mut bytes = payload.iter();
        while let Some(&byte) = bytes.next() {
            if byte != self.escape {
                out.push(byte);
                continue;
            }
            match bytes.next() {
                Some(&SERIAL_ESCAPED_HEAD) => out.push(self.head),
                Some(&SERIAL_ESCAPED_TAIL) => out.push(self.tail),
                Some(&SERIAL_ESCAPED_ESCAPE) => out.push(self.escape),
                Some(_) => out.push(self.escape),
                None => {}
            }
        }
    }

    /// Wrap `payload` in head/tail, escaping reserved bytes
    pub fn encode_frame(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + 2);
        frame.push(self.head);
        for &byte in payload {
            match byte {
                b if b == self.head => frame.extend_from_slice(&[self.escape, SERIAL_ESCAPED_HEAD]),
                b if b == self.tail => frame.extend_from_slice(&[self.escape, SERIAL_ESCAPED_TAIL]),
                b if b == self.escape => frame.extend_from_slice(&[self.escape, SERIAL_ESCAPED_ESCAPE]),
                b => frame.push(b),
            }
        }
        frame.push(self.tail);
        frame
    }
}
