// Inbound terminal channel frames.
//
// Frames are sniffed: a payload is a control message only when it fully
// parses as one. Everything else is process input, byte for byte.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame {
    Resize { cols: u16, rows: u16 },
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Resize { cols: u16, rows: u16 },
    Input(Vec<u8>),
}

/// Classify raw bytes received from the channel.
///
/// Only payloads starting with `{` are considered for parsing. Resize
/// commands with a zero dimension are not valid control messages and are
/// forwarded as input like any other unparseable payload.
pub fn classify(payload: &[u8]) -> InboundFrame {
    if payload.first() == Some(&b'{') {
        if let Ok(ControlFrame::Resize { cols, rows }) = serde_json::from_slice(payload) {
            if cols > 0 && rows > 0 {
                return InboundFrame::Resize { cols, rows };
            }
        }
    }
    InboundFrame::Input(payload.to_vec())
}
