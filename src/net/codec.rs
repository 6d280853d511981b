//! Wire Codec
//!
//! Line-oriented text framing for every datagram: one `name: value` pair per
//! line, UTF-8, newline-terminated. `message_type` is always the first line;
//! `sequence_number` is the second for every type except acknowledgements,
//! which carry `ack_number` instead.
//!
//! Decoding is deliberately forgiving: lines without the `": "` separator
//! are ignored, and a payload with no `message_type` decodes to `None`.
//! Noise on the wire must never crash the receiver.

use std::collections::BTreeMap;

/// Field name carrying the message kind.
pub const KEY_MSG_TYPE: &str = "message_type";
/// Field name carrying the sender-assigned sequence number.
pub const KEY_SEQ_NUM: &str = "sequence_number";
/// Field name on an ACK referencing the sequence being acknowledged.
pub const KEY_ACK_NUM: &str = "ack_number";

/// Ordered-irrelevant field map. BTreeMap keeps encoding deterministic, so
/// re-encoding the same fields is byte-identical (needed for report
/// re-assertion).
pub type FieldMap = BTreeMap<String, String>;

/// A decoded datagram: message kind plus remaining fields.
///
/// `fields` excludes `message_type` but keeps `sequence_number` /
/// `ack_number` so the reliability layer can inspect them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireFrame {
    /// The `message_type` field value.
    pub msg_type: String,
    /// All other fields.
    pub fields: FieldMap,
}

impl WireFrame {
    /// Sequence number, if the frame carries one.
    pub fn sequence(&self) -> Option<u64> {
        self.fields.get(KEY_SEQ_NUM)?.parse().ok()
    }

    /// Acknowledged sequence number, if this is an ACK frame.
    pub fn ack_number(&self) -> Option<u64> {
        self.fields.get(KEY_ACK_NUM)?.parse().ok()
    }
}

/// Encode a message type and field map into a wire payload.
///
/// Header fields come first (`message_type`, then `sequence_number` or
/// `ack_number` when present); the rest follow in sorted order.
pub fn encode(msg_type: &str, fields: &FieldMap) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(KEY_MSG_TYPE);
    out.push_str(": ");
    out.push_str(msg_type);
    out.push('\n');

    for key in [KEY_SEQ_NUM, KEY_ACK_NUM] {
        if let Some(value) = fields.get(key) {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
    }

    for (key, value) in fields {
        if key == KEY_SEQ_NUM || key == KEY_ACK_NUM || key == KEY_MSG_TYPE {
            continue;
        }
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }

    out.into_bytes()
}

/// Decode a wire payload into a frame.
///
/// Returns `None` for anything that cannot possibly be a message: invalid
/// UTF-8 or a payload with no `message_type` field. Individual malformed
/// lines are skipped, not fatal.
pub fn decode(payload: &[u8]) -> Option<WireFrame> {
    let text = std::str::from_utf8(payload).ok()?;

    let mut fields = FieldMap::new();
    let mut msg_type = None;

    for line in text.lines() {
        // Split on the first ": " only; values may themselves contain colons.
        let Some((name, value)) = line.split_once(": ") else {
            continue;
        };
        if name == KEY_MSG_TYPE {
            msg_type = Some(value.to_string());
        } else {
            fields.insert(name.to_string(), value.to_string());
        }
    }

    Some(WireFrame {
        msg_type: msg_type?,
        fields,
    })
}
