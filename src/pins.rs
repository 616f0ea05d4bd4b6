//! Modification points ("pins"): located, annotated change requests that a
//! client attaches to a revision, and the chat rendering of them.
//!
//! New messages persist a tagged JSON payload next to the plain-text content,
//! so consumers never have to guess. Older rows carry prose only; for those,
//! decoding falls back to a best-effort parse of the fixed Arabic template:
//!
//! ```text
//! نقطة التعديل #3
//! الموقع: (غرفة النوم)
//! الملاحظة: الرجاء تغيير الموقع
//! ```
//!
//! A message that does not match the template is an ordinary chat message,
//! never a decode error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placeholder shown when a point was submitted without a note.
pub const NO_NOTE: &str = "بدون ملاحظة";

const NOTE_MARKER: &str = "الملاحظة:";
const NOTE_CUTOFF_PREFIX: &str = "هل";

static PIN_INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"نقطة التعديل #(\d+)").expect("valid pin index pattern"));
static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"الموقع:\s*\(([^)]*)\)").expect("valid location pattern"));

/// One stored pin on a revision request. Pins live as a JSON-encoded array in
/// a text column; their index is their 1-based position in that array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub location: String,
    #[serde(default)]
    pub note: String,
}

/// Structured message payload, stored as tagged JSON alongside the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text,
    ModificationPoint {
        pin_index: u32,
        location: String,
        note: String,
    },
}

/// Result of decoding a prose-encoded modification point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPoint {
    pub pin_index: u32,
    pub location: String,
    pub note: String,
    pub raw_content: String,
}

pub fn encode_modification_point(pin_index: u32, location: &str, note: &str) -> String {
    let note = note.trim_end_matches('\n');
    let note = if note.trim().is_empty() { NO_NOTE } else { note };
    format!("نقطة التعديل #{pin_index}\nالموقع: ({location})\nالملاحظة: {note}")
}

/// Best-effort template match. Both the index and the location marker must be
/// present; anything else is treated as plain text and yields `None`.
pub fn parse_modification_point(content: &str) -> Option<ParsedPoint> {
    let pin_index = PIN_INDEX_RE
        .captures(content)?
        .get(1)
        .and_then(|m| m.as_str().parse::<u32>().ok())?;
    let location = LOCATION_RE.captures(content)?.get(1)?.as_str().to_string();

    let note = extract_note(content)
        .filter(|note| !note.is_empty())
        .unwrap_or_else(|| NO_NOTE.to_string());

    Some(ParsedPoint {
        pin_index,
        location,
        note,
        raw_content: content.to_string(),
    })
}

/// The note runs from its marker to a blank line, a line starting with
/// `هل`, or the end of input. The boundary is tuned to the producing
/// template; the full original text stays available in `raw_content`.
fn extract_note(content: &str) -> Option<String> {
    let start = content.find(NOTE_MARKER)? + NOTE_MARKER.len();
    let rest = &content[start..];

    let mut collected: Vec<&str> = Vec::new();
    for (position, line) in rest.split('\n').enumerate() {
        let trimmed = line.trim();
        if position > 0 && (trimmed.is_empty() || trimmed.starts_with(NOTE_CUTOFF_PREFIX)) {
            break;
        }
        collected.push(trimmed);
    }

    Some(collected.join("\n").trim().to_string())
}

/// Decode a message for rendering. Tagged payloads win; prose parsing is the
/// fallback for rows written before payloads existed.
pub fn decode_message(content: &str, payload: Option<&serde_json::Value>) -> MessageBody {
    if let Some(value) = payload {
        if let Ok(body) = serde_json::from_value::<MessageBody>(value.clone()) {
            return body;
        }
    }

    match parse_modification_point(content) {
        Some(point) => MessageBody::ModificationPoint {
            pin_index: point.pin_index,
            location: point.location,
            note: point.note,
        },
        None => MessageBody::Text,
    }
}

/// Decode the stored pin array of a revision request. Malformed JSON or a
/// non-array payload degrades to an empty list.
pub fn decode_pins(raw: &str) -> Vec<Pin> {
    serde_json::from_str(raw).unwrap_or_default()
}
