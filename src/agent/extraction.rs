//! Inline capture-block protocol.
//!
//! The model is instructed to append one delimited block to its final text
//! when it judges the user's message contains a capturable action item:
//!
//! ```text
//! [[capture]]{"type":"task","title":"Renew passport","urgency":"high"}[[/capture]]
//! ```
//!
//! The block is always stripped from the user-visible reply. Parsing is
//! permissive: a malformed block is dropped silently rather than failing
//! the turn.

use serde::{Deserialize, Serialize};

const OPEN_MARKER: &str = "[[capture]]";
const CLOSE_MARKER: &str = "[[/capture]]";

/// A captured action item extracted from the model's final text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedItem {
    /// Item category, e.g. "task", "event", "idea".
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
    pub title: String,
    /// Free-text context carried along with the item.
    #[serde(default)]
    pub context: Option<String>,
    /// Due timestamp as the model emitted it (not validated here).
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
}

/// Remove the capture block from `text` and parse its payload.
///
/// Returns the cleaned reply and the parsed item, if the block was present
/// and well-formed. A block that fails to parse is still removed.
pub fn strip_capture_block(text: &str) -> (String, Option<CapturedItem>) {
    let Some(open) = text.find(OPEN_MARKER) else {
        return (text.to_string(), None);
    };
    let after_open = open + OPEN_MARKER.len();
    let Some(close_rel) = text[after_open..].find(CLOSE_MARKER) else {
        // Unterminated block: drop everything from the opener on.
        return (text[..open].trim_end().to_string(), None);
    };
    let close = after_open + close_rel;

    let payload = &text[after_open..close];
    let item = match serde_json::from_str::<CapturedItem>(payload.trim()) {
        Ok(item) => Some(item),
        Err(e) => {
            log::debug!("dropping malformed capture block: {e}");
            None
        }
    };

    let mut cleaned = String::with_capacity(text.len());
    cleaned.push_str(&text[..open]);
    cleaned.push_str(&text[close + CLOSE_MARKER.len()..]);
    (cleaned.trim().to_string(), item)
}
