//! Wire framing for mesh messages.
//!
//! Every adapter byte-pipe carries one JSON object per line: the `Message`
//! envelope serializes directly to the wire shape (see the `camelCase`
//! renaming on `Message`), so encoding is just `serde_json::to_string` and
//! decoding is `serde_json::from_str`. The adapter's own framing (newline,
//! MTU-chunk reassembly, ...) demarcates message boundaries below this
//! layer; this module never sees partial frames.

use crate::error::{Error, Result};
use crate::protocol::types::Message;

/// Encode a message as a single line of JSON, ready to hand to a transport's
/// `send`.
pub fn encode(message: &Message) -> Result<String> {
    serde_json::to_string(message).map_err(Error::Serialization)
}

/// Decode a line of text received from a transport into a `Message`.
///
/// Malformed frames are the caller's concern to log and drop - a bad frame
/// must not disturb other peers' flows - this function just reports the
/// failure.
pub fn decode(text: &str) -> Result<Message> {
    serde_json::from_str(text).map_err(|e| Error::Decode(e.to_string()))
}
