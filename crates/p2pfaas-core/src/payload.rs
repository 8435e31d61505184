//! Base64 transcoding of payloads carried in peer envelopes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encode raw payload bytes for a peer envelope.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode an envelope payload back to raw bytes.
pub fn decode(text: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}
