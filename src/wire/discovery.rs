//! Discovery reply wire format: `$` followed by a UTF-8 JSON object.

use serde::Deserialize;

/// Raw shape of a discovery/state reply payload, as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryReply {
    pub serial_number: String,
    pub ip_address: String,
    pub state_counter: u32,
    #[serde(default)]
    pub mac_address: Option<String>,
}

/// Recognize and decode a `$`-prefixed JSON discovery reply datagram.
/// Returns `None` for anything that doesn't match the `^\$(\{.*\})$`
/// shape or fails to parse as JSON — both are treated as "not a
/// discovery reply" rather than an error, since the same socket also
/// carries fragment-header state datagrams.
pub fn parse_reply(datagram: &[u8]) -> Option<DiscoveryReply> {
    if datagram.first() != Some(&b'$') {
        return None;
    }
    let body = &datagram[1..];
    if body.first() != Some(&b'{') || body.last() != Some(&b'}') {
        return None;
    }
    serde_json::from_slice(body).ok()
}
