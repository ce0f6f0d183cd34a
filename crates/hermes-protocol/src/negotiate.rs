//! The negotiation handshake frame.
//!
//! The first record a client sends names the hub protocol it intends to
//! speak: a UTF-8 JSON object without BOM carrying the single required
//! string property `protocol`, terminated by the record separator.
//!
//! ```text
//! {"protocol":"json"}\x1e
//! ```

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{try_read_record, write_record};

/// The protocol-selection handshake message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationMessage {
    /// Name of the hub protocol the client wants to speak.
    pub protocol: String,
}

impl NegotiationMessage {
    /// Create a negotiation message for the named protocol.
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
        }
    }
}

/// Append the negotiation record for `message` to `out`.
pub fn write_negotiation(message: &NegotiationMessage, out: &mut BytesMut) {
    // A single-string-field struct cannot fail JSON serialization.
    let payload = serde_json::to_vec(message).unwrap_or_default();
    write_record(&payload, out);
}

/// Parse one negotiation record off the front of `buf`.
///
/// Returns `Ok(None)` when no complete record is buffered yet.
///
/// # Errors
///
/// [`ProtocolError::InvalidNegotiation`] when the record is not a JSON
/// object or the `protocol` property is missing or not a string.
pub fn try_parse_negotiation(buf: &mut BytesMut) -> ProtocolResult<Option<NegotiationMessage>> {
    let Some(record) = try_read_record(buf) else {
        return Ok(None);
    };

    let value: Value = serde_json::from_slice(&record)
        .map_err(|e| ProtocolError::invalid_negotiation(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ProtocolError::invalid_negotiation(
            "negotiation message must be a JSON object",
        ));
    };

    match object.get("protocol") {
        Some(Value::String(protocol)) => Ok(Some(NegotiationMessage::new(protocol.clone()))),
        Some(_) => Err(ProtocolError::invalid_negotiation(
            "'protocol' must be a string",
        )),
        None => Err(ProtocolError::invalid_negotiation(
            "missing required property 'protocol'",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::RECORD_SEPARATOR;

    #[test]
    fn test_write_produces_exact_wire_shape() {
        let mut buf = BytesMut::new();
        write_negotiation(&NegotiationMessage::new("json"), &mut buf);
        assert_eq!(buf.as_ref(), b"{\"protocol\":\"json\"}\x1e");
        assert_eq!(*buf.last().unwrap(), RECORD_SEPARATOR);
    }

    #[test]
    fn test_roundtrip() {
        let mut buf = BytesMut::new();
        write_negotiation(&NegotiationMessage::new("messagepack"), &mut buf);

        let parsed = try_parse_negotiation(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.protocol, "messagepack");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_record_returns_none() {
        let mut buf = BytesMut::from(&b"{\"protocol\":\"js"[..]);
        assert_eq!(try_parse_negotiation(&mut buf).unwrap(), None);
        assert_eq!(buf.as_ref(), b"{\"protocol\":\"js");
    }

    #[test]
    fn test_missing_protocol_property_is_rejected() {
        let mut buf = BytesMut::from(&b"{\"not-protocol\":\"json\"}\x1e"[..]);
        let err = try_parse_negotiation(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidNegotiation(_)));
        assert!(err.to_string().contains("protocol"));
    }

    #[test]
    fn test_non_object_is_rejected() {
        let mut buf = BytesMut::from(&b"\"json\"\x1e"[..]);
        let err = try_parse_negotiation(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidNegotiation(_)));
    }

    #[test]
    fn test_non_string_protocol_is_rejected() {
        let mut buf = BytesMut::from(&b"{\"protocol\":42}\x1e"[..]);
        let err = try_parse_negotiation(&mut buf).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let mut buf = BytesMut::from(&b"{not json}\x1e"[..]);
        assert!(try_parse_negotiation(&mut buf).is_err());
    }
}
