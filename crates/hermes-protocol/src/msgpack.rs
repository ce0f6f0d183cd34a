//! The MessagePack hub protocol.
//!
//! Each message is a positional msgpack array starting with the integer type
//! discriminator, preceded by a 7-bit varint length prefix:
//!
//! ```text
//! invocation:  [1, invocation-id | nil, target, [arguments...], non-blocking]
//! stream item: [2, invocation-id, item]
//! completion:  [3, invocation-id, result-kind, payload?]
//! ```
//!
//! The completion `result-kind` is 1 for an error (payload is the message),
//! 2 for a void result (no payload element), 3 for a value (payload is the
//! result).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value as JsonValue;

use hermes_transport::TransferFormat;

use crate::binder::InvocationBinder;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{try_read_length_prefix, write_length_prefix};
use crate::messages::{HubMessage, COMPLETION_KIND, INVOCATION_KIND, STREAM_ITEM_KIND};
use crate::protocol::{check_arguments, check_result, HubProtocol};

/// Completion result kind: the invocation failed.
const RESULT_KIND_ERROR: u64 = 1;
/// Completion result kind: the invocation succeeded without a value.
const RESULT_KIND_VOID: u64 = 2;
/// Completion result kind: the invocation succeeded with a value.
const RESULT_KIND_VALUE: u64 = 3;

/// The length-prefix framed MessagePack codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackHubProtocol;

impl MessagePackHubProtocol {
    /// Create the MessagePack protocol.
    pub fn new() -> Self {
        Self
    }

    fn parse_payload(
        &self,
        payload: &Bytes,
        binder: &dyn InvocationBinder,
    ) -> ProtocolResult<HubMessage> {
        let mut cursor = payload.as_ref();
        let value = rmpv::decode::read_value(&mut cursor)
            .map_err(|e| ProtocolError::decode_failed(e.to_string()))?;
        if !cursor.is_empty() {
            return Err(ProtocolError::decode_failed(
                "message payload has trailing bytes",
            ));
        }

        let rmpv::Value::Array(elements) = value else {
            return Err(ProtocolError::invalid_message(
                "hub message must be a msgpack array",
            ));
        };

        let kind = elements
            .first()
            .and_then(rmpv::Value::as_u64)
            .ok_or_else(|| ProtocolError::invalid_message("missing or invalid type element"))?;

        match kind {
            k if k == u64::from(INVOCATION_KIND) => parse_invocation(&elements, binder),
            k if k == u64::from(STREAM_ITEM_KIND) => parse_stream_item(&elements),
            k if k == u64::from(COMPLETION_KIND) => parse_completion(&elements, binder),
            other => Err(ProtocolError::invalid_message(format!(
                "unknown message type {other}"
            ))),
        }
    }
}

impl HubProtocol for MessagePackHubProtocol {
    fn name(&self) -> &'static str {
        "messagepack"
    }

    fn transfer_format(&self) -> TransferFormat {
        TransferFormat::Binary
    }

    fn try_parse_messages(
        &self,
        buf: &mut BytesMut,
        binder: &dyn InvocationBinder,
        messages: &mut Vec<HubMessage>,
    ) -> ProtocolResult<bool> {
        let mut progress = false;
        loop {
            let Some((length, prefix_len)) = try_read_length_prefix(buf)? else {
                break;
            };
            if buf.len() < prefix_len + length {
                // Whole message not buffered yet; the prefix stays put.
                break;
            }
            buf.advance(prefix_len);
            let payload = buf.split_to(length).freeze();
            messages.push(self.parse_payload(&payload, binder)?);
            progress = true;
        }
        Ok(progress)
    }

    fn write_message(&self, message: &HubMessage, out: &mut BytesMut) -> ProtocolResult<()> {
        let elements = match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
                non_blocking,
            } => {
                let id = match invocation_id {
                    Some(id) => rmpv::Value::from(id.as_str()),
                    None => rmpv::Value::Nil,
                };
                let arguments = arguments
                    .iter()
                    .map(to_msgpack)
                    .collect::<ProtocolResult<Vec<_>>>()?;
                vec![
                    rmpv::Value::from(u64::from(INVOCATION_KIND)),
                    id,
                    rmpv::Value::from(target.as_str()),
                    rmpv::Value::Array(arguments),
                    rmpv::Value::from(*non_blocking),
                ]
            }
            HubMessage::StreamItem {
                invocation_id,
                item,
            } => vec![
                rmpv::Value::from(u64::from(STREAM_ITEM_KIND)),
                rmpv::Value::from(invocation_id.as_str()),
                to_msgpack(item)?,
            ],
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let mut elements = vec![
                    rmpv::Value::from(u64::from(COMPLETION_KIND)),
                    rmpv::Value::from(invocation_id.as_str()),
                ];
                match (result, error) {
                    (Some(_), Some(_)) => {
                        return Err(ProtocolError::encode_failed(
                            "completion cannot carry both a result and an error",
                        ))
                    }
                    (None, Some(error)) => {
                        elements.push(rmpv::Value::from(RESULT_KIND_ERROR));
                        elements.push(rmpv::Value::from(error.as_str()));
                    }
                    (None, None) => elements.push(rmpv::Value::from(RESULT_KIND_VOID)),
                    (Some(result), None) => {
                        elements.push(rmpv::Value::from(RESULT_KIND_VALUE));
                        elements.push(to_msgpack(result)?);
                    }
                }
                elements
            }
        };

        let mut payload = Vec::new();
        rmpv::encode::write_value(&mut payload, &rmpv::Value::Array(elements))
            .map_err(|e| ProtocolError::encode_failed(e.to_string()))?;
        write_length_prefix(payload.len(), out);
        out.put_slice(&payload);
        Ok(())
    }
}

fn to_msgpack(value: &JsonValue) -> ProtocolResult<rmpv::Value> {
    rmpv::ext::to_value(value).map_err(|e| ProtocolError::encode_failed(e.to_string()))
}

fn from_msgpack(value: rmpv::Value) -> ProtocolResult<JsonValue> {
    rmpv::ext::from_value(value).map_err(|e| ProtocolError::decode_failed(e.to_string()))
}

fn element_str(elements: &[rmpv::Value], index: usize, name: &str) -> ProtocolResult<String> {
    elements
        .get(index)
        .and_then(rmpv::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::invalid_message(format!("missing or invalid '{name}'")))
}

fn parse_invocation(
    elements: &[rmpv::Value],
    binder: &dyn InvocationBinder,
) -> ProtocolResult<HubMessage> {
    if elements.len() != 5 {
        return Err(ProtocolError::invalid_message(
            "invocation must have 5 elements",
        ));
    }

    let invocation_id = match &elements[1] {
        rmpv::Value::Nil => None,
        rmpv::Value::String(id) => id.as_str().map(str::to_owned),
        _ => None,
    };
    if !matches!(&elements[1], rmpv::Value::Nil) && invocation_id.is_none() {
        return Err(ProtocolError::invalid_message(
            "'invocationId' must be a string or nil",
        ));
    }

    let target = element_str(elements, 2, "target")?;

    let rmpv::Value::Array(raw_arguments) = &elements[3] else {
        return Err(ProtocolError::invalid_message(
            "'arguments' must be an array",
        ));
    };
    let arguments = raw_arguments
        .iter()
        .cloned()
        .map(from_msgpack)
        .collect::<ProtocolResult<Vec<_>>>()?;

    let non_blocking = elements[4]
        .as_bool()
        .ok_or_else(|| ProtocolError::invalid_message("'nonBlocking' must be a boolean"))?;

    // An id is present exactly when the caller expects a response.
    if non_blocking == invocation_id.is_some() {
        return Err(ProtocolError::invalid_message(
            "an invocation carries an id iff it expects a completion",
        ));
    }

    check_arguments(binder, &target, &arguments)?;

    Ok(HubMessage::Invocation {
        invocation_id,
        target,
        arguments,
        non_blocking,
    })
}

fn parse_stream_item(elements: &[rmpv::Value]) -> ProtocolResult<HubMessage> {
    if elements.len() != 3 {
        return Err(ProtocolError::invalid_message(
            "stream item must have 3 elements",
        ));
    }
    let invocation_id = element_str(elements, 1, "invocationId")?;
    let item = from_msgpack(elements[2].clone())?;
    Ok(HubMessage::StreamItem {
        invocation_id,
        item,
    })
}

fn parse_completion(
    elements: &[rmpv::Value],
    binder: &dyn InvocationBinder,
) -> ProtocolResult<HubMessage> {
    if elements.len() < 3 {
        return Err(ProtocolError::invalid_message(
            "completion must have at least 3 elements",
        ));
    }
    let invocation_id = element_str(elements, 1, "invocationId")?;
    let result_kind = elements[2]
        .as_u64()
        .ok_or_else(|| ProtocolError::invalid_message("missing or invalid result kind"))?;

    let (result, error) = match result_kind {
        RESULT_KIND_ERROR => {
            let error = element_str(elements, 3, "error")?;
            (None, Some(error))
        }
        RESULT_KIND_VOID => {
            if elements.len() != 3 {
                return Err(ProtocolError::invalid_message(
                    "void completion carries no payload",
                ));
            }
            (None, None)
        }
        RESULT_KIND_VALUE => {
            let value = elements
                .get(3)
                .cloned()
                .ok_or_else(|| ProtocolError::invalid_message("missing 'result'"))?;
            (Some(from_msgpack(value)?), None)
        }
        other => {
            return Err(ProtocolError::invalid_message(format!(
                "unknown completion result kind {other}"
            )))
        }
    };

    check_result(binder, &invocation_id, result.as_ref())?;

    Ok(HubMessage::Completion {
        invocation_id,
        result,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::NullBinder;
    use serde_json::json;

    fn roundtrip(message: HubMessage) -> HubMessage {
        let protocol = MessagePackHubProtocol::new();
        let mut buf = BytesMut::new();
        protocol.write_message(&message, &mut buf).unwrap();

        let mut messages = Vec::new();
        assert!(protocol
            .try_parse_messages(&mut buf, &NullBinder, &mut messages)
            .unwrap());
        assert!(buf.is_empty());
        assert_eq!(messages.len(), 1);
        messages.pop().unwrap()
    }

    #[test]
    fn test_roundtrip_all_variants() {
        let messages = [
            HubMessage::invocation("7", "Add", vec![json!(1), json!(2)]),
            HubMessage::non_blocking_invocation("Notify", vec![json!("x")]),
            HubMessage::stream_item("7", json!({"nested": [1, 2]})),
            HubMessage::completion_result("7", json!(3)),
            HubMessage::completion_void("8"),
            HubMessage::completion_error("9", "target blew up"),
        ];
        for message in messages {
            assert_eq!(roundtrip(message.clone()), message);
        }
    }

    #[test]
    fn test_payload_is_length_prefixed() {
        let protocol = MessagePackHubProtocol::new();
        let mut buf = BytesMut::new();
        protocol
            .write_message(&HubMessage::completion_void("1"), &mut buf)
            .unwrap();

        let (length, prefix_len) = try_read_length_prefix(&buf).unwrap().unwrap();
        assert_eq!(prefix_len + length, buf.len());
    }

    #[test]
    fn test_partial_message_is_left_intact() {
        let protocol = MessagePackHubProtocol::new();
        let mut full = BytesMut::new();
        protocol
            .write_message(&HubMessage::completion_void("1"), &mut full)
            .unwrap();

        // Everything except the last byte: prefix present, payload short.
        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        let snapshot = partial.clone();

        let mut messages = Vec::new();
        assert!(!protocol
            .try_parse_messages(&mut partial, &NullBinder, &mut messages)
            .unwrap());
        assert!(messages.is_empty());
        assert_eq!(partial, snapshot);

        // Completing the payload parses the message.
        partial.extend_from_slice(&full[full.len() - 1..]);
        assert!(protocol
            .try_parse_messages(&mut partial, &NullBinder, &mut messages)
            .unwrap());
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_two_messages_parse_in_order() {
        let protocol = MessagePackHubProtocol::new();
        let mut buf = BytesMut::new();
        protocol
            .write_message(&HubMessage::stream_item("1", json!(1)), &mut buf)
            .unwrap();
        protocol
            .write_message(&HubMessage::stream_item("1", json!(2)), &mut buf)
            .unwrap();

        let mut messages = Vec::new();
        assert!(protocol
            .try_parse_messages(&mut buf, &NullBinder, &mut messages)
            .unwrap());
        assert_eq!(
            messages,
            vec![
                HubMessage::stream_item("1", json!(1)),
                HubMessage::stream_item("1", json!(2)),
            ]
        );
    }

    #[test]
    fn test_malformed_payload_raises() {
        let protocol = MessagePackHubProtocol::new();
        let mut messages = Vec::new();

        // A length-prefixed msgpack string is not a hub message.
        let mut payload = Vec::new();
        rmpv::encode::write_value(&mut payload, &rmpv::Value::from("nope")).unwrap();
        let mut buf = BytesMut::new();
        write_length_prefix(payload.len(), &mut buf);
        buf.put_slice(&payload);

        let err = protocol
            .try_parse_messages(&mut buf, &NullBinder, &mut messages)
            .unwrap_err();
        assert!(err.to_string().contains("msgpack array"));
    }

    #[test]
    fn test_unknown_type_raises() {
        let protocol = MessagePackHubProtocol::new();
        let mut payload = Vec::new();
        rmpv::encode::write_value(
            &mut payload,
            &rmpv::Value::Array(vec![rmpv::Value::from(9u64)]),
        )
        .unwrap();
        let mut buf = BytesMut::new();
        write_length_prefix(payload.len(), &mut buf);
        buf.put_slice(&payload);

        let mut messages = Vec::new();
        let err = protocol
            .try_parse_messages(&mut buf, &NullBinder, &mut messages)
            .unwrap_err();
        assert!(err.to_string().contains("unknown message type 9"));
    }

    #[test]
    fn test_protocol_identity() {
        let protocol = MessagePackHubProtocol::new();
        assert_eq!(protocol.name(), "messagepack");
        assert_eq!(protocol.transfer_format(), TransferFormat::Binary);
    }
}
