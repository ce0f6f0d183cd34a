//! The JSON hub protocol.
//!
//! Each framed record is a JSON object keyed by `type`, an integer
//! discriminator (1 = invocation, 2 = stream item, 3 = completion), with
//! variant-specific fields:
//!
//! ```text
//! {"type":1,"invocationId":"1","target":"Send","arguments":["hello"],"nonBlocking":false}\x1e
//! {"type":2,"invocationId":"1","item":42}\x1e
//! {"type":3,"invocationId":"1","result":"done"}\x1e
//! ```

use bytes::{Bytes, BytesMut};
use serde_json::{Map, Value};

use hermes_transport::TransferFormat;

use crate::binder::InvocationBinder;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{try_read_record, write_record};
use crate::messages::{HubMessage, COMPLETION_KIND, INVOCATION_KIND, STREAM_ITEM_KIND};
use crate::protocol::{check_arguments, check_result, HubProtocol};

/// The record-separator framed JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHubProtocol;

impl JsonHubProtocol {
    /// Create the JSON protocol.
    pub fn new() -> Self {
        Self
    }

    fn parse_record(
        &self,
        record: &Bytes,
        binder: &dyn InvocationBinder,
    ) -> ProtocolResult<HubMessage> {
        let value: Value = serde_json::from_slice(record)
            .map_err(|e| ProtocolError::decode_failed(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(ProtocolError::invalid_message(
                "hub message must be a JSON object",
            ));
        };

        let kind = object
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| ProtocolError::invalid_message("missing or invalid 'type'"))?;

        match kind {
            k if k == u64::from(INVOCATION_KIND) => parse_invocation(&object, binder),
            k if k == u64::from(STREAM_ITEM_KIND) => parse_stream_item(&object),
            k if k == u64::from(COMPLETION_KIND) => parse_completion(&object, binder),
            other => Err(ProtocolError::invalid_message(format!(
                "unknown message type {other}"
            ))),
        }
    }
}

impl HubProtocol for JsonHubProtocol {
    fn name(&self) -> &'static str {
        "json"
    }

    fn transfer_format(&self) -> TransferFormat {
        TransferFormat::Text
    }

    fn try_parse_messages(
        &self,
        buf: &mut BytesMut,
        binder: &dyn InvocationBinder,
        messages: &mut Vec<HubMessage>,
    ) -> ProtocolResult<bool> {
        let mut progress = false;
        while let Some(record) = try_read_record(buf) {
            messages.push(self.parse_record(&record, binder)?);
            progress = true;
        }
        Ok(progress)
    }

    fn write_message(&self, message: &HubMessage, out: &mut BytesMut) -> ProtocolResult<()> {
        let mut object = Map::new();
        object.insert("type".into(), Value::from(message.kind()));

        match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
                non_blocking,
            } => {
                if let Some(id) = invocation_id {
                    object.insert("invocationId".into(), Value::from(id.clone()));
                }
                object.insert("target".into(), Value::from(target.clone()));
                object.insert("arguments".into(), Value::from(arguments.clone()));
                object.insert("nonBlocking".into(), Value::from(*non_blocking));
            }
            HubMessage::StreamItem {
                invocation_id,
                item,
            } => {
                object.insert("invocationId".into(), Value::from(invocation_id.clone()));
                object.insert("item".into(), item.clone());
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                if result.is_some() && error.is_some() {
                    return Err(ProtocolError::encode_failed(
                        "completion cannot carry both a result and an error",
                    ));
                }
                object.insert("invocationId".into(), Value::from(invocation_id.clone()));
                if let Some(result) = result {
                    object.insert("result".into(), result.clone());
                }
                if let Some(error) = error {
                    object.insert("error".into(), Value::from(error.clone()));
                }
            }
        }

        let payload = serde_json::to_vec(&Value::Object(object))
            .map_err(|e| ProtocolError::encode_failed(e.to_string()))?;
        write_record(&payload, out);
        Ok(())
    }
}

fn required_id(object: &Map<String, Value>) -> ProtocolResult<String> {
    object
        .get("invocationId")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::invalid_message("missing or invalid 'invocationId'"))
}

fn parse_invocation(
    object: &Map<String, Value>,
    binder: &dyn InvocationBinder,
) -> ProtocolResult<HubMessage> {
    let target = object
        .get("target")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::invalid_message("missing or invalid 'target'"))?
        .to_owned();

    let arguments = match object.get("arguments") {
        Some(Value::Array(values)) => values.clone(),
        Some(_) => {
            return Err(ProtocolError::invalid_message(
                "'arguments' must be an array",
            ))
        }
        None => Vec::new(),
    };

    let invocation_id = match object.get("invocationId") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(_) => {
            return Err(ProtocolError::invalid_message(
                "'invocationId' must be a string",
            ))
        }
        None => None,
    };

    let non_blocking = match object.get("nonBlocking") {
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(ProtocolError::invalid_message(
                "'nonBlocking' must be a boolean",
            ))
        }
        None => false,
    };

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

fn parse_stream_item(object: &Map<String, Value>) -> ProtocolResult<HubMessage> {
    let invocation_id = required_id(object)?;
    let item = object
        .get("item")
        .cloned()
        .ok_or_else(|| ProtocolError::invalid_message("missing 'item'"))?;
    Ok(HubMessage::StreamItem {
        invocation_id,
        item,
    })
}

fn parse_completion(
    object: &Map<String, Value>,
    binder: &dyn InvocationBinder,
) -> ProtocolResult<HubMessage> {
    let invocation_id = required_id(object)?;

    let result = object.get("result").cloned();
    let error = match object.get("error") {
        Some(Value::String(error)) => Some(error.clone()),
        Some(_) => return Err(ProtocolError::invalid_message("'error' must be a string")),
        None => None,
    };
    if result.is_some() && error.is_some() {
        return Err(ProtocolError::invalid_message(
            "completion cannot carry both a result and an error",
        ));
    }

    check_result(binder, &invocation_id, result.as_ref())?;

    Ok(HubMessage::Completion {
        invocation_id,
        result,
        error,
    })
}
