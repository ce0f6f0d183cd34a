//! The hub protocol trait.

use bytes::BytesMut;
use hermes_transport::TransferFormat;

use crate::binder::InvocationBinder;
use crate::error::ProtocolResult;
use crate::messages::HubMessage;

/// A pluggable hub message codec.
///
/// A protocol pairs a per-message encoding with a framing scheme matched to
/// its transfer format: text protocols end every record with the record
/// separator, binary protocols precede every message with a varint length
/// prefix.
pub trait HubProtocol: Send + Sync {
    /// The protocol name used during negotiation.
    fn name(&self) -> &'static str;

    /// The transfer format this protocol requires of its transport.
    fn transfer_format(&self) -> TransferFormat;

    /// Parse as many whole messages as `buf` holds, appending them to
    /// `messages`.
    ///
    /// Returns whether any message was produced. Trailing partial bytes are
    /// left in `buf` for the next pass.
    ///
    /// # Errors
    ///
    /// A [`ProtocolError`](crate::ProtocolError) when a complete record is
    /// malformed; the buffer's remaining contents are unspecified afterwards
    /// and the connection is expected to terminate.
    fn try_parse_messages(
        &self,
        buf: &mut BytesMut,
        binder: &dyn InvocationBinder,
        messages: &mut Vec<HubMessage>,
    ) -> ProtocolResult<bool>;

    /// Append `message` and its framing to `out`.
    fn write_message(&self, message: &HubMessage, out: &mut BytesMut) -> ProtocolResult<()>;
}

/// Check invocation arguments against the binder's expectations.
pub(crate) fn check_arguments(
    binder: &dyn InvocationBinder,
    target: &str,
    arguments: &[serde_json::Value],
) -> ProtocolResult<()> {
    let Some(expected) = binder.parameter_types(target) else {
        return Ok(());
    };
    if expected.len() != arguments.len() {
        return Err(crate::ProtocolError::invalid_message(format!(
            "invocation of '{target}' expects {} argument(s), got {}",
            expected.len(),
            arguments.len()
        )));
    }
    for (index, (parameter, argument)) in expected.iter().zip(arguments).enumerate() {
        if !parameter.matches(argument) {
            return Err(crate::ProtocolError::invalid_message(format!(
                "argument {index} of '{target}' does not match the expected type"
            )));
        }
    }
    Ok(())
}

/// Check a completion result against the binder's expectations.
pub(crate) fn check_result(
    binder: &dyn InvocationBinder,
    invocation_id: &str,
    result: Option<&serde_json::Value>,
) -> ProtocolResult<()> {
    if let Some(value) = result {
        let expected = binder.return_type(invocation_id);
        if !expected.matches(value) {
            return Err(crate::ProtocolError::invalid_message(format!(
                "completion of invocation '{invocation_id}' does not match the expected type"
            )));
        }
    }
    Ok(())
}
