//! Hub protocol framing and message codecs for the Hermes framework.
//!
//! Two layers live here:
//!
//! 1. **Framing** ([`framing`]): record-separator delimiting for text
//!    payloads (`0x1E` terminates every record) and 7-bit varint length
//!    prefixes for binary payloads.
//! 2. **Message codecs**: the [`NegotiationMessage`] handshake frame and the
//!    [`HubMessage`] sum type with two interchangeable wire encodings,
//!    [`JsonHubProtocol`] and [`MessagePackHubProtocol`], both behind the
//!    [`HubProtocol`] trait.
//!
//! Parsers consume only whole messages: trailing partial bytes stay in the
//! caller's buffer, and malformed records raise a [`ProtocolError`] rather
//! than being reported as missing data.

pub mod binder;
pub mod error;
pub mod framing;
pub mod json;
pub mod messages;
pub mod msgpack;
pub mod negotiate;
pub mod protocol;

pub use binder::{InvocationBinder, NullBinder, ParameterType};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::RECORD_SEPARATOR;
pub use json::JsonHubProtocol;
pub use messages::HubMessage;
pub use msgpack::MessagePackHubProtocol;
pub use negotiate::NegotiationMessage;
pub use protocol::HubProtocol;
