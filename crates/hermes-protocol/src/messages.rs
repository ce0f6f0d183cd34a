//! Hub message types.

use serde_json::Value;

/// Wire discriminator for invocations.
pub const INVOCATION_KIND: u8 = 1;
/// Wire discriminator for stream items.
pub const STREAM_ITEM_KIND: u8 = 2;
/// Wire discriminator for completions.
pub const COMPLETION_KIND: u8 = 3;

/// One logical RPC event.
///
/// Invariants the invocation layer maintains:
///
/// - `invocation_id` is present iff the caller expects a response;
/// - at most one `Completion` is produced per invocation id;
/// - `StreamItem`s for an id only precede its `Completion`.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// A call to a named target.
    Invocation {
        /// Correlation id; `None` for fire-and-forget invocations.
        invocation_id: Option<String>,
        /// Name of the method to invoke. Matched case-sensitively.
        target: String,
        /// Arguments for the target.
        arguments: Vec<Value>,
        /// Whether the caller declines a completion.
        non_blocking: bool,
    },

    /// One item of a streaming invocation's result.
    StreamItem {
        /// Id of the invocation this item belongs to.
        invocation_id: String,
        /// The streamed value.
        item: Value,
    },

    /// The terminal message of an invocation.
    Completion {
        /// Id of the invocation being completed.
        invocation_id: String,
        /// The result value, for successful non-void invocations.
        result: Option<Value>,
        /// The failure description, for failed invocations.
        error: Option<String>,
    },
}

impl HubMessage {
    /// Create a blocking invocation with a correlation id.
    pub fn invocation(
        invocation_id: impl Into<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self::Invocation {
            invocation_id: Some(invocation_id.into()),
            target: target.into(),
            arguments,
            non_blocking: false,
        }
    }

    /// Create a fire-and-forget invocation.
    pub fn non_blocking_invocation(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Invocation {
            invocation_id: None,
            target: target.into(),
            arguments,
            non_blocking: true,
        }
    }

    /// Create a stream item.
    pub fn stream_item(invocation_id: impl Into<String>, item: Value) -> Self {
        Self::StreamItem {
            invocation_id: invocation_id.into(),
            item,
        }
    }

    /// Create a successful completion carrying a result.
    pub fn completion_result(invocation_id: impl Into<String>, result: Value) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create a successful completion without a result value.
    pub fn completion_void(invocation_id: impl Into<String>) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: None,
            error: None,
        }
    }

    /// Create a failed completion.
    pub fn completion_error(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// The wire discriminator for this message.
    pub fn kind(&self) -> u8 {
        match self {
            Self::Invocation { .. } => INVOCATION_KIND,
            Self::StreamItem { .. } => STREAM_ITEM_KIND,
            Self::Completion { .. } => COMPLETION_KIND,
        }
    }

    /// The invocation id this message correlates to, if any.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            Self::Invocation { invocation_id, .. } => invocation_id.as_deref(),
            Self::StreamItem { invocation_id, .. } | Self::Completion { invocation_id, .. } => {
                Some(invocation_id)
            }
        }
    }
}
