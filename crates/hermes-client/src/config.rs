//! Client connection configuration.

use http::Uri;

use hermes_pipe::PipeOptions;
use hermes_transport::TransferFormats;

/// Configuration for a [`ClientConnection`](crate::ClientConnection).
#[derive(Debug, Clone)]
pub struct ClientConnectionConfig {
    /// The endpoint handed to the transport on every start.
    pub url: Uri,
    /// The transfer format requested of the transport.
    pub transfer_format: TransferFormats,
    /// Whether to re-establish the connection after a non-user-initiated
    /// termination.
    pub allow_reconnect: bool,
    /// Options for the application-to-transport pipe.
    pub transport_pipe: PipeOptions,
    /// Options for the transport-to-application pipe.
    pub application_pipe: PipeOptions,
}

impl Default for ClientConnectionConfig {
    fn default() -> Self {
        Self {
            url: Uri::from_static("http://localhost"),
            transfer_format: TransferFormats::TEXT,
            allow_reconnect: false,
            transport_pipe: PipeOptions::default(),
            application_pipe: PipeOptions::default(),
        }
    }
}

impl ClientConnectionConfig {
    /// Create a configuration for the given endpoint.
    pub fn new(url: Uri) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    /// Set the requested transfer format.
    pub fn transfer_format(mut self, format: TransferFormats) -> Self {
        self.transfer_format = format;
        self
    }

    /// Enable or disable automatic reconnect.
    pub fn allow_reconnect(mut self, allow: bool) -> Self {
        self.allow_reconnect = allow;
        self
    }

    /// Set options for the application-to-transport pipe.
    pub fn transport_pipe(mut self, options: PipeOptions) -> Self {
        self.transport_pipe = options;
        self
    }

    /// Set options for the transport-to-application pipe.
    pub fn application_pipe(mut self, options: PipeOptions) -> Self {
        self.application_pipe = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConnectionConfig::default();
        assert_eq!(config.transfer_format, TransferFormats::TEXT);
        assert!(!config.allow_reconnect);
    }

    #[test]
    fn test_builder() {
        let config = ClientConnectionConfig::new(Uri::from_static("ws://host/echo"))
            .transfer_format(TransferFormats::BINARY)
            .allow_reconnect(true)
            .transport_pipe(PipeOptions::new().capacity(8))
            .application_pipe(PipeOptions::new().capacity(16));

        assert_eq!(config.url, Uri::from_static("ws://host/echo"));
        assert_eq!(config.transfer_format, TransferFormats::BINARY);
        assert!(config.allow_reconnect);
        assert_eq!(config.transport_pipe.capacity, 8);
        assert_eq!(config.application_pipe.capacity, 16);
    }
}
