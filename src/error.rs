//! Error types for the gateway client.

use std::io;

/// Errors that can occur while opening, operating, or tearing down a
/// [`crate::Gateway`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to connect to the remote container.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Failed to open or configure the serial device.
    #[error("failed to open serial device {path}: {source}")]
    SerialOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The requested baud rate is not one of the rates the container
    /// protocol supports.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    /// A termios call failed while configuring the serial line.
    #[error("failed to configure serial line: {0}")]
    Termios(#[source] nix::Error),

    /// An I/O error occurred on the underlying transport during a
    /// session-machine operation.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// Setting up the self-pipe interrupt primitive failed.
    #[error("failed to create interrupt pipe: {0}")]
    Interrupt(#[source] nix::Error),

    /// `subscribe` was called with a topic that would overflow the
    /// subscription set's size budget.
    #[error("subscription capacity exceeded (max {max} bytes)")]
    SubscriptionCapacity { max: usize },
}
