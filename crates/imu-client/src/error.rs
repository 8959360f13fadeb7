//! Error types for the IMU Client.

use thiserror::Error;

/// Errors raised by [`crate::ImuClient::connect`].
#[derive(Debug, Error)]
pub enum ImuClientError {
    /// The TCP connect attempt itself failed.
    #[error("failed to connect to IMU at {address}:{port}: {source}")]
    Connect {
        address: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
