//! Errors raised by the Compute Engine collaborator.

use thiserror::Error;

/// Errors raised while talking to the metadata server or the Compute Engine
/// API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GoogleComputeError {
    /// Raised when a metadata server lookup fails.
    #[error("metadata lookup {path} failed: {message}")]
    Metadata {
        /// Metadata path relative to the v1 root.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a Compute Engine request cannot be sent or read.
    #[error("{operation} request failed: {message}")]
    Transport {
        /// Operation being attempted (for example `create template`).
        operation: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the Compute Engine API rejects a request.
    #[error("{operation} returned HTTP {status}: {body}")]
    HttpStatus {
        /// Operation being attempted.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Response body, useful for quota and permission errors.
        body: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        /// Operation being attempted.
        operation: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when a long-running operation finishes with errors.
    #[error("{operation} failed: {message}")]
    Operation {
        /// Operation being attempted.
        operation: String,
        /// Errors reported by the operation.
        message: String,
    },
    /// Raised when the host network has no subnetwork in the host region.
    #[error("no subnetwork of network {network} found in region {region}")]
    NoSubnetwork {
        /// Network short name.
        network: String,
        /// Region searched.
        region: String,
    },
}
