/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Error taxonomy for the relay.
//!
//! Per-connection faults are contained by the worker that hit them; only
//! [`RelayError::ServiceFault`] is surfaced to the operator.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// A record could not be turned into an [`Envelope`](crate::message::Envelope).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The record is truncated or is not a structurally valid envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// An envelope field failed validation while decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid envelope field `{field}`: {reason}")]
pub struct InvalidEnvelope {
    /// Wire name of the offending field.
    pub field: &'static str,
    /// Why the value was rejected.
    pub reason: &'static str,
}

/// Errors produced by the broker, the in-process bus and the actor client.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed envelope record; the record is discarded and the connection continues.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An envelope was built with a blank sender or recipient.
    #[error(transparent)]
    InvalidEnvelope(#[from] InvalidEnvelope),

    /// An envelope could not be encoded.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// No live registration exists for the envelope's recipient.
    #[error("recipient `{0}` is not registered")]
    UnknownRecipient(String),

    /// I/O failure on a single connection.
    #[error("connection fault: {0}")]
    ConnectionFault(#[from] std::io::Error),

    /// The broker could not bind or listen on its endpoint.
    #[error("failed to listen on {address}: {source}")]
    ServiceFault {
        /// Endpoint the broker tried to bind.
        address: SocketAddr,
        /// Underlying bind or listen failure.
        #[source]
        source: std::io::Error,
    },

    /// The actor identity is empty, reserved or contains control characters.
    #[error("invalid actor id `{0}`")]
    InvalidActorId(String),

    /// A partial record grew past the configured limit without a delimiter.
    #[error("record of {size} bytes exceeds the {max} byte limit")]
    RecordTooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Configured maximum record size.
        max: usize,
    },

    /// The broker closed the connection or answered with something other than the expected acknowledgement.
    #[error("registration rejected: {0}")]
    HandshakeRejected(String),

    /// No acknowledgement arrived within the handshake timeout.
    #[error("registration was not acknowledged in time")]
    HandshakeTimeout,

    /// The handle was already disconnected.
    #[error("not connected")]
    NotConnected,

    /// Handlers can only be dispatched from inside a Tokio runtime.
    #[error("no Tokio runtime available to dispatch handlers")]
    NoRuntime,

    /// A configuration file could not be read or parsed.
    #[error("invalid configuration {path}: {reason}")]
    Config {
        /// File that failed to load.
        path: PathBuf,
        /// Read or parse failure.
        reason: String,
    },
}

impl RelayError {
    /// Returns `true` for faults that must be surfaced to the operator.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ServiceFault { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_service_faults_are_fatal() {
        let bind = RelayError::ServiceFault {
            address: "127.0.0.1:12000".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(bind.is_fatal());
        assert!(!RelayError::UnknownRecipient("house001".into()).is_fatal());
        assert!(!RelayError::NotConnected.is_fatal());
        assert!(!RelayError::ConnectionFault(std::io::ErrorKind::BrokenPipe.into()).is_fatal());
    }

    #[test]
    fn error_display() {
        let err = RelayError::UnknownRecipient("house042".to_string());
        assert_eq!(err.to_string(), "recipient `house042` is not registered");

        let err = RelayError::RecordTooLarge { size: 2048, max: 1024 };
        assert_eq!(err.to_string(), "record of 2048 bytes exceeds the 1024 byte limit");
    }
}
