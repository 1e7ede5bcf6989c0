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

//! The envelope: the addressed, typed unit routed by the broker.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{DecodeError, InvalidEnvelope, RelayError};
use crate::message::Route;

/// Recipient marker that selects every registered actor except the sender.
pub const BROADCAST: &str = "*";

/// Kind of domain message carried by an [`Envelope`].
///
/// Routing never looks at the kind. Kinds this build does not know about are kept
/// verbatim in [`MessageType::Unknown`] and forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Startup announcement.
    Hello,
    /// Shutdown announcement.
    GoodBye,
    /// Time synchronization.
    TimeSync,
    /// Threat environment published by the simulator.
    ThreatEnvironment,
    /// A threat detected by a house.
    Threat,
    /// Verification request for a reported threat.
    ThreatCheck,
    /// Acknowledgement that a threat report arrived.
    ThreatReceived,
    /// Periodic security status of a house.
    HouseSecurityStatus,
    /// Request for a house's security status.
    SecurityStatusRequest,
    /// Command sent from the monitoring center to a house.
    RemoteCommand,
    /// A kind this build does not recognise, preserved as received.
    Unknown(UnknownKind),
}

/// Wire name of a kind that is not one of the [`MessageType::KNOWN`] kinds.
///
/// Only [`MessageType::parse`] builds one, so a known name is never wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownKind(String);

impl UnknownKind {
    /// The name as received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl MessageType {
    /// Every kind this build knows by name.
    pub const KNOWN: [Self; 10] = [
        Self::Hello,
        Self::GoodBye,
        Self::TimeSync,
        Self::ThreatEnvironment,
        Self::Threat,
        Self::ThreatCheck,
        Self::ThreatReceived,
        Self::HouseSecurityStatus,
        Self::SecurityStatusRequest,
        Self::RemoteCommand,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hello => "HELLO",
            Self::GoodBye => "GOOD_BYE",
            Self::TimeSync => "TIME_SYNC",
            Self::ThreatEnvironment => "THREAT_ENVIRONMENT",
            Self::Threat => "THREAT",
            Self::ThreatCheck => "THREAT_CHECK",
            Self::ThreatReceived => "THREAT_RECEIVED",
            Self::HouseSecurityStatus => "HOUSE_SECURITY_STATUS",
            Self::SecurityStatusRequest => "SECURITY_STATUS_REQUEST",
            Self::RemoteCommand => "REMOTE_COMMAND",
            Self::Unknown(name) => name.as_str(),
        }
    }

    /// Resolves a wire name to its kind; names outside [`MessageType::KNOWN`]
    /// become [`MessageType::Unknown`].
    #[must_use]
    pub fn parse(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::KNOWN
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .unwrap_or(Self::Unknown(UnknownKind(name)))
    }

    /// Returns `true` for [`MessageType::Unknown`].
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Builds a broadcast envelope of this kind.
    pub fn envelope(
        self,
        sender_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Envelope, InvalidEnvelope> {
        Envelope::new(sender_id, self, message, BROADCAST)
    }

    /// Builds an envelope of this kind addressed to one actor.
    pub fn envelope_to(
        self,
        sender_id: impl Into<String>,
        message: impl Into<String>,
        recipient_id: impl Into<String>,
    ) -> Result<Envelope, InvalidEnvelope> {
        Envelope::new(sender_id, self, message, recipient_id)
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        Self::parse(name)
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Unknown(UnknownKind(name)) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An addressed, typed message.
///
/// Envelopes are immutable once built; routing reads the addressing fields and
/// never inspects or rewrites the payload.
///
/// # Wire Format
///
/// One JSON object per record, without embedded newlines:
///
/// ```json
/// {"senderId":"house001","recipientId":"monitoring_center","type":"THREAT","message":"{...}"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireEnvelope")]
pub struct Envelope {
    sender_id: String,
    recipient_id: String,
    #[serde(rename = "type")]
    kind: MessageType,
    message: String,
}

/// Unvalidated shape of an envelope record.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    sender_id: String,
    recipient_id: String,
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default)]
    message: String,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = InvalidEnvelope;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        Envelope::new(wire.sender_id, wire.kind, wire.message, wire.recipient_id)
    }
}

fn require_address(field: &'static str, value: &str) -> Result<(), InvalidEnvelope> {
    if value.trim().is_empty() {
        return Err(InvalidEnvelope {
            field,
            reason: "must not be empty",
        });
    }
    Ok(())
}

impl Envelope {
    /// Creates an envelope.
    ///
    /// # Errors
    ///
    /// [`InvalidEnvelope`] when the sender or recipient is blank, which is the
    /// same check [`Envelope::decode`] applies.
    pub fn new(
        sender_id: impl Into<String>,
        kind: MessageType,
        message: impl Into<String>,
        recipient_id: impl Into<String>,
    ) -> Result<Self, InvalidEnvelope> {
        let sender_id = sender_id.into();
        let recipient_id = recipient_id.into();
        require_address("senderId", &sender_id)?;
        require_address("recipientId", &recipient_id)?;
        Ok(Self {
            sender_id,
            recipient_id,
            kind,
            message: message.into(),
        })
    }

    /// Creates an envelope addressed to every actor except the sender.
    pub fn broadcast(
        sender_id: impl Into<String>,
        kind: MessageType,
        message: impl Into<String>,
    ) -> Result<Self, InvalidEnvelope> {
        Self::new(sender_id, kind, message, BROADCAST)
    }

    /// Identity of the originating actor.
    #[must_use]
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Identity of the addressee, or [`BROADCAST`].
    #[must_use]
    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    /// Kind of domain message.
    #[must_use]
    pub const fn kind(&self) -> &MessageType {
        &self.kind
    }

    /// Opaque payload.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` when the envelope is addressed to [`BROADCAST`].
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.recipient_id == BROADCAST
    }

    /// Addressing decision for this envelope.
    #[must_use]
    pub fn route(&self) -> Route<'_> {
        Route::of(self)
    }

    /// Encodes the envelope as one record body (no trailing delimiter).
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(RelayError::Encode)
    }

    /// Decodes a record body.
    ///
    /// Unknown message kinds are preserved; truncated or structurally invalid
    /// input, or empty sender/recipient fields, yield a [`DecodeError`].
    pub fn decode(record: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(record)?)
    }
}
