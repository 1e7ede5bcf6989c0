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

//! Addressing policy shared by the broker's router and the in-process bus.

use std::collections::HashMap;

use crate::message::{ActorId, Envelope};

/// Where an envelope should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Every registered actor except `sender`.
    Broadcast {
        /// Identity excluded from the fan-out.
        sender: &'a str,
    },
    /// Exactly one named actor.
    Unicast {
        /// The addressee.
        recipient: &'a str,
    },
}

impl<'a> Route<'a> {
    /// Classifies an envelope by its recipient.
    #[must_use]
    pub fn of(envelope: &'a Envelope) -> Self {
        if envelope.is_broadcast() {
            Self::Broadcast {
                sender: envelope.sender_id(),
            }
        } else {
            Self::Unicast {
                recipient: envelope.recipient_id(),
            }
        }
    }

    /// Picks the matching entries out of a registration map.
    ///
    /// Returns `None` when a unicast recipient has no entry; a broadcast with no
    /// other registered actor yields an empty selection.
    pub fn select<'m, V>(&self, registrations: &'m HashMap<ActorId, V>) -> Option<Vec<(&'m ActorId, &'m V)>> {
        match *self {
            Self::Broadcast { sender } => Some(
                registrations
                    .iter()
                    .filter(|(actor_id, _)| actor_id.as_str() != sender)
                    .collect(),
            ),
            Self::Unicast { recipient } => registrations
                .get_key_value(recipient)
                .map(|entry| vec![entry]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn table() -> HashMap<ActorId, u8> {
        ["house001", "house002", "monitoring_center"]
            .into_iter()
            .enumerate()
            .map(|(i, id)| (ActorId::new(id).unwrap(), i as u8))
            .collect()
    }

    #[test]
    fn broadcast_skips_the_sender() {
        let table = table();
        let envelope = MessageType::ThreatEnvironment.envelope("house001", "storm").unwrap();
        let mut picked: Vec<_> = envelope
            .route()
            .select(&table)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        picked.sort();
        assert_eq!(picked, vec!["house002", "monitoring_center"]);
    }

    #[test]
    fn broadcast_from_unregistered_sender_reaches_everyone() {
        let table = table();
        let envelope = MessageType::TimeSync.envelope("simulator", "12:00").unwrap();
        assert_eq!(envelope.route().select(&table).unwrap().len(), 3);
    }

    #[test]
    fn unicast_picks_one_or_none() {
        let table = table();
        let known = MessageType::Threat.envelope_to("house001", "", "monitoring_center").unwrap();
        let picked = known.route().select(&table).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].0, "monitoring_center");

        let unknown = MessageType::Threat.envelope_to("house001", "", "house999").unwrap();
        assert!(unknown.route().select(&table).is_none());
    }
}
