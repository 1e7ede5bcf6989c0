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

//! Registration handshake records.
//!
//! ```text
//! actor  -> broker : REGISTER|<actorId>\n
//! broker -> actor  : REGISTERED|<actorId>\n
//! ```

use crate::common::RelayError;
use crate::message::ActorId;

/// Prefix of a registration request.
pub const REGISTER_PREFIX: &str = "REGISTER|";

/// Prefix of a registration acknowledgement.
pub const REGISTERED_PREFIX: &str = "REGISTERED|";

/// Builds and recognises handshake records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Handshake;

impl Handshake {
    /// Recognises a registration request.
    ///
    /// Returns `None` when the record is not a registration request at all, and
    /// `Some(Err(_))` when it is one but names an invalid identity.
    #[must_use]
    pub fn parse_request(record: &str) -> Option<Result<ActorId, RelayError>> {
        record
            .trim()
            .strip_prefix(REGISTER_PREFIX)
            .map(ActorId::new)
    }

    /// Recognises a registration acknowledgement and returns the acknowledged id.
    #[must_use]
    pub fn parse_ack(record: &str) -> Option<&str> {
        record.trim().strip_prefix(REGISTERED_PREFIX).map(str::trim)
    }

    /// Registration request record, delimiter included.
    #[must_use]
    pub fn request(actor_id: &ActorId) -> String {
        format!("{REGISTER_PREFIX}{actor_id}\n")
    }

    /// Acknowledgement record, delimiter included.
    #[must_use]
    pub fn ack(actor_id: &ActorId) -> String {
        format!("{REGISTERED_PREFIX}{actor_id}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requests() {
        let id = Handshake::parse_request("REGISTER|house001").unwrap().unwrap();
        assert_eq!(id, "house001");
        assert!(Handshake::parse_request("REGISTER|").unwrap().is_err());
        assert!(Handshake::parse_request("REGISTER|*").unwrap().is_err());
        assert!(Handshake::parse_request(r#"{"senderId":"a"}"#).is_none());
        assert!(Handshake::parse_request("REGISTERED|house001").is_none());
    }

    #[test]
    fn builds_records() {
        let id = ActorId::new("house001").unwrap();
        assert_eq!(Handshake::request(&id), "REGISTER|house001\n");
        assert_eq!(Handshake::ack(&id), "REGISTERED|house001\n");
        assert_eq!(Handshake::parse_ack(&Handshake::ack(&id)), Some("house001"));
        assert_eq!(Handshake::parse_ack("REGISTER|house001"), None);
    }
}
