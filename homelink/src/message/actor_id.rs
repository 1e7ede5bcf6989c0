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

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::RelayError;
use crate::message::BROADCAST;

/// Identity of a registered actor (a house, the monitoring center, the simulator).
///
/// An id is never empty, never equal to the [`BROADCAST`] marker and never
/// contains control characters, so it always fits on a single wire record.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(Arc<str>);

impl ActorId {
    /// Validates and wraps an actor identity.
    pub fn new(id: impl AsRef<str>) -> Result<Self, RelayError> {
        let id = id.as_ref().trim();
        if id.is_empty() || id == BROADCAST || id.chars().any(char::is_control) {
            return Err(RelayError::InvalidActorId(id.to_string()));
        }
        Ok(Self(Arc::from(id)))
    }

    /// Borrows the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", &self.0)
    }
}

impl AsRef<str> for ActorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ActorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActorId {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ActorId {
    type Error = RelayError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ActorId> for String {
    fn from(id: ActorId) -> Self {
        id.0.to_string()
    }
}

impl PartialEq<str> for ActorId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ActorId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        let id = ActorId::new("house001").unwrap();
        assert_eq!(id.as_str(), "house001");
        assert_eq!(id, "house001");
        assert_eq!(ActorId::new("  monitoring_center ").unwrap(), "monitoring_center");
    }

    #[test]
    fn rejects_reserved_and_empty_ids() {
        assert!(matches!(ActorId::new(""), Err(RelayError::InvalidActorId(_))));
        assert!(matches!(ActorId::new("   "), Err(RelayError::InvalidActorId(_))));
        assert!(matches!(ActorId::new(BROADCAST), Err(RelayError::InvalidActorId(_))));
        assert!(matches!(ActorId::new("house\u{7}01"), Err(RelayError::InvalidActorId(_))));
    }

    #[test]
    fn looks_up_by_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(ActorId::new("house001").unwrap(), 1);
        assert_eq!(map.get("house001"), Some(&1));
    }
}
