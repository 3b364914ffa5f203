use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::UserId;

/// Correlation id pairing a command with the event it produces.
///
/// A saga id is never nil: constructing one generates a fresh v4 id, and a
/// missing or nil id on the wire is replaced by a fresh one when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing id, generating a fresh one if `id` is nil.
    pub fn from_uuid(id: Uuid) -> Self {
        if id.is_nil() { Self::new() } else { Self(id) }
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SagaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for SagaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = Option::<Uuid>::deserialize(deserializer)?;
        Ok(id.map(SagaId::from_uuid).unwrap_or_default())
    }
}

/// Fields shared by every command and event.
///
/// - `logged_in_user_id`: identity of the requester, resolved at the boundary.
/// - `saga_id`: correlation id, copied unchanged from a command to its event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub logged_in_user_id: UserId,
    #[serde(default)]
    pub saga_id: SagaId,
}

impl Meta {
    /// Metadata for a new request, with a freshly generated saga id.
    pub fn new(logged_in_user_id: UserId) -> Self {
        Self {
            logged_in_user_id,
            saga_id: SagaId::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_saga_id_is_never_nil() {
        assert!(!SagaId::new().as_uuid().is_nil());
        assert!(!SagaId::from_uuid(Uuid::nil()).as_uuid().is_nil());
    }

    #[test]
    fn test_missing_saga_id_is_generated() {
        let meta: Meta = serde_json::from_value(json!({ "loggedInUserId": 7 })).unwrap();
        assert_eq!(meta.logged_in_user_id, 7);
        assert!(!meta.saga_id.as_uuid().is_nil());
    }

    #[test]
    fn test_nil_and_null_saga_ids_are_replaced() {
        let nil: Meta = serde_json::from_value(json!({
            "loggedInUserId": 1,
            "sagaId": "00000000-0000-0000-0000-000000000000"
        }))
        .unwrap();
        assert!(!nil.saga_id.as_uuid().is_nil());

        let null: Meta =
            serde_json::from_value(json!({ "loggedInUserId": 1, "sagaId": null })).unwrap();
        assert!(!null.saga_id.as_uuid().is_nil());
    }

    #[test]
    fn test_saga_id_survives_round_trip() {
        let meta = Meta::new(42);
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["sagaId"], json!(meta.saga_id.to_string()));
        let back: Meta = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }
}
