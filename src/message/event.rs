use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExperimentMembership, Message, Meta};
use crate::{Envelope, Label, Method, MethodId, RepositoryError, Result};

/// Snapshot of a method, carried by `MethodCreated`, `MethodsCreated` and
/// `MethodUpdated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDetails {
    pub id: MethodId,
    pub creator: String,
    pub name: String,
    pub application_rate: f64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: Meta,
}

impl MethodDetails {
    pub fn new(method: &Method, meta: Meta) -> Self {
        Self {
            id: method.id,
            creator: method.creator.clone(),
            name: method.name.clone(),
            application_rate: method.application_rate,
            created_at: method.created_at,
            meta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodsCreated {
    pub methods: Vec<MethodDetails>,
    #[serde(flatten)]
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDeleted {
    pub id: MethodId,
    #[serde(flatten)]
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodsDeleted {
    pub ids: Vec<MethodId>,
    #[serde(flatten)]
    pub meta: Meta,
}

/// Payload of every `*Failed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub reason: String,
    #[serde(flatten)]
    pub meta: Meta,
}

impl Failure {
    pub fn new(error: &RepositoryError, meta: Meta) -> Self {
        Self {
            reason: error.to_string(),
            meta,
        }
    }
}

/// Outcome of a handled [`Command`](crate::Command).
///
/// Every command variant maps to exactly one success variant and one
/// `*Failed` variant.
#[derive(Debug, Clone, PartialEq, Label)]
pub enum Event {
    MethodCreated(MethodDetails),
    MethodCreationFailed(Failure),
    MethodsCreated(MethodsCreated),
    MethodsCreationFailed(Failure),
    MethodDeleted(MethodDeleted),
    MethodDeletionFailed(Failure),
    MethodsDeleted(MethodsDeleted),
    MethodsDeletionFailed(Failure),
    MethodUpdated(MethodDetails),
    MethodUpdateFailed(Failure),
    ExperimentAddedToMethods(ExperimentMembership),
    ExperimentAdditionToMethodsFailed(Failure),
    ExperimentRemovedFromMethods(ExperimentMembership),
    ExperimentRemovalFromMethodsFailed(Failure),
}

impl Event {
    /// Decode an event from an envelope. Commands and unknown tags yield `Ok(None)`.
    pub fn decode(envelope: Envelope) -> Result<Option<Event>> {
        use serde_json::from_value;

        let Envelope {
            message_type,
            payload,
            ..
        } = envelope;

        let event = match message_type.as_str() {
            "MethodCreated" => Event::MethodCreated(from_value(payload)?),
            "MethodCreationFailed" => Event::MethodCreationFailed(from_value(payload)?),
            "MethodsCreated" => Event::MethodsCreated(from_value(payload)?),
            "MethodsCreationFailed" => Event::MethodsCreationFailed(from_value(payload)?),
            "MethodDeleted" => Event::MethodDeleted(from_value(payload)?),
            "MethodDeletionFailed" => Event::MethodDeletionFailed(from_value(payload)?),
            "MethodsDeleted" => Event::MethodsDeleted(from_value(payload)?),
            "MethodsDeletionFailed" => Event::MethodsDeletionFailed(from_value(payload)?),
            "MethodUpdated" => Event::MethodUpdated(from_value(payload)?),
            "MethodUpdateFailed" => Event::MethodUpdateFailed(from_value(payload)?),
            "ExperimentAddedToMethods" => Event::ExperimentAddedToMethods(from_value(payload)?),
            "ExperimentAdditionToMethodsFailed" => {
                Event::ExperimentAdditionToMethodsFailed(from_value(payload)?)
            }
            "ExperimentRemovedFromMethods" => {
                Event::ExperimentRemovedFromMethods(from_value(payload)?)
            }
            "ExperimentRemovalFromMethodsFailed" => {
                Event::ExperimentRemovalFromMethodsFailed(from_value(payload)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Failure reason, if this is a `*Failed` event.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Event::MethodCreationFailed(f)
            | Event::MethodsCreationFailed(f)
            | Event::MethodDeletionFailed(f)
            | Event::MethodsDeletionFailed(f)
            | Event::MethodUpdateFailed(f)
            | Event::ExperimentAdditionToMethodsFailed(f)
            | Event::ExperimentRemovalFromMethodsFailed(f) => Some(&f.reason),
            _ => None,
        }
    }
}

impl Message for Event {
    fn meta(&self) -> &Meta {
        match self {
            Event::MethodCreated(e) | Event::MethodUpdated(e) => &e.meta,
            Event::MethodsCreated(e) => &e.meta,
            Event::MethodDeleted(e) => &e.meta,
            Event::MethodsDeleted(e) => &e.meta,
            Event::ExperimentAddedToMethods(e) | Event::ExperimentRemovedFromMethods(e) => &e.meta,
            Event::MethodCreationFailed(f)
            | Event::MethodsCreationFailed(f)
            | Event::MethodDeletionFailed(f)
            | Event::MethodsDeletionFailed(f)
            | Event::MethodUpdateFailed(f)
            | Event::ExperimentAdditionToMethodsFailed(f)
            | Event::ExperimentRemovalFromMethodsFailed(f) => &f.meta,
        }
    }

    fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Event::MethodCreated(e) | Event::MethodUpdated(e) => serde_json::to_value(e),
            Event::MethodsCreated(e) => serde_json::to_value(e),
            Event::MethodDeleted(e) => serde_json::to_value(e),
            Event::MethodsDeleted(e) => serde_json::to_value(e),
            Event::ExperimentAddedToMethods(e) | Event::ExperimentRemovedFromMethods(e) => {
                serde_json::to_value(e)
            }
            Event::MethodCreationFailed(f)
            | Event::MethodsCreationFailed(f)
            | Event::MethodDeletionFailed(f)
            | Event::MethodsDeletionFailed(f)
            | Event::MethodUpdateFailed(f)
            | Event::ExperimentAdditionToMethodsFailed(f)
            | Event::ExperimentRemovalFromMethodsFailed(f) => serde_json::to_value(f),
        }
    }
}
