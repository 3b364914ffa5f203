use serde::{Deserialize, Serialize, Serializer, ser};
use serde_json::Value;

use super::{Message, Meta};
use crate::{Envelope, ExperimentId, Label, MethodId, Result};

/// Data needed to create one method.
///
/// A NaN or infinite `application_rate` has no JSON form, so a command
/// carrying one fails to seal and [`Producer::publish`](crate::Producer::publish)
/// drops it with an error log instead of putting it on the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDraft {
    pub creator: String,
    pub name: String,
    #[serde(serialize_with = "finite")]
    pub application_rate: f64,
}

fn finite<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(ser::Error::custom(format!(
            "applicationRate must be a finite number (was {value})"
        )));
    }
    serializer.serialize_f64(*value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMethod {
    #[serde(flatten)]
    pub method: MethodDraft,
    #[serde(flatten)]
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMethods {
    pub methods: Vec<MethodDraft>,
    #[serde(flatten)]
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMethod {
    pub id: MethodId,
    #[serde(flatten)]
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMethods {
    pub ids: Vec<MethodId>,
    #[serde(flatten)]
    pub meta: Meta,
}

/// Replaces the creator and name of an existing method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMethod {
    pub id: MethodId,
    pub creator: String,
    pub name: String,
    #[serde(flatten)]
    pub meta: Meta,
}

/// An experiment and the methods joining or leaving it.
///
/// Used by both membership commands and by their success events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentMembership {
    pub experiment_id: ExperimentId,
    pub method_ids: Vec<MethodId>,
    #[serde(flatten)]
    pub meta: Meta,
}

/// Intent to mutate method state.
#[derive(Debug, Clone, PartialEq, Label)]
pub enum Command {
    CreateMethod(CreateMethod),
    CreateMethods(CreateMethods),
    DeleteMethod(DeleteMethod),
    DeleteMethods(DeleteMethods),
    UpdateMethod(UpdateMethod),
    AddMethodsToExperiment(ExperimentMembership),
    RemoveMethodsFromExperiment(ExperimentMembership),
}

impl Command {
    /// Decode a command from an envelope.
    ///
    /// Returns `Ok(None)` when the tag does not name a command, e.g. for
    /// events travelling on the same topic. A known tag with a payload that
    /// doesn't match its shape is an error.
    pub fn decode(envelope: Envelope) -> Result<Option<Command>> {
        use serde_json::from_value;

        let Envelope {
            message_type,
            payload,
            ..
        } = envelope;

        let command = match message_type.as_str() {
            "CreateMethod" => Command::CreateMethod(from_value(payload)?),
            "CreateMethods" => Command::CreateMethods(from_value(payload)?),
            "DeleteMethod" => Command::DeleteMethod(from_value(payload)?),
            "DeleteMethods" => Command::DeleteMethods(from_value(payload)?),
            "UpdateMethod" => Command::UpdateMethod(from_value(payload)?),
            "AddMethodsToExperiment" => Command::AddMethodsToExperiment(from_value(payload)?),
            "RemoveMethodsFromExperiment" => {
                Command::RemoveMethodsFromExperiment(from_value(payload)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

impl Message for Command {
    fn meta(&self) -> &Meta {
        match self {
            Command::CreateMethod(c) => &c.meta,
            Command::CreateMethods(c) => &c.meta,
            Command::DeleteMethod(c) => &c.meta,
            Command::DeleteMethods(c) => &c.meta,
            Command::UpdateMethod(c) => &c.meta,
            Command::AddMethodsToExperiment(c) => &c.meta,
            Command::RemoveMethodsFromExperiment(c) => &c.meta,
        }
    }

    fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Command::CreateMethod(c) => serde_json::to_value(c),
            Command::CreateMethods(c) => serde_json::to_value(c),
            Command::DeleteMethod(c) => serde_json::to_value(c),
            Command::DeleteMethods(c) => serde_json::to_value(c),
            Command::UpdateMethod(c) => serde_json::to_value(c),
            Command::AddMethodsToExperiment(c) => serde_json::to_value(c),
            Command::RemoveMethodsFromExperiment(c) => serde_json::to_value(c),
        }
    }
}
