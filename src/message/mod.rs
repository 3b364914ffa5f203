//! Commands, events and the fields they share.
//!
//! Both [`Command`] and [`Event`] are closed enums. Each variant wraps a
//! payload struct whose JSON form is the envelope's `payload`, and each
//! variant's [`Label`] is the envelope's `messageType`. Decoding goes the other
//! way through an explicit tag table (`Command::decode`, `Event::decode`);
//! a tag missing from the table is not an error, it just isn't ours.

mod command;
mod event;
mod meta;

pub use command::{
    Command, CreateMethod, CreateMethods, DeleteMethod, DeleteMethods, ExperimentMembership,
    MethodDraft, UpdateMethod,
};
pub use event::{Event, Failure, MethodDetails, MethodDeleted, MethodsCreated, MethodsDeleted};
pub use meta::{Meta, SagaId};

use serde_json::Value;

use crate::Label;

/// Anything that can be sealed into an [`Envelope`](crate::Envelope) and
/// published.
pub trait Message: Label + Send + Sync + 'static {
    /// Requester identity and correlation id.
    fn meta(&self) -> &Meta;

    /// JSON form of the variant's payload, without the variant tag.
    fn payload(&self) -> serde_json::Result<Value>;
}
