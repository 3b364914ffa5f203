//! Methods - command/event microservice
//!
//! An HTTP front end turns requests into commands and publishes them on a
//! shared topic. A consumer running in the same process decodes those
//! commands, applies them to a [`MethodRepository`] and publishes one success
//! or failure event per command back onto the same topic.
//!
//! ```text
//! HTTP ─▶ Producer ─▶ Broker ─▶ Consumer ─▶ MethodCommandHandler ─▶ Repository
//!                       ▲                          │
//!                       └──────── Producer ◀───────┘ (event)
//! ```
//!
//! See `src/main.rs` for the wiring used by the binary.

mod broker;
mod config;
mod consumer;
mod envelope;
mod error;
mod handler;
mod label;
mod message;
mod producer;
mod repository;
mod service;

pub mod http;

pub use broker::{Broker, Delivery, InMemoryBroker, Subscription};
pub use config::Config;
pub use consumer::{CommandHandler, Consumer, ConsumerStats};
pub use envelope::Envelope;
pub use error::Error;
pub use handler::MethodCommandHandler;
pub use label::Label;
pub use message::{
    Command, CreateMethod, CreateMethods, DeleteMethod, DeleteMethods, Event,
    ExperimentMembership, Failure, Message, Meta, MethodDeleted, MethodDetails, MethodDraft,
    MethodsCreated, MethodsDeleted, SagaId, UpdateMethod,
};
pub use producer::{Producer, RetryPolicy};
pub use repository::{
    ExperimentId, InMemoryMethodRepository, Method, MethodChanges, MethodId, MethodRepository,
    RepositoryError, UserId,
};
pub use service::Service;

pub use methods_macros::Label;

// Lets `#[derive(Label)]` expand to `::methods::Label` inside this crate too.
extern crate self as methods;

pub type Result<T = ()> = std::result::Result<T, Error>;
