use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    Command, CommandHandler, Event, ExperimentMembership, Failure, Label, Message, MethodChanges,
    MethodDeleted, MethodDetails, MethodRepository, MethodsCreated, MethodsDeleted, Producer,
    RepositoryError,
};

/// Applies commands to a [`MethodRepository`] and publishes the outcome.
///
/// Each command makes exactly one repository call and publishes exactly one
/// event, which carries the command's `loggedInUserId` and `sagaId`.
pub struct MethodCommandHandler {
    repository: Arc<dyn MethodRepository>,
    producer: Producer,
    topic: Arc<str>,
}

impl MethodCommandHandler {
    pub fn new(
        repository: Arc<dyn MethodRepository>,
        producer: Producer,
        topic: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            repository,
            producer,
            topic: topic.into(),
        }
    }

    /// Run `command` against the repository and build its event.
    pub async fn apply(&self, command: Command) -> Event {
        match command {
            Command::CreateMethod(c) => match self.repository.create_method(c.method).await {
                Ok(method) => Event::MethodCreated(MethodDetails::new(&method, c.meta)),
                Err(e) => Event::MethodCreationFailed(Failure::new(&e, c.meta)),
            },
            Command::CreateMethods(c) => match self.repository.create_methods(c.methods).await {
                Ok(methods) => Event::MethodsCreated(MethodsCreated {
                    methods: methods
                        .iter()
                        .map(|m| MethodDetails::new(m, c.meta.clone()))
                        .collect(),
                    meta: c.meta,
                }),
                Err(e) => Event::MethodsCreationFailed(Failure::new(&e, c.meta)),
            },
            Command::DeleteMethod(c) => match self.repository.delete_method(c.id).await {
                Ok(()) => Event::MethodDeleted(MethodDeleted {
                    id: c.id,
                    meta: c.meta,
                }),
                Err(e) => Event::MethodDeletionFailed(Failure::new(&e, c.meta)),
            },
            Command::DeleteMethods(c) => match self.repository.delete_methods(&c.ids).await {
                Ok(ids) => Event::MethodsDeleted(MethodsDeleted { ids, meta: c.meta }),
                Err(e) => Event::MethodsDeletionFailed(Failure::new(&e, c.meta)),
            },
            Command::UpdateMethod(c) => {
                let changes = MethodChanges {
                    creator: c.creator,
                    name: c.name,
                };
                match self.repository.update_method(c.id, changes).await {
                    Ok(method) => Event::MethodUpdated(MethodDetails::new(&method, c.meta)),
                    Err(e) => Event::MethodUpdateFailed(Failure::new(&e, c.meta)),
                }
            }
            Command::AddMethodsToExperiment(c) => {
                let result = self
                    .repository
                    .add_methods_to_experiment(c.experiment_id, &c.method_ids)
                    .await;
                membership_outcome(
                    c,
                    result,
                    Event::ExperimentAddedToMethods,
                    Event::ExperimentAdditionToMethodsFailed,
                )
            }
            Command::RemoveMethodsFromExperiment(c) => {
                let result = self
                    .repository
                    .remove_methods_from_experiment(c.experiment_id, &c.method_ids)
                    .await;
                membership_outcome(
                    c,
                    result,
                    Event::ExperimentRemovedFromMethods,
                    Event::ExperimentRemovalFromMethodsFailed,
                )
            }
        }
    }
}

fn membership_outcome(
    membership: ExperimentMembership,
    result: Result<(), RepositoryError>,
    success: fn(ExperimentMembership) -> Event,
    failure: fn(Failure) -> Event,
) -> Event {
    match result {
        Ok(()) => success(membership),
        Err(e) => failure(Failure::new(&e, membership.meta)),
    }
}

impl CommandHandler for MethodCommandHandler {
    async fn handle(&self, command: Command) {
        let command_type = command.label();
        let event = self.apply(command).await;

        match event.failure_reason() {
            Some(reason) => info!(
                %command_type,
                event_type = %event.label(),
                saga_id = %event.meta().saga_id,
                reason,
                "Command rejected"
            ),
            None => debug!(
                %command_type,
                event_type = %event.label(),
                saga_id = %event.meta().saga_id,
                "Command applied"
            ),
        }

        self.producer.publish(&event, &self.topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CreateMethod, CreateMethods, DeleteMethod, DeleteMethods, Envelope, InMemoryBroker,
        InMemoryMethodRepository, Meta, MethodDraft, RetryPolicy, UpdateMethod,
    };

    fn draft(creator: &str, name: &str, rate: f64) -> MethodDraft {
        MethodDraft {
            creator: creator.into(),
            name: name.into(),
            application_rate: rate,
        }
    }

    struct Fixture {
        broker: InMemoryBroker,
        repository: Arc<InMemoryMethodRepository>,
        producer: Producer,
        handler: MethodCommandHandler,
    }

    fn fixture() -> Fixture {
        let broker = InMemoryBroker::new();
        let repository = Arc::new(InMemoryMethodRepository::new());
        let producer = Producer::new(Arc::new(broker.clone()), RetryPolicy::default());
        let handler = MethodCommandHandler::new(repository.clone(), producer.clone(), "methods");
        Fixture {
            broker,
            repository,
            producer,
            handler,
        }
    }

    fn create(meta: &Meta, creator: &str, name: &str, rate: f64) -> Command {
        Command::CreateMethod(CreateMethod {
            method: draft(creator, name, rate),
            meta: meta.clone(),
        })
    }

    #[tokio::test]
    async fn test_create_method() {
        let f = fixture();
        let meta = Meta::new(7);

        let Event::MethodCreated(created) = f.handler.apply(create(&meta, "alice", "drip", 0.5)).await
        else {
            panic!("expected MethodCreated");
        };
        assert_eq!(created.creator, "alice");
        assert_eq!(created.name, "drip");
        assert_eq!(created.application_rate, 0.5);
        assert_eq!(created.meta, meta);
        assert!(f.repository.get(created.id).await.is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_rate_fails_creation() {
        let f = fixture();
        let meta = Meta::new(7);

        let event = f.handler.apply(create(&meta, "alice", "drip", 1.5)).await;
        let Event::MethodCreationFailed(failure) = &event else {
            panic!("expected MethodCreationFailed, got {event:?}");
        };
        assert!(failure.reason.contains("Application Rate"));
        assert!(failure.reason.contains("less than or equal to '1'"));
        assert_eq!(failure.meta, meta);
        assert!(f.repository.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_methods_keeps_nothing_on_one_bad_item() {
        let f = fixture();
        let meta = Meta::new(1);

        let failed = f
            .handler
            .apply(Command::CreateMethods(CreateMethods {
                methods: vec![draft("alice", "drip", 0.5), draft("bo", "spray", 0.5)],
                meta: meta.clone(),
            }))
            .await;
        assert_eq!(failed.label(), "MethodsCreationFailed");
        assert!(f.repository.list().await.is_empty());

        let Event::MethodsCreated(created) = f
            .handler
            .apply(Command::CreateMethods(CreateMethods {
                methods: vec![draft("alice", "drip", 0.5), draft("bob", "spray", 0.5)],
                meta: meta.clone(),
            }))
            .await
        else {
            panic!("expected MethodsCreated");
        };
        assert_eq!(created.methods.len(), 2);
        assert!(created.methods.iter().all(|m| m.meta == meta));
        assert_eq!(created.meta, meta);
    }

    #[tokio::test]
    async fn test_delete_method() {
        let f = fixture();
        let meta = Meta::new(2);
        let method = f
            .repository
            .create_method(draft("alice", "drip", 0.5))
            .await
            .unwrap();

        let missing = f
            .handler
            .apply(Command::DeleteMethod(DeleteMethod {
                id: 999,
                meta: meta.clone(),
            }))
            .await;
        assert_eq!(missing.label(), "MethodDeletionFailed");
        assert_eq!(missing.meta(), &meta);

        let deleted = f
            .handler
            .apply(Command::DeleteMethod(DeleteMethod {
                id: method.id,
                meta: meta.clone(),
            }))
            .await;
        assert_eq!(
            deleted,
            Event::MethodDeleted(MethodDeleted {
                id: method.id,
                meta
            })
        );
        assert!(f.repository.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_methods_reports_removed_ids() {
        let f = fixture();
        let meta = Meta::new(2);
        let method = f
            .repository
            .create_method(draft("alice", "drip", 0.5))
            .await
            .unwrap();

        let event = f
            .handler
            .apply(Command::DeleteMethods(DeleteMethods {
                ids: vec![method.id, 500],
                meta: meta.clone(),
            }))
            .await;
        assert_eq!(
            event,
            Event::MethodsDeleted(MethodsDeleted {
                ids: vec![method.id],
                meta: meta.clone()
            })
        );

        let none = f
            .handler
            .apply(Command::DeleteMethods(DeleteMethods {
                ids: vec![500],
                meta,
            }))
            .await;
        assert_eq!(none.label(), "MethodsDeletionFailed");
    }

    #[tokio::test]
    async fn test_update_method() {
        let f = fixture();
        let meta = Meta::new(3);
        let method = f
            .repository
            .create_method(draft("alice", "drip", 0.5))
            .await
            .unwrap();

        let Event::MethodUpdated(updated) = f
            .handler
            .apply(Command::UpdateMethod(UpdateMethod {
                id: method.id,
                creator: "bob".into(),
                name: "spray".into(),
                meta: meta.clone(),
            }))
            .await
        else {
            panic!("expected MethodUpdated");
        };
        assert_eq!(updated.id, method.id);
        assert_eq!(updated.creator, "bob");
        assert_eq!(updated.application_rate, 0.5);

        let missing = f
            .handler
            .apply(Command::UpdateMethod(UpdateMethod {
                id: 404,
                creator: "bob".into(),
                name: "spray".into(),
                meta,
            }))
            .await;
        assert_eq!(
            missing.failure_reason(),
            Some("The method you are trying to update does not exist: 404")
        );
    }

    #[tokio::test]
    async fn test_membership_commands() {
        let f = fixture();
        let meta = Meta::new(4);
        let a = f
            .repository
            .create_method(draft("alice", "drip", 0.5))
            .await
            .unwrap();

        let membership = |ids: Vec<u64>| ExperimentMembership {
            experiment_id: 8,
            method_ids: ids,
            meta: meta.clone(),
        };

        let failed = f
            .handler
            .apply(Command::AddMethodsToExperiment(membership(vec![a.id, 99])))
            .await;
        assert_eq!(failed.label(), "ExperimentAdditionToMethodsFailed");
        assert!(f.repository.get(a.id).await.unwrap().experiment_ids.is_empty());

        let added = f
            .handler
            .apply(Command::AddMethodsToExperiment(membership(vec![a.id])))
            .await;
        assert_eq!(
            added,
            Event::ExperimentAddedToMethods(membership(vec![a.id]))
        );
        assert_eq!(f.repository.get(a.id).await.unwrap().experiment_ids, vec![8]);

        let removed = f
            .handler
            .apply(Command::RemoveMethodsFromExperiment(membership(vec![a.id])))
            .await;
        assert_eq!(
            removed,
            Event::ExperimentRemovedFromMethods(membership(vec![a.id]))
        );

        let failed = f
            .handler
            .apply(Command::RemoveMethodsFromExperiment(membership(vec![99])))
            .await;
        assert_eq!(failed.label(), "ExperimentRemovalFromMethodsFailed");
    }

    #[tokio::test]
    async fn test_handle_publishes_exactly_one_event() {
        let f = fixture();
        let meta = Meta::new(5);

        f.handler.handle(create(&meta, "alice", "drip", 0.5)).await;
        f.producer.flush().await;

        let records = f.broker.records("methods").await;
        assert_eq!(records.len(), 1);
        let event = Event::decode(Envelope::from_bytes(&records[0]).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(event.label(), "MethodCreated");
        assert_eq!(event.meta(), &meta);
    }
}
