//! Storage boundary for methods.
//!
//! Every operation returns a plain `Result`: validation and not-found
//! outcomes are values, and the handler turns them into `*Failed` events.

mod error;
mod in_memory;
mod method;

pub use error::{Action, RepositoryError};
pub use in_memory::InMemoryMethodRepository;
pub use method::{Method, MethodChanges};

use async_trait::async_trait;

use crate::MethodDraft;

pub type MethodId = u64;
pub type ExperimentId = u64;
pub type UserId = u64;

pub type RepositoryResult<T = ()> = std::result::Result<T, RepositoryError>;

/// Storage contract for methods.
///
/// Batch policies:
/// - `create_methods` is all-or-nothing: one invalid draft fails the batch.
/// - `delete_methods` is best-effort: it succeeds when at least one id
///   existed and ignores the rest.
/// - membership operations require every named method to exist and change
///   nothing otherwise.
#[async_trait]
pub trait MethodRepository: Send + Sync + 'static {
    async fn create_method(&self, draft: MethodDraft) -> RepositoryResult<Method>;

    async fn create_methods(&self, drafts: Vec<MethodDraft>) -> RepositoryResult<Vec<Method>>;

    async fn delete_method(&self, id: MethodId) -> RepositoryResult;

    /// Returns the ids that were actually removed.
    async fn delete_methods(&self, ids: &[MethodId]) -> RepositoryResult<Vec<MethodId>>;

    async fn update_method(&self, id: MethodId, changes: MethodChanges) -> RepositoryResult<Method>;

    async fn add_methods_to_experiment(
        &self,
        experiment_id: ExperimentId,
        method_ids: &[MethodId],
    ) -> RepositoryResult;

    async fn remove_methods_from_experiment(
        &self,
        experiment_id: ExperimentId,
        method_ids: &[MethodId],
    ) -> RepositoryResult;

    async fn get(&self, id: MethodId) -> Option<Method>;

    /// All stored methods, in creation order.
    async fn list(&self) -> Vec<Method>;
}
