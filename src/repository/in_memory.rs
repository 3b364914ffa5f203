use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    Action, ExperimentId, Method, MethodChanges, MethodId, MethodRepository, RepositoryError,
    RepositoryResult,
};
use crate::MethodDraft;

/// Process-local method store.
///
/// All state sits behind one async mutex, so concurrent callers (several
/// consumers, tests, the HTTP layer) see each operation as atomic. Ids come
/// from a counter that only grows, so deleted ids are never handed out again.
#[derive(Debug, Default)]
pub struct InMemoryMethodRepository {
    state: Mutex<Store>,
}

#[derive(Debug, Default)]
struct Store {
    methods: Vec<Method>,
    last_id: MethodId,
}

impl Store {
    fn insert(&mut self, mut method: Method) -> Method {
        self.last_id += 1;
        method.id = self.last_id;
        self.methods.push(method.clone());
        method
    }

    fn missing(&self, ids: &[MethodId]) -> Vec<MethodId> {
        let mut missing: Vec<MethodId> = ids
            .iter()
            .copied()
            .filter(|id| !self.methods.iter().any(|m| m.id == *id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    fn members_mut<'a>(&'a mut self, ids: &'a [MethodId]) -> impl Iterator<Item = &'a mut Method> {
        self.methods.iter_mut().filter(|m| ids.contains(&m.id))
    }
}

impl InMemoryMethodRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_experiment(experiment_id: ExperimentId) -> RepositoryResult {
    if experiment_id < 1 {
        return Err(RepositoryError::InvalidExperiment(experiment_id));
    }
    Ok(())
}

#[async_trait]
impl MethodRepository for InMemoryMethodRepository {
    async fn create_method(&self, draft: MethodDraft) -> RepositoryResult<Method> {
        let method = Method::from_draft(draft);
        let errors = method.violations();
        if !errors.is_empty() {
            return Err(RepositoryError::Invalid(errors));
        }
        Ok(self.state.lock().await.insert(method))
    }

    async fn create_methods(&self, drafts: Vec<MethodDraft>) -> RepositoryResult<Vec<Method>> {
        let methods: Vec<Method> = drafts.into_iter().map(Method::from_draft).collect();

        let errors: Vec<String> = methods
            .iter()
            .enumerate()
            .flat_map(|(i, method)| {
                method
                    .violations()
                    .into_iter()
                    .map(move |e| format!("methods[{i}]: {e}"))
            })
            .collect();
        if !errors.is_empty() {
            return Err(RepositoryError::Invalid(errors));
        }

        let mut store = self.state.lock().await;
        Ok(methods.into_iter().map(|m| store.insert(m)).collect())
    }

    async fn delete_method(&self, id: MethodId) -> RepositoryResult {
        let mut store = self.state.lock().await;
        let before = store.methods.len();
        store.methods.retain(|m| m.id != id);
        if store.methods.len() == before {
            return Err(RepositoryError::MethodNotFound {
                id,
                action: Action::Delete,
            });
        }
        Ok(())
    }

    async fn delete_methods(&self, ids: &[MethodId]) -> RepositoryResult<Vec<MethodId>> {
        let mut store = self.state.lock().await;
        let mut removed = Vec::new();
        store.methods.retain(|m| {
            let hit = ids.contains(&m.id);
            if hit {
                removed.push(m.id);
            }
            !hit
        });
        if removed.is_empty() {
            return Err(RepositoryError::NoneExist);
        }
        Ok(removed)
    }

    async fn update_method(&self, id: MethodId, changes: MethodChanges) -> RepositoryResult<Method> {
        let errors = changes.violations();
        if !errors.is_empty() {
            return Err(RepositoryError::Invalid(errors));
        }

        let mut store = self.state.lock().await;
        let method = store
            .methods
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RepositoryError::MethodNotFound {
                id,
                action: Action::Update,
            })?;
        method.creator = changes.creator;
        method.name = changes.name;
        Ok(method.clone())
    }

    async fn add_methods_to_experiment(
        &self,
        experiment_id: ExperimentId,
        method_ids: &[MethodId],
    ) -> RepositoryResult {
        check_experiment(experiment_id)?;
        let mut store = self.state.lock().await;
        let missing = store.missing(method_ids);
        if !missing.is_empty() {
            return Err(RepositoryError::SomeMissing(missing));
        }
        store
            .members_mut(method_ids)
            .for_each(|m| m.add_experiment(experiment_id));
        Ok(())
    }

    async fn remove_methods_from_experiment(
        &self,
        experiment_id: ExperimentId,
        method_ids: &[MethodId],
    ) -> RepositoryResult {
        check_experiment(experiment_id)?;
        let mut store = self.state.lock().await;
        let missing = store.missing(method_ids);
        if !missing.is_empty() {
            return Err(RepositoryError::SomeMissing(missing));
        }
        store
            .members_mut(method_ids)
            .for_each(|m| m.remove_experiment(experiment_id));
        Ok(())
    }

    async fn get(&self, id: MethodId) -> Option<Method> {
        let store = self.state.lock().await;
        store.methods.iter().find(|m| m.id == id).cloned()
    }

    async fn list(&self) -> Vec<Method> {
        self.state.lock().await.methods.clone()
    }
}
