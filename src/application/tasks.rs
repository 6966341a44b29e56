//! Task write path and aggregate computation.
//!
//! `TaskService` owns the mutation flow: commit through the write repo,
//! then synchronously publish the mutation to the aggregate invalidator.
//! Every mutation path for tasks must go through this service so that both
//! cache mechanisms (tag flushes for responses, direct deletes for
//! aggregates) stay in sync.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::cache::keys::AnalyticsKind;
use crate::cache::{
    AggregateInvalidator, AggregateSource, TaskMutation, TaskMutationKind, WarmError,
};
use crate::domain::tasks::{
    NewTaskRecord, StatusCounts, TaskPatch, TaskPriority, TaskQueryFilter, TaskRecord, TaskStatus,
};

use super::repos::{RepoError, TasksRepo, TasksWriteRepo};

const RECENT_TASKS_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task `{0}` not found")]
    NotFound(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct TaskService {
    repo: Arc<dyn TasksRepo>,
    write: Arc<dyn TasksWriteRepo>,
    invalidator: Arc<AggregateInvalidator>,
}

impl TaskService {
    pub fn new(
        repo: Arc<dyn TasksRepo>,
        write: Arc<dyn TasksWriteRepo>,
        invalidator: Arc<AggregateInvalidator>,
    ) -> Self {
        Self {
            repo,
            write,
            invalidator,
        }
    }

    pub async fn create_task(&self, record: NewTaskRecord) -> Result<TaskRecord, TaskError> {
        let created = self.write.insert_task(record).await?;
        debug!(task_id = created.id, user_id = created.user_id, "task created");

        self.invalidator
            .task_mutated(&TaskMutation {
                kind: TaskMutationKind::Created,
                task_id: created.id,
                owner_id: created.user_id,
                previous_owner_id: None,
            })
            .await;

        Ok(created)
    }

    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<TaskRecord, TaskError> {
        let existing = self
            .repo
            .find_task(id)
            .await?
            .ok_or(TaskError::NotFound(id))?;
        let previous_owner = existing.user_id;

        let updated = self.write.update_task(id, patch).await?;
        debug!(task_id = id, user_id = updated.user_id, "task updated");

        self.invalidator
            .task_mutated(&TaskMutation {
                kind: TaskMutationKind::Updated,
                task_id: id,
                owner_id: updated.user_id,
                previous_owner_id: (previous_owner != updated.user_id).then_some(previous_owner),
            })
            .await;

        Ok(updated)
    }

    pub async fn delete_task(&self, id: i64) -> Result<(), TaskError> {
        let deleted = self.write.delete_task(id).await?;
        debug!(task_id = id, user_id = deleted.user_id, "task deleted");

        self.invalidator
            .task_mutated(&TaskMutation {
                kind: TaskMutationKind::Deleted,
                task_id: id,
                owner_id: deleted.user_id,
                previous_owner_id: None,
            })
            .await;

        Ok(())
    }

    pub async fn list_tasks(
        &self,
        filter: &TaskQueryFilter,
    ) -> Result<Vec<TaskRecord>, TaskError> {
        Ok(self.repo.list_tasks(filter).await?)
    }

    pub async fn status_counts(&self, user_id: i64) -> Result<StatusCounts, TaskError> {
        Ok(self.repo.status_counts(user_id).await?)
    }
}

/// Computes warmable aggregates from the task repository.
pub struct TaskAggregateSource {
    repo: Arc<dyn TasksRepo>,
}

impl TaskAggregateSource {
    pub fn new(repo: Arc<dyn TasksRepo>) -> Self {
        Self { repo }
    }

    async fn user_tasks(&self, user_id: i64) -> Result<Vec<TaskRecord>, WarmError> {
        let filter = TaskQueryFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.repo
            .list_tasks(&filter)
            .await
            .map_err(|err| WarmError::Source(err.to_string()))
    }
}

#[async_trait]
impl AggregateSource for TaskAggregateSource {
    async fn status_counts(&self, user_id: i64) -> Result<StatusCounts, WarmError> {
        self.repo
            .status_counts(user_id)
            .await
            .map_err(|err| WarmError::Source(err.to_string()))
    }

    async fn recent_tasks(&self, user_id: i64) -> Result<Value, WarmError> {
        let mut tasks = self.user_tasks(user_id).await?;
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        tasks.truncate(RECENT_TASKS_LIMIT);

        Ok(Value::Array(
            tasks
                .iter()
                .map(|task| {
                    json!({
                        "id": task.id,
                        "title": task.title,
                        "status": task.status.as_str(),
                        "priority": task.priority.as_str(),
                        "due_at": task.due_at.map(OffsetDateTime::unix_timestamp),
                    })
                })
                .collect(),
        ))
    }

    async fn analytics(&self, user_id: i64, kind: AnalyticsKind) -> Result<Value, WarmError> {
        let tasks = self.user_tasks(user_id).await?;
        Ok(match kind {
            AnalyticsKind::Creation => creation_by_month(&tasks),
            AnalyticsKind::Completion => completion_summary(&tasks),
            AnalyticsKind::Priorities => counts_by_priority(&tasks),
            AnalyticsKind::Weekly => counts_by_weekday(&tasks),
            AnalyticsKind::TimeOfDay => counts_by_time_of_day(&tasks),
            AnalyticsKind::Overall => overall_summary(&tasks),
        })
    }

    async fn reference_data(&self) -> Result<Value, WarmError> {
        Ok(json!({
            "statuses": TaskStatus::ALL.map(|status| status.as_str()),
            "priorities": TaskPriority::ALL.map(|priority| priority.as_str()),
        }))
    }
}

fn creation_by_month(tasks: &[TaskRecord]) -> Value {
    let mut months: BTreeMap<String, u64> = BTreeMap::new();
    for task in tasks {
        let month = format!(
            "{:04}-{:02}",
            task.created_at.year(),
            u8::from(task.created_at.month())
        );
        *months.entry(month).or_default() += 1;
    }
    json!(months)
}

fn completion_summary(tasks: &[TaskRecord]) -> Value {
    let total = tasks.len() as u64;
    let completed = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .count() as u64;
    let rate = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64
    };
    json!({ "total": total, "completed": completed, "rate": rate })
}

fn counts_by_priority(tasks: &[TaskRecord]) -> Value {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for priority in TaskPriority::ALL {
        counts.insert(priority.as_str(), 0);
    }
    for task in tasks {
        *counts.entry(task.priority.as_str()).or_default() += 1;
    }
    json!(counts)
}

fn counts_by_weekday(tasks: &[TaskRecord]) -> Value {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for task in tasks {
        let weekday = task.created_at.weekday().to_string();
        *counts.entry(weekday).or_default() += 1;
    }
    json!(counts)
}

fn counts_by_time_of_day(tasks: &[TaskRecord]) -> Value {
    let mut morning = 0_u64;
    let mut afternoon = 0_u64;
    let mut evening = 0_u64;
    let mut night = 0_u64;
    for task in tasks {
        match task.created_at.hour() {
            5..=11 => morning += 1,
            12..=16 => afternoon += 1,
            17..=21 => evening += 1,
            _ => night += 1,
        }
    }
    json!({
        "morning": morning,
        "afternoon": afternoon,
        "evening": evening,
        "night": night,
    })
}

fn overall_summary(tasks: &[TaskRecord]) -> Value {
    let total = tasks.len() as u64;
    let completed = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .count() as u64;
    json!({
        "total": total,
        "completed": completed,
        "open": total - completed,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory task repository shared by unit and integration tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct MemoryTasksRepo {
        tasks: RwLock<HashMap<i64, TaskRecord>>,
        next_id: AtomicI64,
    }

    impl MemoryTasksRepo {
        pub fn new() -> Self {
            Self {
                tasks: RwLock::new(HashMap::new()),
                next_id: AtomicI64::new(1),
            }
        }
    }

    #[async_trait]
    impl TasksRepo for MemoryTasksRepo {
        async fn find_task(&self, id: i64) -> Result<Option<TaskRecord>, RepoError> {
            Ok(self.tasks.read().await.get(&id).cloned())
        }

        async fn list_tasks(
            &self,
            filter: &TaskQueryFilter,
        ) -> Result<Vec<TaskRecord>, RepoError> {
            let guard = self.tasks.read().await;
            let mut matches: Vec<TaskRecord> = guard
                .values()
                .filter(|task| filter.user_id.is_none_or(|user| task.user_id == user))
                .filter(|task| filter.status.is_none_or(|status| task.status == status))
                .filter(|task| {
                    filter
                        .priority
                        .is_none_or(|priority| task.priority == priority)
                })
                .filter(|task| {
                    filter
                        .search
                        .as_deref()
                        .is_none_or(|needle| task.title.contains(needle))
                })
                .cloned()
                .collect();
            matches.sort_by_key(|task| task.id);
            Ok(matches)
        }

        async fn status_counts(&self, user_id: i64) -> Result<StatusCounts, RepoError> {
            let guard = self.tasks.read().await;
            let mut counts = StatusCounts::default();
            for task in guard.values().filter(|task| task.user_id == user_id) {
                match task.status {
                    TaskStatus::Pending => counts.pending += 1,
                    TaskStatus::InProgress => counts.in_progress += 1,
                    TaskStatus::Completed => counts.completed += 1,
                }
            }
            Ok(counts)
        }
    }

    #[async_trait]
    impl TasksWriteRepo for MemoryTasksRepo {
        async fn insert_task(&self, record: NewTaskRecord) -> Result<TaskRecord, RepoError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let now = OffsetDateTime::now_utc();
            let task = TaskRecord {
                id,
                user_id: record.user_id,
                title: record.title,
                description: record.description,
                status: TaskStatus::Pending,
                priority: record.priority,
                due_at: record.due_at,
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            self.tasks.write().await.insert(id, task.clone());
            Ok(task)
        }

        async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<TaskRecord, RepoError> {
            let mut guard = self.tasks.write().await;
            let task = guard.get_mut(&id).ok_or(RepoError::NotFound(id))?;

            if let Some(user_id) = patch.user_id {
                task.user_id = user_id;
            }
            if let Some(title) = patch.title {
                task.title = title;
            }
            if let Some(description) = patch.description {
                task.description = Some(description);
            }
            if let Some(status) = patch.status {
                task.status = status;
                task.completed_at = (status == TaskStatus::Completed)
                    .then(OffsetDateTime::now_utc);
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(due_at) = patch.due_at {
                task.due_at = Some(due_at);
            }
            task.updated_at = OffsetDateTime::now_utc();

            Ok(task.clone())
        }

        async fn delete_task(&self, id: i64) -> Result<TaskRecord, RepoError> {
            self.tasks
                .write()
                .await
                .remove(&id)
                .ok_or(RepoError::NotFound(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use bytes::Bytes;

    use crate::cache::keys;
    use crate::cache::{CacheBackend, MemoryBackend};

    use super::testing::MemoryTasksRepo;
    use super::*;

    fn new_task(user_id: i64, title: &str) -> NewTaskRecord {
        NewTaskRecord {
            user_id,
            title: title.to_string(),
            description: None,
            priority: TaskPriority::Medium,
            due_at: None,
        }
    }

    fn service(
        repo: Arc<MemoryTasksRepo>,
        backend: Arc<MemoryBackend>,
    ) -> TaskService {
        TaskService::new(
            repo.clone(),
            repo,
            Arc::new(AggregateInvalidator::new(backend)),
        )
    }

    async fn seed_aggregates(backend: &MemoryBackend, user_id: i64) {
        let ttl = Duration::from_secs(600);
        let tags = BTreeSet::new();
        backend
            .put(&keys::status_counts_key(user_id), Bytes::from("{}"), ttl, &tags)
            .await
            .expect("put");
        for kind in AnalyticsKind::ALL {
            backend
                .put(&kind.key(user_id), Bytes::from("{}"), ttl, &tags)
                .await
                .expect("put");
        }
    }

    #[tokio::test]
    async fn create_invalidates_owner_aggregates() {
        let repo = Arc::new(MemoryTasksRepo::new());
        let backend = Arc::new(MemoryBackend::new());
        seed_aggregates(&backend, 5).await;

        let service = service(repo, backend.clone());
        let created = service.create_task(new_task(5, "write report")).await.expect("create");
        assert_eq!(created.user_id, 5);
        assert_eq!(created.status, TaskStatus::Pending);

        assert!(!backend.has(&keys::status_counts_key(5)).await.expect("has"));
    }

    #[tokio::test]
    async fn reassigning_update_invalidates_both_owners() {
        let repo = Arc::new(MemoryTasksRepo::new());
        let backend = Arc::new(MemoryBackend::new());

        let service = service(repo, backend.clone());
        let created = service.create_task(new_task(5, "hand over")).await.expect("create");

        seed_aggregates(&backend, 5).await;
        seed_aggregates(&backend, 9).await;

        let patch = TaskPatch {
            user_id: Some(9),
            ..Default::default()
        };
        let updated = service.update_task(created.id, patch).await.expect("update");
        assert_eq!(updated.user_id, 9);

        for user in [5_i64, 9] {
            assert!(
                !backend
                    .has(&keys::status_counts_key(user))
                    .await
                    .expect("has")
            );
            for kind in AnalyticsKind::ALL {
                assert!(!backend.has(&kind.key(user)).await.expect("has"));
            }
        }
    }

    #[tokio::test]
    async fn delete_invalidates_and_removes() {
        let repo = Arc::new(MemoryTasksRepo::new());
        let backend = Arc::new(MemoryBackend::new());

        let service = service(repo.clone(), backend.clone());
        let created = service.create_task(new_task(5, "drop me")).await.expect("create");
        seed_aggregates(&backend, 5).await;

        service.delete_task(created.id).await.expect("delete");

        assert!(repo.find_task(created.id).await.expect("find").is_none());
        assert!(!backend.has(&keys::status_counts_key(5)).await.expect("has"));
    }

    #[tokio::test]
    async fn update_of_missing_task_is_not_found() {
        let repo = Arc::new(MemoryTasksRepo::new());
        let backend = Arc::new(MemoryBackend::new());
        let service = service(repo, backend);

        let result = service.update_task(404, TaskPatch::default()).await;
        assert!(matches!(result, Err(TaskError::NotFound(404))));
    }

    #[tokio::test]
    async fn aggregate_source_computes_per_user_analytics() {
        let repo = Arc::new(MemoryTasksRepo::new());
        let backend = Arc::new(MemoryBackend::new());
        let service = service(repo.clone(), backend);

        let first = service.create_task(new_task(7, "one")).await.expect("create");
        service.create_task(new_task(7, "two")).await.expect("create");
        service.create_task(new_task(8, "other user")).await.expect("create");

        service
            .update_task(
                first.id,
                TaskPatch {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .expect("update");

        let source = TaskAggregateSource::new(repo);

        let counts = source.status_counts(7).await.expect("counts");
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 1);

        let completion = source
            .analytics(7, AnalyticsKind::Completion)
            .await
            .expect("analytics");
        assert_eq!(completion["total"], 2);
        assert_eq!(completion["completed"], 1);

        let overall = source
            .analytics(7, AnalyticsKind::Overall)
            .await
            .expect("analytics");
        assert_eq!(overall["open"], 1);

        let recent = source.recent_tasks(7).await.expect("recent");
        assert_eq!(recent.as_array().map(Vec::len), Some(2));

        let reference = source.reference_data().await.expect("reference");
        assert_eq!(
            reference["statuses"],
            serde_json::json!(["pending", "in_progress", "completed"])
        );
    }
}
