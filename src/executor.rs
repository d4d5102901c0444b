use crate::context::TransactionContext;
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives tasks as contexts create them.
///
/// This is the only call a [`TransactionContext`] makes into its coordinator.
/// The coordinator is then responsible for initializing every context before
/// its first task runs, running each task exactly once and in order, and
/// finishing every context with `commit` or `rollback`.
pub trait Coordinator: Send + Sync {
    /// Queues `task` to run after every task registered before it.
    fn add_task(&self, task: Task);
}

/// Runs registered tasks one after another across any number of contexts.
///
/// All participating contexts are committed if every task succeeds and rolled
/// back as soon as one fails.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_mtxn_mysql::{Params, SequentialCoordinator, TransactionContext};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let coordinator = SequentialCoordinator::new();
/// let ctx = TransactionContext::new(pool, &coordinator);
///
/// ctx.add_task("DELETE FROM users");
/// ctx.add_task_with_params(
///     "INSERT INTO users (id, name) VALUES (:id, :name)",
///     Params::new().bind("id", 1).bind("name", "Alice"),
/// );
///
/// // Both statements commit together, or neither does
/// coordinator.exec().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SequentialCoordinator {
    tasks: Mutex<Vec<Task>>,
}

impl SequentialCoordinator {
    /// Creates an empty coordinator, shared so contexts can register with it.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// True when no task is waiting to run.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlx_mtxn_mysql::SequentialCoordinator;
    ///
    /// assert!(SequentialCoordinator::new().is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Executes all registered tasks in registration order.
    ///
    /// The queue is drained first, so tasks registered while this runs wait for
    /// the next call. Returns the executed tasks on success.
    ///
    /// # Errors
    ///
    /// Returns the first task, initialization or commit error. Every
    /// participating context that was not yet committed is rolled back first.
    pub async fn exec(&self) -> crate::Result<Vec<Task>> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut participants: Vec<Arc<TransactionContext>> = Vec::new();

        for task in &tasks {
            if let Err(e) = run_task(task, &mut participants).await {
                rollback_all(&participants).await;
                return Err(e);
            }
        }

        for (i, ctx) in participants.iter().enumerate() {
            if let Err(e) = ctx.commit().await {
                rollback_all(&participants[i + 1..]).await;
                return Err(e);
            }
        }

        Ok(tasks)
    }
}

impl Coordinator for SequentialCoordinator {
    fn add_task(&self, task: Task) {
        self.tasks.lock().push(task);
    }
}

async fn run_task(task: &Task, participants: &mut Vec<Arc<TransactionContext>>) -> crate::Result<()> {
    let ctx = task.context();
    if !participants.iter().any(|p| Arc::ptr_eq(p, ctx)) {
        // contexts the caller already initialized are adopted as-is
        if !ctx.is_initialized() {
            ctx.initialize().await?;
        }
        participants.push(ctx.clone());
    }

    let mut conn = ctx.transaction().await?;
    task.exec(&mut conn).await?;
    Ok(())
}

async fn rollback_all(contexts: &[Arc<TransactionContext>]) {
    for ctx in contexts {
        if let Err(e) = ctx.rollback().await {
            tracing::warn!(parent: ctx.span(), context = %ctx.name(), error = %e, "rollback after failure did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextState;
    use crate::Error;
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_exec_succeeds() {
        let coordinator = SequentialCoordinator::new();
        assert!(coordinator.is_empty());
        assert!(coordinator.exec().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acquisition_failure_aborts_sequence() {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(300))
            .connect_lazy("mysql://root@127.0.0.1:1/mtxn")
            .unwrap();
        let coordinator = SequentialCoordinator::new();
        let ctx = TransactionContext::new(pool, &coordinator);
        let first = ctx.add_task("DELETE FROM t");
        ctx.add_task("SELECT 1");

        let err = coordinator.exec().await.unwrap_err();
        assert!(matches!(err, Error::Acquisition(_)));
        assert!(coordinator.is_empty());
        assert!(first.result().is_none());
        assert_eq!(ctx.state(), ContextState::Uninitialized);
    }
}
