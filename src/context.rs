use crate::error::Error;
use crate::executor::Coordinator;
use crate::params::ParamSource;
use crate::task::{Task, TaskFuture, TaskKind};
use parking_lot::Mutex;
use sqlx::{MySql, MySqlConnection, MySqlPool, Transaction};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{MappedMutexGuard, Mutex as AsyncMutex, MutexGuard};
use tracing::Span;
use uuid::Uuid;

/// Exclusive access to a context's live transaction.
///
/// Dereferences to the connection the transaction runs on. While a guard is
/// alive, no other task, commit or rollback can use the same context.
pub type TransactionGuard<'a> = MappedMutexGuard<'a, MySqlConnection>;

/// Lifecycle of a [`TransactionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initialized,
    /// Committed or rolled back. Terminal.
    Finalized,
}

/// One MySQL transaction shared by the tasks created from it.
///
/// The transaction is acquired by [`initialize`](Self::initialize) and ends with
/// [`commit`](Self::commit) or [`rollback`](Self::rollback). Both of those are
/// terminal and return the connection to the pool whatever their outcome.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use sqlx_mtxn_mysql::{SequentialCoordinator, TransactionContext};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
/// let coordinator = SequentialCoordinator::new();
/// let ctx = TransactionContext::new(pool, &coordinator);
///
/// ctx.initialize().await?;
/// {
///     let mut conn = ctx.transaction().await?;
///     sqlx::query("DELETE FROM users").execute(&mut *conn).await?;
/// }
/// ctx.commit().await?;
/// assert!(!ctx.is_initialized());
/// # Ok(())
/// # }
/// ```
pub struct TransactionContext {
    id: Uuid,
    pool: MySqlPool,
    coordinator: Weak<dyn Coordinator>,
    tx: AsyncMutex<Option<Transaction<'static, MySql>>>,
    state: Mutex<ContextState>,
    span: Span,
}

impl TransactionContext {
    /// Creates an uninitialized context that registers its tasks with `coordinator`.
    ///
    /// The context only keeps a weak reference to the coordinator. Tasks hold
    /// their context and queued tasks are held by the coordinator, so dropping
    /// the coordinator and the caller's handles releases the whole graph, and an
    /// open transaction is rolled back by SQLx when it is dropped.
    pub fn new<C>(pool: MySqlPool, coordinator: &Arc<C>) -> Arc<Self>
    where
        C: Coordinator + 'static,
    {
        let id = Uuid::new_v4();
        let span = tracing::debug_span!("mysql_context", context_id = %id);
        let coordinator: Weak<C> = Arc::downgrade(coordinator);
        Self::build(id, pool, coordinator, span)
    }

    /// Like [`new`](Self::new), but logs under the given span.
    pub fn with_span<C>(pool: MySqlPool, coordinator: &Arc<C>, span: Span) -> Arc<Self>
    where
        C: Coordinator + 'static,
    {
        let coordinator: Weak<C> = Arc::downgrade(coordinator);
        Self::build(Uuid::new_v4(), pool, coordinator, span)
    }

    fn build(id: Uuid, pool: MySqlPool, coordinator: Weak<dyn Coordinator>, span: Span) -> Arc<Self> {
        Arc::new(Self {
            id,
            pool,
            coordinator,
            tx: AsyncMutex::new(None),
            state: Mutex::new(ContextState::Uninitialized),
            span,
        })
    }

    /// Process-unique identifier, generated at construction.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Diagnostic name, stable for the lifetime of the context.
    pub fn name(&self) -> String {
        format!("MySQL DB Context: {}", self.id)
    }

    /// The pool the transaction is acquired from.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Span every event of this context and its tasks is recorded under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Current lifecycle state.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx::MySqlPool;
    /// use sqlx_mtxn_mysql::{ContextState, SequentialCoordinator, TransactionContext};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
    /// let coordinator = SequentialCoordinator::new();
    /// let ctx = TransactionContext::new(pool, &coordinator);
    /// assert_eq!(ctx.state(), ContextState::Uninitialized);
    ///
    /// ctx.initialize().await?;
    /// ctx.rollback().await?;
    /// assert_eq!(ctx.state(), ContextState::Finalized);
    /// # Ok(())
    /// # }
    /// ```
    pub fn state(&self) -> ContextState {
        *self.state.lock()
    }

    /// True iff a live transaction is held.
    pub fn is_initialized(&self) -> bool {
        self.state() == ContextState::Initialized
    }

    /// Acquires a connection from the pool and begins the transaction.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInitialized`] if a transaction is already held; the
    ///   existing one is left untouched.
    /// - [`Error::Finalized`] after `commit` or `rollback`.
    /// - [`Error::Acquisition`] if the pool cannot supply a connection.
    pub async fn initialize(&self) -> crate::Result<&Self> {
        let mut slot = self.tx.lock().await;
        match self.state() {
            ContextState::Initialized => {
                return Err(Error::AlreadyInitialized { context: self.name() })
            }
            ContextState::Finalized => return Err(Error::Finalized { context: self.name() }),
            ContextState::Uninitialized => {}
        }

        let tx = self.pool.begin().await.map_err(Error::Acquisition)?;
        *slot = Some(tx);
        *self.state.lock() = ContextState::Initialized;
        tracing::debug!(parent: &self.span, context = %self.name(), "initialized");
        Ok(self)
    }

    /// Commits the transaction and releases the connection.
    ///
    /// The context is finalized even when the commit fails; there is no retry.
    /// A failed commit may still have been applied by the server.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if no transaction is held.
    /// - [`Error::Database`] carrying the driver's commit error.
    pub async fn commit(&self) -> crate::Result<&Self> {
        let mut slot = self.tx.lock().await;
        let tx = slot.take().ok_or_else(|| self.not_initialized())?;
        *self.state.lock() = ContextState::Finalized;

        let outcome = tx.commit().await;
        match outcome {
            Ok(()) => {
                tracing::debug!(parent: &self.span, context = %self.name(), "committed");
                Ok(self)
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, context = %self.name(), error = %e, "commit failed");
                Err(Error::Database(e))
            }
        }
    }

    /// Rolls the transaction back and releases the connection.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if no transaction is held.
    /// - [`Error::Database`] carrying the driver's rollback error.
    pub async fn rollback(&self) -> crate::Result<&Self> {
        let mut slot = self.tx.lock().await;
        let tx = slot.take().ok_or_else(|| self.not_initialized())?;
        *self.state.lock() = ContextState::Finalized;

        let outcome = tx.rollback().await;
        match outcome {
            Ok(()) => {
                tracing::debug!(parent: &self.span, context = %self.name(), "rolled back");
                Ok(self)
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, context = %self.name(), error = %e, "rollback failed");
                Err(Error::Database(e))
            }
        }
    }

    /// Locks the live transaction and returns its connection.
    ///
    /// Every task reads the transaction through this at execution time, so it
    /// always sees the current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if no transaction is held.
    pub async fn transaction(&self) -> crate::Result<TransactionGuard<'_>> {
        let slot = self.tx.lock().await;
        MutexGuard::try_map(slot, |tx| tx.as_mut().map(|tx| &mut **tx))
            .map_err(|_| self.not_initialized())
    }

    /// Creates a SQL task without parameters and registers it with the coordinator.
    ///
    /// If the coordinator has already been dropped the task is returned
    /// unregistered.
    pub fn add_task(self: &Arc<Self>, sql: impl Into<String>) -> Task {
        self.register(TaskKind::Sql { template: sql.into() }, None)
    }

    /// Creates a SQL task with named parameters and registers it with the coordinator.
    ///
    /// `params` may be a [`Params`](crate::Params) or a [`ParamSource::Lazy`]
    /// evaluated when the task runs.
    pub fn add_task_with_params(
        self: &Arc<Self>,
        sql: impl Into<String>,
        params: impl Into<ParamSource>,
    ) -> Task {
        self.register(TaskKind::Sql { template: sql.into() }, Some(params.into()))
    }

    /// Creates a function task and registers it with the coordinator.
    ///
    /// The function receives the connection of the live transaction and the
    /// task itself. It must use that connection rather than calling
    /// [`transaction`](Self::transaction), which is already locked while it runs.
    pub fn add_function_task<F>(self: &Arc<Self>, f: F) -> Task
    where
        F: for<'a> Fn(&'a mut MySqlConnection, &'a Task) -> TaskFuture<'a> + Send + Sync + 'static,
    {
        self.register(TaskKind::Function(Box::new(f)), None)
    }

    fn register(self: &Arc<Self>, kind: TaskKind, params: Option<ParamSource>) -> Task {
        let task = Task::new(self.clone(), kind, params);
        match self.coordinator.upgrade() {
            Some(coordinator) => coordinator.add_task(task.clone()),
            None => tracing::warn!(parent: &self.span, context = %self.name(), "coordinator dropped, task not registered"),
        }
        task
    }

    fn not_initialized(&self) -> Error {
        Error::NotInitialized { context: self.name() }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SequentialCoordinator;
    use crate::task::no_output;
    use crate::Params;
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;

    fn unreachable_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(300))
            .connect_lazy("mysql://root@127.0.0.1:1/mtxn")
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_context_is_uninitialized() {
        let ctx = TransactionContext::new(unreachable_pool(), &SequentialCoordinator::new());
        assert!(!ctx.is_initialized());
        assert_eq!(ctx.state(), ContextState::Uninitialized);
        assert!(ctx.name().ends_with(&ctx.id().to_string()));
    }

    #[tokio::test]
    async fn test_context_ids_are_unique() {
        let coordinator = SequentialCoordinator::new();
        let a = TransactionContext::new(unreachable_pool(), &coordinator);
        let b = TransactionContext::new(unreachable_pool(), &coordinator);
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let ctx = TransactionContext::new(unreachable_pool(), &SequentialCoordinator::new());

        assert!(matches!(ctx.commit().await, Err(Error::NotInitialized { .. })));
        assert!(matches!(ctx.rollback().await, Err(Error::NotInitialized { .. })));
        assert!(matches!(ctx.transaction().await, Err(Error::NotInitialized { .. })));
        assert_eq!(ctx.state(), ContextState::Uninitialized);
    }

    #[tokio::test]
    async fn test_initialize_reports_acquisition_failure() {
        let ctx = TransactionContext::new(unreachable_pool(), &SequentialCoordinator::new());

        let err = ctx.initialize().await.unwrap_err();
        assert!(matches!(err, Error::Acquisition(_)));
        assert!(!ctx.is_initialized());
    }

    #[tokio::test]
    async fn test_tasks_register_with_coordinator() {
        let coordinator = SequentialCoordinator::new();
        let ctx = TransactionContext::new(unreachable_pool(), &coordinator);

        let sql = ctx.add_task_with_params("SELECT :id", Params::new().bind("id", 1));
        let func = ctx.add_function_task(|_conn, _task| Box::pin(async { no_output() }));

        assert_eq!(coordinator.len(), 2);
        assert!(sql.result().is_none());
        assert!(func.result().is_none());
        assert!(Arc::ptr_eq(sql.context(), &ctx));
    }

    #[tokio::test]
    async fn test_dropping_handles_frees_context_with_queued_tasks() {
        let coordinator = SequentialCoordinator::new();
        let ctx = TransactionContext::new(unreachable_pool(), &coordinator);
        let task = ctx.add_task("SELECT 1");
        ctx.add_function_task(|_conn, _task| Box::pin(async { no_output() }));
        let weak_ctx = Arc::downgrade(&ctx);

        drop(task);
        drop(ctx);
        assert!(weak_ctx.upgrade().is_some(), "queued tasks keep the context alive");

        drop(coordinator);
        assert!(weak_ctx.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_task_without_coordinator_is_unregistered() {
        let coordinator = SequentialCoordinator::new();
        let ctx = TransactionContext::new(unreachable_pool(), &coordinator);
        drop(coordinator);

        let task = ctx.add_task("SELECT 1");
        assert_eq!(task.sql(), Some("SELECT 1"));
        assert_eq!(Arc::strong_count(&ctx), 2);
    }
}
