use crate::context::TransactionContext;
use crate::error::{BoxError, Error};
use crate::params::{ParamSource, Params};
use crate::statement::{BoundStatement, QueryOutput};
use parking_lot::Mutex;
use sqlx::MySqlConnection;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a function task.
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<QueryOutput, BoxError>> + Send + 'a>>;

/// Body of a function task. Called with the live transaction's connection and
/// the task being executed.
pub type TaskFn =
    Box<dyn for<'a> Fn(&'a mut MySqlConnection, &'a Task) -> TaskFuture<'a> + Send + Sync>;

/// What a task runs.
pub(crate) enum TaskKind {
    Sql { template: String },
    Function(TaskFn),
}

/// Execution progress of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Executing,
    Completed,
    Failed,
}

struct Inner {
    context: Arc<TransactionContext>,
    kind: TaskKind,
    params: Mutex<Option<ParamSource>>,
    state: Mutex<TaskState>,
    result: Mutex<Option<Arc<QueryOutput>>>,
}

/// One unit of work bound to a [`TransactionContext`].
///
/// Handles are cheap to clone; the coordinator and the caller share the same
/// task, so the caller can read [`result`](Self::result) after the coordinator
/// has run it.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

impl Task {
    pub(crate) fn new(
        context: Arc<TransactionContext>,
        kind: TaskKind,
        params: Option<ParamSource>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                kind,
                params: Mutex::new(params),
                state: Mutex::new(TaskState::Pending),
                result: Mutex::new(None),
            }),
        }
    }

    /// The context this task was created from.
    pub fn context(&self) -> &Arc<TransactionContext> {
        &self.inner.context
    }

    /// The SQL template, or `None` for a function task.
    pub fn sql(&self) -> Option<&str> {
        match &self.inner.kind {
            TaskKind::Sql { template } => Some(template),
            TaskKind::Function(_) => None,
        }
    }

    /// True for a task created by `add_function_task`.
    pub fn is_function(&self) -> bool {
        matches!(self.inner.kind, TaskKind::Function(_))
    }

    /// Execution progress. A task that failed stays [`TaskState::Failed`].
    pub fn state(&self) -> TaskState {
        *self.inner.state.lock()
    }

    /// Replaces the parameters. Takes effect at the next execution.
    pub fn set_params(&self, params: impl Into<ParamSource>) {
        *self.inner.params.lock() = Some(params.into());
    }

    /// Replaces the parameters with a closure evaluated at execution time.
    pub fn set_lazy_params<F>(&self, f: F)
    where
        F: Fn() -> Params + Send + Sync + 'static,
    {
        self.set_params(ParamSource::lazy(f));
    }

    /// Resolves the current parameters, evaluating a lazy source now.
    /// No parameters resolve to an empty set.
    pub fn params(&self) -> Params {
        // clone the source so a lazy closure never runs under the lock
        let source = self.inner.params.lock().clone();
        source.map(|s| s.resolve()).unwrap_or_default()
    }

    /// The captured result, or `None` until `exec` has succeeded.
    pub fn result(&self) -> Option<Arc<QueryOutput>> {
        self.inner.result.lock().clone()
    }

    /// Runs the task on `conn`, the connection of its context's live transaction.
    ///
    /// Meant to be called once, by the coordinator.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExecuted`] if the task was executed before.
    /// - [`Error::MissingParameter`] if a placeholder has no value.
    /// - [`Error::Statement`] with the driver's error in SQL mode.
    /// - [`Error::FunctionTask`] with the function's error in function mode.
    pub async fn exec(&self, conn: &mut MySqlConnection) -> crate::Result<&Self> {
        {
            let mut state = self.inner.state.lock();
            if *state != TaskState::Pending {
                return Err(Error::AlreadyExecuted);
            }
            *state = TaskState::Executing;
        }

        let outcome = match &self.inner.kind {
            TaskKind::Sql { template } => self.run_sql(template, conn).await,
            TaskKind::Function(f) => f(conn, self).await.map_err(Error::FunctionTask),
        };

        match outcome {
            Ok(output) => {
                *self.inner.result.lock() = Some(Arc::new(output));
                *self.inner.state.lock() = TaskState::Completed;
                Ok(self)
            }
            Err(e) => {
                *self.inner.state.lock() = TaskState::Failed;
                tracing::debug!(parent: self.context().span(), error = %e, "task failed");
                Err(e)
            }
        }
    }

    async fn run_sql(&self, template: &str, conn: &mut MySqlConnection) -> crate::Result<QueryOutput> {
        let statement = BoundStatement::new(template, &self.params())?;
        tracing::debug!(
            parent: self.context().span(),
            sql = statement.sql(),
            params = statement.values().len(),
            "executing task"
        );
        statement.run(conn).await
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Task");
        match &self.inner.kind {
            TaskKind::Sql { template } => d.field("sql", template),
            TaskKind::Function(_) => d.field("function", &".."),
        };
        d.field("state", &self.state()).finish()
    }
}

/// Result for function tasks with nothing to report.
pub fn no_output() -> Result<QueryOutput, BoxError> {
    Ok(QueryOutput::empty())
}
