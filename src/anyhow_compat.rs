use crate::context::TransactionContext;
use crate::error::BoxError;
use crate::executor::SequentialCoordinator;
use crate::statement::QueryOutput;
use crate::task::Task;
use sqlx::MySqlConnection;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a function task written against `anyhow`.
pub type AnyhowTaskFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<QueryOutput>> + Send + 'a>>;

impl TransactionContext {
    /// Creates a function task whose body returns `anyhow::Result`.
    ///
    /// The error is kept as the source of [`Error::FunctionTask`](crate::Error::FunctionTask).
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx::MySqlPool;
    /// use sqlx_mtxn_mysql::{QueryOutput, SequentialCoordinator, TransactionContext};
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// # let pool = MySqlPool::connect("mysql://localhost/test").await?;
    /// let coordinator = SequentialCoordinator::new();
    /// let ctx = TransactionContext::new(pool, &coordinator);
    ///
    /// ctx.add_function_task_anyhow(|conn, _task| {
    ///     Box::pin(async move {
    ///         let done = sqlx::query("INSERT INTO users (name) VALUES (?)")
    ///             .bind("Alice")
    ///             .execute(&mut *conn)
    ///             .await?;
    ///         Ok::<_, anyhow::Error>(QueryOutput::from_done(done))
    ///     })
    /// });
    ///
    /// coordinator.exec_anyhow().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_function_task_anyhow<F>(self: &Arc<Self>, f: F) -> Task
    where
        F: for<'a> Fn(&'a mut MySqlConnection, &'a Task) -> AnyhowTaskFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.add_function_task(move |conn, task| {
            let fut = f(conn, task);
            Box::pin(async move { fut.await.map_err(BoxError::from) })
        })
    }
}

impl SequentialCoordinator {
    /// [`exec`](Self::exec) with the error converted to `anyhow::Error`.
    pub async fn exec_anyhow(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self.exec().await?)
    }
}
