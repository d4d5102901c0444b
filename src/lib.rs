//! # sqlx-mtxn-mysql
//!
//! MySQL participant for multi-step transaction coordinators, built on SQLx.
//!
//! A [`TransactionContext`] owns one database transaction. Tasks created from
//! it, either parameterized SQL statements or custom async functions, all run
//! on that transaction and are registered with a [`Coordinator`] that decides
//! when to run them and whether the context commits or rolls back.
//!
//! ## Features
//!
//! - **Named Parameters**: `:name` placeholders translated to MySQL's positional `?`
//! - **Lazy Parameters**: parameter sets computed when the task runs, not when it is created
//! - **Function Tasks**: arbitrary async code on the shared transaction
//! - **Leak-Free Finalization**: `commit` and `rollback` always return the connection to the pool
//! - **Sequential Coordinator**: a ready-made coordinator spanning any number of contexts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_mtxn_mysql::{Params, SequentialCoordinator, TransactionContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let coordinator = SequentialCoordinator::new();
//! let ctx = TransactionContext::new(pool, &coordinator);
//!
//! ctx.add_task("DELETE FROM test_table");
//! let insert = ctx.add_task_with_params(
//!     "INSERT INTO test_table(id, name) VALUES (:id, :name)",
//!     Params::new().bind("id", 1).bind("name", "Dave"),
//! );
//!
//! coordinator.exec().await?;
//! assert_eq!(insert.result().map(|r| r.rows_affected()), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ### Function Tasks
//!
//! A function task receives the live transaction's connection and the task
//! itself:
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_mtxn_mysql::{BoxError, QueryOutput, SequentialCoordinator, TransactionContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let coordinator = SequentialCoordinator::new();
//! let ctx = TransactionContext::new(pool, &coordinator);
//!
//! ctx.add_function_task(|conn, _task| {
//!     Box::pin(async move {
//!         let done = sqlx::query("INSERT INTO test_table(id, name) VALUES (1, 'Stuart')")
//!             .execute(&mut *conn)
//!             .await?;
//!         Ok::<_, BoxError>(QueryOutput::from_done(done))
//!     })
//! });
//! let select = ctx.add_task("SELECT * FROM test_table");
//!
//! coordinator.exec().await?;
//! // The select ran on the same transaction and sees the insert
//! assert!(!select.result().unwrap().rows().is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ### Lazy Parameters
//!
//! ```rust,no_run
//! use sqlx::MySqlPool;
//! use sqlx_mtxn_mysql::{Params, SequentialCoordinator, TransactionContext};
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let pool = MySqlPool::connect("mysql://localhost/test").await?;
//! let coordinator = SequentialCoordinator::new();
//! let ctx = TransactionContext::new(pool, &coordinator);
//!
//! let next_id = Arc::new(AtomicI64::new(0));
//! let id = next_id.clone();
//! let insert = ctx.add_task("INSERT INTO test_table(id, name) VALUES (:id, 'Kevin')");
//! insert.set_lazy_params(move || Params::new().bind("id", id.load(Ordering::SeqCst)));
//!
//! // Read when the task runs, so this value is the one inserted
//! next_id.store(7, Ordering::SeqCst);
//! coordinator.exec().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **TransactionContext**: holds the SQLx `Transaction` between `initialize` and `commit`/`rollback`
//! 2. **Task**: either a SQL template or a function, run once by the coordinator
//! 3. **Explicit Connection Passing**: the coordinator locks the context's transaction and hands
//!    the connection to [`Task::exec`]
//! 4. **Finalization**: a context that was committed or rolled back cannot be used again
//!
//! ## Limitations
//!
//! - MySQL only
//! - Tasks of one context run one at a time; there is no cancellation and no timeout at this layer
//! - A failed commit still finalizes the context; whether the server applied it must be checked
//!   out of band
//!
//! ## Logging
//!
//! Events are emitted with `tracing` under each context's span. The library never installs a
//! subscriber.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod params;
pub mod statement;
pub mod task;

#[cfg(feature = "anyhow")]
pub mod anyhow_compat;

pub use config::PoolConfig;
pub use context::{ContextState, TransactionContext, TransactionGuard};
pub use error::{BoxError, Error, Result};
pub use executor::{Coordinator, SequentialCoordinator};
pub use params::{ParamSource, Params, Value};
pub use statement::{BoundStatement, QueryOutput};
pub use task::{no_output, Task, TaskFn, TaskFuture, TaskState};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::context::TransactionContext;
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::executor::{Coordinator, SequentialCoordinator};
    pub use crate::params::{ParamSource, Params};
    pub use crate::statement::QueryOutput;
    pub use crate::task::Task;
}
