use sqlx::Row;
use sqlx_mtxn_mysql::{
    BoundStatement, BoxError, Params, PoolConfig, SequentialCoordinator, TransactionContext,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let pool = PoolConfig::from_env()?.connect().await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS test_table (id INT PRIMARY KEY, name VARCHAR(64))")
        .execute(&pool)
        .await?;

    println!("=== Multi-Task Transaction Example ===\n");

    // Example 1: Two statements committed together
    println!("1. Replacing table contents...");
    let coordinator = SequentialCoordinator::new();
    let ctx = TransactionContext::new(pool.clone(), &coordinator);
    ctx.add_task("DELETE FROM test_table");
    ctx.add_task_with_params(
        "INSERT INTO test_table(id, name) VALUES (:id, :name)",
        Params::new().bind("id", 1).bind("name", "Dave"),
    );
    coordinator.exec().await?;
    println!("   ✓ Committed\n");

    // Example 2: A duplicate key rolls everything back
    println!("2. Testing rollback on error...");
    let coordinator = SequentialCoordinator::new();
    let ctx = TransactionContext::new(pool.clone(), &coordinator);
    ctx.add_task("DELETE FROM test_table");
    ctx.add_task_with_params(
        "INSERT INTO test_table(id, name) VALUES (:id, :name)",
        Params::new().bind("id", 1).bind("name", "Kevin"),
    );
    ctx.add_task_with_params(
        "INSERT INTO test_table(id, name) VALUES (:id, :name)",
        Params::new().bind("id", 1).bind("name", "Kevin"),
    );
    match coordinator.exec().await {
        Ok(_) => println!("   ✗ Should have failed!"),
        Err(e) => println!("   ✓ Rolled back: {}\n", e),
    }

    // Example 3: Function task and SQL task on one transaction
    println!("3. Function task...");
    let coordinator = SequentialCoordinator::new();
    let ctx = TransactionContext::new(pool.clone(), &coordinator);
    ctx.add_task("DELETE FROM test_table");
    ctx.add_function_task(|conn, _task| {
        Box::pin(async move {
            let insert = BoundStatement::new(
                "INSERT INTO test_table(id, name) VALUES (:id, :name)",
                &Params::new().bind("id", 1).bind("name", "Stuart"),
            )?;
            Ok::<_, BoxError>(insert.run(conn).await?)
        })
    });
    let select = ctx.add_task("SELECT * FROM test_table");
    coordinator.exec().await?;

    if let Some(result) = select.result() {
        for row in result.rows() {
            let id: i32 = row.try_get("id")?;
            let name: String = row.try_get("name")?;
            println!("   Row: ({}, {})", id, name);
        }
    }

    println!("\n=== All examples completed successfully ===");

    pool.close().await;
    Ok(())
}
