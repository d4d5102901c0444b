use crate::error::Error;
use crate::params::{Params, Value};
use sqlx::mysql::{MySqlArguments, MySqlColumn, MySqlConnection, MySqlQueryResult, MySqlRow};
use sqlx::{Arguments, Executor, Row, Statement};

/// A template rewritten to positional `?` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    /// Statement text in the driver's positional dialect
    pub sql: String,
    /// Placeholder names in occurrence order, repeats included
    pub names: Vec<String>,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrites `:name` placeholders to `?`.
///
/// Quoted sections (`'...'`, `"..."`, `` `...` ``) and `::` are copied as-is.
///
/// ```
/// use sqlx_mtxn_mysql::statement::translate;
///
/// let t = translate("SELECT * FROM t WHERE id = :id OR parent = :id");
/// assert_eq!(t.sql, "SELECT * FROM t WHERE id = ? OR parent = ?");
/// assert_eq!(t.names, vec!["id", "id"]);
/// ```
pub fn translate(template: &str) -> Translated {
    let mut sql = String::with_capacity(template.len());
    let mut names = Vec::new();
    let mut chars = template.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            sql.push(c);
            if c == '\\' && q != '`' {
                if let Some(escaped) = chars.next() {
                    sql.push(escaped);
                }
            } else if c == q {
                // doubled quote stays inside the literal
                if chars.peek() == Some(&q) {
                    sql.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                sql.push(c);
            }
            ':' if chars.peek() == Some(&':') => {
                sql.push_str("::");
                chars.next();
            }
            ':' if chars.peek().copied().is_some_and(is_ident_char) => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                sql.push('?');
                names.push(name);
            }
            _ => sql.push(c),
        }
    }

    Translated { sql, names }
}

/// A translated statement with its values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    values: Vec<Value>,
}

impl BoundStatement {
    /// Translates `template` and looks up each placeholder in `params`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] if a placeholder has no value.
    pub fn new(template: &str, params: &Params) -> crate::Result<Self> {
        let Translated { sql, names } = translate(template);
        let values = names
            .into_iter()
            .map(|name| match params.get(&name) {
                Some(value) => Ok(value.clone()),
                None => Err(Error::MissingParameter(name)),
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self { sql, values })
    }

    /// Statement text with positional `?` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound values, one per placeholder occurrence.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn arguments(&self) -> Result<MySqlArguments, sqlx::Error> {
        let mut args = MySqlArguments::default();
        for value in &self.values {
            let added = match value.clone() {
                Value::Null => args.add(None::<String>),
                Value::Bool(v) => args.add(v),
                Value::Int(v) => args.add(v),
                Value::UInt(v) => args.add(v),
                Value::Float(v) => args.add(v),
                Value::Text(v) => args.add(v),
                Value::Bytes(v) => args.add(v),
            };
            added.map_err(sqlx::Error::Encode)?;
        }
        Ok(args)
    }

    /// Submits the statement on `conn`.
    ///
    /// Statements that produce columns are fetched, the rest are executed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Statement`] carrying the driver's error.
    pub async fn run(&self, conn: &mut MySqlConnection) -> crate::Result<QueryOutput> {
        self.submit(conn).await.map_err(Error::Statement)
    }

    async fn submit(&self, conn: &mut MySqlConnection) -> Result<QueryOutput, sqlx::Error> {
        let columns = (&mut *conn).prepare(&self.sql).await?.columns().to_vec();
        let args = self.arguments()?;

        if columns.is_empty() {
            let done = sqlx::query_with(&self.sql, args).execute(&mut *conn).await?;
            Ok(QueryOutput::from_done(done))
        } else {
            let rows = sqlx::query_with(&self.sql, args).fetch_all(&mut *conn).await?;
            Ok(QueryOutput::new(rows, columns))
        }
    }
}

/// Result of a task: the rows returned and the column metadata that
/// describes them.
#[derive(Debug, Default)]
pub struct QueryOutput {
    rows: Vec<MySqlRow>,
    columns: Vec<MySqlColumn>,
    rows_affected: u64,
    last_insert_id: u64,
}

impl QueryOutput {
    /// An output with no rows or columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rows and the columns describing them, as fetched by a function task.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx::{Executor, Statement};
    /// use sqlx_mtxn_mysql::{BoxError, QueryOutput, SequentialCoordinator, TransactionContext};
    ///
    /// # async fn example(pool: sqlx::MySqlPool) {
    /// let coordinator = SequentialCoordinator::new();
    /// let ctx = TransactionContext::new(pool, &coordinator);
    /// ctx.add_function_task(|conn, _task| {
    ///     Box::pin(async move {
    ///         let sql = "SELECT id, name FROM users";
    ///         let columns = (&mut *conn).prepare(sql).await?.columns().to_vec();
    ///         let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
    ///         Ok::<_, BoxError>(QueryOutput::new(rows, columns))
    ///     })
    /// });
    /// # }
    /// ```
    pub fn new(rows: Vec<MySqlRow>, columns: Vec<MySqlColumn>) -> Self {
        Self {
            rows,
            columns,
            ..Self::default()
        }
    }

    /// Execution summary of a statement that returned no rows.
    pub fn from_done(done: MySqlQueryResult) -> Self {
        Self {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_id(),
            ..Self::default()
        }
    }

    /// Rows returned by the statement, in server order.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlx_mtxn_mysql::QueryOutput;
    ///
    /// assert!(QueryOutput::empty().rows().is_empty());
    /// ```
    pub fn rows(&self) -> &[MySqlRow] {
        &self.rows
    }

    /// Column metadata. Empty for statements that return no rows.
    pub fn columns(&self) -> &[MySqlColumn] {
        &self.columns
    }

    /// Rows changed by an `INSERT`, `UPDATE` or `DELETE`; zero for queries.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// `LAST_INSERT_ID()` reported for the statement; zero for queries.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }
}

/// Takes the column metadata from the first row; no rows means no columns.
impl From<Vec<MySqlRow>> for QueryOutput {
    fn from(rows: Vec<MySqlRow>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.columns().to_vec())
            .unwrap_or_default();
        Self::new(rows, columns)
    }
}
