use super::{Backend, BackendCallError, Operation, Outcome};
use duel_analysis::BackendId;
use duel_ingest::Value;
use itertools::Itertools;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKind {
    Select,
    Modify,
}

/// Statement text and bound parameters, ready to run against the cached statement of the same text
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    kind: StatementKind,
    sql: String,
    params: Vec<SqlValue>,
}

impl PreparedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Single table SQLite adapter, autocommitting every statement
#[derive(Debug)]
pub struct SqliteBackend {
    connection: Connection,
    table: String,
    columns: Vec<String>,
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn bind(value: &Value) -> SqlValue {
    match value {
        Value::Integer(integer) => SqlValue::Integer(*integer),
        Value::Real(real) => SqlValue::Real(*real),
        Value::Text(text) => SqlValue::Text(text.clone()),
    }
}

impl SqliteBackend {
    /// Open a database file, `:memory:` opens a private in-memory database
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, BackendCallError> {
        let path = path.as_ref();
        let connection = Connection::open(path)?;

        info!(path = %path.display(), table = table, "Opened SQLite database");

        Ok(Self {
            connection,
            table: table.to_owned(),
            columns: Vec::new(),
        })
    }

    pub fn row_count(&self) -> Result<usize, BackendCallError> {
        let count: i64 = self
            .connection
            .prepare_cached(&format!("select count(*) from {}", quote(&self.table)))?
            .query_row([], |row| row.get(0))?;

        Ok(count as usize)
    }

    pub fn schema(&self) -> Vec<String> {
        vec![
            format!("drop table if exists {}", quote(&self.table)),
            format!(
                "create table {} (id integer primary key autoincrement, timestamp integer{})",
                quote(&self.table),
                self.columns
                    .iter()
                    .map(|column| format!(", {} integer", quote(column)))
                    .join("")
            ),
        ]
    }

    pub fn close(mut self) -> Result<(), BackendCallError> {
        let mut counter = 0;
        while let Err((connection, error)) = self.connection.close() {
            counter += 1;
            self.connection = connection;
            error!(error = ?error, "Failed to close SQLite connection: {error}, trying again {counter}/3");

            if counter == 3 {
                error!("Giving up on closing the SQLite connection");

                return Err(BackendCallError::Statement(error));
            }
        }

        info!("Closed SQLite connection");

        Ok(())
    }
}

impl Backend for SqliteBackend {
    type Prepared = PreparedStatement;

    fn id(&self) -> BackendId {
        BackendId::Sqlite
    }

    fn reset(&mut self, columns: &[String]) -> Result<(), BackendCallError> {
        self.columns = columns.to_vec();
        self.connection.flush_prepared_statement_cache();

        let schema = self.schema();
        let total = schema.len();

        for (counter, statement) in schema.iter().enumerate() {
            match self.connection.execute(statement, []) {
                Ok(_) => info!("Applied SQL schema ({}/{total})", counter + 1),
                Err(error) => {
                    error!(error = ?error, statement = %statement, "Failed to apply SQL schema ({}/{total}): {error}", counter + 1);

                    return Err(BackendCallError::Statement(error));
                }
            }
        }

        Ok(())
    }

    fn prepare(&self, operation: Operation<'_>) -> PreparedStatement {
        let table = quote(&self.table);

        match operation {
            Operation::Insert(record) => PreparedStatement {
                kind: StatementKind::Modify,
                sql: format!(
                    "insert into {table} (timestamp{}) values (?{})",
                    self.columns
                        .iter()
                        .map(|column| format!(", {}", quote(column)))
                        .join(""),
                    ", ?".repeat(self.columns.len())
                ),
                params: std::iter::once(SqlValue::Integer(record.key))
                    .chain(record.values.iter().map(bind))
                    .collect(),
            },
            Operation::PointQuery(key) => PreparedStatement {
                kind: StatementKind::Select,
                sql: format!("select * from {table} where timestamp = ?"),
                params: vec![SqlValue::Integer(key)],
            },
            Operation::RangeQuery { low, high } => PreparedStatement {
                kind: StatementKind::Select,
                sql: format!("select * from {table} where timestamp between ? and ?"),
                params: vec![SqlValue::Integer(low), SqlValue::Integer(high)],
            },
            Operation::Delete(key) => PreparedStatement {
                kind: StatementKind::Modify,
                sql: format!("delete from {table} where timestamp = ?"),
                params: vec![SqlValue::Integer(key)],
            },
        }
    }

    fn execute(&mut self, prepared: &PreparedStatement) -> Result<Outcome, BackendCallError> {
        let mut statement = self.connection.prepare_cached(&prepared.sql)?;
        let params = params_from_iter(prepared.params.iter());

        match prepared.kind {
            StatementKind::Select => {
                let mut rows = statement.query(params)?;
                let mut count = 0;
                while rows.next()?.is_some() {
                    count += 1;
                }

                Ok(Outcome::Rows(count))
            }
            StatementKind::Modify => Ok(Outcome::Rows(statement.execute(params)?)),
        }
    }
}
