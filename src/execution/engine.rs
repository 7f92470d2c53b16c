//! Execution Engine - runs guarded read-only SQL against the relational store
//!
//! Every call opens a short-lived read-only connection, wraps the work in a
//! deferred read transaction that is always rolled back, and aborts the
//! statement once the configured deadline passes.

use crate::config::ExecutionConfig;
use crate::error::{AgentError, Result};
use crate::execution::guard;
use crate::execution::result::{normalize_column_names, Scalar, StructuredResult};
use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Connection, OpenFlags, Params, Statement, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Extra time granted to the blocking task before the outer timer gives up on it.
const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

/// Bind values for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryParameters {
    #[default]
    None,
    /// Bound to `?`, `?1`, `?2`, ...
    Positional(Vec<Scalar>),
    /// Bound to `:name` / `@name` / `$name`
    Named(Vec<(String, Scalar)>),
}

impl QueryParameters {
    /// Interpret a JSON argument: arrays bind positionally, objects by name.
    pub fn from_json(value: Option<&serde_json::Value>) -> Result<Self> {
        let bad = |what: &str| AgentError::invalid_parameter("parameters", what.to_string());
        match value {
            None | Some(serde_json::Value::Null) => Ok(QueryParameters::None),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| Scalar::from_json(v).ok_or_else(|| bad("values must be scalars")))
                .collect::<Result<Vec<_>>>()
                .map(QueryParameters::Positional),
            Some(serde_json::Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let name = if k.starts_with([':', '@', '$']) {
                        k.clone()
                    } else {
                        format!(":{}", k)
                    };
                    Scalar::from_json(v)
                        .map(|s| (name, s))
                        .ok_or_else(|| bad("values must be scalars"))
                })
                .collect::<Result<Vec<_>>>()
                .map(QueryParameters::Named),
            Some(_) => Err(bad("expected an array or an object")),
        }
    }
}

pub struct ExecutionEngine {
    database_path: PathBuf,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(database_path: impl AsRef<Path>, config: ExecutionConfig) -> Self {
        Self {
            database_path: database_path.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Open a read-only connection; a missing or unreadable store is `CatalogUnavailable`.
    pub fn open_read_only(&self) -> Result<Connection> {
        open_read_only(&self.database_path)
    }

    /// Run an arbitrary query after the read-only guard accepts it.
    pub async fn run_query(&self, sql: &str, params: QueryParameters) -> Result<StructuredResult> {
        guard::ensure_read_only(sql)?;
        let sql = sql.to_string();
        let max_rows = self.config.max_rows;
        debug!("Running query: {}", sql);
        self.with_read_transaction(move |conn| execute_statement(conn, &sql, &params, max_rows))
            .await
    }

    /// All user tables with their row counts.
    pub async fn list_tables(&self) -> Result<StructuredResult> {
        self.with_read_transaction(|conn| {
            let names = table_names(conn)?;
            let mut rows = Vec::with_capacity(names.len());
            for name in names {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", quote_identifier(&name)),
                    [],
                    |row| row.get(0),
                )?;
                rows.push(vec![Scalar::Text(name), Scalar::Integer(count)]);
            }
            Ok(StructuredResult::new(
                vec!["table".to_string(), "row_count".to_string()],
                rows,
                0,
            ))
        })
        .await
    }

    /// Column layout of one table: name, declared type, nullability, default,
    /// primary-key position and outgoing reference.
    pub async fn describe_table(&self, name: &str) -> Result<StructuredResult> {
        let requested = name.trim().to_string();
        self.with_read_transaction(move |conn| {
            let names = table_names(conn)?;
            let table = names
                .iter()
                .find(|t| t.eq_ignore_ascii_case(&requested))
                .cloned()
                .ok_or_else(|| AgentError::UnknownTable {
                    suggestion: closest(&requested, &names),
                    name: requested.clone(),
                })?;

            let mut references = std::collections::HashMap::new();
            {
                let mut stmt = conn.prepare(&format!(
                    "PRAGMA foreign_key_list({})",
                    quote_identifier(&table)
                ))?;
                let fks = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?;
                for fk in fks {
                    let (from, to_table, to_column) = fk?;
                    let target = match to_column {
                        Some(c) => format!("{}.{}", to_table, c),
                        None => to_table,
                    };
                    references.insert(from, target);
                }
            }

            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(&table)))?;
            let rows = stmt
                .query_map([], |row| {
                    let column: String = row.get(1)?;
                    Ok((
                        column,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)? == 0,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let rows = rows
                .into_iter()
                .map(|(column, declared, nullable, default, pk)| {
                    let reference = references.get(&column).cloned();
                    vec![
                        Scalar::Text(column),
                        declared.map(Scalar::Text).unwrap_or(Scalar::Null),
                        Scalar::Integer(i64::from(nullable)),
                        default.map(Scalar::Text).unwrap_or(Scalar::Null),
                        Scalar::Integer(pk),
                        reference.map(Scalar::Text).unwrap_or(Scalar::Null),
                    ]
                })
                .collect();

            Ok(StructuredResult::new(
                ["column", "type", "nullable", "default", "primary_key", "references"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                rows,
                0,
            ))
        })
        .await
    }

    /// Run `work` on a blocking thread inside a read transaction bounded by
    /// the configured query timeout.
    async fn with_read_transaction<F>(&self, work: F) -> Result<StructuredResult>
    where
        F: FnOnce(&Connection) -> Result<StructuredResult> + Send + 'static,
    {
        let timeout = self.config.query_timeout;
        let conn = self.open_read_only()?;
        let interrupt = conn.get_interrupt_handle();
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || {
            let mut conn = conn;
            let deadline = started + timeout;
            conn.progress_handler(1_000, Some(move || Instant::now() >= deadline));
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let result = work(&*tx);
            // Dropping the transaction rolls it back; nothing here writes.
            drop(tx);
            result
        });

        let outcome = match tokio::time::timeout(timeout + INTERRUPT_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(AgentError::QueryFailed(format!(
                "query task aborted: {}",
                join_err
            ))),
            Err(_) => {
                interrupt.interrupt();
                Err(AgentError::QueryTimeout(timeout))
            }
        };

        match outcome {
            Ok(mut result) => {
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                Ok(result)
            }
            Err(AgentError::QueryTimeout(_)) => {
                warn!("Query cancelled after {:?}", timeout);
                Err(AgentError::QueryTimeout(timeout))
            }
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(AgentError::CatalogUnavailable(format!(
            "store not found at {}",
            path.display()
        )));
    }
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )
    .map_err(|e| AgentError::CatalogUnavailable(format!("cannot open {}: {}", path.display(), e)))
}

/// User tables in name order, excluding SQLite internals.
pub(crate) fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Closest candidate by Jaro-Winkler similarity, when reasonably close.
pub(crate) fn closest(needle: &str, candidates: &[String]) -> Option<String> {
    let needle = needle.to_lowercase();
    candidates
        .iter()
        .map(|c| (strsim::jaro_winkler(&needle, &c.to_lowercase()), c))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, c)| c.clone())
}

fn execute_statement(
    conn: &Connection,
    sql: &str,
    params: &QueryParameters,
    max_rows: usize,
) -> Result<StructuredResult> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(AgentError::UnsafeQueryRejected(
            "statement would modify the store".to_string(),
        ));
    }
    let raw: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let columns = normalize_column_names(&raw);

    let (rows, truncated) = match params {
        QueryParameters::None => collect_rows(&mut stmt, [], max_rows)?,
        QueryParameters::Positional(values) => {
            collect_rows(&mut stmt, params_from_iter(values.iter()), max_rows)?
        }
        QueryParameters::Named(pairs) => {
            let named: Vec<(&str, &dyn ToSql)> = pairs
                .iter()
                .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
                .collect();
            collect_rows(&mut stmt, named.as_slice(), max_rows)?
        }
    };

    let mut result = StructuredResult::new(columns, rows, 0);
    result.truncated = truncated;
    Ok(result)
}

fn collect_rows<P: Params>(
    stmt: &mut Statement<'_>,
    params: P,
    max_rows: usize,
) -> Result<(Vec<Vec<Scalar>>, bool)> {
    let width = stmt.column_count();
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            return Ok((out, true));
        }
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(Scalar::from(row.get_ref(idx)?));
        }
        out.push(values);
    }
    Ok((out, false))
}
