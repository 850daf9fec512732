//! libSQL backend: async `TodoStore` implementation.
//!
//! Holds a small set of connections to one embedded database and hands them
//! out round-robin. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::TodoStore;
use crate::todos::model::{NewTodo, Todo, TodoId};

const TODO_COLUMNS: &str = "id, title, description, completed, created_at, updated_at, deleted_at";

/// Pragmas applied to every connection of a file-backed database.
const FILE_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 5000",
    "PRAGMA foreign_keys = ON",
];

/// libSQL database backend.
///
/// SQLite allows a single writer, so the pool stays small. `libsql::Connection`
/// is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conns: Vec<Connection>,
    next: AtomicUsize,
}

impl LibSqlBackend {
    /// Open the database described by `config`.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        if config.url == ":memory:" {
            Self::new_memory().await
        } else {
            Self::new_local(Path::new(&config.url), config.pool_size).await
        }
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, pool_size: usize) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let mut conns = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let conn = db
                .connect()
                .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
            apply_pragmas(&conn).await?;
            conns.push(conn);
        }

        let backend = Self {
            db: Arc::new(db),
            conns,
            next: AtomicUsize::new(0),
        };
        backend.init_schema().await?;
        info!(path = %path.display(), pool_size = backend.conns.len(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    ///
    /// Each in-memory connection is a separate database, so this always uses one.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conns: vec![conn],
            next: AtomicUsize::new(0),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Number of pooled connections.
    pub fn pool_size(&self) -> usize {
        self.conns.len()
    }

    /// Next connection, round-robin.
    fn conn(&self) -> &Connection {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        &self.conns[i]
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conns[0]).await
    }
}

async fn apply_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    for pragma in FILE_PRAGMAS {
        // Some pragmas answer with a row, so go through `query` rather than `execute`.
        conn.query(pragma, ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("{pragma}: {e}")))?;
    }
    Ok(())
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Primary SQLite result code for constraint violations.
const SQLITE_CONSTRAINT: i32 = 19;

/// Classify a write failure: constraint violations become `Constraint`.
///
/// Local failures carry the SQLite code; the primary code is the low byte
/// of an extended one (`SQLITE_CONSTRAINT_UNIQUE` is 2067). Errors without
/// a code fall back to the message.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let is_constraint = match &e {
        libsql::Error::SqliteFailure(code, _) => code & 0xff == SQLITE_CONSTRAINT,
        other => other.to_string().contains("constraint failed"),
    };
    if is_constraint {
        DatabaseError::Constraint(format!("{op}: {e}"))
    } else {
        DatabaseError::Query(format!("{op}: {e}"))
    }
}

fn not_found(id: TodoId) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "todo".to_string(),
        id: id.to_string(),
    }
}

/// Map a libsql Row to a Todo. Column order matches TODO_COLUMNS.
fn row_to_todo(row: &libsql::Row) -> Result<Todo, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("todo.id: {e}")))?;
    let title: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("todo.title: {e}")))?;
    let description: String = row.get(2).unwrap_or_default();
    let completed: i64 = row.get(3).unwrap_or(0);
    let created_str: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("todo.created_at: {e}")))?;
    let updated_str: String = row
        .get(5)
        .map_err(|e| DatabaseError::Query(format!("todo.updated_at: {e}")))?;
    let deleted_str: Option<String> = row.get(6).ok();

    Ok(Todo {
        id,
        title,
        description,
        completed: completed != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
        deleted_at: deleted_str
            .filter(|s| !s.is_empty())
            .map(|s| parse_datetime(&s)),
    })
}

#[async_trait]
impl TodoStore for LibSqlBackend {
    async fn create(&self, todo: &NewTodo) -> Result<Todo, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO todos (title, description, completed, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)
                     RETURNING {TODO_COLUMNS}"
                ),
                params![
                    todo.title.as_str(),
                    todo.description.as_str(),
                    todo.completed as i64,
                    now
                ],
            )
            .await
            .map_err(|e| write_error("create_todo", e))?;

        let row = rows
            .next()
            .await
            .map_err(|e| write_error("create_todo", e))?
            .ok_or_else(|| DatabaseError::Query("create_todo: no row returned".to_string()))?;
        let created = row_to_todo(&row)?;
        debug!(id = created.id, title = %created.title, "Todo created");
        Ok(created)
    }

    async fn get_all(&self) -> Result<Vec<Todo>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE deleted_at IS NULL ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_todos: {e}")))?;

        let mut todos = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_todos row: {e}")))?
        {
            todos.push(row_to_todo(&row)?);
        }
        Ok(todos)
    }

    async fn get_by_id(&self, id: TodoId) -> Result<Todo, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1 AND deleted_at IS NULL"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_todo: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_todo(&row),
            Ok(None) => Err(not_found(id)),
            Err(e) => Err(DatabaseError::Query(format!("get_todo row: {e}"))),
        }
    }

    async fn exists_by_title(&self, title: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT 1 FROM todos WHERE title = ?1 AND deleted_at IS NULL LIMIT 1",
                params![title],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("exists_by_title: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("exists_by_title row: {e}")))?;
        Ok(row.is_some())
    }

    async fn find_id_by_title(&self, title: &str) -> Result<Option<TodoId>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT id FROM todos WHERE title = ?1 AND deleted_at IS NULL LIMIT 1",
                params![title],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_id_by_title: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("find_id_by_title id: {e}")))?;
                Ok(Some(id))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_id_by_title row: {e}"))),
        }
    }

    async fn update(&self, todo: &mut Todo) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now();

        let count = conn
            .execute(
                "UPDATE todos SET title = ?1, description = ?2, completed = ?3, updated_at = ?4
                 WHERE id = ?5 AND deleted_at IS NULL",
                params![
                    todo.title.as_str(),
                    todo.description.as_str(),
                    todo.completed as i64,
                    now.to_rfc3339(),
                    todo.id
                ],
            )
            .await
            .map_err(|e| write_error("update_todo", e))?;

        if count == 0 {
            return Err(not_found(todo.id));
        }
        todo.updated_at = now;
        debug!(id = todo.id, "Todo updated");
        Ok(())
    }

    async fn delete(&self, id: TodoId) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let count = conn
            .execute(
                "UPDATE todos SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_todo: {e}")))?;

        if count == 0 {
            return Err(not_found(id));
        }
        info!(id, "Todo soft-deleted");
        Ok(())
    }
}
