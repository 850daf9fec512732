//! The `TodoStore` trait: async persistence interface for todos.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::todos::model::{NewTodo, Todo, TodoId};

/// Backend-agnostic todo storage.
///
/// Every read filters out soft-deleted rows; a deleted todo behaves as if it
/// never existed. Absence is reported as `DatabaseError::NotFound`.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Insert a todo, assigning its id and timestamps.
    async fn create(&self, todo: &NewTodo) -> Result<Todo, DatabaseError>;

    /// All active todos in insertion order.
    async fn get_all(&self) -> Result<Vec<Todo>, DatabaseError>;

    /// The active todo with this id.
    async fn get_by_id(&self, id: TodoId) -> Result<Todo, DatabaseError>;

    /// Whether an active todo holds `title`. Fetches no row data.
    async fn exists_by_title(&self, title: &str) -> Result<bool, DatabaseError>;

    /// Id of the active todo holding `title`, if any.
    async fn find_id_by_title(&self, title: &str) -> Result<Option<TodoId>, DatabaseError>;

    /// Persist the mutable fields of a loaded todo and refresh its `updated_at`.
    ///
    /// Does not re-check title uniqueness; the caller has already done so.
    async fn update(&self, todo: &mut Todo) -> Result<(), DatabaseError>;

    /// Soft-delete the active todo with this id.
    async fn delete(&self, id: TodoId) -> Result<(), DatabaseError>;
}
