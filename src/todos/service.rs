//! Todo business rules on top of a `TodoStore`.
//!
//! This is the only place domain errors are minted. The store reports
//! absence and infrastructure failures; the service turns them into
//! `TodoError` variants the router can branch on.

use std::sync::Arc;

use tracing::{debug, info};

use super::model::{CreateTodoRequest, NewTodo, Todo, TodoId, UpdateTodoRequest};
use crate::error::TodoError;
use crate::store::TodoStore;

/// Todo service. Cheap to clone; shares the store.
#[derive(Clone)]
pub struct TodoService {
    store: Arc<dyn TodoStore>,
}

impl TodoService {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }

    /// Create a todo. Title must be non-empty and not held by an active todo.
    pub async fn create_todo(&self, req: CreateTodoRequest) -> Result<Todo, TodoError> {
        if req.title.is_empty() {
            return Err(TodoError::TitleRequired);
        }

        let taken = self
            .store
            .exists_by_title(&req.title)
            .await
            .map_err(TodoError::UniquenessCheck)?;
        if taken {
            return Err(TodoError::TitleExists);
        }

        let todo = self
            .store
            .create(&NewTodo::new(req.title).with_description(req.description))
            .await?;
        info!(id = todo.id, title = %todo.title, "Todo created");
        Ok(todo)
    }

    pub async fn get_all_todos(&self) -> Result<Vec<Todo>, TodoError> {
        Ok(self.store.get_all().await?)
    }

    pub async fn get_todo_by_id(&self, id: TodoId) -> Result<Todo, TodoError> {
        Ok(self.store.get_by_id(id).await?)
    }

    /// Apply a partial update.
    ///
    /// Empty `title`/`description` mean "not provided"; `completed` applies
    /// only when explicitly sent with a value. When nothing actually changes
    /// the todo is returned as loaded and the store is not written.
    pub async fn update_todo(&self, id: TodoId, req: UpdateTodoRequest) -> Result<Todo, TodoError> {
        let mut todo = self.store.get_by_id(id).await?;
        let mut changed = false;
        let completed_value = req.completed_value();

        if !req.title.is_empty() && req.title != todo.title {
            let holder = self
                .store
                .find_id_by_title(&req.title)
                .await
                .map_err(TodoError::UniquenessCheck)?;
            if holder.is_some_and(|holder| holder != todo.id) {
                return Err(TodoError::TitleExists);
            }
            todo.title = req.title;
            changed = true;
        }

        if !req.description.is_empty() && req.description != todo.description {
            todo.description = req.description;
            changed = true;
        }

        if let Some(completed) = completed_value {
            if completed != todo.completed {
                todo.completed = completed;
                changed = true;
            }
        }

        if !changed {
            debug!(id, "Update carried no changes");
            return Ok(todo);
        }

        self.store.update(&mut todo).await?;
        info!(id, "Todo updated");
        Ok(todo)
    }

    pub async fn delete_todo(&self, id: TodoId) -> Result<(), TodoError> {
        self.store.delete(id).await?;
        Ok(())
    }
}
