//! Todo data model: the persisted item and the request payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Store-assigned todo identifier.
pub type TodoId = i64;

/// A single to-do item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// Unique ID, assigned on creation and never reused.
    pub id: TodoId,
    /// Short title, unique among active todos.
    pub title: String,
    /// Free-form description (empty when not given).
    #[serde(default)]
    pub description: String,
    /// Whether the todo is done.
    pub completed: bool,
    /// When the todo was created.
    pub created_at: DateTime<Utc>,
    /// When the todo was last mutated.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Never leaves the process.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields needed to insert a todo; the store fills in id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: String,
    pub completed: bool,
}

impl NewTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            completed: false,
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

/// Body of `POST /todos`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
}

/// Body of `PUT /todos/{id}`.
///
/// `title` and `description` treat `null` and the empty string as "not
/// provided". `completed` keeps the absent / `null` / value distinction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTodoRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "present")]
    pub completed: Option<Option<bool>>,
}

impl UpdateTodoRequest {
    /// Builder: set title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder: set completed explicitly.
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(Some(completed));
        self
    }

    /// The explicit `completed` value, if one was sent.
    pub fn completed_value(&self) -> Option<bool> {
        self.completed.flatten()
    }
}

/// Reads a JSON `null` string as empty.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Marks a field as present, keeping an explicit `null` as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// `{"error": "..."}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `{"message": "..."}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_distinguishes_absent_null_and_value() {
        let absent: UpdateTodoRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.completed, None);

        let null: UpdateTodoRequest = serde_json::from_str(r#"{"completed":null}"#).unwrap();
        assert_eq!(null.completed, Some(None));
        assert_eq!(null.completed_value(), None);

        let explicit_false: UpdateTodoRequest =
            serde_json::from_str(r#"{"completed":false}"#).unwrap();
        assert_eq!(explicit_false.completed, Some(Some(false)));
        assert_eq!(explicit_false.completed_value(), Some(false));
    }

    #[test]
    fn create_request_requires_title() {
        let err = serde_json::from_str::<CreateTodoRequest>(r#"{"description":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("missing field `title`"));

        let req: CreateTodoRequest = serde_json::from_str(r#"{"title":"Buy milk"}"#).unwrap();
        assert_eq!(req.title, "Buy milk");
        assert!(req.description.is_empty());
    }

    #[test]
    fn null_strings_read_as_not_provided() {
        let create: CreateTodoRequest =
            serde_json::from_str(r#"{"title":"A","description":null}"#).unwrap();
        assert_eq!(create.title, "A");
        assert!(create.description.is_empty());

        let update: UpdateTodoRequest =
            serde_json::from_str(r#"{"title":null,"description":null,"completed":true}"#).unwrap();
        assert!(update.title.is_empty());
        assert!(update.description.is_empty());
        assert_eq!(update.completed_value(), Some(true));

        assert!(serde_json::from_str::<CreateTodoRequest>(r#"{"title":null}"#).is_err());
    }

    #[test]
    fn serialized_todo_hides_deletion_marker() {
        let now = Utc::now();
        let todo = Todo {
            id: 3,
            title: "Water plants".into(),
            description: String::new(),
            completed: false,
            created_at: now,
            updated_at: now,
            deleted_at: Some(now),
        };
        let json = serde_json::to_value(&todo).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["title"], "Water plants");
        assert_eq!(json["completed"], false);
        assert!(json.get("created_at").is_some());
        assert!(json.get("updated_at").is_some());
        assert!(json.get("deleted_at").is_none());
    }
}
