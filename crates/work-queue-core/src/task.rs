use crate::{Result, TaskError, MAX_PAYLOAD_SIZE};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Task type tag, the key used to pick an executor
pub type TaskType = String;

/// Task payload (arbitrary bytes)
pub type TaskPayload = Vec<u8>;

/// A typed task whose payload travels as JSON under a fixed type tag.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendEmail { to: String }
///
/// impl TaskDefinition for SendEmail {
///     const TASK_TYPE: &'static str = "send_email";
/// }
///
/// let task = Task::from_definition(&SendEmail { to: "a@b.c".into() })?;
/// let email: SendEmail = task.decode()?;
/// ```
pub trait TaskDefinition: Serialize + DeserializeOwned {
    const TASK_TYPE: &'static str;
}

/// Unit of work handed from a dispatcher to a worker.
///
/// Fields are private: a task never changes after it has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    task_type: TaskType,
    payload: TaskPayload,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task
    pub fn new(task_type: impl Into<TaskType>, payload: TaskPayload) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TaskError::PayloadTooLarge {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }

        Ok(Task {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            created_at: Utc::now(),
        })
    }

    /// Create a task from a typed definition, JSON-encoding it as the payload
    pub fn from_definition<T: TaskDefinition>(definition: &T) -> Result<Self> {
        let payload = serde_json::to_vec(definition)?;
        Task::new(T::TASK_TYPE, payload)
    }

    /// Decode the payload back into its typed definition
    pub fn decode<T: TaskDefinition>(&self) -> Result<T> {
        if self.task_type != T::TASK_TYPE {
            return Err(TaskError::TypeMismatch {
                expected: T::TASK_TYPE.to_string(),
                actual: self.task_type.clone(),
            });
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Serialize task to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(TaskError::from)
    }

    /// Deserialize task from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(TaskError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ResizeImage {
        url: String,
        width: u32,
    }

    impl TaskDefinition for ResizeImage {
        const TASK_TYPE: &'static str = "resize_image";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct SendEmail {
        to: String,
    }

    impl TaskDefinition for SendEmail {
        const TASK_TYPE: &'static str = "send_email";
    }

    #[test]
    fn test_task_creation() {
        let task = Task::new("test_task", b"test payload".to_vec()).unwrap();

        assert_eq!(task.task_type(), "test_task");
        assert_eq!(task.payload(), b"test payload");
        assert!(!task.id().is_nil());
    }

    #[test]
    fn test_task_serialization() {
        let task = Task::new("test", b"data".to_vec()).unwrap();

        let bytes = task.to_bytes().unwrap();
        let deserialized = Task::from_bytes(&bytes).unwrap();

        assert_eq!(task, deserialized);
    }

    #[test]
    fn test_payload_size_limit() {
        let large_payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let result = Task::new("test", large_payload);

        match result {
            Err(TaskError::PayloadTooLarge { actual, .. }) => {
                assert_eq!(actual, MAX_PAYLOAD_SIZE + 1)
            }
            _ => panic!("Expected PayloadTooLarge error"),
        }
    }

    #[test]
    fn test_typed_definition() {
        let original = ResizeImage {
            url: "s3://bucket/cat.png".to_string(),
            width: 640,
        };

        let task = Task::from_definition(&original).unwrap();
        assert_eq!(task.task_type(), "resize_image");

        let decoded: ResizeImage = task.decode().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_checks_type_tag() {
        let task = Task::from_definition(&SendEmail {
            to: "ops@example.com".to_string(),
        })
        .unwrap();

        match task.decode::<ResizeImage>() {
            Err(TaskError::TypeMismatch { expected, actual }) => {
                assert_eq!(expected, "resize_image");
                assert_eq!(actual, "send_email");
            }
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
    }
}
