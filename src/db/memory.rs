use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{TableBackend, Workbook};
use crate::error::StorageError;

/// In-process workbook storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    workbook: Mutex<Option<Workbook>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing workbook, e.g. a legacy layout under test.
    pub fn with_workbook(workbook: Workbook) -> Self {
        Self {
            workbook: Mutex::new(Some(workbook)),
        }
    }

    /// Copy of the currently stored workbook.
    pub fn snapshot(&self) -> Option<Workbook> {
        self.workbook.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Workbook>, StorageError> {
        self.workbook
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| StorageError::Task(format!("memory backend lock poisoned: {e}")))
    }

    async fn save(&self, workbook: &Workbook) -> Result<(), StorageError> {
        let mut guard = self
            .workbook
            .lock()
            .map_err(|e| StorageError::Task(format!("memory backend lock poisoned: {e}")))?;
        *guard = Some(workbook.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
