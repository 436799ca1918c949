#![forbid(unsafe_code)]

use crate::{MarkerKey, MarkerStore, StoreError, check_value};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Process-local markers, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryMarkers {
    values: Mutex<BTreeMap<MarkerKey, String>>,
}

impl MemoryMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(entries: impl IntoIterator<Item = (MarkerKey, String)>) -> Self {
        Self {
            values: Mutex::new(entries.into_iter().collect()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<MarkerKey, String>> {
        // a poisoned map is still a consistent map
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MarkerStore for MemoryMarkers {
    fn get(&self, key: MarkerKey) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(&key).cloned())
    }

    fn set(&self, key: MarkerKey, value: &str) -> Result<(), StoreError> {
        check_value(value)?;
        self.lock().insert(key, value.to_string());
        Ok(())
    }

    fn clear(&self, key: MarkerKey) -> Result<(), StoreError> {
        self.lock().remove(&key);
        Ok(())
    }
}
