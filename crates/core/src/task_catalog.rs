//! Bijective task text <-> id catalog.
//!
//! Ids are dense and assigned in first-seen order. The catalog is
//! append-only: an id, once assigned, never changes meaning.

use crate::error::{CoreError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized form: `{"tasks": {text: id}, "next_id": n}`.
#[derive(Serialize, Deserialize)]
struct CatalogRepr {
    tasks: BTreeMap<String, u32>,
    next_id: u32,
}

/// One line of `tasks.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Dense task id
    pub task_index: u32,
    /// Task text
    pub task: String,
}

/// Task text <-> id mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "CatalogRepr", into = "CatalogRepr")]
pub struct TaskCatalog {
    texts: Vec<String>,
    ids: FxHashMap<String, u32>,
}

impl PartialEq for TaskCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.texts == other.texts
    }
}

impl TaskCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `text`, assigning the next id if unseen.
    pub fn get_or_add(&mut self, text: &str) -> u32 {
        if let Some(&id) = self.ids.get(text) {
            return id;
        }
        let id = self.texts.len() as u32;
        self.texts.push(text.to_string());
        self.ids.insert(text.to_string(), id);
        id
    }

    /// Id of `text`, if registered
    pub fn get_id(&self, text: &str) -> Option<u32> {
        self.ids.get(text).copied()
    }

    /// Text of `id`, if registered
    pub fn get_text(&self, id: u32) -> Option<&str> {
        self.texts.get(id as usize).map(String::as_str)
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// True when no task is registered
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// `(id, text)` in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.texts.iter().enumerate().map(|(i, t)| (i as u32, t.as_str()))
    }

    /// Render as `tasks.jsonl` (one `{task_index, task}` object per line).
    pub fn to_jsonl(&self) -> Result<String> {
        let mut out = String::new();
        for (task_index, task) in self.iter() {
            let entry = TaskEntry {
                task_index,
                task: task.to_string(),
            };
            out.push_str(&serde_json::to_string(&entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse `tasks.jsonl`. Ids must be dense and in order.
    pub fn from_jsonl(s: &str) -> Result<Self> {
        let mut catalog = TaskCatalog::new();
        for line in s.lines().filter(|l| !l.trim().is_empty()) {
            let entry: TaskEntry = serde_json::from_str(line)?;
            let id = catalog.get_or_add(&entry.task);
            if id != entry.task_index {
                return Err(CoreError::Serialization(format!(
                    "task '{}' has index {}, expected {}",
                    entry.task, entry.task_index, id
                )));
            }
        }
        Ok(catalog)
    }
}

impl TryFrom<CatalogRepr> for TaskCatalog {
    type Error = String;

    fn try_from(repr: CatalogRepr) -> std::result::Result<Self, Self::Error> {
        let mut by_id: Vec<(u32, String)> = repr.tasks.into_iter().map(|(t, i)| (i, t)).collect();
        by_id.sort();
        let mut catalog = TaskCatalog::new();
        for (expected, (id, text)) in by_id.into_iter().enumerate() {
            if id as usize != expected {
                return Err(format!("task ids are not dense: found {} at position {}", id, expected));
            }
            catalog.get_or_add(&text);
        }
        if catalog.len() as u32 != repr.next_id {
            return Err(format!(
                "next_id {} does not match {} tasks",
                repr.next_id,
                catalog.len()
            ));
        }
        Ok(catalog)
    }
}

impl From<TaskCatalog> for CatalogRepr {
    fn from(catalog: TaskCatalog) -> Self {
        CatalogRepr {
            next_id: catalog.texts.len() as u32,
            tasks: catalog.ids.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_seen_order() {
        let mut catalog = TaskCatalog::new();
        let ids: Vec<u32> = ["A", "B", "A"].iter().map(|t| catalog.get_or_add(t)).collect();
        assert_eq!(ids, vec![0, 1, 0]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get_text(1), Some("B"));
    }

    #[test]
    fn test_serialized_form() {
        let mut catalog = TaskCatalog::new();
        catalog.get_or_add("open drawer");
        catalog.get_or_add("close drawer");
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["next_id"], 2);
        assert_eq!(json["tasks"]["close drawer"], 1);

        let back: TaskCatalog = serde_json::from_value(json).unwrap();
        assert_eq!(back, catalog);
        assert_eq!(back.get_id("close drawer"), Some(1));
    }

    #[test]
    fn test_sparse_ids_rejected() {
        let json = serde_json::json!({"tasks": {"a": 0, "b": 2}, "next_id": 3});
        assert!(serde_json::from_value::<TaskCatalog>(json).is_err());
    }

    #[test]
    fn test_jsonl_lines() {
        let mut catalog = TaskCatalog::new();
        catalog.get_or_add("pick");
        catalog.get_or_add("place");
        let text = catalog.to_jsonl().unwrap();
        assert_eq!(
            text,
            "{\"task_index\":0,\"task\":\"pick\"}\n{\"task_index\":1,\"task\":\"place\"}\n"
        );
        assert_eq!(TaskCatalog::from_jsonl(&text).unwrap(), catalog);
    }

    proptest! {
        #[test]
        fn prop_get_or_add_is_idempotent(texts in proptest::collection::vec("[a-d]{1,2}", 0..40)) {
            let mut catalog = TaskCatalog::new();
            let first: Vec<u32> = texts.iter().map(|t| catalog.get_or_add(t)).collect();
            let again: Vec<u32> = texts.iter().map(|t| catalog.get_or_add(t)).collect();
            prop_assert_eq!(&first, &again);
            for (id, text) in catalog.iter() {
                prop_assert_eq!(catalog.get_id(text), Some(id));
            }
            // ids are dense
            let max = first.iter().copied().max().map(|m| m + 1).unwrap_or(0);
            prop_assert_eq!(max as usize, catalog.len());
        }
    }
}
