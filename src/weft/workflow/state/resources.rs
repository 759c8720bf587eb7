// SPDX-License-Identifier: MIT

//! Live handles carried alongside workflow state
//!
//! Resources are shared by `Arc` between every copy of the state. They are
//! never snapshotted, compared or merged.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named bag of type-erased handles (chat clients, storage clients, ...)
#[derive(Clone, Default)]
pub struct Resources {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Resources {
    /// Store a handle under `name`, replacing any previous one
    pub fn insert<T>(&mut self, name: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.entries.insert(name.into(), Arc::new(value));
    }

    /// Borrow the handle stored under `name` if it has type `T`
    pub fn get<T>(&self, name: &str) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.entries.get(name)?.downcast_ref::<T>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Resources").field("names", &names).finish()
    }
}
