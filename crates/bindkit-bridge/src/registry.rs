//! Binding Registry
//!
//! Name to dispatch-table map. Filled once during start-up, then handed to
//! the [`Bridge`](crate::Bridge) and only read from.

use crate::error::RegistrationError;
use crate::dispatch::DispatchTable;
use bindkit_object::MetaClass;
use std::collections::HashMap;
use std::ptr;

/// Registered bindings by type name
#[derive(Debug, Default)]
pub struct BindingRegistry {
    tables: HashMap<&'static str, &'static DispatchTable>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its own name
    pub fn register(&mut self, table: &'static DispatchTable) -> Result<(), RegistrationError> {
        self.register_as(table.name, table)
    }

    /// Register a table under an explicit name.
    ///
    /// Registering the same table twice is a no-op; a different table under
    /// a taken name is rejected.
    pub fn register_as(
        &mut self,
        name: &'static str,
        table: &'static DispatchTable,
    ) -> Result<(), RegistrationError> {
        match self.tables.get(name) {
            Some(existing) if ptr::eq(*existing, table) => Ok(()),
            Some(_) => {
                tracing::error!("Binding conflict: '{}' is already registered", name);
                Err(RegistrationError::Conflict { name: name.to_string() })
            }
            None => {
                tracing::debug!("Registered binding {}", name);
                self.tables.insert(name, table);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static DispatchTable> {
        self.tables.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tables.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Nearest registered table for a class, walking up its superclasses
    pub fn resolve_class(&self, meta: &MetaClass, max_depth: usize) -> Option<&'static DispatchTable> {
        meta.ancestors()
            .take(max_depth)
            .find_map(|class| self.get(class.name()))
    }

    /// Append `table` and its base tables to `chain`, skipping duplicates
    pub fn extend_chain(
        &self,
        chain: &mut Vec<&'static DispatchTable>,
        table: &'static DispatchTable,
        max_depth: usize,
    ) {
        let mut current = Some(table);
        let mut steps = 0;
        while let Some(t) = current {
            if steps >= max_depth {
                tracing::warn!("Base chain of {} exceeds {} tables", table.name, max_depth);
                break;
            }
            if !chain.iter().any(|c| ptr::eq(*c, t)) {
                chain.push(t);
            }
            current = t.base.and_then(|base| self.get(base));
            steps += 1;
        }
    }
}
