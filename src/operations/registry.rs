//! Operation registry for managing available operation types.

use crate::core::node::{Category, Operation, OperationMetadata};
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function for creating operation instances.
pub type OperationFactory = Arc<dyn Fn() -> Box<dyn Operation> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: OperationFactory,
    /// Cached metadata (avoids creating an instance just to read it).
    pub metadata: OperationMetadata,
    /// Whether this operation can be created.
    pub enabled: bool,
}

/// Registry for all available operation types.
///
/// Operations that need expensive shared state (lookup tables and the like)
/// are registered through [`register_with_setup`](Self::register_with_setup);
/// the setup runs once per state type and every instance shares its result.
pub struct OperationRegistry {
    /// Operations indexed by their unique ID.
    operations: IndexMap<String, RegistryEntry>,
    /// Operation IDs grouped by category.
    categories: IndexMap<Category, Vec<String>>,
    /// Results of one-time setups, by type.
    shared: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl OperationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            operations: IndexMap::new(),
            categories: IndexMap::new(),
            shared: HashMap::new(),
        }
    }

    /// Create a registry pre-populated with built-in operations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::operations::builtin::register_all(&mut registry);
        registry
    }

    /// Register an operation type. A later registration with the same ID
    /// replaces the earlier one.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn Operation> + Send + Sync + 'static,
    {
        let metadata = factory().metadata();
        let id = metadata.id.clone();
        let category = metadata.category;

        if let Some(previous) = self.operations.get(&id) {
            log::warn!("Operation '{}' registered twice; replacing it", id);
            let old_category = previous.metadata.category;
            if let Some(ids) = self.categories.get_mut(&old_category) {
                ids.retain(|i| i != &id);
            }
        }

        self.operations.insert(
            id.clone(),
            RegistryEntry {
                factory: Arc::new(factory),
                metadata,
                enabled: true,
            },
        );
        self.categories.entry(category).or_default().push(id);
    }

    /// Register an operation whose instances share state built by `setup`.
    ///
    /// `setup` runs at most once per state type `S` over the lifetime of the
    /// registry, however many operations ask for it.
    pub fn register_with_setup<S, I, F>(&mut self, setup: I, factory: F)
    where
        S: Send + Sync + 'static,
        I: FnOnce() -> S,
        F: Fn(Arc<S>) -> Box<dyn Operation> + Send + Sync + 'static,
    {
        let state = self.shared_state(setup);
        self.register(move || factory(Arc::clone(&state)));
    }

    /// The shared state of type `S`, running `setup` if it does not exist yet.
    pub fn shared_state<S, I>(&mut self, setup: I) -> Arc<S>
    where
        S: Send + Sync + 'static,
        I: FnOnce() -> S,
    {
        let key = TypeId::of::<S>();
        if let Some(existing) = self
            .shared
            .get(&key)
            .and_then(|s| Arc::clone(s).downcast::<S>().ok())
        {
            return existing;
        }

        log::debug!("Running setup for {}", std::any::type_name::<S>());
        let state = Arc::new(setup());
        self.shared.insert(key, state.clone());
        state
    }

    /// Create a new instance of an operation by ID.
    pub fn create(&self, id: &str) -> Option<Box<dyn Operation>> {
        self.operations
            .get(id)
            .filter(|e| e.enabled)
            .map(|e| (e.factory)())
    }

    /// Get metadata for an operation without creating an instance.
    pub fn get_metadata(&self, id: &str) -> Option<&OperationMetadata> {
        self.operations.get(id).map(|e| &e.metadata)
    }

    /// Check if an operation is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.operations.contains_key(id)
    }

    /// All registered operation IDs, in registration order.
    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(|s| s.as_str())
    }

    /// Get operations by category.
    pub fn by_category(&self, category: &Category) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Categories with at least one registered operation.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(c, _)| c)
    }

    /// Search operations by id, name, description or tag.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();

        self.operations
            .iter()
            .filter(|(_, entry)| {
                let m = &entry.metadata;
                m.id.to_lowercase().contains(&query)
                    || m.name.to_lowercase().contains(&query)
                    || m.description.to_lowercase().contains(&query)
                    || m.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Enable or disable an operation.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        if let Some(entry) = self.operations.get_mut(id) {
            entry.enabled = enabled;
            true
        } else {
            false
        }
    }

    /// Unregister an operation.
    pub fn unregister(&mut self, id: &str) -> bool {
        if let Some(entry) = self.operations.shift_remove(id) {
            if let Some(ids) = self.categories.get_mut(&entry.metadata.category) {
                ids.retain(|i| i != id);
            }
            true
        } else {
            false
        }
    }

    /// Get the total number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Enabled operations grouped by category, each group sorted by name.
    pub fn grouped_by_category(&self) -> IndexMap<Category, Vec<&OperationMetadata>> {
        let mut grouped: IndexMap<Category, Vec<&OperationMetadata>> = IndexMap::new();

        for entry in self.operations.values().filter(|e| e.enabled) {
            grouped
                .entry(entry.metadata.category)
                .or_default()
                .push(&entry.metadata);
        }
        for operations in grouped.values_mut() {
            operations.sort_by(|a, b| a.name.cmp(&b.name));
        }

        grouped
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
