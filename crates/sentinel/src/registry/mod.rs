//! Resolution of configured module paths to task factories.
//!
//! The [`TaskRegistry`] stores task factories keyed by the name used in the
//! `module-path` field of plugin entries. Duplicate registrations for the same
//! name are rejected.

use std::collections::HashMap;
use std::fmt;

use crate::error::{ResolveError, SentinelError};
use crate::task::{Task, TaskFactory, factory};

/// Turns a configured module path into a constructible task type.
pub trait TaskResolver {
    /// Looks up the factory for `module_path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when no usable task type is known under
    /// that path.
    fn resolve(&self, module_path: &str) -> Result<TaskFactory, ResolveError>;
}

impl<T> TaskResolver for &T
where
    T: TaskResolver + ?Sized,
{
    fn resolve(&self, module_path: &str) -> Result<TaskFactory, ResolveError> {
        (**self).resolve(module_path)
    }
}

/// Name-keyed map of task factories.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Registration`] if the name is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: TaskFactory,
    ) -> Result<(), SentinelError> {
        let key = name.into();
        if self.factories.contains_key(&key) {
            return Err(SentinelError::Registration { name: key });
        }
        self.factories.insert(key, factory);
        Ok(())
    }

    /// Registers a closure building tasks of type `T` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Registration`] if the name is already taken.
    pub fn register_fn<F, T>(
        &mut self,
        name: impl Into<String>,
        build: F,
    ) -> Result<(), SentinelError>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Task,
    {
        self.register(name, factory(build))
    }

    /// Looks up a factory by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TaskFactory> {
        self.factories.get(name)
    }

    /// Returns the number of registered task types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl TaskResolver for TaskRegistry {
    fn resolve(&self, module_path: &str) -> Result<TaskFactory, ResolveError> {
        if module_path.trim().is_empty() {
            return Err(ResolveError::Invalid {
                module_path: module_path.to_owned(),
                message: String::from("module path is empty"),
            });
        }
        self.get(module_path)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                module_path: module_path.to_owned(),
            })
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TaskRegistry").field("tasks", &names).finish()
    }
}
