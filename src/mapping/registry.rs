//! Per-source binding registry
//!
//! Written by the configuration layer, read by the polling/event thread. A
//! single mutex covers reads and writes; it is held only for the map
//! operation itself, never across device I/O. Bindings are stored behind
//! `Arc` so a lookup hands out a complete binding that later writes cannot
//! tear.

use crate::input::{InputIdentity, InputSource};
use crate::mapping::binding::{Binding, BindingError};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct BindingRegistry {
    source: InputSource,
    bindings: Mutex<HashMap<InputIdentity, Arc<Binding>>>,
}

impl BindingRegistry {
    pub fn new(source: InputSource) -> Self {
        Self {
            source,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> InputSource {
        self.source
    }

    fn map(&self) -> MutexGuard<'_, HashMap<InputIdentity, Arc<Binding>>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the binding for `binding.input`.
    ///
    /// Returns the binding it replaced, if any.
    pub fn set(&self, binding: Binding) -> Result<Option<Arc<Binding>>, BindingError> {
        let actual = binding.input.source();
        if actual != self.source {
            return Err(BindingError::WrongSource {
                input: binding.input.to_token(),
                expected: self.source,
                actual,
            });
        }
        binding.validate()?;

        let input = binding.input;
        let previous = self.map().insert(input, Arc::new(binding));
        if previous.is_some() {
            warn!("{} binding for '{}' replaced", self.source, input);
        } else {
            debug!("{} binding added for '{}'", self.source, input);
        }
        Ok(previous)
    }

    pub fn remove(&self, input: &InputIdentity) -> Option<Arc<Binding>> {
        self.map().remove(input)
    }

    pub fn clear(&self) {
        self.map().clear();
    }

    /// Hold the registry for a batch of lookups. Writers wait until the
    /// guard is dropped, so every lookup through it sees the same bindings.
    pub fn read(&self) -> MutexGuard<'_, HashMap<InputIdentity, Arc<Binding>>> {
        self.map()
    }

    pub fn lookup(&self, input: &InputIdentity) -> Option<Arc<Binding>> {
        self.map().get(input).cloned()
    }

    /// Point-in-time copy of every binding, in no particular order.
    pub fn snapshot(&self) -> Vec<Arc<Binding>> {
        self.map().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
