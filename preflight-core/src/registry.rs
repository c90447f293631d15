use crate::validation::Validator;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A collection of validators keyed by name.
///
/// One process-wide instance backs the module-level functions below;
/// tests build their own instances to avoid cross-test pollution.
pub struct Registry {
    validators: RwLock<HashMap<String, Arc<dyn Validator>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            validators: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a validator, replacing any existing entry with the same
    /// name. The global registry is stricter, see [`register`].
    pub fn register(&self, v: Arc<dyn Validator>) {
        let name = v.metadata().name;
        self.validators.write().unwrap().insert(name, v);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Validator>> {
        self.validators.read().unwrap().get(name).cloned()
    }

    /// All registered validators, in no particular order. The resolver
    /// imposes execution order.
    pub fn get_all(&self) -> Vec<Arc<dyn Validator>> {
        self.validators.read().unwrap().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.validators.write().unwrap().clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: OnceLock<Registry> = OnceLock::new();

fn global() -> &'static Registry {
    GLOBAL_REGISTRY.get_or_init(Registry::new)
}

/// Register a validator with the global registry. Called once per
/// validator during startup.
///
/// # Panics
///
/// Panics if a validator with the same name is already registered;
/// duplicate names are a programmer error.
pub fn register(v: Arc<dyn Validator>) {
    let name = v.metadata().name;
    // Release the lock before panicking so a duplicate cannot poison
    // the registry for other callers.
    {
        let mut validators = global().validators.write().unwrap();
        if !validators.contains_key(&name) {
            validators.insert(name, v);
            return;
        }
    }
    panic!("validator already registered: {name}");
}

pub fn get(name: &str) -> Option<Arc<dyn Validator>> {
    global().get(name)
}

pub fn get_all() -> Vec<Arc<dyn Validator>> {
    global().get_all()
}

/// Empty the global registry. For tests only.
pub fn clear_registry() {
    global().clear();
}
