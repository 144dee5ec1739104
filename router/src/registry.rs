//! Process-wide registry of router instances, for operator introspection.
//!
//! Grounded on `RelayLogServerMachine`'s `lazy_static!` singleton backed
//! by an `RwLock<HashMap<...>>`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::instance::RouterInstance;

lazy_static! {
    static ref REGISTRY: Registry = Registry::default();
}

#[derive(Default)]
pub struct Registry {
    instances: RwLock<HashMap<String, Arc<RouterInstance>>>,
}

impl Registry {
    pub fn get_instance() -> &'static Registry {
        &REGISTRY
    }

    pub fn register(&self, instance: Arc<RouterInstance>) {
        let mut instances = self.instances.write().unwrap();
        instances.insert(instance.name.clone(), instance);
    }

    pub fn get(&self, name: &str) -> Option<Arc<RouterInstance>> {
        self.instances.read().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.instances.read().unwrap().keys().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<RouterInstance>> {
        self.instances.write().unwrap().remove(name)
    }
}
