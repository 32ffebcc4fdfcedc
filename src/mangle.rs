//! Global-uniqueness name mangling.
//!
//! Every origin (a file path or module specifier) gets a short stable id,
//! and a binding `name` from that origin surfaces as `name_<id>` while the
//! optimizer runs. The table keeps both directions so a post pass can turn
//! the surface name back into the original by literal match.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::diagnostics::Anomaly;

const ID_LENGTH: usize = 6;
const DYNAMIC_IMPORT_ORIGIN: &str = "\0dynamic-import";

#[derive(Debug, Default)]
pub struct Mangler {
    salt: u64,
    origin_to_id: HashMap<String, String>,
    id_to_origin: HashMap<String, String>,
    /// `(name, origin id)` to surface name.
    forward: HashMap<(String, String), String>,
    /// Surface name to original name.
    inverse: HashMap<String, String>,
    anomalies: Vec<Anomaly>,
}

impl Mangler {
    pub fn new(salt: u64) -> Self {
        Mangler {
            salt,
            ..Default::default()
        }
    }

    pub fn salt(&self) -> u64 {
        self.salt
    }

    /// Idempotent: the same origin always yields the same id.
    pub fn origin_id(&mut self, origin: &str) -> String {
        if let Some(id) = self.origin_to_id.get(origin) {
            return id.clone();
        }
        let mut attempt = 0u32;
        let id = loop {
            let candidate = hash_id(self.salt, origin, attempt);
            if !self.id_to_origin.contains_key(&candidate) {
                break candidate;
            }
            attempt += 1;
        };
        self.origin_to_id.insert(origin.to_string(), id.clone());
        self.id_to_origin.insert(id.clone(), origin.to_string());
        id
    }

    pub fn origin_of(&self, id: &str) -> Option<&str> {
        self.id_to_origin.get(id).map(|s| s.as_str())
    }

    /// Surface name for `name` coming from `origin_id`.
    ///
    /// The first registration of a surface name wins. A later, different
    /// claim on it is recorded as a `MangleCollision` and otherwise ignored.
    pub fn mangle(&mut self, name: &str, origin_id: &str) -> String {
        let computed = format!("{}_{}", name, origin_id);
        let key = (name.to_string(), origin_id.to_string());

        if let Some(existing) = self.forward.get(&key) {
            if *existing != computed {
                let existing = existing.clone();
                self.anomalies.push(Anomaly::mangle_collision(format!(
                    "`{}` from origin {} already mangled to `{}`, ignoring `{}`",
                    name, origin_id, existing, computed
                )));
                return existing;
            }
            return computed;
        }

        match self.inverse.get(&computed) {
            Some(original) if original != name => {
                self.anomalies.push(Anomaly::mangle_collision(format!(
                    "surface name `{}` already resolves to `{}`, not registering `{}`",
                    computed, original, name
                )));
            }
            Some(_) => {}
            None => {
                self.inverse.insert(computed.clone(), name.to_string());
            }
        }
        self.forward.insert(key, computed.clone());
        computed
    }

    /// Original name of a surface name produced by `mangle`.
    pub fn resolve(&self, mangled: &str) -> Option<&str> {
        self.inverse.get(mangled).map(|s| s.as_str())
    }

    /// Surface name previously assigned to `(name, origin_id)`.
    pub fn mangled_name(&self, name: &str, origin_id: &str) -> Option<&str> {
        self.forward
            .get(&(name.to_string(), origin_id.to_string()))
            .map(|s| s.as_str())
    }

    /// Global function name that stands in for the `import(...)` keyword
    /// while the optimizer runs.
    pub fn dynamic_import_name(&mut self) -> String {
        let id = self.origin_id(DYNAMIC_IMPORT_ORIGIN);
        self.mangle("import", &id)
    }

    pub fn take_anomalies(&mut self) -> Vec<Anomaly> {
        std::mem::take(&mut self.anomalies)
    }
}

fn hash_id(salt: u64, origin: &str, attempt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.to_le_bytes());
    hasher.update(origin.as_bytes());
    if attempt > 0 {
        hasher.update(attempt.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut value = u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);
    let mut id = String::with_capacity(ID_LENGTH);
    for _ in 0..ID_LENGTH {
        let digit = (value % 36) as u32;
        value /= 36;
        id.push(std::char::from_digit(digit, 36).unwrap_or('0'));
    }
    id
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// One mangler shared by every unit of a build. Each call holds the lock for
/// the whole read-modify-write on the registry.
///
/// Every handle made by `for_unit` shares the registry but keeps its own
/// anomaly list, so a collision is reported to the unit whose call caused it.
#[derive(Debug, Clone, Default)]
pub struct SharedMangler {
    registry: Arc<Mutex<Mangler>>,
    anomalies: Arc<Mutex<Vec<Anomaly>>>,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic in another unit leaves the tables consistent: every mutation
    // is a single insert.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SharedMangler {
    pub fn new(salt: u64) -> Self {
        SharedMangler {
            registry: Arc::new(Mutex::new(Mangler::new(salt))),
            anomalies: Arc::default(),
        }
    }

    /// Handle on the same registry with an empty anomaly list.
    pub fn for_unit(&self) -> Self {
        SharedMangler {
            registry: Arc::clone(&self.registry),
            anomalies: Arc::default(),
        }
    }

    /// Runs `f` under the registry lock. Anomalies `f` caused are taken out
    /// under that same lock, so no other handle can claim them.
    fn with_registry<T>(&self, f: impl FnOnce(&mut Mangler) -> T) -> T {
        let mut registry = relock(&self.registry);
        let out = f(&mut registry);
        let reported = registry.take_anomalies();
        drop(registry);
        if !reported.is_empty() {
            relock(&self.anomalies).extend(reported);
        }
        out
    }

    pub fn origin_id(&self, origin: &str) -> String {
        self.with_registry(|m| m.origin_id(origin))
    }

    pub fn mangle(&self, name: &str, origin_id: &str) -> String {
        self.with_registry(|m| m.mangle(name, origin_id))
    }

    pub fn dynamic_import_name(&self) -> String {
        self.with_registry(|m| m.dynamic_import_name())
    }

    pub fn resolve(&self, mangled: &str) -> Option<String> {
        self.with_registry(|m| m.resolve(mangled).map(|s| s.to_string()))
    }

    /// Anomalies caused through this handle since the last call.
    pub fn take_anomalies(&self) -> Vec<Anomaly> {
        std::mem::take(&mut *relock(&self.anomalies))
    }
}
