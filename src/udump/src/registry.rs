//! Entity registry
//!
//! A per-run name table mapping short names to entity handles. Names are
//! registered first-writer-wins; a later entity with an already-taken name
//! is renamed with a numbered `dup_` suffix and the original name joins the
//! duplicated set, which marks it permanently non-resolvable for field
//! types (there is no way to tell which duplicate such a field meant).

use std::collections::{HashMap, HashSet};

use crate::model::EntityRef;

/// What [`Registry::register`] did with a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    /// The name was taken; the entity was registered under this new name
    Renamed(String),
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, EntityRef>,
    duplicated: HashSet<String>,
    dup_counter: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity under a short name.
    ///
    /// On collision the earlier entry keeps the name; the new entity is
    /// registered under `<name>dup_<n>` and the caller must rename the
    /// entity itself to match the returned name.
    pub fn register(&mut self, name: &str, entity: EntityRef) -> RegisterOutcome {
        if !self.entries.contains_key(name) {
            self.entries.insert(name.to_string(), entity);
            return RegisterOutcome::Inserted;
        }

        self.duplicated.insert(name.to_string());
        let renamed = format!("{}dup_{}", name, self.dup_counter);
        self.dup_counter += 1;
        self.entries.insert(renamed.clone(), entity);
        RegisterOutcome::Renamed(renamed)
    }

    pub fn get(&self, name: &str) -> Option<&EntityRef> {
        self.entries.get(name)
    }

    /// Whether a name collided at registration time and can no longer be
    /// resolved from field types
    pub fn is_duplicated(&self, name: &str) -> bool {
        self.duplicated.contains(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &EntityRef)> {
        self.entries.iter()
    }

    pub fn duplicated_names(&self) -> impl Iterator<Item = &String> {
        self.duplicated.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn struct_ref(package: usize, index: usize) -> EntityRef {
        EntityRef::Struct { package, index }
    }

    #[test]
    fn test_first_writer_wins() {
        let mut r = Registry::new();
        assert_eq!(
            r.register("FVector", struct_ref(0, 0)),
            RegisterOutcome::Inserted
        );
        assert_eq!(
            r.register("FVector", struct_ref(3, 7)),
            RegisterOutcome::Renamed("FVectordup_0".into())
        );

        assert_eq!(r.get("FVector"), Some(&struct_ref(0, 0)));
        assert_eq!(r.get("FVectordup_0"), Some(&struct_ref(3, 7)));
        assert!(r.is_duplicated("FVector"));
        assert!(!r.is_duplicated("FVectordup_0"));
    }

    #[test]
    fn test_dup_counter_is_global() {
        let mut r = Registry::new();
        r.register("A", struct_ref(0, 0));
        r.register("B", struct_ref(0, 1));
        assert_eq!(
            r.register("A", struct_ref(1, 0)),
            RegisterOutcome::Renamed("Adup_0".into())
        );
        assert_eq!(
            r.register("B", struct_ref(1, 1)),
            RegisterOutcome::Renamed("Bdup_1".into())
        );
        assert_eq!(r.len(), 4);
    }
}
