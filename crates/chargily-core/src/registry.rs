//! The application registry: id → [`Application`], in insertion order.
//!
//! Order has no meaning for lookups but keeps listings stable across runs, so
//! the registry is a small ordered vector rather than a hash map. It
//! serializes as a plain JSON object and rejects duplicate keys on load.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::Application;

/// All configured applications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    entries: Vec<(String, Application)>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Application> {
        self.position(id).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Application> {
        self.position(id).map(|i| &mut self.entries[i].1)
    }

    /// Insert or replace. A replaced entry keeps its position.
    pub fn insert(&mut self, id: impl Into<String>, app: Application) -> Option<Application> {
        let id = id.into();
        match self.position(&id) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, app)),
            None => {
                self.entries.push((id, app));
                None
            }
        }
    }

    /// Remove an entry, keeping the order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<Application> {
        self.position(id).map(|i| self.entries.remove(i).1)
    }

    /// Ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Application)> {
        self.entries.iter().map(|(id, app)| (id.as_str(), app))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == id)
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = (&'a str, &'a Application);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl Serialize for Registry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, app) in &self.entries {
            map.serialize_entry(id, app)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Registry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RegistryVisitor;

        impl<'de> Visitor<'de> for RegistryVisitor {
            type Value = Registry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of application id to application")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Registry, A::Error> {
                let mut registry = Registry::new();
                while let Some((id, app)) = access.next_entry::<String, Application>()? {
                    if registry.contains(&id) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate application id '{id}'"
                        )));
                    }
                    registry.entries.push((id, app));
                }
                Ok(registry)
            }
        }

        deserializer.deserialize_map(RegistryVisitor)
    }
}
