//! Material subsystem seam
//!
//! The document core does not understand materials. It stores an opaque,
//! ordered property list per element ([`MaterialDescriptor`]) and hands it to
//! a [`MaterialCompiler`] collaborator whenever the element's geometry needs
//! a fresh stateset. The compiler owns an explicit cache object whose
//! lifetime is tied to the document ("new document" and "close document"
//! clear it); nothing material-related lives in module statics.

use std::collections::HashMap;

use crate::foundation::ident::ElementId;
use crate::params::{escape_payload, unescape_payload};

/// Library material id meaning "the element carries custom properties"
pub const MATERIAL_CUSTOM: i64 = -2;

/// Opaque handle to a compiled material stateset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatesetHandle(pub u64);

/// Ordered property list describing one element's material
///
/// The core treats keys and values as opaque strings; only the compiler
/// interprets them. Order is preserved because the serialized form must
/// round-trip byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialDescriptor {
    props: Vec<(String, String)>,
}

impl MaterialDescriptor {
    /// Create an empty descriptor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the descriptor carries no properties
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Set a property, replacing an existing value under the same key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.props.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.props.push((key, value));
        }
    }

    /// Get a property value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate properties in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize into the escaped single-field form used inside records
    #[must_use]
    pub fn to_wire(&self) -> String {
        let raw = self
            .props
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        escape_payload(&raw)
    }

    /// Parse the escaped single-field form back into a descriptor
    #[must_use]
    pub fn from_wire(escaped: &str) -> Self {
        let raw = unescape_payload(escaped);
        let mut descriptor = Self::new();
        if raw.is_empty() {
            return descriptor;
        }
        for pair in raw.split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                descriptor.props.push((key.to_string(), value.to_string()));
            } else {
                log::warn!("ignoring material property without separator: {pair:?}");
            }
        }
        descriptor
    }
}

/// Named snapshot of per-element material properties
///
/// Material states are created and mutated explicitly through document
/// messages and are never pruned automatically, even when an element they
/// refer to is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialState {
    /// User-visible snapshot name
    pub name: String,
    /// Serialized (escaped) material properties per element
    pub entries: Vec<(ElementId, String)>,
}

/// Compiles material descriptors into renderer statesets
///
/// Implemented by the material subsystem collaborator; the handle that comes
/// back is opaque to the core and is only ever forwarded to the scene graph
/// service.
pub trait MaterialCompiler {
    /// Compile (or fetch a cached) stateset for the descriptor
    fn compile_stateset(&mut self, descriptor: &MaterialDescriptor) -> StatesetHandle;

    /// Drop every cached stateset. Called on "new document" and
    /// "close document".
    fn clear(&mut self);
}

/// Default compiler: deduplicates by descriptor wire form
///
/// Stands in for the real shader pipeline. The cache is an owned object, not
/// process state, so two documents never share or leak each other's
/// statesets.
#[derive(Debug, Default)]
pub struct CachingCompiler {
    cache: HashMap<String, StatesetHandle>,
    next_handle: u64,
}

impl CachingCompiler {
    /// Create a compiler with an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct compiled statesets
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl MaterialCompiler for CachingCompiler {
    fn compile_stateset(&mut self, descriptor: &MaterialDescriptor) -> StatesetHandle {
        let key = descriptor.to_wire();
        if let Some(handle) = self.cache.get(&key) {
            return *handle;
        }
        let handle = StatesetHandle(self.next_handle);
        self.next_handle += 1;
        log::debug!("compiled stateset {} for {key:?}", handle.0);
        self.cache.insert(key, handle);
        handle
    }

    fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_wire_round_trip() {
        let mut descriptor = MaterialDescriptor::new();
        descriptor.set("diffuse", "0.5 0.25 0.1");
        descriptor.set("shininess", "32");

        let wire = descriptor.to_wire();
        // The wire form must be safe inside a record line.
        assert!(!wire.contains('=') && !wire.contains(' ') && !wire.contains(','));
        assert_eq!(MaterialDescriptor::from_wire(&wire), descriptor);
    }

    #[test]
    fn test_descriptor_set_replaces() {
        let mut descriptor = MaterialDescriptor::new();
        descriptor.set("alpha", "1");
        descriptor.set("alpha", "0.5");
        assert_eq!(descriptor.get("alpha"), Some("0.5"));
        assert_eq!(descriptor.iter().count(), 1);
    }

    #[test]
    fn test_compiler_deduplicates() {
        let mut compiler = CachingCompiler::new();
        let mut a = MaterialDescriptor::new();
        a.set("diffuse", "1 0 0");
        let mut b = MaterialDescriptor::new();
        b.set("diffuse", "0 1 0");

        let first = compiler.compile_stateset(&a);
        let second = compiler.compile_stateset(&a);
        let third = compiler.compile_stateset(&b);
        assert_eq!(first, second);
        assert_ne!(first, third);
        assert_eq!(compiler.len(), 2);
    }

    #[test]
    fn test_compiler_clear() {
        let mut compiler = CachingCompiler::new();
        compiler.compile_stateset(&MaterialDescriptor::new());
        assert!(!compiler.is_empty());
        compiler.clear();
        assert!(compiler.is_empty());
    }
}
