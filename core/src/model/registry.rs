//! model/registry.rs
//! Name-keyed type table; the default `TypeResolver`.

use std::collections::HashMap;
use std::rc::Rc;

use crate::collab::TypeResolver;
use crate::model::typedef::{TypeRef, TypeVariant};

#[derive(Default)]
pub struct TypeRegistry {
    by_name: HashMap<String, TypeRef>,
    proxies: HashMap<Vec<String>, TypeRef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ty`; a later registration under the same name replaces it.
    pub fn register(&mut self, ty: &TypeRef) -> &mut Self {
        if ty.variant() == TypeVariant::Proxy {
            self.proxies.insert(ty.interfaces().to_vec(), Rc::clone(ty));
        }
        self.by_name.insert(ty.name().to_string(), Rc::clone(ty));
        self
    }

    /// Register `ty` and every ancestor.
    pub fn register_hierarchy(&mut self, ty: &TypeRef) -> &mut Self {
        let mut cur = Some(ty);
        while let Some(t) = cur {
            self.register(t);
            cur = t.super_type();
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeRef> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve(&self, name: &str, _fingerprint: Option<i64>) -> Option<TypeRef> {
        self.by_name.get(name).cloned()
    }

    fn resolve_proxy(&self, interfaces: &[String]) -> Option<TypeRef> {
        self.proxies.get(interfaces).cloned()
    }
}
