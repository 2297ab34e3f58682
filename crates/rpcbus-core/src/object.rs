use std::collections::BTreeMap;

use rpcbus_socket::IdPool;
use rpcbus_value::Value;

use crate::error::{BusError, Result};
use crate::method::Method;

/// A named group of methods registered on a context.
#[derive(Debug, Clone)]
pub struct Object {
    id: u32,
    name: String,
    methods: Vec<Method>,
}

impl Object {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Builder form of [`add_method`](Self::add_method).
    pub fn with_method(mut self, method: Method) -> Result<Self> {
        self.add_method(method)?;
        Ok(self)
    }

    pub fn add_method(&mut self, method: Method) -> Result<()> {
        if self.find_method(method.name()).is_some() {
            return Err(BusError::DuplicateMethod {
                object: self.name.clone(),
                method: method.name().to_string(),
            });
        }
        self.methods.push(method);
        Ok(())
    }

    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|method| method.name() == name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry id, 0 until registered.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Method table for discovery: method name to signature.
    pub fn serialize(&self) -> Value {
        Value::Table(
            self.methods
                .iter()
                .map(|method| (method.name().to_string(), method.signature().clone()))
                .collect(),
        )
    }
}

/// Objects owned by one context, keyed by name.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    by_name: BTreeMap<String, Object>,
    ids: IdPool,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object and return its id.
    pub fn register(&mut self, mut object: Object) -> Result<u32> {
        if self.by_name.contains_key(object.name()) {
            return Err(BusError::DuplicateObject(object.name));
        }
        object.id = self.ids.allocate(0).ok_or(BusError::IdsExhausted)?;
        let id = object.id;
        self.by_name.insert(object.name.clone(), object);
        Ok(id)
    }

    pub fn unregister(&mut self, name: &str) -> Option<Object> {
        let mut object = self.by_name.remove(name)?;
        self.ids.free(object.id);
        object.id = 0;
        Some(object)
    }

    pub fn find(&self, name: &str) -> Option<&Object> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.by_name.clear();
        self.ids = IdPool::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    fn noop(name: &str) -> Method {
        Method::new(name, |_, _| Status::Ok)
    }

    #[test]
    fn test_register_and_find() {
        let mut registry = ObjectRegistry::new();
        let object = Object::new("/a").with_method(noop("m")).unwrap();
        let id = registry.register(object).unwrap();
        assert_ne!(id, 0);
        let found = registry.find("/a").unwrap();
        assert_eq!(found.id(), id);
        assert!(found.find_method("m").is_some());
        assert!(found.find_method("x").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = ObjectRegistry::new();
        registry.register(Object::new("/a")).unwrap();
        assert!(matches!(
            registry.register(Object::new("/a")),
            Err(BusError::DuplicateObject(name)) if name == "/a"
        ));

        let mut object = Object::new("/b");
        object.add_method(noop("m")).unwrap();
        assert!(matches!(
            object.add_method(noop("m")),
            Err(BusError::DuplicateMethod { .. })
        ));
    }

    #[test]
    fn test_unregister_allows_reuse() {
        let mut registry = ObjectRegistry::new();
        registry.register(Object::new("/a")).unwrap();
        let removed = registry.unregister("/a").unwrap();
        assert_eq!(removed.id(), 0);
        assert!(registry.is_empty());
        registry.register(Object::new("/a")).unwrap();
        assert!(registry.unregister("/missing").is_none());
    }

    #[test]
    fn test_serialize_method_table() {
        let object = Object::new("/path/to/object")
            .with_method(noop("my.object.test").param("name_int", "i"))
            .unwrap()
            .with_method(noop("other"))
            .unwrap();
        let table = object.serialize();
        let names: Vec<&str> = table.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["my.object.test", "other"]);
        assert_eq!(
            table.get("my.object.test").map(|sig| sig.children().len()),
            Some(1)
        );
    }
}
