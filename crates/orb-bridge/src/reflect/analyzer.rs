//! Class analysis and the process-wide memo.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use super::class::{ClassDescriptor, MethodDef};
use crate::localarg;

/// Index key of a method map: method name plus wire arity (declared arity
/// minus context-resolved parameters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub name: String,
    pub arity: usize,
}

impl MethodKey {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        MethodKey {
            name: name.into(),
            arity,
        }
    }
}

/// A method map entry: a single method when the key is unambiguous, a
/// candidate list when overloads collide on `(name, arity)`.
#[derive(Clone)]
pub enum MethodEntry {
    Single(Arc<MethodDef>),
    Overloaded(Vec<Arc<MethodDef>>),
}

/// Digested reflection of one class: its instance and static method maps.
/// Shared immutably process-wide.
pub struct ClassData {
    descriptor: Arc<ClassDescriptor>,
    method_map: HashMap<MethodKey, MethodEntry>,
    static_method_map: HashMap<MethodKey, MethodEntry>,
}

impl ClassData {
    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.descriptor
    }

    pub fn method_map(&self) -> &HashMap<MethodKey, MethodEntry> {
        &self.method_map
    }

    pub fn static_method_map(&self) -> &HashMap<MethodKey, MethodEntry> {
        &self.static_method_map
    }
}

/// Analyzes descriptors into [`ClassData`], memoizing per descriptor.
pub struct ClassAnalyzer;

impl ClassAnalyzer {
    /// The memoized analysis of `descriptor`. Thread-safe and
    /// populate-once; cached entries keep their descriptor alive, so a
    /// cache key (the descriptor address) is never reused.
    pub fn class_data(descriptor: &Arc<ClassDescriptor>) -> Arc<ClassData> {
        static CACHE: OnceLock<Mutex<HashMap<usize, Arc<ClassData>>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
        let key = Arc::as_ptr(descriptor) as usize;
        let mut cache = cache.lock().unwrap();
        if let Some(data) = cache.get(&key) {
            return data.clone();
        }
        let data = Arc::new(Self::analyze(descriptor));
        cache.insert(key, data.clone());
        data
    }

    fn analyze(descriptor: &Arc<ClassDescriptor>) -> ClassData {
        debug!(class = descriptor.name(), "analyzing class");
        let mut method_map = HashMap::new();
        let mut static_method_map = HashMap::new();
        for method in descriptor.methods() {
            let wire_arity = method
                .params()
                .iter()
                .filter(|param| !localarg::is_local_arg(param))
                .count();
            let key = MethodKey::new(method.name(), wire_arity);
            let map = if method.is_static() {
                &mut static_method_map
            } else {
                &mut method_map
            };
            match map.remove(&key) {
                None => {
                    map.insert(key, MethodEntry::Single(method.clone()));
                }
                Some(MethodEntry::Single(existing)) => {
                    map.insert(key, MethodEntry::Overloaded(vec![existing, method.clone()]));
                }
                Some(MethodEntry::Overloaded(mut existing)) => {
                    existing.push(method.clone());
                    map.insert(key, MethodEntry::Overloaded(existing));
                }
            }
        }
        ClassData {
            descriptor: descriptor.clone(),
            method_map,
            static_method_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDesc;
    use crate::value::Value;

    struct Svc;

    fn overloaded_class() -> Arc<ClassDescriptor> {
        ClassDescriptor::builder("Svc")
            .instance_method("f", vec![TypeDesc::Int], |_: &Svc, _| Ok(Value::Null))
            .instance_method("f", vec![TypeDesc::String], |_: &Svc, _| Ok(Value::Null))
            .instance_method("f", vec![TypeDesc::Int, TypeDesc::Int], |_: &Svc, _| {
                Ok(Value::Null)
            })
            .static_method("g", vec![], |_| Ok(Value::Null))
            .build()
    }

    #[test]
    fn test_overloads_share_a_key() {
        let data = ClassAnalyzer::class_data(&overloaded_class());
        match data.method_map().get(&MethodKey::new("f", 1)) {
            Some(MethodEntry::Overloaded(methods)) => assert_eq!(methods.len(), 2),
            _ => panic!("expected an overloaded entry for f/1"),
        }
        assert!(matches!(
            data.method_map().get(&MethodKey::new("f", 2)),
            Some(MethodEntry::Single(_))
        ));
        assert!(matches!(
            data.static_method_map().get(&MethodKey::new("g", 0)),
            Some(MethodEntry::Single(_))
        ));
        assert!(data.method_map().get(&MethodKey::new("g", 0)).is_none());
    }

    #[test]
    fn test_memo_returns_same_analysis() {
        let class = overloaded_class();
        let first = ClassAnalyzer::class_data(&class);
        let second = ClassAnalyzer::class_data(&class);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
