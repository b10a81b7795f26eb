//! Local argument resolution.
//!
//! Some parameter types are resolved from the transport context instead
//! of the wire: the slot is stripped from the exported signature and
//! filled at invocation time (a request-info object, a session handle).
//! The registry is process-wide, keyed by `(argument type, context type)`.

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock, RwLock};

use orb_common::protocol::{InvokeError, UnmarshalError};
use tracing::info;

use crate::types::TypeDesc;
use crate::value::Value;

/// Derives an argument value from a transport context entry.
pub trait LocalArgResolver: Send + Sync {
    fn resolve(&self, context: &(dyn Any + Send + Sync)) -> Result<Value, InvokeError>;
}

impl<F> LocalArgResolver for F
where
    F: Fn(&(dyn Any + Send + Sync)) -> Result<Value, InvokeError> + Send + Sync,
{
    fn resolve(&self, context: &(dyn Any + Send + Sync)) -> Result<Value, InvokeError> {
        self(context)
    }
}

struct LocalArgEntry {
    arg_type: TypeDesc,
    context_type: TypeId,
    resolver: Arc<dyn LocalArgResolver>,
}

fn registry() -> &'static RwLock<Vec<LocalArgEntry>> {
    static REGISTRY: OnceLock<RwLock<Vec<LocalArgEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}

/// Registers a resolver for `arg_type` against contexts of
/// `context_type`. Parameters of this type disappear from wire
/// signatures.
pub fn register_local_arg_resolver(
    arg_type: TypeDesc,
    context_type: TypeId,
    resolver: Arc<dyn LocalArgResolver>,
) {
    info!(arg_type = %arg_type, "registered local arg resolver");
    registry().write().unwrap().push(LocalArgEntry {
        arg_type,
        context_type,
        resolver,
    });
}

/// Removes a previously registered resolver pairing. No error if absent.
pub fn unregister_local_arg_resolver(arg_type: &TypeDesc, context_type: TypeId) {
    registry()
        .write()
        .unwrap()
        .retain(|entry| !(entry.arg_type == *arg_type && entry.context_type == context_type));
}

/// Whether parameters of this type are context-resolved.
pub fn is_local_arg(arg_type: &TypeDesc) -> bool {
    registry()
        .read()
        .unwrap()
        .iter()
        .any(|entry| entry.arg_type == *arg_type)
}

/// Resolves a context-resolved argument from the transport context
/// entries.
pub fn resolve_local_arg(
    context: &[Arc<dyn Any + Send + Sync>],
    arg_type: &TypeDesc,
) -> Result<Value, UnmarshalError> {
    let entries = registry().read().unwrap();
    for entry in entries.iter().filter(|entry| entry.arg_type == *arg_type) {
        for ctx in context {
            if (**ctx).type_id() == entry.context_type {
                return entry
                    .resolver
                    .resolve(&**ctx)
                    .map_err(|e| UnmarshalError::bad_value(arg_type.to_string(), e.message));
            }
        }
    }
    Err(UnmarshalError::bad_value(
        arg_type.to_string(),
        "no context entry resolves this argument",
    ))
}
