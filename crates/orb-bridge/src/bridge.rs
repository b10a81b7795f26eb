//! The bridge.
//!
//! A bridge unmarshals JSON-RPC requests, resolves the encoded method
//! against its registration tables, invokes it, and marshals the result
//! into an envelope. One process-wide global bridge holds default
//! registrations; any number of session-scoped bridges layer on top of
//! it, checking their own tables first and delegating unresolved object
//! and class lookups to the global bridge exactly once.
//!
//! ```
//! use orb_bridge::bridge::Bridge;
//! use orb_bridge::reflect::ClassDescriptor;
//! use orb_bridge::types::TypeDesc;
//! use orb_bridge::value::Value;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Echo;
//! let class = ClassDescriptor::builder("Echo")
//!     .instance_method("echo", vec![TypeDesc::Int], |_: &Echo, args| Ok(args[0].clone()))
//!     .build();
//!
//! let bridge = Bridge::new();
//! bridge.register_object("echo", Arc::new(Echo), &class).unwrap();
//!
//! let response = bridge.call(&[], &json!({"id": 1, "method": "echo.echo", "params": [42]}));
//! assert_eq!(response.to_value(), json!({"id": 1, "result": 42}));
//! ```

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::AtomicI64;
use std::sync::{Arc, Mutex};

use orb_common::protocol::fixups::display_path;
use orb_common::protocol::{
    parse_request, FixUp, FixupError, InvokeError, PathToken, RegistrationError, RpcResponse,
    UnmarshalError, CODE_ERR_MARSHAL, CODE_ERR_NOMETHOD, CODE_ERR_PARSE, CODE_ERR_UNMARSHAL,
    MSG_ERR_NOMETHOD,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::callback::{CallbackController, InvocationCallback};
use crate::localarg;
use crate::reflect::{ClassAnalyzer, ClassData, ClassDescriptor, MethodDef, Receiver};
use crate::resolver::resolve_method;
use crate::ser::reference::ReferenceSerializer;
use crate::ser::{Serializer, SerializerOptions, SerializerRegistry, SerializerState};
use crate::types::{BeanDescriptor, TypeRegistry};
use crate::value::{Value, ValueId};

/// Key of the object table: a human name for explicit registrations, an
/// integer handle for reference-typed instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    Name(String),
    Handle(i64),
}

/// A registered instance paired with the class it is exposed as. The
/// declared class limits which methods are reachable.
#[derive(Clone)]
pub struct ObjectInstance {
    pub object: Receiver,
    pub class: Arc<ClassDescriptor>,
}

/// The registration tables, guarded by one per-bridge mutex. Every value
/// keyed by handle in `object_map` also appears in `reference_map` under
/// the same handle.
#[derive(Default)]
pub(crate) struct BridgeTables {
    pub(crate) object_map: HashMap<ObjectKey, ObjectInstance>,
    pub(crate) class_map: HashMap<String, Arc<ClassDescriptor>>,
    pub(crate) reference_classes: HashMap<String, Arc<ClassDescriptor>>,
    pub(crate) callable_reference_classes: HashMap<String, Arc<ClassDescriptor>>,
    pub(crate) reference_map: HashMap<i64, ObjectInstance>,
    pub(crate) handle_by_identity: HashMap<ValueId, i64>,
}

/// Construction-time configuration of a bridge.
#[derive(Default)]
pub struct BridgeConfig {
    pub options: SerializerOptions,
    /// Custom serializers, consulted before the built-in ones.
    pub serializers: Vec<Arc<dyn Serializer>>,
}

pub struct Bridge {
    tables: Arc<Mutex<BridgeTables>>,
    serializer: SerializerRegistry,
    types: Arc<TypeRegistry>,
    callbacks: CallbackController,
    global: Option<Arc<Bridge>>,
}

impl Bridge {
    /// Creates a bridge that plays the global role: it holds default
    /// registrations, never delegates, and refuses reference
    /// registrations.
    pub fn new() -> Arc<Bridge> {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Arc<Bridge> {
        Self::build(None, config, Arc::new(TypeRegistry::new()))
    }

    /// Creates a session-scoped bridge that falls back to `global` for
    /// any unresolved object or class lookup. Bean and enum declarations
    /// are shared with the global bridge.
    pub fn session(global: &Arc<Bridge>) -> Arc<Bridge> {
        Self::session_with_config(global, BridgeConfig::default())
    }

    pub fn session_with_config(global: &Arc<Bridge>, config: BridgeConfig) -> Arc<Bridge> {
        Self::build(Some(global.clone()), config, global.types.clone())
    }

    fn build(
        global: Option<Arc<Bridge>>,
        config: BridgeConfig,
        types: Arc<TypeRegistry>,
    ) -> Arc<Bridge> {
        let tables = Arc::new(Mutex::new(BridgeTables::default()));
        let next_handle = Arc::new(AtomicI64::new(1));
        let mut serializer = SerializerRegistry::new(config.options, types.clone());
        for custom in config.serializers {
            serializer.register(custom);
        }
        serializer.register(Arc::new(ReferenceSerializer::new(
            tables.clone(),
            next_handle,
        )));
        Arc::new(Bridge {
            tables,
            serializer,
            types,
            callbacks: CallbackController::new(),
            global,
        })
    }

    pub fn is_global(&self) -> bool {
        self.global.is_none()
    }

    pub fn serializer(&self) -> &SerializerRegistry {
        &self.serializer
    }

    /// Registers an instance under a name, exposing the methods its
    /// declared class describes. Re-registering a name replaces the
    /// existing entry; the only failure is an instance that is not of the
    /// declared class.
    pub fn register_object(
        &self,
        name: impl Into<String>,
        object: Receiver,
        class: &Arc<ClassDescriptor>,
    ) -> Result<(), RegistrationError> {
        if !class.accepts_instance(&object) {
            return Err(RegistrationError::InvalidInterface(class.name().to_string()));
        }
        let name = name.into();
        let instance = ObjectInstance {
            object,
            class: class.clone(),
        };
        self.tables
            .lock()
            .unwrap()
            .object_map
            .insert(ObjectKey::Name(name.clone()), instance);
        info!(name = %name, class = class.name(), "registered object");
        Ok(())
    }

    pub fn unregister_object(&self, name: &str) {
        if self
            .tables
            .lock()
            .unwrap()
            .object_map
            .remove(&ObjectKey::Name(name.to_string()))
            .is_some()
        {
            info!(name, "unregistered object");
        }
    }

    /// Removes a reference-typed instance by handle. Later wire uses of
    /// the handle fail as stale.
    pub fn unregister_handle(&self, handle: i64) {
        let mut tables = self.tables.lock().unwrap();
        tables.object_map.remove(&ObjectKey::Handle(handle));
        if let Some(instance) = tables.reference_map.remove(&handle) {
            let identity = instance_identity(&instance);
            tables.handle_by_identity.remove(&identity);
            info!(handle, "unregistered object handle");
        }
    }

    pub fn lookup_object(&self, name: &str) -> Option<ObjectInstance> {
        self.tables
            .lock()
            .unwrap()
            .object_map
            .get(&ObjectKey::Name(name.to_string()))
            .cloned()
    }

    /// Registers a class to export its static methods. Idempotent for
    /// the same class; a different class under a taken name is a
    /// conflict.
    pub fn register_class(
        &self,
        name: impl Into<String>,
        class: &Arc<ClassDescriptor>,
    ) -> Result<(), RegistrationError> {
        let name = name.into();
        let mut tables = self.tables.lock().unwrap();
        match tables.class_map.get(&name) {
            Some(existing) if !Arc::ptr_eq(existing, class) => {
                Err(RegistrationError::NameConflict(name))
            }
            Some(_) => Ok(()),
            None => {
                tables.class_map.insert(name.clone(), class.clone());
                info!(name = %name, class = class.name(), "registered class");
                Ok(())
            }
        }
    }

    pub fn unregister_class(&self, name: &str) {
        if self.tables.lock().unwrap().class_map.remove(name).is_some() {
            info!(name, "unregistered class");
        }
    }

    pub fn lookup_class(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.tables.lock().unwrap().class_map.get(name).cloned()
    }

    /// Registers a class whose instances are replaced on the wire by an
    /// opaque reference handle. Forbidden on the global bridge.
    pub fn register_reference(
        &self,
        class: &Arc<ClassDescriptor>,
    ) -> Result<(), RegistrationError> {
        if self.is_global() {
            return Err(RegistrationError::GlobalScope);
        }
        self.tables
            .lock()
            .unwrap()
            .reference_classes
            .insert(class.name().to_string(), class.clone());
        info!(class = class.name(), "registered reference class");
        Ok(())
    }

    /// Registers a class whose references are additionally invocable via
    /// the `.obj#N.method` form. Forbidden on the global bridge.
    pub fn register_callable_reference(
        &self,
        class: &Arc<ClassDescriptor>,
    ) -> Result<(), RegistrationError> {
        if self.is_global() {
            return Err(RegistrationError::GlobalScope);
        }
        self.tables
            .lock()
            .unwrap()
            .callable_reference_classes
            .insert(class.name().to_string(), class.clone());
        info!(class = class.name(), "registered callable reference class");
        Ok(())
    }

    pub fn unregister_reference(&self, class_name: &str) {
        let mut tables = self.tables.lock().unwrap();
        tables.reference_classes.remove(class_name);
        tables.callable_reference_classes.remove(class_name);
    }

    pub fn is_reference(&self, class_name: &str) -> bool {
        if self
            .tables
            .lock()
            .unwrap()
            .reference_classes
            .contains_key(class_name)
        {
            return true;
        }
        self.global
            .as_ref()
            .is_some_and(|global| global.is_reference(class_name))
    }

    pub fn is_callable_reference(&self, class_name: &str) -> bool {
        if self
            .tables
            .lock()
            .unwrap()
            .callable_reference_classes
            .contains_key(class_name)
        {
            return true;
        }
        self.global
            .as_ref()
            .is_some_and(|global| global.is_callable_reference(class_name))
    }

    /// Declares a bean shape for the codecs. Shared with session bridges.
    pub fn register_bean(&self, bean: BeanDescriptor) {
        self.types.register_bean(bean);
    }

    /// Declares an enum's variant list for the codecs.
    pub fn register_enum(&self, name: impl Into<String>, variants: Vec<String>) {
        self.types.register_enum(name, variants);
    }

    pub fn register_callback(
        &self,
        callback: Arc<dyn InvocationCallback>,
        context_type: TypeId,
    ) {
        self.callbacks.register_callback(callback, context_type);
    }

    pub fn unregister_callback(
        &self,
        callback: &Arc<dyn InvocationCallback>,
        context_type: TypeId,
    ) {
        self.callbacks.unregister_callback(callback, context_type);
    }

    fn resolve_object(&self, key: &ObjectKey) -> Option<ObjectInstance> {
        if let Some(instance) = self.tables.lock().unwrap().object_map.get(key).cloned() {
            return Some(instance);
        }
        // The global bridge has no parent, so delegation is one hop.
        self.global.as_ref().and_then(|global| global.resolve_object(key))
    }

    fn resolve_class(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        if let Some(class) = self.tables.lock().unwrap().class_map.get(name).cloned() {
            return Some(class);
        }
        self.global.as_ref().and_then(|global| global.resolve_class(name))
    }

    /// Dispatches one request. `context` carries transport values handed
    /// to hooks and local-arg resolvers; every failure is recovered into
    /// an error envelope here.
    pub fn call(&self, context: &[Arc<dyn Any + Send + Sync>], request: &JsonValue) -> RpcResponse {
        let request_id = request.get("id").cloned().unwrap_or(JsonValue::Null);
        let req = match parse_request(request) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "rejecting unparseable request");
                return RpcResponse::error(request_id, CODE_ERR_PARSE, e.to_string());
            }
        };
        debug!(method = %req.method, id = %req.id, "dispatching call");

        if req.method == "system.listMethods" && req.params.is_empty() {
            let names = self
                .system_list_methods()
                .into_iter()
                .map(JsonValue::String)
                .collect();
            return RpcResponse::success(req.id, JsonValue::Array(names));
        }

        let (class_data, method_name, receiver, statics_only) =
            if let Some(rest) = req.method.strip_prefix(".obj#") {
                let Some((handle_text, method_name)) = rest.split_once('.') else {
                    return no_method(req.id);
                };
                let Ok(handle) = handle_text.parse::<i64>() else {
                    return no_method(req.id);
                };
                let Some(instance) = self.resolve_object(&ObjectKey::Handle(handle)) else {
                    return no_method(req.id);
                };
                let data = ClassAnalyzer::class_data(&instance.class);
                if method_name == "listMethods" && req.params.is_empty() {
                    let names = class_method_names(&data).into_iter().map(JsonValue::String).collect();
                    return RpcResponse::success(req.id, JsonValue::Array(names));
                }
                (data, method_name.to_string(), Some(instance.object), false)
            } else {
                let Some((class_name, method_name)) = req.method.split_once('.') else {
                    return no_method(req.id);
                };
                if let Some(instance) = self.resolve_object(&ObjectKey::Name(class_name.to_string()))
                {
                    (
                        ClassAnalyzer::class_data(&instance.class),
                        method_name.to_string(),
                        Some(instance.object),
                        false,
                    )
                } else if let Some(class) = self.resolve_class(class_name) {
                    (ClassAnalyzer::class_data(&class), method_name.to_string(), None, true)
                } else {
                    return no_method(req.id);
                }
            };

        // Instance targets resolve instance methods first, then the
        // statics of their class, so every listed method is callable.
        let (method, receiver) = if statics_only {
            match resolve_method(
                &self.serializer,
                class_data.static_method_map(),
                &method_name,
                &req.params,
            ) {
                Some(method) => (method, None),
                None => return no_method(req.id),
            }
        } else {
            match resolve_method(
                &self.serializer,
                class_data.method_map(),
                &method_name,
                &req.params,
            ) {
                Some(method) => (method, receiver),
                None => match resolve_method(
                    &self.serializer,
                    class_data.static_method_map(),
                    &method_name,
                    &req.params,
                ) {
                    Some(method) => (method, None),
                    None => return no_method(req.id),
                },
            }
        };

        let mut state = SerializerState::new();
        let mut args = match self.unmarshal_args(context, &mut state, &method, &req.params) {
            Ok(args) => args,
            Err(e) => {
                self.callbacks.invocation_error(
                    context,
                    receiver.as_ref(),
                    &method,
                    &InvokeError::new(e.to_string()),
                );
                return RpcResponse::error(req.id, CODE_ERR_UNMARSHAL, e.to_string());
            }
        };

        if let Err(e) = relink_arguments(&state, &mut args, &req.fixups) {
            return RpcResponse::error(req.id, CODE_ERR_PARSE, e.to_string());
        }

        if let Err(e) = self
            .callbacks
            .pre_invoke(context, receiver.as_ref(), &method, &args)
        {
            self.callbacks
                .invocation_error(context, receiver.as_ref(), &method, &e);
            return RpcResponse::remote_exception(req.id, &e);
        }

        debug!("invoking {}({})", method.name(), method.signature());
        let result = match method.invoke(receiver.as_ref(), &args) {
            Ok(result) => result,
            Err(e) => {
                self.callbacks
                    .invocation_error(context, receiver.as_ref(), &method, &e);
                return RpcResponse::remote_exception(req.id, &e);
            }
        };

        if let Err(e) = self
            .callbacks
            .post_invoke(context, receiver.as_ref(), &method, &result)
        {
            self.callbacks
                .invocation_error(context, receiver.as_ref(), &method, &e);
            return RpcResponse::remote_exception(req.id, &e);
        }

        match self.serializer.marshal(&mut state, "result", &result) {
            Ok(node) => {
                let fixups = state.take_fixups();
                RpcResponse::success_with_fixups(req.id, node, fixups)
            }
            Err(e) => {
                self.callbacks.invocation_error(
                    context,
                    receiver.as_ref(),
                    &method,
                    &InvokeError::new(e.to_string()),
                );
                RpcResponse::error(req.id, CODE_ERR_MARSHAL, e.to_string())
            }
        }
    }

    fn unmarshal_args(
        &self,
        context: &[Arc<dyn Any + Send + Sync>],
        state: &mut SerializerState,
        method: &MethodDef,
        params: &[JsonValue],
    ) -> Result<Vec<Value>, UnmarshalError> {
        let mut args = Vec::with_capacity(method.params().len());
        let mut wire_index = 0;
        for (i, param) in method.params().iter().enumerate() {
            if localarg::is_local_arg(param) {
                let value = localarg::resolve_local_arg(context, param)
                    .map_err(|e| UnmarshalError::arg(i + 1, e))?;
                args.push(value);
            } else {
                let path = vec![PathToken::ident("params"), PathToken::Index(wire_index)];
                let value = self
                    .serializer
                    .unmarshal(state, path, param, &params[wire_index])
                    .map_err(|e| UnmarshalError::arg(i + 1, e))?;
                args.push(value);
                wire_index += 1;
            }
        }
        Ok(args)
    }

    /// The sorted union of all method names exposed by this bridge and,
    /// for session bridges, the global bridge.
    fn system_list_methods(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        if let Some(global) = &self.global {
            global.collect_method_names(&mut names);
        }
        self.collect_method_names(&mut names);
        names.into_iter().collect()
    }

    fn collect_method_names(&self, names: &mut BTreeSet<String>) {
        let tables = self.tables.lock().unwrap();
        for (key, instance) in &tables.object_map {
            let ObjectKey::Name(name) = key else {
                continue;
            };
            let data = ClassAnalyzer::class_data(&instance.class);
            for method_key in data
                .method_map()
                .keys()
                .chain(data.static_method_map().keys())
            {
                names.insert(format!("{}.{}", name, method_key.name));
            }
        }
        for (name, class) in &tables.class_map {
            let data = ClassAnalyzer::class_data(class);
            for method_key in data.static_method_map().keys() {
                names.insert(format!("{}.{}", name, method_key.name));
            }
        }
    }
}

fn no_method(id: JsonValue) -> RpcResponse {
    RpcResponse::error(id, CODE_ERR_NOMETHOD, MSG_ERR_NOMETHOD)
}

/// Unique method names of one class, instance and static.
fn class_method_names(data: &ClassData) -> Vec<String> {
    let mut names = BTreeSet::new();
    for key in data
        .method_map()
        .keys()
        .chain(data.static_method_map().keys())
    {
        names.insert(key.name.clone());
    }
    names.into_iter().collect()
}

/// The graph identity an instance was handed a handle under.
fn instance_identity(instance: &ObjectInstance) -> ValueId {
    match instance.object.downcast_ref::<Value>() {
        Some(value) => value
            .identity()
            .unwrap_or(Arc::as_ptr(&instance.object) as *const () as ValueId),
        None => Arc::as_ptr(&instance.object) as *const () as ValueId,
    }
}

/// Replays the request's fixups against the unmarshalled arguments,
/// re-pointing each target slot at the cell its source path produced.
/// This is what restores shared identity and cycles that the JSON tree
/// cannot represent.
fn relink_arguments(
    state: &SerializerState,
    args: &mut [Value],
    fixups: &[FixUp],
) -> Result<(), FixupError> {
    for fixup in fixups {
        let roots = (fixup.target.first(), fixup.source.first());
        let (Some(PathToken::Ident(target_root)), Some(PathToken::Ident(source_root))) = roots
        else {
            return Err(FixupError::MalformedPath(display_path(&fixup.target)));
        };
        if target_root != "params" || source_root != "params" {
            continue;
        }
        let source = state
            .unmarshalled_at(&fixup.source)
            .ok_or_else(|| FixupError::MissingSource(display_path(&fixup.source)))?;
        match &fixup.target[..] {
            [_, PathToken::Index(i)] if *i < args.len() => {
                args[*i] = source;
            }
            [.., last] if fixup.target.len() > 2 => {
                let parent_path = &fixup.target[..fixup.target.len() - 1];
                let parent = state.unmarshalled_at(parent_path).ok_or_else(|| {
                    FixupError::MissingTarget(display_path(&fixup.target))
                })?;
                if !parent.assign_child(last, source) {
                    return Err(FixupError::MissingTarget(display_path(&fixup.target)));
                }
            }
            _ => return Err(FixupError::MissingTarget(display_path(&fixup.target))),
        }
    }
    Ok(())
}
