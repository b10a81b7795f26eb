//! ORB Bridge
//!
//! This crate is the core of the ORB JSON-RPC bridge: it lets a remote
//! peer invoke methods on registered server objects as if they were
//! local, and ships server-side object graphs back to the peer with
//! their topology intact, including duplicates and cycles.
//!
//! # Architecture
//!
//! A request flows through a synchronous per-call pipeline:
//!
//! 1. The envelope is parsed and inbound fixups are replayed
//!    ([`orb_common::protocol`])
//! 2. The encoded method name is resolved against the registration
//!    tables, delegating from a session bridge to the global bridge when
//!    needed ([`bridge`])
//! 3. Overload candidates are scored against the JSON arguments with
//!    cheap `try_unmarshal` probes ([`resolver`])
//! 4. Arguments are unmarshalled, context-resolved parameters are
//!    injected ([`ser`], [`localarg`])
//! 5. Pre-invoke hooks run, the method executes, post-invoke hooks run
//!    ([`callback`])
//! 6. The result is marshalled; duplicate and circular references become
//!    `null` placeholders plus fixup assignments the peer replays
//!    ([`ser::state`])
//!
//! # Reflection without reflection
//!
//! Classes declare their method signatures through
//! [`reflect::ClassDescriptor::builder`]; the [`reflect::ClassAnalyzer`]
//! memoizes the `(name, arity)`-keyed method maps process-wide, which is
//! what dynamic dispatch resolves against.
//!
//! # Example
//!
//! ```
//! use orb_bridge::{Bridge, ClassDescriptor, TypeDesc, Value};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Calculator;
//!
//! let class = ClassDescriptor::builder("Calculator")
//!     .instance_method("add", vec![TypeDesc::Int, TypeDesc::Int], |_: &Calculator, args| {
//!         let a = args[0].as_i64().unwrap_or(0);
//!         let b = args[1].as_i64().unwrap_or(0);
//!         Ok(Value::Long(a + b))
//!     })
//!     .build();
//!
//! let bridge = Bridge::new();
//! bridge.register_object("calc", Arc::new(Calculator), &class).unwrap();
//!
//! let response = bridge.call(&[], &json!({"id": 1, "method": "calc.add", "params": [2, 3]}));
//! assert_eq!(response.to_value(), json!({"id": 1, "result": 5}));
//! ```

pub mod bridge;
pub mod callback;
pub mod localarg;
pub mod reflect;
pub mod resolver;
pub mod ser;
pub mod types;
pub mod value;

pub use bridge::{Bridge, BridgeConfig, ObjectInstance, ObjectKey};
pub use callback::{CallbackController, InvocationCallback};
pub use localarg::{
    is_local_arg, register_local_arg_resolver, resolve_local_arg, unregister_local_arg_resolver,
    LocalArgResolver,
};
pub use reflect::{ClassBuilder, ClassDescriptor, MethodDef, Receiver};
pub use ser::{ObjectMatch, Serializer, SerializerOptions, SerializerRegistry, SerializerState};
pub use types::{BeanDescriptor, JsonShape, TypeDesc, TypeRegistry};
pub use value::{Exported, Value};
