//! Declared-class reflection.
//!
//! Registration declares method signatures through [`ClassBuilder`]
//! instead of discovering them at runtime. [`ClassAnalyzer`] digests a
//! descriptor into the `(name, wire-arity)`-keyed maps the dispatcher
//! resolves against, memoized process-wide.

pub mod analyzer;
pub mod class;

pub use analyzer::{ClassAnalyzer, ClassData, MethodEntry, MethodKey};
pub use class::{ClassBuilder, ClassDescriptor, MethodDef, MethodHandler, Receiver};
