//! Class descriptors and the registration builder.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use orb_common::protocol::InvokeError;

use crate::types::TypeDesc;
use crate::value::Value;

/// A registered instance, as the dispatcher holds it.
pub type Receiver = Arc<dyn Any + Send + Sync>;

/// The invocation entry point of a declared method. Receives the receiver
/// (`None` for statics) and the unmarshalled arguments; an `Err` is the
/// analog of the method throwing.
pub type MethodHandler =
    Arc<dyn Fn(Option<&Receiver>, &[Value]) -> Result<Value, InvokeError> + Send + Sync>;

/// One declared method of a class.
pub struct MethodDef {
    name: String,
    params: Vec<TypeDesc>,
    is_static: bool,
    handler: MethodHandler,
}

impl MethodDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn invoke(
        &self,
        receiver: Option<&Receiver>,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        (self.handler)(receiver, args)
    }

    /// Comma-joined parameter signature for diagnostics.
    pub fn signature(&self) -> String {
        self.params
            .iter()
            .map(TypeDesc::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.signature())
    }
}

/// The declared shape of a registered class: its name, its methods, and
/// (when the builder saw typed instance methods) the concrete receiver
/// type they downcast to.
pub struct ClassDescriptor {
    name: String,
    receiver_type: Option<TypeId>,
    methods: Vec<Arc<MethodDef>>,
}

impl ClassDescriptor {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            name: name.into(),
            receiver_type: None,
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver_type(&self) -> Option<TypeId> {
        self.receiver_type
    }

    /// Declaration order doubles as the deterministic tie-break order of
    /// overload resolution.
    pub fn methods(&self) -> &[Arc<MethodDef>] {
        &self.methods
    }

    /// Whether `object` satisfies this descriptor's declared interface.
    pub fn accepts_instance(&self, object: &Receiver) -> bool {
        match self.receiver_type {
            Some(expected) => (**object).type_id() == expected,
            None => true,
        }
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Builds a [`ClassDescriptor`].
///
/// ```
/// use orb_bridge::reflect::ClassDescriptor;
/// use orb_bridge::types::TypeDesc;
/// use orb_bridge::value::Value;
///
/// struct Counter {
///     step: i32,
/// }
///
/// let class = ClassDescriptor::builder("Counter")
///     .instance_method("bump", vec![TypeDesc::Int], |counter: &Counter, args| {
///         let n = args[0].as_i64().unwrap_or(0) as i32;
///         Ok(Value::Int(n + counter.step))
///     })
///     .build();
/// assert_eq!(class.name(), "Counter");
/// ```
pub struct ClassBuilder {
    name: String,
    receiver_type: Option<TypeId>,
    methods: Vec<Arc<MethodDef>>,
}

impl ClassBuilder {
    /// Declares an instance method. The first typed declaration pins the
    /// receiver type checked at registration.
    pub fn instance_method<T, F>(mut self, name: &str, params: Vec<TypeDesc>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        self.receiver_type.get_or_insert(TypeId::of::<T>());
        let method_name = name.to_string();
        let handler: MethodHandler = Arc::new(move |receiver, args| {
            let receiver = receiver.ok_or_else(|| {
                InvokeError::new(format!("{}: instance method invoked without a receiver", method_name))
            })?;
            let typed = receiver.downcast_ref::<T>().ok_or_else(|| {
                InvokeError::new(format!(
                    "{}: receiver is not an instance of the declared class",
                    method_name
                ))
            })?;
            f(typed, args)
        });
        self.methods.push(Arc::new(MethodDef {
            name: name.to_string(),
            params,
            is_static: false,
            handler,
        }));
        self
    }

    /// Declares a static method.
    pub fn static_method<F>(mut self, name: &str, params: Vec<TypeDesc>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        let handler: MethodHandler = Arc::new(move |_, args| f(args));
        self.methods.push(Arc::new(MethodDef {
            name: name.to_string(),
            params,
            is_static: true,
            handler,
        }));
        self
    }

    pub fn build(self) -> Arc<ClassDescriptor> {
        Arc::new(ClassDescriptor {
            name: self.name,
            receiver_type: self.receiver_type,
            methods: self.methods,
        })
    }
}
