//! Invocation callbacks.
//!
//! Hooks run around every dispatched invocation, filtered to the
//! transport context types they declared interest in. Pre- and
//! post-invoke failures become the invocation's error; error-hook
//! failures are swallowed so an observer cannot take the bridge down.

use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex};

use orb_common::protocol::InvokeError;
use tracing::{debug, info};

use crate::reflect::{MethodDef, Receiver};
use crate::value::Value;

/// Hooks invoked before, after, and on failure of a method invocation.
/// `instance` is `None` for static methods.
pub trait InvocationCallback: Send + Sync {
    fn pre_invoke(
        &self,
        context: &(dyn Any + Send + Sync),
        instance: Option<&Receiver>,
        method: &MethodDef,
        args: &[Value],
    ) -> Result<(), InvokeError>;

    fn post_invoke(
        &self,
        context: &(dyn Any + Send + Sync),
        instance: Option<&Receiver>,
        method: &MethodDef,
        result: &Value,
    ) -> Result<(), InvokeError>;

    /// Called when the invocation fails. Best-effort: errors returned
    /// here are ignored.
    fn invocation_error(
        &self,
        _context: &(dyn Any + Send + Sync),
        _instance: Option<&Receiver>,
        _method: &MethodDef,
        _error: &InvokeError,
    ) -> Result<(), InvokeError> {
        Ok(())
    }
}

struct CallbackData {
    callback: Arc<dyn InvocationCallback>,
    context_type: TypeId,
}

impl CallbackData {
    fn understands(&self, context: &Arc<dyn Any + Send + Sync>) -> bool {
        (**context).type_id() == self.context_type
    }
}

/// Maintains the callbacks of one bridge and dispatches them.
#[derive(Default)]
pub struct CallbackController {
    callbacks: Mutex<Vec<CallbackData>>,
}

impl CallbackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_callback(&self, callback: Arc<dyn InvocationCallback>, context_type: TypeId) {
        info!("registered invocation callback");
        self.callbacks.lock().unwrap().push(CallbackData {
            callback,
            context_type,
        });
    }

    pub fn unregister_callback(
        &self,
        callback: &Arc<dyn InvocationCallback>,
        context_type: TypeId,
    ) {
        self.callbacks.lock().unwrap().retain(|data| {
            !(Arc::ptr_eq(&data.callback, callback) && data.context_type == context_type)
        });
    }

    pub(crate) fn pre_invoke(
        &self,
        context: &[Arc<dyn Any + Send + Sync>],
        instance: Option<&Receiver>,
        method: &MethodDef,
        args: &[Value],
    ) -> Result<(), InvokeError> {
        let callbacks = self.callbacks.lock().unwrap();
        for ctx in context {
            for data in callbacks.iter().filter(|data| data.understands(ctx)) {
                data.callback.pre_invoke(&**ctx, instance, method, args)?;
            }
        }
        Ok(())
    }

    pub(crate) fn post_invoke(
        &self,
        context: &[Arc<dyn Any + Send + Sync>],
        instance: Option<&Receiver>,
        method: &MethodDef,
        result: &Value,
    ) -> Result<(), InvokeError> {
        let callbacks = self.callbacks.lock().unwrap();
        for ctx in context {
            for data in callbacks.iter().filter(|data| data.understands(ctx)) {
                data.callback.post_invoke(&**ctx, instance, method, result)?;
            }
        }
        Ok(())
    }

    pub(crate) fn invocation_error(
        &self,
        context: &[Arc<dyn Any + Send + Sync>],
        instance: Option<&Receiver>,
        method: &MethodDef,
        error: &InvokeError,
    ) {
        let callbacks = self.callbacks.lock().unwrap();
        for ctx in context {
            for data in callbacks.iter().filter(|data| data.understands(ctx)) {
                if let Err(hook_error) =
                    data.callback.invocation_error(&**ctx, instance, method, error)
                {
                    // Ignore failures so an observer cannot mask the
                    // original error.
                    debug!(error = %hook_error, "error callback failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::ClassDescriptor;
    use crate::types::TypeDesc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ctx;
    struct OtherCtx;

    #[derive(Default)]
    struct CountingCallback {
        pre: AtomicUsize,
        post: AtomicUsize,
        errors: AtomicUsize,
        fail_pre: bool,
    }

    impl InvocationCallback for CountingCallback {
        fn pre_invoke(
            &self,
            _context: &(dyn Any + Send + Sync),
            _instance: Option<&Receiver>,
            _method: &MethodDef,
            _args: &[Value],
        ) -> Result<(), InvokeError> {
            self.pre.fetch_add(1, Ordering::SeqCst);
            if self.fail_pre {
                Err(InvokeError::new("vetoed"))
            } else {
                Ok(())
            }
        }

        fn post_invoke(
            &self,
            _context: &(dyn Any + Send + Sync),
            _instance: Option<&Receiver>,
            _method: &MethodDef,
            _result: &Value,
        ) -> Result<(), InvokeError> {
            self.post.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn invocation_error(
            &self,
            _context: &(dyn Any + Send + Sync),
            _instance: Option<&Receiver>,
            _method: &MethodDef,
            _error: &InvokeError,
        ) -> Result<(), InvokeError> {
            self.errors.fetch_add(1, Ordering::SeqCst);
            Err(InvokeError::new("hook blew up, nobody noticed"))
        }
    }

    fn method() -> Arc<ClassDescriptor> {
        struct Svc;
        ClassDescriptor::builder("Svc")
            .instance_method("m", vec![TypeDesc::Int], |_: &Svc, _| Ok(Value::Null))
            .build()
    }

    #[test]
    fn test_hooks_filtered_by_context_type() {
        let controller = CallbackController::new();
        let counting = Arc::new(CountingCallback::default());
        controller.register_callback(counting.clone(), TypeId::of::<Ctx>());

        let class = method();
        let method = &class.methods()[0];
        let matching: Vec<Arc<dyn Any + Send + Sync>> = vec![Arc::new(Ctx)];
        let other: Vec<Arc<dyn Any + Send + Sync>> = vec![Arc::new(OtherCtx)];

        controller.pre_invoke(&matching, None, method, &[]).unwrap();
        controller.pre_invoke(&other, None, method, &[]).unwrap();
        assert_eq!(counting.pre.load(Ordering::SeqCst), 1);

        controller
            .post_invoke(&matching, None, method, &Value::Null)
            .unwrap();
        assert_eq!(counting.post.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_hook_failures_swallowed() {
        let controller = CallbackController::new();
        let counting = Arc::new(CountingCallback::default());
        controller.register_callback(counting.clone(), TypeId::of::<Ctx>());

        let class = method();
        let context: Vec<Arc<dyn Any + Send + Sync>> = vec![Arc::new(Ctx)];
        controller.invocation_error(
            &context,
            None,
            &class.methods()[0],
            &InvokeError::new("boom"),
        );
        assert_eq!(counting.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pre_invoke_failure_propagates() {
        let controller = CallbackController::new();
        let vetoing = Arc::new(CountingCallback {
            fail_pre: true,
            ..Default::default()
        });
        controller.register_callback(vetoing, TypeId::of::<Ctx>());

        let class = method();
        let context: Vec<Arc<dyn Any + Send + Sync>> = vec![Arc::new(Ctx)];
        let err = controller
            .pre_invoke(&context, None, &class.methods()[0], &[])
            .unwrap_err();
        assert_eq!(err.message, "vetoed");
    }

    #[test]
    fn test_unregister_by_identity() {
        let controller = CallbackController::new();
        let counting = Arc::new(CountingCallback::default());
        let as_dyn: Arc<dyn InvocationCallback> = counting.clone();
        controller.register_callback(as_dyn.clone(), TypeId::of::<Ctx>());
        controller.unregister_callback(&as_dyn, TypeId::of::<Ctx>());

        let class = method();
        let context: Vec<Arc<dyn Any + Send + Sync>> = vec![Arc::new(Ctx)];
        controller
            .pre_invoke(&context, None, &class.methods()[0], &[])
            .unwrap();
        assert_eq!(counting.pre.load(Ordering::SeqCst), 0);
    }
}
