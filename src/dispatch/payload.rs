//! Opaque, cheaply cloneable event payload.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// Type-erased event body shared by every target of one dispatch.
///
/// # Example
/// ```rust
/// use simstub::Payload;
///
/// let p = Payload::new(42u32);
/// assert_eq!(p.downcast_ref::<u32>(), Some(&42));
/// assert!(p.downcast_ref::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct Payload {
    body: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    pub fn new<T: Any + Send + Sync>(body: T) -> Self {
        Self {
            body: Arc::new(body),
            type_name: type_name::<T>(),
        }
    }

    /// Borrows the body as `T`, or `None` when it holds another type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.body.is::<T>()
    }

    /// Name of the concrete body type (diagnostics only).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("type", &self.type_name).finish()
    }
}
