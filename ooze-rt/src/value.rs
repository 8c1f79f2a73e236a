use std::any::Any;
use std::sync::Arc;

type CloneFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// A type-erased, thread-safe value.
///
/// Values created with [`Value::of`] carry a clone hook so the runtime can
/// duplicate them for pass-by-copy edges; values created with
/// [`Value::opaque`] can only be moved.
pub struct Value {
    inner: Box<dyn Any + Send + Sync>,
    clone_fn: Option<CloneFn>,
}

impl Value {
    pub fn of<T: Any + Send + Sync + Clone>(v: T) -> Self {
        Self {
            inner: Box::new(v),
            clone_fn: Some(Arc::new(|any| {
                let v = any
                    .downcast_ref::<T>()
                    .expect("clone hook applied to a foreign value");
                Box::new(v.clone())
            })),
        }
    }

    pub fn opaque<T: Any + Send + Sync>(v: T) -> Self {
        Self {
            inner: Box::new(v),
            clone_fn: None,
        }
    }

    pub fn try_clone(&self) -> Option<Value> {
        let clone_fn = self.clone_fn.as_ref()?;
        Some(Value {
            inner: clone_fn(self.inner.as_ref()),
            clone_fn: Some(clone_fn.clone()),
        })
    }

    pub fn is<T: Any>(&self) -> bool {
        (*self.inner).is::<T>()
    }

    pub fn downcast<T: Any>(self) -> Result<T, Value> {
        let clone_fn = self.clone_fn.clone();
        match self.inner.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(inner) => Err(Value { inner, clone_fn }),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.inner).downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("copyable", &self.clone_fn.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_round_trip() {
        let v = Value::of(41_i32);
        assert!(v.is::<i32>());
        assert_eq!(v.downcast::<i32>().ok(), Some(41));
    }

    #[test]
    fn clone_hook() {
        let v = Value::of("abc".to_string());
        let c = v.try_clone().expect("clonable");
        assert_eq!(c.downcast_ref::<String>().map(String::as_str), Some("abc"));
        assert_eq!(v.downcast::<String>().ok().as_deref(), Some("abc"));
    }

    #[test]
    fn opaque_values_do_not_clone() {
        struct Token;
        let v = Value::opaque(Token);
        assert!(v.try_clone().is_none());
    }

    #[test]
    fn failed_downcast_returns_value() {
        let v = Value::of(1_i32);
        let v = v.downcast::<String>().expect_err("wrong type");
        assert_eq!(v.downcast::<i32>().ok(), Some(1));
    }
}
