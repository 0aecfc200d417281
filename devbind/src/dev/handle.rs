//! Owning and non-owning handles for driver-model objects.
//!
//! - [Handle<T>] keeps the object alive. The registry holds the single long-lived
//!   [Handle] of each binding; clones obtained elsewhere should be temporary.
//! - [HandleRef<T>] is a weak reference handed out for inspection. It never keeps a
//!   binding alive after its device is removed; [HandleRef::get_handle] returns [None] then.
use alloc::sync::{Arc, Weak};
use core::ops::Deref;

#[derive(Debug)]
pub struct Handle<T> {
    inner: Arc<T>,
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> From<T> for Handle<T> {
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Handle<T> {
    /// Create a [HandleRef<T>] that does not keep the object alive.
    pub fn create_ref(&self) -> HandleRef<T> {
        HandleRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug)]
pub struct HandleRef<T> {
    inner: Weak<T>,
}

impl<T> Clone for HandleRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> HandleRef<T> {
    /// Upgrade to a strong [Handle<T>]; `None` once the owner dropped the object.
    pub fn get_handle(&self) -> Option<Handle<T>> {
        Weak::upgrade(&self.inner).map(|inner| Handle { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_dies_with_owner() {
        let handle = Handle::from(5usize);
        let weak = handle.create_ref();
        assert_eq!(*weak.get_handle().unwrap(), 5);
        drop(handle);
        assert!(weak.get_handle().is_none());
        assert!(!weak.is_alive());
    }
}
