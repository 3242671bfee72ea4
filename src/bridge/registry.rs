//! Handle registry.
//!
//! Maps integer handles to connection records. Handles are allocated
//! monotonically and never reused, so a late event carrying a stale handle can
//! only ever miss.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Largest handle ever issued. Handles cross the C ABI as `int`.
pub const MAX_HANDLE: u32 = i32::MAX as u32;

/// Every handle up to the registry's limit has been issued once.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("handle space exhausted")]
pub struct HandleSpaceExhausted;

/// Opaque connection identifier handed to native code.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u32);

impl Handle {
    /// Sentinel meaning "no handle / operation failed".
    pub const NONE: Handle = Handle(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Check if this handle is valid (non-zero).
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns every live record, keyed by handle.
#[derive(Debug)]
pub struct HandleRegistry<T> {
    entries: HashMap<Handle, T>,
    next_id: u32,
    limit: u32,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::with_limit(MAX_HANDLE)
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that stops issuing handles after `limit`.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
            limit,
        }
    }

    /// Check whether another handle can still be issued.
    pub fn is_exhausted(&self) -> bool {
        self.next_id == 0 || self.next_id > self.limit
    }

    /// Store `record` under a fresh handle.
    pub fn allocate(&mut self, record: T) -> Result<Handle, HandleSpaceExhausted> {
        self.allocate_with(|_| Ok::<_, HandleSpaceExhausted>(record))
    }

    /// Build a record that needs to know its own handle up front.
    ///
    /// `build` is not called once the handle space is used up, and the
    /// counter only advances when `build` succeeds.
    pub fn allocate_with<E: From<HandleSpaceExhausted>>(
        &mut self,
        build: impl FnOnce(Handle) -> Result<T, E>,
    ) -> Result<Handle, E> {
        if self.is_exhausted() {
            return Err(HandleSpaceExhausted.into());
        }
        let handle = Handle(self.next_id);
        let record = build(handle)?;
        // Wraps to 0 past u32::MAX, which reads as exhausted.
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(handle, record);
        Ok(handle)
    }

    pub fn lookup(&self, handle: Handle) -> Option<&T> {
        self.entries.get(&handle)
    }

    pub fn lookup_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.entries.get_mut(&handle)
    }

    /// Erase the mapping. The record is handed back to the caller to tear down.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        self.entries.remove(&handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.entries.keys().copied().collect();
        handles.sort();
        handles
    }
}
