//! Addresses in a tracee's address space.

use serde::{Deserialize, Serialize};

/// An address in the tracee, never dereferenced by the tracer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePtr(u64);

impl RemotePtr {
    /// Create from a raw address
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// The null address
    #[must_use]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Whether this is the null address
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Raw address value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Address of a field `offset` bytes past this one
    #[must_use]
    pub const fn field(&self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset as u64))
    }
}

impl std::fmt::Display for RemotePtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for RemotePtr {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

/// Layout of the preload library's globals block mapped into each tracee.
///
/// Only the single-byte flags the tracer writes are described here.
pub mod preload_globals {
    /// Set while the tracee is being replayed
    pub const IN_REPLAY: usize = 0;
    /// Set while the tracee runs in a diversion; the preload library must not
    /// buffer syscalls while this is nonzero
    pub const IN_DIVERSION: usize = 1;
    /// Set when recording in chaos mode
    pub const IN_CHAOS: usize = 2;
}
