//! Opaque pooled resource handles

use std::fmt;

/// One pooled resource.
///
/// Handles are minted by the pool when it is built and never change. They are
/// neither `Clone` nor `Copy`, so a handle can only be held by one caller at a
/// time and is given up by moving it into [`ResourcePool::release`].
///
/// [`ResourcePool::release`]: crate::ResourcePool::release
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pool_id: usize,
    id: usize,
    name: String,
}

impl ResourceHandle {
    pub(crate) fn new(pool_id: usize, id: usize, prefix: &str) -> Self {
        Self {
            pool_id,
            id,
            name: format!("{} {}", prefix, id),
        }
    }

    /// 1-based id, unique within the owning pool
    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn pool_id(&self) -> usize {
        self.pool_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
