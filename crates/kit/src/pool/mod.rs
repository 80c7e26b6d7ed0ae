//! Storage pool backends
//!
//! The provisioning core talks to the hypervisor's storage subsystem only
//! through [`PoolBackend`]. Pools are referenced by name and never created
//! or reconfigured here.

use std::io::Read;

use color_eyre::Result;

use crate::descriptor::VolumeDescriptor;

#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod virsh;

/// Handle to a volume that exists in a pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VolumeRef {
    pub pool: String,
    pub name: String,
}

/// Capability set a storage pool backend must provide.
pub(crate) trait PoolBackend {
    /// Fail unless a pool named `pool` exists and is accessible.
    fn lookup_pool(&self, pool: &str) -> Result<()>;

    /// Find volume `name` in `pool`.
    fn lookup_volume(&self, pool: &str, name: &str) -> Result<VolumeRef>;

    /// Names of all volumes in `pool`, in backend order.
    fn list_volumes(&self, pool: &str) -> Result<Vec<String>>;

    /// Create a volume from `descriptor`. The volume is empty until uploaded to.
    fn create_volume(&self, pool: &str, descriptor: &VolumeDescriptor) -> Result<VolumeRef>;

    fn delete_volume(&self, vol: &VolumeRef) -> Result<()>;

    /// Write exactly `length` bytes from `stream` into `vol` starting at `offset`.
    ///
    /// A stream that ends early is an error.
    fn upload(&self, vol: &VolumeRef, stream: &mut dyn Read, offset: u64, length: u64)
        -> Result<()>;

    /// On-disk path of `vol`.
    fn volume_path(&self, vol: &VolumeRef) -> Result<String>;
}
