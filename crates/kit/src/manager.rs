//! Volume provisioning against a single storage pool
//!
//! [`VolumeManager`] is the context threaded through every operation: it
//! owns the pool backend and the name of the managed pool. Operations run
//! to completion on the calling thread; there are no retries and no locking
//! beyond what the backend itself guarantees.

use std::io::{Cursor, Read};

use tracing::{debug, info, instrument, warn};

use crate::descriptor::{VolumeDescriptor, ISO, QCOW2};
use crate::error::VolumeError;
use crate::pool::{PoolBackend, VolumeRef};
use crate::{progress, source};

/// Largest configuration payload accepted by [`VolumeManager::create_config_volume`]
pub(crate) const MAX_CONFIG_VOLUME_SIZE: u64 = 10_000_000;

/// Default format tag for imported base images
pub(crate) const DEFAULT_IMAGE_FORMAT: &str = QCOW2;

/// Provisions volumes in the storage pool named `pool`
#[derive(Debug)]
pub(crate) struct VolumeManager<B> {
    backend: B,
    pool: String,
}

impl<B: PoolBackend> VolumeManager<B> {
    pub fn new(backend: B, pool: &str) -> Self {
        Self {
            backend,
            pool: pool.to_string(),
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lookup_pool(&self) -> Result<(), VolumeError> {
        self.backend
            .lookup_pool(&self.pool)
            .map_err(|e| VolumeError::PoolLookup {
                pool: self.pool.clone(),
                source: e.into(),
            })
    }

    fn lookup_volume(&self, name: &str) -> Result<VolumeRef, VolumeError> {
        self.backend
            .lookup_volume(&self.pool, name)
            .map_err(|e| VolumeError::VolumeLookup {
                pool: self.pool.clone(),
                name: name.to_string(),
                source: e.into(),
            })
    }

    fn submit(&self, descriptor: &VolumeDescriptor) -> Result<VolumeRef, VolumeError> {
        self.backend
            .create_volume(&self.pool, descriptor)
            .map_err(|e| VolumeError::VolumeCreate {
                pool: self.pool.clone(),
                name: descriptor.name.clone(),
                source: e.into(),
            })
    }

    /// Create volume `name` of `size` bytes and upload `stream` into it.
    ///
    /// The volume is visible in the pool as soon as it is created, before
    /// the upload finishes. If the upload fails the volume is deleted again;
    /// a failure of that deletion is logged and reported in
    /// [`VolumeError::VolumeUpload`] alongside the upload error.
    #[instrument(skip(self, stream), fields(pool = %self.pool))]
    pub fn create_volume<R: Read>(
        &self,
        name: &str,
        size: u64,
        mut stream: R,
        format: &str,
    ) -> Result<VolumeRef, VolumeError> {
        let descriptor = VolumeDescriptor::new(name, size, format);

        self.lookup_pool()?;
        let vol = self.submit(&descriptor)?;
        debug!("Created volume {}, uploading {} bytes", name, size);

        if let Err(e) = self.backend.upload(&vol, &mut stream, 0, size) {
            let rollback = match self.backend.delete_volume(&vol) {
                Ok(()) => None,
                Err(delete_err) => {
                    warn!(
                        "Failed to delete volume '{}' after failed upload: {}",
                        name, delete_err
                    );
                    Some(delete_err.into())
                }
            };
            return Err(VolumeError::VolumeUpload {
                name: name.to_string(),
                source: e.into(),
                rollback,
            });
        }

        info!("Uploaded volume '{}' to pool '{}'", name, self.pool);
        Ok(vol)
    }

    /// Import the image at `uri` as volume `name`.
    ///
    /// Shows a progress bar on stderr unless `quiet`.
    pub fn import_base_image(
        &self,
        name: &str,
        uri: &str,
        format: &str,
        quiet: bool,
    ) -> Result<VolumeRef, VolumeError> {
        let source = source::resolve(uri)?;
        let pb = progress::transfer_bar(source.size, quiet);
        let reader = progress::wrap_read(&pb, source.reader);
        let r = self.create_volume(name, source.size, reader, format);
        pb.finish_and_clear();
        r
    }

    /// Create an ISO volume holding the configuration payload read from `payload`.
    ///
    /// The payload is buffered in memory since the volume size must be known
    /// before creation; anything beyond [`MAX_CONFIG_VOLUME_SIZE`] bytes is
    /// rejected without touching the pool.
    #[instrument(skip(self, payload), fields(pool = %self.pool))]
    pub fn create_config_volume<R: Read>(
        &self,
        name: &str,
        payload: R,
    ) -> Result<VolumeRef, VolumeError> {
        // Read one byte past the limit to detect oversized payloads
        let mut data = Vec::new();
        payload
            .take(MAX_CONFIG_VOLUME_SIZE + 1)
            .read_to_end(&mut data)
            .map_err(VolumeError::PayloadRead)?;

        if data.len() as u64 > MAX_CONFIG_VOLUME_SIZE {
            return Err(VolumeError::PayloadTooLarge {
                limit: MAX_CONFIG_VOLUME_SIZE,
            });
        }

        let size = data.len() as u64;
        self.create_volume(name, size, Cursor::new(data), ISO)
    }

    /// On-disk path of volume `name`
    pub fn volume_path(&self, name: &str) -> Result<String, VolumeError> {
        self.lookup_pool()?;
        let vol = self.lookup_volume(name)?;
        self.backend
            .volume_path(&vol)
            .map_err(|e| VolumeError::VolumePath {
                name: name.to_string(),
                source: e.into(),
            })
    }

    /// Create `name` as a copy-on-write clone of `base_image`.
    ///
    /// `base_image` must be a qcow2 volume; this is not checked here and the
    /// backend decides what happens otherwise. With no `new_size` (or zero)
    /// the clone inherits the base image's capacity. A `new_size` smaller
    /// than the base image is left for the backend to reject.
    #[instrument(skip(self), fields(pool = %self.pool))]
    pub fn clone_base_image(
        &self,
        name: &str,
        base_image: &str,
        new_size: Option<u64>,
    ) -> Result<VolumeRef, VolumeError> {
        let base_path = self.volume_path(base_image)?;
        let descriptor =
            VolumeDescriptor::qcow2_clone(name, &base_path, new_size.unwrap_or_default());
        debug!("Cloning {} from backing store {}", name, base_path);

        let vol = self.submit(&descriptor)?;
        info!("Created volume '{}' backed by '{}'", name, base_image);
        Ok(vol)
    }

    /// Names of all volumes in the pool, sorted
    pub fn list(&self) -> Result<Vec<String>, VolumeError> {
        self.lookup_pool()?;
        let mut names = self
            .backend
            .list_volumes(&self.pool)
            .map_err(|e| VolumeError::PoolLookup {
                pool: self.pool.clone(),
                source: e.into(),
            })?;
        names.sort();
        Ok(names)
    }

    /// Delete volume `name`.
    ///
    /// A missing volume yields [`VolumeError::VolumeLookup`]; a refused
    /// deletion yields [`VolumeError::VolumeDelete`].
    #[instrument(skip(self), fields(pool = %self.pool))]
    pub fn remove(&self, name: &str) -> Result<(), VolumeError> {
        self.lookup_pool()?;
        let vol = self.lookup_volume(name)?;
        self.backend
            .delete_volume(&vol)
            .map_err(|e| VolumeError::VolumeDelete {
                pool: self.pool.clone(),
                name: name.to_string(),
                source: e.into(),
            })?;
        info!("Removed volume '{}' from pool '{}'", name, self.pool);
        Ok(())
    }
}
