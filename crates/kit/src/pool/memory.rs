//! In-memory pool backend with fault injection, for tests

use std::cell::{Cell, RefCell};
use std::io::Read;

use color_eyre::{eyre::eyre, Result};

use super::{PoolBackend, VolumeRef};
use crate::descriptor::VolumeDescriptor;

#[derive(Debug)]
pub(crate) struct StoredVolume {
    pub descriptor: VolumeDescriptor,
    pub content: Vec<u8>,
}

/// A single named pool holding volumes in memory
#[derive(Debug)]
pub(crate) struct MemoryPool {
    name: String,
    volumes: RefCell<Vec<StoredVolume>>,
    pub fail_uploads: Cell<bool>,
    pub fail_deletes: Cell<bool>,
    pub fail_paths: Cell<bool>,
    pub create_calls: Cell<usize>,
}

impl MemoryPool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            volumes: RefCell::new(Vec::new()),
            fail_uploads: Cell::new(false),
            fail_deletes: Cell::new(false),
            fail_paths: Cell::new(false),
            create_calls: Cell::new(0),
        }
    }

    /// Insert a volume directly, bypassing creation
    pub fn insert(&self, name: &str, content: &[u8]) {
        self.volumes.borrow_mut().push(StoredVolume {
            descriptor: VolumeDescriptor::new(name, content.len() as u64, "raw"),
            content: content.to_vec(),
        });
    }

    pub fn descriptor(&self, name: &str) -> Option<VolumeDescriptor> {
        self.volumes
            .borrow()
            .iter()
            .find(|v| v.descriptor.name == name)
            .map(|v| v.descriptor.clone())
    }

    pub fn content(&self, name: &str) -> Option<Vec<u8>> {
        self.volumes
            .borrow()
            .iter()
            .find(|v| v.descriptor.name == name)
            .map(|v| v.content.clone())
    }

    fn path_of(&self, name: &str) -> String {
        format!("/pools/{}/{}", self.name, name)
    }

    fn check_pool(&self, pool: &str) -> Result<()> {
        if pool != self.name {
            return Err(eyre!("no storage pool with matching name '{pool}'"));
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.volumes
            .borrow()
            .iter()
            .position(|v| v.descriptor.name == name)
    }
}

impl PoolBackend for MemoryPool {
    fn lookup_pool(&self, pool: &str) -> Result<()> {
        self.check_pool(pool)
    }

    fn lookup_volume(&self, pool: &str, name: &str) -> Result<VolumeRef> {
        self.check_pool(pool)?;
        self.position(name)
            .ok_or_else(|| eyre!("no storage vol with matching name '{name}'"))?;
        Ok(VolumeRef {
            pool: pool.to_string(),
            name: name.to_string(),
        })
    }

    fn list_volumes(&self, pool: &str) -> Result<Vec<String>> {
        self.check_pool(pool)?;
        // Newest first, so callers cannot rely on creation order being sorted
        Ok(self
            .volumes
            .borrow()
            .iter()
            .rev()
            .map(|v| v.descriptor.name.clone())
            .collect())
    }

    fn create_volume(&self, pool: &str, descriptor: &VolumeDescriptor) -> Result<VolumeRef> {
        self.create_calls.set(self.create_calls.get() + 1);
        self.check_pool(pool)?;
        if self.position(&descriptor.name).is_some() {
            return Err(eyre!("storage volume '{}' exists already", descriptor.name));
        }
        self.volumes.borrow_mut().push(StoredVolume {
            descriptor: descriptor.clone(),
            content: Vec::new(),
        });
        Ok(VolumeRef {
            pool: pool.to_string(),
            name: descriptor.name.clone(),
        })
    }

    fn delete_volume(&self, vol: &VolumeRef) -> Result<()> {
        if self.fail_deletes.get() {
            return Err(eyre!("cannot delete volume '{}': device busy", vol.name));
        }
        let idx = self
            .position(&vol.name)
            .ok_or_else(|| eyre!("no storage vol with matching name '{}'", vol.name))?;
        self.volumes.borrow_mut().remove(idx);
        Ok(())
    }

    fn upload(
        &self,
        vol: &VolumeRef,
        stream: &mut dyn Read,
        offset: u64,
        length: u64,
    ) -> Result<()> {
        let idx = self
            .position(&vol.name)
            .ok_or_else(|| eyre!("no storage vol with matching name '{}'", vol.name))?;
        if self.fail_uploads.get() {
            return Err(eyre!("stream aborted"));
        }
        let mut buf = Vec::new();
        (&mut *stream).take(length).read_to_end(&mut buf)?;
        if buf.len() as u64 != length {
            return Err(eyre!("Source ended after {} of {length} bytes", buf.len()));
        }
        let mut volumes = self.volumes.borrow_mut();
        let content = &mut volumes[idx].content;
        let start = offset as usize;
        let end = start + buf.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(&buf);
        Ok(())
    }

    fn volume_path(&self, vol: &VolumeRef) -> Result<String> {
        self.position(&vol.name)
            .ok_or_else(|| eyre!("no storage vol with matching name '{}'", vol.name))?;
        if self.fail_paths.get() {
            return Err(eyre!("cannot resolve path of '{}': target unavailable", vol.name));
        }
        Ok(self.path_of(&vol.name))
    }
}
