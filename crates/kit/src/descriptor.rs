//! Storage volume descriptors and their libvirt XML form
//!
//! A descriptor is what gets submitted to a pool to create a volume: a name,
//! an optional capacity, the target format, and for copy-on-write clones a
//! reference to the backing volume.

/// Format tag used for base images and their clones.
pub(crate) const QCOW2: &str = "qcow2";

/// Format tag used for configuration volumes.
pub(crate) const ISO: &str = "iso";

/// Read-only volume a copy-on-write volume is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BackingStore {
    /// On-disk path of the backing volume
    pub path: String,
    /// Format of the backing volume
    pub format: String,
}

/// Description of a volume to create in a storage pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VolumeDescriptor {
    pub name: String,
    /// Capacity in bytes; `None` lets the backend derive it (e.g. from a backing store)
    pub capacity: Option<u64>,
    pub format: String,
    pub backing_store: Option<BackingStore>,
}

impl VolumeDescriptor {
    /// Descriptor for a plain volume whose content will be uploaded
    pub fn new(name: &str, capacity: u64, format: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: Some(capacity),
            format: format.to_string(),
            backing_store: None,
        }
    }

    /// Descriptor for a qcow2 volume backed by the qcow2 volume at `base_path`
    ///
    /// A `new_size` of zero leaves the capacity unset so it is inherited from
    /// the base image.
    pub fn qcow2_clone(name: &str, base_path: &str, new_size: u64) -> Self {
        Self {
            name: name.to_string(),
            capacity: (new_size != 0).then_some(new_size),
            format: QCOW2.to_string(),
            backing_store: Some(BackingStore {
                path: base_path.to_string(),
                format: QCOW2.to_string(),
            }),
        }
    }

    /// Serialize to a libvirt `<volume>` document
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<volume>");
        xml.push_str(&format!("\n  <name>{}</name>", escape(&self.name)));

        if let Some(capacity) = self.capacity {
            xml.push_str(&format!("\n  <capacity unit=\"b\">{}</capacity>", capacity));
        }

        xml.push_str(&format!(
            r#"
  <target>
    <format type="{}"/>
  </target>"#,
            escape(&self.format)
        ));

        if let Some(ref backing) = self.backing_store {
            xml.push_str(&format!(
                r#"
  <backingStore>
    <path>{}</path>
    <format type="{}"/>
  </backingStore>"#,
                escape(&backing.path),
                escape(&backing.format)
            ));
        }

        xml.push_str("\n</volume>\n");
        xml
    }
}

/// Escape text for use in XML content or a double-quoted attribute
fn escape(s: &str) -> String {
    let mut r = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => r.push_str("&amp;"),
            '<' => r.push_str("&lt;"),
            '>' => r.push_str("&gt;"),
            '"' => r.push_str("&quot;"),
            '\'' => r.push_str("&apos;"),
            c => r.push(c),
        }
    }
    r
}
