//! Error kinds surfaced by volume provisioning.
//!
//! Pool backends report failures as `eyre` reports; the provisioning core
//! wraps those into a [`VolumeError`] carrying the operation context so a
//! caller can tell, for example, "volume already gone" apart from "delete
//! refused".

use thiserror::Error;

/// Boxed cause carried by the error variants.
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the provisioning operations.
#[derive(Debug, Error)]
pub(crate) enum VolumeError {
    /// The source URI could not be opened, read, or sized.
    #[error("Failed to read source '{uri}': {source}")]
    Source {
        uri: String,
        #[source]
        source: BoxError,
    },

    /// The source URI uses a scheme other than file, http or https.
    #[error("Unsupported source scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// The named pool does not exist or could not be queried.
    #[error("Failed to get storage pool '{pool}': {source}")]
    PoolLookup {
        pool: String,
        #[source]
        source: BoxError,
    },

    /// No volume with that name exists in the pool.
    #[error("Failed to find volume '{name}' in pool '{pool}': {source}")]
    VolumeLookup {
        pool: String,
        name: String,
        #[source]
        source: BoxError,
    },

    /// The volume exists but its on-disk path could not be resolved.
    #[error("Failed to get path of volume '{name}': {source}")]
    VolumePath {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The pool refused the volume descriptor, e.g. on a name collision.
    #[error("Failed to create volume '{name}' in pool '{pool}': {source}")]
    VolumeCreate {
        pool: String,
        name: String,
        #[source]
        source: BoxError,
    },

    /// The upload into a freshly created volume failed.
    ///
    /// `rollback` holds the cause if deleting the partially written volume
    /// failed as well; in that case the volume may still be in the pool.
    #[error("Failed to upload content to volume '{name}': {source}{}", rollback_note(.rollback))]
    VolumeUpload {
        name: String,
        #[source]
        source: BoxError,
        rollback: Option<BoxError>,
    },

    /// The volume exists but the pool refused to delete it.
    #[error("Failed to delete volume '{name}' from pool '{pool}': {source}")]
    VolumeDelete {
        pool: String,
        name: String,
        #[source]
        source: BoxError,
    },

    /// A configuration payload exceeded the in-memory ceiling.
    #[error("Config payload is bigger than {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Reading the configuration payload itself failed.
    #[error("Failed to read config payload: {0}")]
    PayloadRead(#[source] std::io::Error),
}

fn rollback_note(rollback: &Option<BoxError>) -> String {
    match rollback {
        Some(e) => format!(" (cleanup of the partial volume also failed: {e})"),
        None => String::new(),
    }
}
