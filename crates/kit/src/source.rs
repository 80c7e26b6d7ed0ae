//! Resolve an image source URI into a sized byte stream
//!
//! Supported schemes are `file`, `http` and `https`. The size has to be known
//! up front because pool volumes are created with a declared capacity before
//! any content is uploaded.

use std::fmt::Display;
use std::fs::File;
use std::io::Read;

use reqwest::blocking::{Client, ClientBuilder};
use reqwest::{StatusCode, Url};
use tracing::{debug, instrument};

use crate::error::VolumeError;

/// Where a [`Source`] is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheme {
    File,
    Http,
    Https,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::File => write!(f, "file"),
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// A readable source of known length
pub(crate) struct Source {
    pub scheme: Scheme,
    /// Exact number of bytes the reader yields
    pub size: u64,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("scheme", &self.scheme)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

fn source_error(uri: &str, e: impl Into<crate::error::BoxError>) -> VolumeError {
    VolumeError::Source {
        uri: uri.to_string(),
        source: e.into(),
    }
}

/// HTTP client settings for image downloads.
///
/// The blocking client defaults to a 30 second total request timeout, which
/// also covers reading the body; multi-gigabyte images routinely take longer.
fn http_client_builder() -> ClientBuilder {
    Client::builder().timeout(None)
}

/// Open `uri` and determine its length.
///
/// Unsupported schemes are rejected before any I/O happens.
#[instrument]
pub(crate) fn resolve(uri: &str) -> Result<Source, VolumeError> {
    let url =
        Url::parse(uri).map_err(|e| source_error(uri, format!("failed to parse url: {e}")))?;

    let source = match url.scheme() {
        "file" => open_file(uri, &url)?,
        "http" | "https" => {
            let scheme = if url.scheme() == "http" {
                Scheme::Http
            } else {
                Scheme::Https
            };
            let client = http_client_builder()
                .build()
                .map_err(|e| source_error(uri, e))?;
            open_http(uri, &url, scheme, &client)?
        }
        other => {
            return Err(VolumeError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    };
    debug!("Resolved {} source of {} bytes", source.scheme, source.size);
    Ok(source)
}

fn open_file(uri: &str, url: &Url) -> Result<Source, VolumeError> {
    let path = url
        .to_file_path()
        .map_err(|()| source_error(uri, "not a local file path"))?;
    let file = File::open(&path).map_err(|e| source_error(uri, e))?;
    let meta = file.metadata().map_err(|e| source_error(uri, e))?;
    if !meta.is_file() {
        return Err(source_error(uri, "not a regular file"));
    }

    Ok(Source {
        scheme: Scheme::File,
        size: meta.len(),
        reader: Box::new(file),
    })
}

fn open_http(
    uri: &str,
    url: &Url,
    scheme: Scheme,
    client: &Client,
) -> Result<Source, VolumeError> {
    let resp = client.get(url.as_str()).send().map_err(|e| source_error(uri, e))?;

    if resp.status() != StatusCode::OK {
        return Err(source_error(
            uri,
            format!("http status {} returned", resp.status()),
        ));
    }

    let Some(size) = resp.content_length() else {
        return Err(source_error(uri, "could not determine content length"));
    };

    Ok(Source {
        scheme,
        size,
        reader: Box::new(resp),
    })
}
