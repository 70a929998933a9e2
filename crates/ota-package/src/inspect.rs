use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

use crate::{PackageError, Result};

/// Archive entry holding the streaming payload blob.
pub const PAYLOAD_ENTRY: &str = "payload.bin";

/// Archive entry holding the streaming payload descriptor.
pub const PROPERTIES_ENTRY: &str = "payload_properties.txt";

/// Package format, decides which installer backend applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    /// Differential payload applied in place by the streaming installer.
    Streaming,
    /// Full replacement image applied by the legacy installer.
    Legacy,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte range of the payload blob inside the package file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLocation {
    pub offset: u64,
    pub size: u64,
}

/// Result of inspecting a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub kind: PackageKind,
    /// Present for streaming packages only.
    pub payload: Option<PayloadLocation>,
    /// Non-empty lines of the properties descriptor (`KEY=value`).
    pub properties: Vec<String>,
}

impl PackageInfo {
    pub fn legacy() -> Self {
        Self {
            kind: PackageKind::Legacy,
            payload: None,
            properties: Vec::new(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.kind == PackageKind::Streaming
    }
}

/// Inspect the package at `path`.
///
/// A package is streaming when it contains both the payload blob and the
/// properties descriptor. For streaming packages the payload must be a
/// stored entry so the installer can read it straight out of the archive.
pub fn inspect(path: impl AsRef<Path>) -> Result<PackageInfo> {
    let path = path.as_ref();
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;

    let streaming = archive.index_for_name(PAYLOAD_ENTRY).is_some()
        && archive.index_for_name(PROPERTIES_ENTRY).is_some();
    if !streaming {
        debug!(path = %path.display(), "Package classified as legacy");
        return Ok(PackageInfo::legacy());
    }

    let (offset, size) = {
        let entry = archive.by_name(PAYLOAD_ENTRY)?;
        if entry.compression() != CompressionMethod::Stored {
            return Err(PackageError::CompressedPayload {
                entry: PAYLOAD_ENTRY.to_string(),
            });
        }
        (entry.data_start(), entry.size())
    };

    let properties = {
        let mut entry = archive.by_name(PROPERTIES_ENTRY)?;
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    };

    debug!(
        path = %path.display(),
        offset,
        size,
        "Package classified as streaming"
    );

    Ok(PackageInfo {
        kind: PackageKind::Streaming,
        payload: Some(PayloadLocation { offset, size }),
        properties,
    })
}
