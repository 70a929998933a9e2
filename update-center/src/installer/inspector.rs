use std::path::Path;

use ota_package::PackageInfo;

use crate::Result;

/// Classifies a downloaded package by its archive contents.
pub trait PackageInspector: Send + Sync {
    fn inspect(&self, path: &Path) -> Result<PackageInfo>;
}

/// Inspector reading the package archive from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveInspector;

impl PackageInspector for ArchiveInspector {
    fn inspect(&self, path: &Path) -> Result<PackageInfo> {
        Ok(ota_package::inspect(path)?)
    }
}
