use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackageError>;

/// Errors raised while introspecting a package archive.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Entry {entry} is compressed, streaming payloads must be stored")]
    CompressedPayload { entry: String },
}
