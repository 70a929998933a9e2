//! Introspection of downloaded OTA update packages.
//!
//! A package is a zip archive. Streaming packages carry a raw payload blob
//! together with a properties descriptor and are applied in place by the
//! streaming installer. Anything else is a legacy full-image package.

mod error;
mod inspect;

pub use error::{PackageError, Result};
pub use inspect::{
    PAYLOAD_ENTRY, PROPERTIES_ENTRY, PackageInfo, PackageKind, PayloadLocation, inspect,
};
