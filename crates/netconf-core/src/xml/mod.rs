//! XML module: well-formedness checks and root-attribute access.

pub mod document;

pub use document::{RootElement, XmlDocument, XmlError, NETCONF_BASE_NS};
