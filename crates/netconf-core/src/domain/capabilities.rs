//! Capability sets and the `<hello>` documents that carry them.
//!
//! # The hello exchange (for beginners)
//!
//! Right after the SSH subsystem channel opens, both peers send a `<hello>`
//! listing the capability URIs they support:
//!
//! ```xml
//! <hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
//!   <capabilities>
//!     <capability>urn:ietf:params:netconf:base:1.0</capability>
//!     <capability>urn:ietf:params:netconf:base:1.1</capability>
//!   </capabilities>
//!   <session-id>4</session-id>   <!-- server hello only -->
//! </hello>
//! ```
//!
//! Older servers omit the `xmlns` declaration; a `<hello>` in no namespace
//! is read the same way, with its children also unqualified.
//!
//! Every peer must advertise at least one *base* capability.  A server that
//! advertises `base:1.1` speaks the chunked framing dialect; one that does not
//! is limited to the legacy `]]>]]>` dialect.

use std::collections::BTreeSet;

use quick_xml::escape::escape;
use thiserror::Error;
use tracing::warn;

use crate::protocol::ProtocolMode;
use crate::xml::{XmlDocument, XmlError, NETCONF_BASE_NS};

const HELLO: &str = "hello";

/// The NETCONF 1.0 base capability.
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// The NETCONF 1.1 base capability; selects chunked framing.
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

const CAPABILITY_PATH: [&str; 3] = ["hello", "capabilities", "capability"];
const SESSION_ID_PATH: [&str; 2] = ["hello", "session-id"];

/// Reasons a hello document is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HelloError {
    /// The document is not well-formed or is not a NETCONF `<hello>`.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// Neither base capability is advertised.
    #[error("hello does not advertise a base NETCONF capability")]
    MissingBaseCapability,
}

/// An unordered set of capability URIs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    uris: BTreeSet<String>,
}

impl CapabilitySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a URI; returns `false` if it was already present.
    pub fn insert(&mut self, uri: impl Into<String>) -> bool {
        self.uris.insert(uri.into())
    }

    /// Whether `uri` is advertised.
    pub fn contains(&self, uri: &str) -> bool {
        self.uris.contains(uri)
    }

    /// Whether a base capability (1.0 or 1.1) is advertised.
    pub fn has_base(&self) -> bool {
        self.contains(BASE_1_0) || self.contains(BASE_1_1)
    }

    /// Whether the chunked framing capability is advertised.
    pub fn supports_base_1_1(&self) -> bool {
        self.contains(BASE_1_1)
    }

    /// The framing dialect a peer advertising this set must be spoken to in.
    ///
    /// Never returns [`ProtocolMode::Unknown`].
    pub fn protocol_mode(&self) -> ProtocolMode {
        if self.supports_base_1_1() {
            ProtocolMode::Chunked
        } else {
            ProtocolMode::LegacyDelimited
        }
    }

    /// Iterates the URIs in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.uris.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            uris: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A validated `<hello>` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    capabilities: CapabilitySet,
    session_id: Option<u32>,
    document: XmlDocument,
}

impl Hello {
    /// Builds a client hello advertising `capabilities`.
    ///
    /// # Errors
    ///
    /// Returns [`HelloError::MissingBaseCapability`] if no base capability is
    /// included.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use netconf_core::domain::capabilities::{Hello, BASE_1_0, BASE_1_1};
    ///
    /// let hello = Hello::new([BASE_1_0, BASE_1_1]).unwrap();
    /// assert!(hello.capabilities().supports_base_1_1());
    /// assert!(hello.document().as_str().contains("<capability>urn:ietf:params:netconf:base:1.1</capability>"));
    /// ```
    pub fn new<I, S>(capabilities: I) -> Result<Self, HelloError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let capabilities: CapabilitySet = capabilities.into_iter().collect();
        if !capabilities.has_base() {
            return Err(HelloError::MissingBaseCapability);
        }

        let mut text = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        text.push_str(&format!(r#"<hello xmlns="{NETCONF_BASE_NS}"><capabilities>"#));
        for uri in capabilities.iter() {
            text.push_str("<capability>");
            text.push_str(&escape(uri));
            text.push_str("</capability>");
        }
        text.push_str("</capabilities></hello>");

        let document = XmlDocument::parse(text)?;
        Ok(Self {
            capabilities,
            session_id: None,
            document,
        })
    }

    /// Validates an already parsed hello document.
    ///
    /// The root must be `<hello>` in the NETCONF base namespace or in no
    /// namespace.  A `<session-id>` that is not a positive 32-bit integer is
    /// logged and ignored.
    ///
    /// # Errors
    ///
    /// - [`HelloError::Xml`] if the root is not a `<hello>`.
    /// - [`HelloError::MissingBaseCapability`] if no base capability is listed.
    pub fn from_document(document: XmlDocument) -> Result<Self, HelloError> {
        let namespace = hello_namespace(&document)?;

        let capabilities: CapabilitySet = document
            .select_texts(namespace, &CAPABILITY_PATH)?
            .into_iter()
            .filter(|uri| !uri.is_empty())
            .collect();
        if !capabilities.has_base() {
            return Err(HelloError::MissingBaseCapability);
        }

        let session_id = document
            .select_texts(namespace, &SESSION_ID_PATH)?
            .into_iter()
            .next()
            .and_then(|text| parse_session_id(&text));

        Ok(Self {
            capabilities,
            session_id,
            document,
        })
    }

    /// Parses and validates hello text.
    ///
    /// # Errors
    ///
    /// See [`Hello::from_document`]; malformed XML yields [`HelloError::Xml`].
    pub fn parse(text: &str) -> Result<Self, HelloError> {
        Self::from_document(XmlDocument::parse(text)?)
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// The server-assigned session id, present only in a server hello.
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// Shorthand for `self.capabilities().protocol_mode()`.
    pub fn protocol_mode(&self) -> ProtocolMode {
        self.capabilities.protocol_mode()
    }
}

/// Namespace the hello's elements are expected in: the base namespace, or
/// none for an unqualified hello.
fn hello_namespace(document: &XmlDocument) -> Result<Option<&'static str>, XmlError> {
    let root = document.root();
    if root.local_name == HELLO && root.namespace.is_none() {
        return Ok(None);
    }
    document.expect_netconf_root(HELLO)?;
    Ok(Some(NETCONF_BASE_NS))
}

fn parse_session_id(text: &str) -> Option<u32> {
    match text.parse::<u32>() {
        Ok(id) if id > 0 => Some(id),
        _ => {
            warn!(session_id = text, "ignoring invalid session-id in hello");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_with(capabilities: &[&str], extra: &str) -> String {
        let caps: String = capabilities
            .iter()
            .map(|c| format!("<capability>{c}</capability>"))
            .collect();
        format!(
            r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities>{caps}</capabilities>{extra}</hello>"#
        )
    }

    #[test]
    fn test_base_1_0_only_selects_legacy_framing() {
        // Arrange
        let text = hello_with(&[BASE_1_0], "");

        // Act
        let hello = Hello::parse(&text).unwrap();

        // Assert
        assert_eq!(hello.protocol_mode(), ProtocolMode::LegacyDelimited);
    }

    #[test]
    fn test_base_1_1_selects_chunked_framing() {
        let hello = Hello::parse(&hello_with(&[BASE_1_0, BASE_1_1], "")).unwrap();

        assert_eq!(hello.protocol_mode(), ProtocolMode::Chunked);
    }

    #[test]
    fn test_base_1_1_alone_is_a_valid_base() {
        let hello = Hello::parse(&hello_with(&[BASE_1_1], "")).unwrap();

        assert_eq!(hello.protocol_mode(), ProtocolMode::Chunked);
    }

    #[test]
    fn test_missing_base_capability_is_rejected() {
        let result = Hello::parse(&hello_with(&["urn:ietf:params:netconf:capability:candidate:1.0"], ""));

        assert_eq!(result, Err(HelloError::MissingBaseCapability));
    }

    #[test]
    fn test_unqualified_hello_with_base_1_0_selects_legacy_framing() {
        // Arrange
        let text = "<hello><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>";

        // Act
        let hello = Hello::parse(text).unwrap();

        // Assert
        assert_eq!(hello.protocol_mode(), ProtocolMode::LegacyDelimited);
        assert!(hello.capabilities().contains(BASE_1_0));
    }

    #[test]
    fn test_unqualified_hello_with_base_1_1_selects_chunked_framing() {
        let hello = Hello::parse(
            "<hello><capabilities><capability>urn:ietf:params:netconf:base:1.1</capability></capabilities><session-id>3</session-id></hello>",
        )
        .unwrap();

        assert_eq!(hello.protocol_mode(), ProtocolMode::Chunked);
        assert_eq!(hello.session_id(), Some(3));
    }

    #[test]
    fn test_hello_in_foreign_namespace_is_rejected() {
        let result = Hello::parse(
            r#"<hello xmlns="urn:example"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>"#,
        );

        assert!(matches!(result, Err(HelloError::Xml(XmlError::UnexpectedRoot { .. }))));
    }

    #[test]
    fn test_non_hello_root_is_rejected() {
        let result = Hello::parse("<goodbye><capabilities/></goodbye>");

        assert!(matches!(result, Err(HelloError::Xml(XmlError::UnexpectedRoot { .. }))));
    }

    #[test]
    fn test_malformed_hello_is_rejected() {
        let result = Hello::parse("<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><capabilities>");

        assert!(matches!(result, Err(HelloError::Xml(XmlError::Malformed(_)))));
    }

    #[test]
    fn test_session_id_is_parsed() {
        let hello = Hello::parse(&hello_with(&[BASE_1_0], "<session-id>4711</session-id>")).unwrap();

        assert_eq!(hello.session_id(), Some(4711));
    }

    #[test]
    fn test_invalid_session_id_is_ignored() {
        for bad in ["0", "abc", "-4", "4294967296"] {
            // Arrange
            let text = hello_with(&[BASE_1_0], &format!("<session-id>{bad}</session-id>"));

            // Act
            let hello = Hello::parse(&text).unwrap();

            // Assert
            assert_eq!(hello.session_id(), None, "session-id {bad:?}");
            assert_eq!(hello.protocol_mode(), ProtocolMode::LegacyDelimited);
        }
    }

    #[test]
    fn test_capability_uri_with_query_is_kept_intact() {
        let uri = "urn:ietf:params:netconf:capability:with-defaults:1.0?basic-mode=explicit&amp;also-supported=trim";

        let hello = Hello::parse(&hello_with(&[BASE_1_0, uri], "")).unwrap();

        assert!(hello.capabilities().contains(
            "urn:ietf:params:netconf:capability:with-defaults:1.0?basic-mode=explicit&also-supported=trim"
        ));
    }

    #[test]
    fn test_client_hello_round_trips_through_parse() {
        // Arrange
        let built = Hello::new([BASE_1_0, BASE_1_1]).unwrap();

        // Act
        let parsed = Hello::parse(built.document().as_str()).unwrap();

        // Assert
        assert_eq!(parsed.capabilities(), built.capabilities());
        assert_eq!(parsed.session_id(), None);
    }

    #[test]
    fn test_client_hello_without_base_is_rejected() {
        let result = Hello::new(["urn:example:only"]);

        assert_eq!(result.unwrap_err(), HelloError::MissingBaseCapability);
    }

    #[test]
    fn test_capability_set_never_yields_unknown_mode() {
        let sets = [
            CapabilitySet::from_iter([BASE_1_0]),
            CapabilitySet::from_iter([BASE_1_1]),
            CapabilitySet::new(),
        ];

        for set in sets {
            assert_ne!(set.protocol_mode(), ProtocolMode::Unknown);
        }
    }
}
