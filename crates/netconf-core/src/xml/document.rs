//! A parsed, well-formed XML document.
//!
//! NETCONF needs very little from XML: confirm a document is well formed,
//! read and rewrite attributes on the root element (`message-id`), and pull
//! the text out of a few known elements (`capability`, `session-id`).
//! [`XmlDocument`] keeps the original text untouched and records what it
//! learned about the root element while checking well-formedness, so the
//! text sent on the wire is exactly what the caller supplied.
//!
//! Parsing is done with `quick-xml`'s namespace-aware pull reader.  The
//! reader already rejects mismatched end tags; this module adds the rules a
//! pull reader does not enforce on its own:
//!
//! - exactly one root element,
//! - no non-whitespace text outside the root element,
//! - every opened element is closed before the end of input.

use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::{NsReader, Reader};
use quick_xml::writer::Writer;
use thiserror::Error;

/// Namespace of all NETCONF base protocol elements.
pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Errors from parsing or inspecting an [`XmlDocument`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// The text is not well-formed XML.
    #[error("document is not well-formed XML: {0}")]
    Malformed(String),

    /// The text contains no element at all.
    #[error("document has no root element")]
    NoRootElement,

    /// The root element is not the one the caller required.
    #[error("expected root element <{expected}> in namespace {NETCONF_BASE_NS}, found <{found}>")]
    UnexpectedRoot { expected: &'static str, found: String },
}

fn malformed(err: impl fmt::Display) -> XmlError {
    XmlError::Malformed(err.to_string())
}

/// Name, namespace and attributes of a document's root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootElement {
    /// Local (unprefixed) element name.
    pub local_name: String,
    /// Resolved namespace URI, if the element is in a namespace.
    pub namespace: Option<String>,
    /// Attributes as `(qualified name, unescaped value)` in document order.
    pub attributes: Vec<(String, String)>,
}

impl RootElement {
    fn from_start(namespace: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let namespace = match namespace {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(prefix) => {
                return Err(XmlError::Malformed(format!(
                    "unknown namespace prefix {:?}",
                    String::from_utf8_lossy(&prefix)
                )))
            }
        };

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            local_name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            namespace,
            attributes,
        })
    }
}

/// A well-formed XML document and the facts learned about its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    text: String,
    root: RootElement,
}

impl XmlDocument {
    /// Parses `text`, keeping it verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Malformed`] or [`XmlError::NoRootElement`] if the
    /// text is not a single well-formed XML document.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use netconf_core::xml::XmlDocument;
    ///
    /// let doc = XmlDocument::parse(r#"<rpc message-id="7"><get/></rpc>"#).unwrap();
    /// assert_eq!(doc.root_attribute("message-id"), Some("7"));
    /// assert!(XmlDocument::parse("<rpc>").is_err());
    /// ```
    pub fn parse(text: impl Into<String>) -> Result<Self, XmlError> {
        let text = text.into();
        let root = scan(&text)?;
        Ok(Self { text, root })
    }

    /// Parses a UTF-8 byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Malformed`] for invalid UTF-8, or any error of
    /// [`XmlDocument::parse`].
    pub fn from_utf8(bytes: &[u8]) -> Result<Self, XmlError> {
        let text = std::str::from_utf8(bytes).map_err(malformed)?;
        Self::parse(text)
    }

    /// The document text exactly as parsed.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consumes the document, returning its text.
    pub fn into_string(self) -> String {
        self.text
    }

    /// The root element.
    pub fn root(&self) -> &RootElement {
        &self.root
    }

    /// Value of the root attribute with qualified name `name`.
    pub fn root_attribute(&self, name: &str) -> Option<&str> {
        self.root
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the root is `local_name` in the NETCONF base namespace.
    pub fn is_netconf_root(&self, local_name: &str) -> bool {
        self.root.local_name == local_name && self.root.namespace.as_deref() == Some(NETCONF_BASE_NS)
    }

    /// Fails unless the root is `local_name` in the NETCONF base namespace.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::UnexpectedRoot`] naming the root actually found.
    pub fn expect_netconf_root(&self, local_name: &'static str) -> Result<(), XmlError> {
        if self.is_netconf_root(local_name) {
            return Ok(());
        }
        let found = match &self.root.namespace {
            Some(ns) => format!("{} xmlns=\"{}\"", self.root.local_name, ns),
            None => self.root.local_name.clone(),
        };
        Err(XmlError::UnexpectedRoot {
            expected: local_name,
            found,
        })
    }

    /// Returns a copy of the document with root attribute `name` set to `value`.
    ///
    /// An existing attribute keeps its position; a missing one is appended.
    /// Everything else in the document is written back unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Malformed`] if the document cannot be rewritten.
    pub fn with_root_attribute(&self, name: &str, value: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(&self.text);
        let mut writer = Writer::new(Vec::with_capacity(self.text.len() + name.len() + value.len() + 4));
        let mut rewritten = false;

        loop {
            let event = match reader.read_event().map_err(malformed)? {
                Event::Eof => break,
                Event::Start(start) if !rewritten => {
                    rewritten = true;
                    Event::Start(set_attribute(&start, name, value)?)
                }
                Event::Empty(start) if !rewritten => {
                    rewritten = true;
                    Event::Empty(set_attribute(&start, name, value)?)
                }
                other => other,
            };
            writer.write_event(event).map_err(malformed)?;
        }

        let text = String::from_utf8(writer.into_inner()).map_err(malformed)?;
        Self::parse(text)
    }

    /// Collects the trimmed text of every element at `path`.
    ///
    /// `path` lists local names from the root down, and every element on it
    /// must be in `namespace` (`None` selects elements in no namespace).  For
    /// example `["hello", "capabilities", "capability"]` selects each
    /// capability URI of a hello document.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Malformed`] if the text cannot be re-read.
    pub fn select_texts(&self, namespace: Option<&str>, path: &[&str]) -> Result<Vec<String>, XmlError> {
        let mut reader = NsReader::from_str(&self.text);
        // One entry per open element: whether it and all its ancestors match `path`.
        let mut stack: Vec<bool> = Vec::new();
        let mut current = String::new();
        let mut found = Vec::new();

        loop {
            let (ns, event) = reader.read_resolved_event().map_err(malformed)?;
            match event {
                Event::Start(start) => {
                    let depth = stack.len();
                    let parent_matches = stack.last().copied().unwrap_or(true);
                    let matches = parent_matches
                        && depth < path.len()
                        && start.local_name().as_ref() == path[depth].as_bytes()
                        && in_namespace(&ns, namespace);
                    stack.push(matches);
                    if matches && stack.len() == path.len() {
                        current.clear();
                    }
                }
                Event::Empty(start) => {
                    let depth = stack.len();
                    let parent_matches = stack.last().copied().unwrap_or(true);
                    if parent_matches
                        && depth + 1 == path.len()
                        && start.local_name().as_ref() == path[depth].as_bytes()
                        && in_namespace(&ns, namespace)
                    {
                        found.push(String::new());
                    }
                }
                Event::Text(text) if at_target(&stack, path) => {
                    current.push_str(&text.unescape().map_err(malformed)?);
                }
                Event::CData(data) if at_target(&stack, path) => {
                    current.push_str(&String::from_utf8_lossy(&data));
                }
                Event::End(_) => {
                    if at_target(&stack, path) {
                        found.push(current.trim().to_string());
                        current.clear();
                    }
                    stack.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(found)
    }
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl std::str::FromStr for XmlDocument {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Whether a resolved element namespace is `namespace`.
fn in_namespace(resolved: &ResolveResult<'_>, namespace: Option<&str>) -> bool {
    match (resolved, namespace) {
        (ResolveResult::Bound(bound), Some(expected)) => bound.as_ref() == expected.as_bytes(),
        (ResolveResult::Unbound, None) => true,
        _ => false,
    }
}

/// Whether the innermost open element is the last element of `path`.
fn at_target(stack: &[bool], path: &[&str]) -> bool {
    !path.is_empty() && stack.len() == path.len() && stack.last().copied().unwrap_or(false)
}

/// Rebuilds `start` with attribute `name` set to `value`.
fn set_attribute(start: &BytesStart<'_>, name: &str, value: &str) -> Result<BytesStart<'static>, XmlError> {
    let mut rebuilt = BytesStart::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    let mut replaced = false;

    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        if attr.key.as_ref() == name.as_bytes() {
            rebuilt.push_attribute((name, value));
            replaced = true;
        } else {
            rebuilt.push_attribute(attr);
        }
    }
    if !replaced {
        rebuilt.push_attribute((name, value));
    }
    Ok(rebuilt)
}

/// Checks well-formedness and returns the root element.
fn scan(text: &str) -> Result<RootElement, XmlError> {
    let mut reader = NsReader::from_str(text);
    let mut depth = 0usize;
    let mut root: Option<RootElement> = None;

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(malformed)?;
        match event {
            Event::Start(start) => {
                open_element(&mut root, depth, ns, &start)?;
                depth += 1;
            }
            Event::Empty(start) => {
                open_element(&mut root, depth, ns, &start)?;
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| XmlError::Malformed("unmatched end tag".to_string()))?;
            }
            Event::Text(text) => {
                let content = text.unescape().map_err(malformed)?;
                if depth == 0 && !content.trim().is_empty() {
                    return Err(XmlError::Malformed(
                        "text outside the root element".to_string(),
                    ));
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(XmlError::Malformed(
                    "CDATA outside the root element".to_string(),
                ));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(XmlError::Malformed(format!(
            "{depth} element(s) left unclosed at end of input"
        )));
    }
    root.ok_or(XmlError::NoRootElement)
}

fn open_element(
    root: &mut Option<RootElement>,
    depth: usize,
    ns: ResolveResult<'_>,
    start: &BytesStart<'_>,
) -> Result<(), XmlError> {
    if depth > 0 {
        // Attribute syntax is still checked below the root.
        for attr in start.attributes() {
            attr.map_err(malformed)?.unescape_value().map_err(malformed)?;
        }
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Malformed("more than one root element".to_string()));
    }
    *root = Some(RootElement::from_start(ns, start)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.0</capability>
    <capability> urn:ietf:params:netconf:base:1.1 </capability>
  </capabilities>
  <session-id>4</session-id>
</hello>"#;

    #[test]
    fn test_parse_records_root_name_and_namespace() {
        // Arrange / Act
        let doc = XmlDocument::parse(HELLO).unwrap();

        // Assert
        assert_eq!(doc.root().local_name, "hello");
        assert_eq!(doc.root().namespace.as_deref(), Some(NETCONF_BASE_NS));
        assert!(doc.is_netconf_root("hello"));
        assert_eq!(doc.as_str(), HELLO, "text must be kept verbatim");
    }

    #[test]
    fn test_prefixed_root_resolves_namespace() {
        let doc = XmlDocument::parse(
            r#"<nc:rpc xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="3"><nc:get/></nc:rpc>"#,
        )
        .unwrap();

        assert!(doc.is_netconf_root("rpc"));
        assert_eq!(doc.root_attribute("message-id"), Some("3"));
    }

    #[test]
    fn test_unclosed_element_is_malformed() {
        let result = XmlDocument::parse("<rpc><get></rpc>");
        assert!(matches!(result, Err(XmlError::Malformed(_))));
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        let result = XmlDocument::parse("<rpc-reply><ok/>");
        assert!(matches!(result, Err(XmlError::Malformed(_))));
    }

    #[test]
    fn test_two_roots_are_malformed() {
        let result = XmlDocument::parse("<a/><b/>");
        assert!(matches!(result, Err(XmlError::Malformed(_))));
    }

    #[test]
    fn test_text_outside_root_is_malformed() {
        let result = XmlDocument::parse("garbage <a/>");
        assert!(matches!(result, Err(XmlError::Malformed(_))));
    }

    #[test]
    fn test_empty_input_has_no_root() {
        assert_eq!(XmlDocument::parse("  \n "), Err(XmlError::NoRootElement));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let result = XmlDocument::from_utf8(&[b'<', b'a', 0xFF, b'/', b'>']);
        assert!(matches!(result, Err(XmlError::Malformed(_))));
    }

    #[test]
    fn test_with_root_attribute_replaces_existing_value() {
        // Arrange
        let doc = XmlDocument::parse(
            r#"<rpc message-id="old" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><get/></rpc>"#,
        )
        .unwrap();

        // Act
        let stamped = doc.with_root_attribute("message-id", "42").unwrap();

        // Assert
        assert_eq!(stamped.root_attribute("message-id"), Some("42"));
        assert_eq!(
            stamped.as_str(),
            r#"<rpc message-id="42" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><get/></rpc>"#
        );
        assert_eq!(doc.root_attribute("message-id"), Some("old"), "original is untouched");
    }

    #[test]
    fn test_with_root_attribute_appends_missing_attribute() {
        let doc = XmlDocument::parse(r#"<rpc xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"/>"#).unwrap();

        let stamped = doc.with_root_attribute("message-id", "1").unwrap();

        assert_eq!(stamped.root_attribute("message-id"), Some("1"));
        assert!(stamped.is_netconf_root("rpc"));
    }

    #[test]
    fn test_with_root_attribute_leaves_nested_elements_alone() {
        let doc = XmlDocument::parse(r#"<rpc message-id="1"><edit message-id="keep">a &amp; b</edit></rpc>"#).unwrap();

        let stamped = doc.with_root_attribute("message-id", "2").unwrap();

        assert_eq!(
            stamped.as_str(),
            r#"<rpc message-id="2"><edit message-id="keep">a &amp; b</edit></rpc>"#
        );
    }

    #[test]
    fn test_select_texts_returns_trimmed_values_in_order() {
        let doc = XmlDocument::parse(HELLO).unwrap();

        let caps = doc
            .select_texts(Some(NETCONF_BASE_NS), &["hello", "capabilities", "capability"])
            .unwrap();

        assert_eq!(
            caps,
            vec![
                "urn:ietf:params:netconf:base:1.0".to_string(),
                "urn:ietf:params:netconf:base:1.1".to_string(),
            ]
        );
    }

    #[test]
    fn test_select_texts_ignores_elements_in_other_namespaces() {
        let doc = XmlDocument::parse(
            r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability xmlns="urn:example">x</capability><capability>y</capability></capabilities></hello>"#,
        )
        .unwrap();

        let caps = doc
            .select_texts(Some(NETCONF_BASE_NS), &["hello", "capabilities", "capability"])
            .unwrap();

        assert_eq!(caps, vec!["y".to_string()]);
    }

    #[test]
    fn test_select_texts_without_namespace() {
        let doc = XmlDocument::parse(
            "<hello><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>",
        )
        .unwrap();

        let unqualified = doc
            .select_texts(None, &["hello", "capabilities", "capability"])
            .unwrap();
        let qualified = doc
            .select_texts(Some(NETCONF_BASE_NS), &["hello", "capabilities", "capability"])
            .unwrap();

        assert_eq!(unqualified, vec!["urn:ietf:params:netconf:base:1.0".to_string()]);
        assert!(qualified.is_empty());
    }

    #[test]
    fn test_expect_netconf_root_reports_what_was_found() {
        let doc = XmlDocument::parse("<hello/>").unwrap();

        let result = doc.expect_netconf_root("hello");

        assert_eq!(
            result,
            Err(XmlError::UnexpectedRoot {
                expected: "hello",
                found: "hello".to_string()
            })
        );
    }
}
