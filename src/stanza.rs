//! Parsed stanzas and the owned XML payload tree.
//!
//! A [`Stanza`] is an immutable, already-parsed protocol unit produced
//! by the external stream parser: one of the three core content types
//! (IQ, message, presence) or a stream-control element. The core never
//! serializes XML text; outbound stanzas leave the crate as trees and
//! the transport layer renders them onto the wire.

use crate::addr::Entity;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

/// XML namespaces the stream core knows about.
pub mod ns {
    /// Client content stanzas.
    pub const CLIENT: &str = "jabber:client";
    /// Stream framing elements.
    pub const STREAM: &str = "http://etherx.jabber.org/streams";
    /// STARTTLS negotiation.
    pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
    /// SASL negotiation.
    pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
    /// Resource binding.
    pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
    /// Stanza error conditions.
    pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
    /// Stream error conditions.
    pub const STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
}

/// One node of an element's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    /// A child element.
    Element(XmlElement),
    /// Character data.
    Text(String),
}

/// An owned XML element tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    name: String,
    namespace: Option<String>,
    attributes: HashMap<String, String>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// New element with a name and optional namespace.
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element namespace, if declared.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Child nodes in document order.
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// First child element, if any.
    pub fn first_child(&self) -> Option<&XmlElement> {
        self.children.iter().find_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given name.
    pub fn find_child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|node| match node {
            XmlNode::Element(element) if element.name == name => Some(element),
            _ => None,
        })
    }

    /// Concatenated character data of the direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder-style child element append.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder-style character data append.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    fn render_dense(&self, out: &mut String) {
        out.push_str(&self.name);
        if !self.attributes.is_empty() {
            let mut keys: Vec<&String> = self.attributes.keys().collect();
            keys.sort();
            out.push('[');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{key}={}", self.attributes[key.as_str()]);
            }
            out.push(']');
        }
        if !self.children.is_empty() {
            out.push('{');
            for (i, node) in self.children.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                match node {
                    XmlNode::Element(element) => element.render_dense(out),
                    XmlNode::Text(text) => {
                        let _ = write!(out, "\"{}\"", text.trim());
                    }
                }
            }
            out.push('}');
        }
    }
}

/// An immutable, already-parsed unit of protocol exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Stanza {
    element: XmlElement,
}

impl Stanza {
    /// Wrap a parsed element as a stanza.
    pub fn new(element: XmlElement) -> Self {
        Self { element }
    }

    /// Start building a stanza with the given name and namespace.
    pub fn builder(name: impl Into<String>, namespace: Option<&str>) -> StanzaBuilder {
        StanzaBuilder {
            element: XmlElement::new(name, namespace),
        }
    }

    /// Top-level element name.
    pub fn name(&self) -> &str {
        self.element.name()
    }

    /// Top-level element namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.element.namespace()
    }

    /// Attribute on the top-level element.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.element.attribute(name)
    }

    /// The `id` correlation attribute.
    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// The `to` address, if present and well-formed.
    pub fn to_addr(&self) -> Option<Entity> {
        self.attribute("to").and_then(|t| Entity::parse(t).ok())
    }

    /// The `from` address, if present and well-formed.
    pub fn from_addr(&self) -> Option<Entity> {
        self.attribute("from").and_then(|f| Entity::parse(f).ok())
    }

    /// The underlying element tree.
    pub fn element(&self) -> &XmlElement {
        &self.element
    }

    /// Compact single-line rendering for log output.
    pub fn dense(&self) -> String {
        let mut out = String::new();
        self.element.render_dense(&mut out);
        out
    }

    /// Standard stanza-error response mirroring `original`: addresses
    /// swapped, `type="error"`, same correlation id, with an `<error>`
    /// child carrying the defined condition.
    pub fn error_response(original: &Stanza, error_type: &str, condition: &str) -> Stanza {
        let mut builder = Stanza::builder(original.name(), original.namespace())
            .attribute("type", "error");
        if let Some(id) = original.id() {
            builder = builder.attribute("id", id);
        }
        if let Some(from) = original.attribute("from") {
            builder = builder.attribute("to", from);
        }
        if let Some(to) = original.attribute("to") {
            builder = builder.attribute("from", to);
        }
        builder
            .child(
                XmlElement::new("error", original.namespace())
                    .with_attribute("type", error_type)
                    .with_child(XmlElement::new(condition, Some(ns::STANZAS))),
            )
            .build()
    }

    /// Stream-level error element with the given defined condition.
    pub fn stream_error(condition: &str) -> Stanza {
        Stanza::builder("error", Some(ns::STREAM))
            .child(XmlElement::new(condition, Some(ns::STREAMS)))
            .build()
    }

    /// TLS negotiation failure element.
    pub fn tls_failure() -> Stanza {
        Stanza::builder("failure", Some(ns::TLS)).build()
    }

    /// IQ `result` reply to `request`, following the reply-addressing
    /// convention: response `to` = request `from`, same correlation id.
    pub fn iq_result(request: &Stanza, payload: Option<XmlElement>) -> Stanza {
        let mut builder = Stanza::builder("iq", request.namespace()).attribute("type", "result");
        if let Some(id) = request.id() {
            builder = builder.attribute("id", id);
        }
        if let Some(from) = request.attribute("from") {
            builder = builder.attribute("to", from);
        }
        if let Some(to) = request.attribute("to") {
            builder = builder.attribute("from", to);
        }
        if let Some(payload) = payload {
            builder = builder.child(payload);
        }
        builder.build()
    }
}

/// Builder for outbound stanzas.
#[derive(Debug)]
pub struct StanzaBuilder {
    element: XmlElement,
}

impl StanzaBuilder {
    /// Set an attribute on the top-level element.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.element = self.element.with_attribute(name, value);
        self
    }

    /// Append a child element.
    pub fn child(mut self, child: XmlElement) -> Self {
        self.element = self.element.with_child(child);
        self
    }

    /// Append character data.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.element = self.element.with_text(text);
        self
    }

    /// Finish the stanza.
    pub fn build(self) -> Stanza {
        Stanza::new(self.element)
    }
}

/// The three core content stanza kinds of RFC 3920.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreStanzaKind {
    /// Info/query request-response.
    Iq,
    /// One-directional message.
    Message,
    /// Availability broadcast.
    Presence,
}

/// View over a stanza that is one of the core content types.
///
/// Stream-control and negotiation elements do not wrap; the admission
/// pipeline uses this to apply the authentication gate only to content
/// stanzas.
#[derive(Debug, Clone, Copy)]
pub struct CoreStanza<'a> {
    kind: CoreStanzaKind,
    stanza: &'a Stanza,
}

impl<'a> CoreStanza<'a> {
    /// Classify a stanza; `None` for anything that is not IQ, message
    /// or presence.
    pub fn wrap(stanza: &'a Stanza) -> Option<CoreStanza<'a>> {
        let kind = match stanza.name() {
            "iq" => CoreStanzaKind::Iq,
            "message" => CoreStanzaKind::Message,
            "presence" => CoreStanzaKind::Presence,
            _ => return None,
        };
        Some(CoreStanza { kind, stanza })
    }

    /// Which of the three kinds this is.
    pub fn kind(&self) -> CoreStanzaKind {
        self.kind
    }

    /// The wrapped stanza.
    pub fn stanza(&self) -> &'a Stanza {
        self.stanza
    }
}

/// IQ `type` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqType {
    /// Request for information.
    Get,
    /// Request to change state.
    Set,
    /// Response carrying a result.
    Result,
    /// Response carrying an error.
    Error,
}

impl IqType {
    /// Parse the attribute text; `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "get" => Some(Self::Get),
            "set" => Some(Self::Set),
            "result" => Some(Self::Result),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// The wire form of this type.
    pub fn value(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for IqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
