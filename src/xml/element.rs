use std::fmt;
use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::xml::XML_NS;

/// Namespace-qualified element or attribute name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QName {
    namespace: String,
    local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Name without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self::new(String::new(), local_name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Returns true if this name has the given namespace and local name
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace == namespace && self.local_name == local_name
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

/// Attribute of an element. The prefix is only a serialization hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub prefix: Option<String>,
    pub value: String,
}

/// Child node of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(XmlElement),
    Text(String),
}

/// An owned XML element with its attributes and descendants.
///
/// Used wherever the protocol passes XML through untouched: issued tokens,
/// validation targets, key material. Serialization declares every namespace
/// that is not already in scope, so a subtree detached from its document
/// stays well-formed.
///
/// Equality compares the XML infoset: names, attribute values and children.
/// Prefixes and namespace declarations are ignored.
#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    name: QName,
    prefix: Option<String>,
    attributes: Vec<Attribute>,
    namespaces: Vec<(Option<String>, String)>,
    children: Vec<Node>,
}

impl PartialEq for XmlElement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attributes.len() == other.attributes.len()
            && self
                .attributes
                .iter()
                .zip(&other.attributes)
                .all(|(a, b)| a.name == b.name && a.value == b.value)
            && self.children == other.children
    }
}

impl Eq for XmlElement {}

impl XmlElement {
    /// Creates an element. An empty prefix selects the default namespace.
    pub fn new(namespace: &str, prefix: &str, local_name: &str) -> Self {
        Self {
            name: QName::new(namespace, local_name),
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            ..Default::default()
        }
    }

    /// Creates an element holding a single text node
    pub fn text_element(namespace: &str, prefix: &str, local_name: &str, text: &str) -> Self {
        Self::new(namespace, prefix, local_name).with_text(text)
    }

    pub(crate) fn from_parts(
        name: QName,
        prefix: Option<String>,
        attributes: Vec<Attribute>,
        namespaces: Vec<(Option<String>, String)>,
    ) -> Self {
        Self {
            name,
            prefix,
            attributes,
            namespaces,
            children: Vec::new(),
        }
    }

    /// Adds an unqualified attribute
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Adds a namespace-qualified attribute
    pub fn with_qualified_attribute(
        mut self,
        namespace: &str,
        prefix: &str,
        name: &str,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(Attribute {
            name: QName::new(namespace, name),
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            value: value.into(),
        });
        self
    }

    /// Declares a namespace on this element even if no name uses it
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        let prefix = (!prefix.is_empty()).then(|| prefix.to_string());
        self.namespaces.push((prefix, uri.to_string()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Adds the child when present
    pub fn with_optional_child(mut self, child: Option<XmlElement>) -> Self {
        if let Some(child) = child {
            self.children.push(Node::Element(child));
        }
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Sets or replaces an unqualified attribute
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.namespace.is_empty() && a.name.local_name == name)
        {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                name: QName::local(name),
                prefix: None,
                value,
            }),
        }
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Inserts a child element at the given node index
    pub fn insert_child(&mut self, index: usize, child: XmlElement) {
        let index = index.min(self.children.len());
        self.children.insert(index, Node::Element(child));
    }

    /// Keeps only the element children matching the predicate. Text is kept.
    pub fn retain_elements(&mut self, mut keep: impl FnMut(&XmlElement) -> bool) {
        self.children.retain(|node| match node {
            Node::Element(el) => keep(el),
            Node::Text(_) => true,
        });
    }

    /// Replaces all children
    pub fn set_children(&mut self, children: Vec<Node>) {
        self.children = children;
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    pub fn namespace(&self) -> &str {
        &self.name.namespace
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn namespaces(&self) -> &[(Option<String>, String)] {
        &self.namespaces
    }

    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// Value of an unqualified attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attribute_ns("", name)
    }

    pub fn attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(namespace, name))
            .map(|a| a.value.as_str())
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn first_element(&self) -> Option<&XmlElement> {
        self.elements().next()
    }

    /// First child element with the given name
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name.is(namespace, local_name))
    }

    pub fn child_mut(&mut self, namespace: &str, local_name: &str) -> Option<&mut XmlElement> {
        self.elements_mut()
            .find(|el| el.name.is(namespace, local_name))
    }

    /// First child element with the given local name, in any namespace
    pub fn child_by_local_name(&self, local_name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name.local_name == local_name)
    }

    /// Node index of the first child element with the given name
    pub fn position_of(&self, namespace: &str, local_name: &str) -> Option<usize> {
        self.children.iter().position(|node| match node {
            Node::Element(el) => el.name.is(namespace, local_name),
            Node::Text(_) => false,
        })
    }

    /// Depth-first search of the descendants, excluding this element
    pub fn find(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        for el in self.elements() {
            if el.name.is(namespace, local_name) {
                return Some(el);
            }
            if let Some(found) = el.find(namespace, local_name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text of the direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Text of the first child element with the given name
    pub fn child_text(&self, namespace: &str, local_name: &str) -> Option<String> {
        self.child(namespace, local_name).map(XmlElement::text)
    }

    /// Serializes the element and its descendants
    pub fn to_xml(&self) -> Result<String, quick_xml::Error> {
        let mut writer = Writer::new(Vec::new());
        self.write_to(&mut writer)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    /// Writes the element to an existing writer with an empty namespace scope
    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), quick_xml::Error> {
        let mut scope = Vec::new();
        self.write_scoped(writer, &mut scope)
    }

    fn write_scoped<W: Write>(
        &self,
        writer: &mut Writer<W>,
        scope: &mut Vec<(Option<String>, String)>,
    ) -> Result<(), quick_xml::Error> {
        let mark = scope.len();
        let mut declarations = Vec::new();

        for (prefix, uri) in &self.namespaces {
            bind(scope, &mut declarations, prefix.clone(), uri, true);
        }

        let prefix = if self.name.namespace.is_empty() {
            None
        } else {
            self.prefix.clone()
        };
        bind(scope, &mut declarations, prefix.clone(), &self.name.namespace, false);

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            let key = if attr.name.namespace.is_empty() {
                attr.name.local_name.clone()
            } else if attr.name.namespace == XML_NS {
                format!("xml:{}", attr.name.local_name)
            } else {
                let prefix = attr
                    .prefix
                    .clone()
                    .or_else(|| prefix_for(scope, &attr.name.namespace))
                    .unwrap_or_else(|| format!("ns{}", scope.len()));
                bind(
                    scope,
                    &mut declarations,
                    Some(prefix.clone()),
                    &attr.name.namespace,
                    false,
                );
                format!("{prefix}:{}", attr.name.local_name)
            };
            attributes.push((key, attr.value.as_str()));
        }

        let qualified = match &prefix {
            Some(p) => format!("{p}:{}", self.name.local_name),
            None => self.name.local_name.clone(),
        };
        let mut start = BytesStart::new(qualified.as_str());
        for (prefix, uri) in &declarations {
            let key = match prefix {
                Some(p) => format!("xmlns:{p}"),
                None => "xmlns".to_string(),
            };
            start.push_attribute((key.as_str(), uri.as_str()));
        }
        for (key, value) in &attributes {
            start.push_attribute((key.as_str(), *value));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            for node in &self.children {
                match node {
                    Node::Element(el) => el.write_scoped(writer, scope)?,
                    Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
                }
            }
            writer.write_event(Event::End(BytesEnd::new(qualified.as_str())))?;
        }

        scope.truncate(mark);
        Ok(())
    }
}

fn lookup<'a>(scope: &'a [(Option<String>, String)], prefix: &Option<String>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn prefix_for(scope: &[(Option<String>, String)], namespace: &str) -> Option<String> {
    scope
        .iter()
        .rev()
        .find(|(p, uri)| p.is_some() && uri == namespace)
        .and_then(|(p, _)| p.clone())
}

/// Records a declaration unless the prefix is already bound to the namespace.
fn bind(
    scope: &mut Vec<(Option<String>, String)>,
    declarations: &mut Vec<(Option<String>, String)>,
    prefix: Option<String>,
    namespace: &str,
    explicit: bool,
) {
    if prefix.as_deref() == Some("xml") {
        return;
    }
    let current = lookup(scope, &prefix);
    let bound = match (&prefix, current) {
        (_, Some(uri)) => uri == namespace,
        (None, None) => namespace.is_empty(),
        (Some(_), None) => false,
    };
    if bound {
        return;
    }
    if !explicit && prefix.is_some() && namespace.is_empty() {
        return;
    }
    if declarations.iter().any(|(p, _)| *p == prefix) {
        return;
    }
    scope.push((prefix.clone(), namespace.to_string()));
    declarations.push((prefix, namespace.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS_A: &str = "http://a.example.org";
    const NS_B: &str = "http://b.example.org";

    #[test]
    fn test_serialize_declares_namespaces_once() {
        let el = XmlElement::new(NS_A, "a", "Root")
            .with_child(XmlElement::text_element(NS_A, "a", "Child", "value"));

        let xml = el.to_xml().unwrap();
        assert_eq!(
            xml,
            r#"<a:Root xmlns:a="http://a.example.org"><a:Child>value</a:Child></a:Root>"#
        );
    }

    #[test]
    fn test_serialize_nested_foreign_namespace() {
        let el = XmlElement::new(NS_A, "a", "Root").with_child(
            XmlElement::new(NS_B, "b", "Inner").with_qualified_attribute(NS_A, "a", "Id", "x1"),
        );

        let xml = el.to_xml().unwrap();
        assert!(xml.contains(r#"<b:Inner xmlns:b="http://b.example.org" a:Id="x1"/>"#));
    }

    #[test]
    fn test_default_namespace_and_unqualified_children() {
        let el = XmlElement::new(NS_A, "", "Root").with_child(XmlElement::new("", "", "plain"));

        let xml = el.to_xml().unwrap();
        assert_eq!(
            xml,
            r#"<Root xmlns="http://a.example.org"><plain xmlns=""/></Root>"#
        );
    }

    #[test]
    fn test_equality_ignores_declarations_and_prefixes() {
        let built = XmlElement::new(NS_A, "a", "Root")
            .with_attribute("Id", "r1")
            .with_child(XmlElement::text_element(NS_B, "b", "Child", "value"));
        let parsed = crate::xml::ElementReader::new(
            r#"<x:Root xmlns:x="http://a.example.org" xmlns:unused="urn:unused" Id="r1"><y:Child xmlns:y="http://b.example.org">value</y:Child></x:Root>"#,
        )
        .unwrap()
        .raw_subtree()
        .unwrap();

        assert!(!parsed.namespaces().is_empty());
        assert_eq!(parsed, built);
        assert_ne!(parsed, built.clone().with_attribute("Extra", "1"));
        assert_ne!(parsed, XmlElement::new(NS_B, "a", "Root").with_attribute("Id", "r1"));
    }

    #[test]
    fn test_text_is_escaped() {
        let el = XmlElement::text_element("", "", "v", "a < b & c");
        assert_eq!(el.to_xml().unwrap(), "<v>a &lt; b &amp; c</v>");
    }

    #[test]
    fn test_lookup_helpers() {
        let el = XmlElement::new(NS_A, "a", "Root")
            .with_attribute("Context", "ctx")
            .with_child(
                XmlElement::new(NS_A, "a", "Wrapper")
                    .with_child(XmlElement::text_element(NS_B, "b", "Deep", "found")),
            );

        assert_eq!(el.attribute("Context"), Some("ctx"));
        assert!(el.child(NS_A, "Wrapper").is_some());
        assert!(el.child(NS_B, "Deep").is_none());
        assert_eq!(el.find(NS_B, "Deep").map(XmlElement::text).as_deref(), Some("found"));
        assert_eq!(el.position_of(NS_A, "Wrapper"), Some(0));
    }

    #[test]
    fn test_retain_and_insert() {
        let mut el = XmlElement::new(NS_A, "a", "Root")
            .with_child(XmlElement::new(NS_A, "a", "One"))
            .with_child(XmlElement::new(NS_A, "a", "Two"));

        el.retain_elements(|child| child.local_name() != "One");
        el.insert_child(0, XmlElement::new(NS_A, "a", "Zero"));

        let names: Vec<_> = el.elements().map(XmlElement::local_name).collect();
        assert_eq!(names, ["Zero", "Two"]);
    }

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::new(NS_A, "X").to_string(), "{http://a.example.org}X");
        assert_eq!(QName::local("X").to_string(), "X");
    }
}
