// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! A minimal owned XML element tree.

Documents are read with the `xml-rs` event reader and written back with its event
writer. Whitespace, comments and namespace declarations are retained so a
document that is parsed, edited in a few places and written again keeps the
formatting of everything that was not edited.
*/

use {
    crate::error::{NbmError, Result},
    std::{
        borrow::Cow,
        io::{Read, Write},
    },
    xml::{
        attribute::OwnedAttribute,
        common::XmlVersion,
        name::OwnedName,
        namespace::Namespace,
        reader::{ParserConfig, XmlEvent as ReaderEvent},
        writer::{EmitterConfig, EventWriter, XmlEvent as WriterEvent},
    },
};

/// A node in an element's content.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { name: String, data: Option<String> },
}

impl XmlNode {
    /// Whether this node is text consisting only of whitespace.
    pub fn is_whitespace(&self) -> bool {
        matches!(self, Self::Text(s) if s.chars().all(|c| c.is_whitespace()))
    }
}

/// An XML element with its attributes and content.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlElement {
    pub name: OwnedName,
    pub attributes: Vec<OwnedAttribute>,
    pub namespace: Namespace,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Construct an element without a namespace.
    pub fn new(local_name: &str) -> Self {
        Self {
            name: OwnedName::local(local_name),
            attributes: vec![],
            namespace: Namespace::empty(),
            children: vec![],
        }
    }

    /// Construct an element in the same namespace as this one.
    pub fn new_child(&self, local_name: &str) -> Self {
        Self {
            name: OwnedName {
                local_name: local_name.to_string(),
                namespace: self.name.namespace.clone(),
                prefix: self.name.prefix.clone(),
            },
            attributes: vec![],
            namespace: self.namespace.clone(),
            children: vec![],
        }
    }

    /// The local name of this element.
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    /// Obtain the value of an attribute by local name.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attribute(&mut self, local_name: &str, value: impl ToString) {
        if let Some(a) = self
            .attributes
            .iter_mut()
            .find(|a| a.name.local_name == local_name)
        {
            a.value = value.to_string();
        } else {
            self.attributes
                .push(OwnedAttribute::new(OwnedName::local(local_name), value.to_string()));
        }
    }

    /// Builder style variant of [Self::set_attribute].
    pub fn with_attribute(mut self, local_name: &str, value: impl ToString) -> Self {
        self.set_attribute(local_name, value);
        self
    }

    /// Iterate over child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Iterate mutably over child elements.
    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Find the first child element with a local name.
    pub fn find_child(&self, local_name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.local_name() == local_name)
    }

    /// Find the first child element with a local name, mutably.
    pub fn find_child_mut(&mut self, local_name: &str) -> Option<&mut XmlElement> {
        self.child_elements_mut()
            .find(|e| e.local_name() == local_name)
    }

    /// Node index of the first child element with a local name.
    pub fn child_node_index(&self, local_name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|n| matches!(n, XmlNode::Element(e) if e.local_name() == local_name))
    }

    /// Depth first search for a descendant element, including this element.
    pub fn find_descendant(&self, local_name: &str) -> Option<&XmlElement> {
        if self.local_name() == local_name {
            return Some(self);
        }

        self.child_elements()
            .find_map(|e| e.find_descendant(local_name))
    }

    /// Depth first search for a descendant element, mutably.
    pub fn find_descendant_mut(&mut self, local_name: &str) -> Option<&mut XmlElement> {
        if self.local_name() == local_name {
            return Some(self);
        }

        self.child_elements_mut()
            .find_map(|e| e.find_descendant_mut(local_name))
    }

    /// Concatenated text content of direct text children, trimmed.
    ///
    /// Returns `None` if the element has no non-whitespace text.
    pub fn text(&self) -> Option<String> {
        let text = self
            .children
            .iter()
            .filter_map(|n| match n {
                XmlNode::Text(s) | XmlNode::CData(s) => Some(s.as_str()),
                _ => None,
            })
            .collect::<String>();

        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Replace the content of this element with text.
    pub fn set_text(&mut self, text: impl ToString) {
        self.children = vec![XmlNode::Text(text.to_string())];
    }

    /// Builder style variant of [Self::set_text].
    pub fn with_text(mut self, text: impl ToString) -> Self {
        self.set_text(text);
        self
    }

    /// The whitespace preceding child elements, starting at the last newline.
    ///
    /// Used to indent inserted elements like their siblings.
    pub fn child_indent(&self) -> Option<String> {
        for (i, node) in self.children.iter().enumerate() {
            if let XmlNode::Element(_) = node {
                if i == 0 {
                    return None;
                }

                return match &self.children[i - 1] {
                    XmlNode::Text(s) => {
                        let start = s.rfind('\n').unwrap_or(0);
                        let indent = &s[start..];
                        if indent.chars().all(|c| c.is_whitespace()) {
                            Some(indent.to_string())
                        } else {
                            None
                        }
                    }
                    _ => None,
                };
            }
        }

        None
    }

    /// Insert an element after the node at `node_index`, preceded by `indent`.
    pub fn insert_element_after(&mut self, node_index: usize, element: XmlElement, indent: &str) {
        self.children
            .insert(node_index + 1, XmlNode::Element(element));
        if !indent.is_empty() {
            self.children
                .insert(node_index + 1, XmlNode::Text(indent.to_string()));
        }
    }

    /// Insert an element before the node at `node_index`, followed by `indent`.
    pub fn insert_element_before(&mut self, node_index: usize, element: XmlElement, indent: &str) {
        if !indent.is_empty() {
            self.children
                .insert(node_index, XmlNode::Text(indent.to_string()));
        }
        self.children.insert(node_index, XmlNode::Element(element));
    }

    /// Append an element after the last child element.
    ///
    /// `indent` precedes the new element. If the element has no child elements yet,
    /// `closing_indent` is placed between the new element and the end tag.
    pub fn append_element(&mut self, element: XmlElement, indent: &str, closing_indent: &str) {
        let last_element = self
            .children
            .iter()
            .rposition(|n| matches!(n, XmlNode::Element(_)));

        if let Some(index) = last_element {
            self.insert_element_after(index, element, indent);
        } else {
            // Only whitespace (or nothing) inside the element. Normalize it.
            if self.children.iter().all(|n| n.is_whitespace()) {
                self.children.clear();
            }
            if !indent.is_empty() {
                self.children.push(XmlNode::Text(indent.to_string()));
            }
            self.children.push(XmlNode::Element(element));
            if !closing_indent.is_empty() {
                self.children
                    .push(XmlNode::Text(closing_indent.to_string()));
            }
        }
    }

    /// Remove the child element at `node_index` along with the whitespace before it.
    pub fn remove_element_at(&mut self, node_index: usize) -> Option<XmlElement> {
        if node_index >= self.children.len() {
            return None;
        }

        let removed = match self.children.remove(node_index) {
            XmlNode::Element(e) => e,
            other => {
                self.children.insert(node_index, other);
                return None;
            }
        };

        if node_index > 0 && self.children[node_index - 1].is_whitespace() {
            self.children.remove(node_index - 1);
        }

        if self.child_elements().next().is_none() && self.children.iter().all(|n| n.is_whitespace())
        {
            self.children.clear();
        }

        Some(removed)
    }

    /// Remove the first child element with a local name.
    pub fn remove_child(&mut self, local_name: &str) -> Option<XmlElement> {
        let index = self.child_node_index(local_name)?;
        self.remove_element_at(index)
    }

    fn write<W: Write>(&self, writer: &mut EventWriter<W>) -> Result<()> {
        let attributes = self
            .attributes
            .iter()
            .map(|a| a.borrow())
            .collect::<Vec<_>>();

        writer.write(WriterEvent::StartElement {
            name: self.name.borrow(),
            attributes: Cow::Owned(attributes),
            namespace: Cow::Borrowed(&self.namespace),
        })?;

        for child in &self.children {
            write_node(child, writer)?;
        }

        writer.write(WriterEvent::EndElement {
            name: Some(self.name.borrow()),
        })?;

        Ok(())
    }
}

fn write_node<W: Write>(node: &XmlNode, writer: &mut EventWriter<W>) -> Result<()> {
    match node {
        XmlNode::Element(e) => e.write(writer)?,
        XmlNode::Text(s) => writer.write(WriterEvent::Characters(s))?,
        XmlNode::CData(s) => writer.write(WriterEvent::CData(s))?,
        XmlNode::Comment(s) => writer.write(WriterEvent::Comment(s))?,
        XmlNode::ProcessingInstruction { name, data } => {
            writer.write(WriterEvent::ProcessingInstruction {
                name,
                data: data.as_deref(),
            })?
        }
    }

    Ok(())
}

/// The `<?xml ... ?>` declaration of a document.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlDeclaration {
    pub version: XmlVersion,
    pub encoding: String,
    pub standalone: Option<bool>,
}

impl Default for XmlDeclaration {
    fn default() -> Self {
        Self {
            version: XmlVersion::Version10,
            encoding: "UTF-8".to_string(),
            standalone: None,
        }
    }
}

/// A parsed XML document.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlDocument {
    pub declaration: Option<XmlDeclaration>,
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
    pub epilog: Vec<XmlNode>,
}

impl XmlDocument {
    /// Construct a document around a root element.
    pub fn new(root: XmlElement) -> Self {
        Self {
            declaration: Some(XmlDeclaration::default()),
            prolog: vec![],
            root,
            epilog: vec![],
        }
    }

    /// Parse a document from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let has_declaration = data
            .strip_prefix(b"\xef\xbb\xbf".as_ref())
            .unwrap_or(data)
            .starts_with(b"<?xml");

        Self::parse_reader(data, has_declaration)
    }

    fn parse_reader<R: Read>(reader: R, has_declaration: bool) -> Result<Self> {
        let parser = ParserConfig::new()
            .trim_whitespace(false)
            .whitespace_to_characters(true)
            .cdata_to_characters(false)
            .ignore_comments(false)
            .coalesce_characters(true)
            .create_reader(reader);

        let mut declaration = None;
        let mut prolog = vec![];
        let mut epilog = vec![];
        let mut root: Option<XmlElement> = None;
        let mut stack: Vec<XmlElement> = vec![];

        for event in parser {
            let node = match event? {
                ReaderEvent::StartDocument {
                    version,
                    encoding,
                    standalone,
                } => {
                    if has_declaration {
                        declaration = Some(XmlDeclaration {
                            version,
                            encoding,
                            standalone,
                        });
                    }
                    continue;
                }
                ReaderEvent::EndDocument => break,
                ReaderEvent::StartElement {
                    name,
                    attributes,
                    namespace,
                } => {
                    stack.push(XmlElement {
                        name,
                        attributes,
                        namespace,
                        children: vec![],
                    });
                    continue;
                }
                ReaderEvent::EndElement { .. } => {
                    let element = stack.pop().ok_or_else(|| {
                        NbmError::MalformedDescriptor("unbalanced end element".to_string())
                    })?;

                    if stack.is_empty() {
                        root = Some(element);
                        continue;
                    }

                    XmlNode::Element(element)
                }
                ReaderEvent::Characters(s) | ReaderEvent::Whitespace(s) => {
                    if stack.is_empty() {
                        continue;
                    }
                    XmlNode::Text(s)
                }
                ReaderEvent::CData(s) => XmlNode::CData(s),
                ReaderEvent::Comment(s) => XmlNode::Comment(s),
                ReaderEvent::ProcessingInstruction { name, data } => {
                    XmlNode::ProcessingInstruction { name, data }
                }
                #[allow(unreachable_patterns)]
                _ => continue,
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
            } else if root.is_none() {
                prolog.push(node);
            } else {
                epilog.push(node);
            }
        }

        let root = root.ok_or_else(|| {
            NbmError::MalformedDescriptor("document has no root element".to_string())
        })?;

        Ok(Self {
            declaration,
            prolog,
            root,
            epilog,
        })
    }

    /// Serialize the document.
    ///
    /// With `indent`, the writer indents elements itself. This is meant for trees
    /// built in memory that carry no whitespace of their own.
    pub fn to_bytes(&self, indent: bool) -> Result<Vec<u8>> {
        let mut buf = vec![];

        if let Some(decl) = &self.declaration {
            write!(
                &mut buf,
                "<?xml version=\"{}\" encoding=\"{}\"",
                decl.version, decl.encoding
            )?;
            if let Some(standalone) = decl.standalone {
                write!(
                    &mut buf,
                    " standalone=\"{}\"",
                    if standalone { "yes" } else { "no" }
                )?;
            }
            buf.write_all(b"?>\n")?;
        }

        let mut writer = EmitterConfig::new()
            .perform_indent(indent)
            .write_document_declaration(false)
            .normalize_empty_elements(true)
            .pad_self_closing(false)
            .autopad_comments(false)
            .create_writer(buf);

        for node in &self.prolog {
            write_node(node, &mut writer)?;
            writer.inner_mut().write_all(b"\n")?;
        }

        self.root.write(&mut writer)?;

        for node in &self.epilog {
            writer.inner_mut().write_all(b"\n")?;
            write_node(node, &mut writer)?;
        }

        writer.inner_mut().write_all(b"\n")?;

        Ok(writer.into_inner())
    }
}
