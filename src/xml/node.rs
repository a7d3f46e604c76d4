/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::{AttrMap, XmlError, XmlNode};

/// Discriminant of an [`XmlNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlNodeType {
    Document,
    Element,
    ProcessingInstruction,
    Declaration,
    Text,
    Comment,
}

impl AttrMap {
    pub fn new() -> Self {
        AttrMap::default()
    }

    /// Adds an attribute. Keys are unique case-insensitively; a duplicate
    /// is rejected rather than replaced.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), XmlError> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(XmlError::AttrExists);
        }
        self.entries.push((key, value.into()));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(idx).1)
    }

    /// Attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl XmlNode {
    pub fn document() -> Self {
        XmlNode::Document { children: Vec::new() }
    }

    pub fn element(name: impl Into<String>) -> Self {
        XmlNode::Element {
            name: name.into(),
            attributes: AttrMap::new(),
            children: Vec::new(),
        }
    }

    pub fn element_with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        XmlNode::Element {
            name: name.into(),
            attributes: AttrMap::new(),
            children: vec![XmlNode::text(text)],
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        XmlNode::Text { text: text.into() }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        XmlNode::Comment { text: text.into() }
    }

    pub fn processing_instruction(name: impl Into<String>) -> Self {
        XmlNode::ProcessingInstruction {
            name: name.into(),
            attributes: AttrMap::new(),
            tag_data: None,
        }
    }

    pub fn declaration(name: impl Into<String>) -> Self {
        XmlNode::Declaration {
            name: name.into(),
            tag_data: None,
        }
    }

    /// The `<?xml version="1.0" encoding="..."?>` processing instruction.
    pub fn xml_declaration(encoding: &str) -> Self {
        let mut attributes = AttrMap::new();
        // Fresh map, the inserts cannot collide.
        let _ = attributes.insert("version", "1.0");
        let _ = attributes.insert("encoding", encoding);
        XmlNode::ProcessingInstruction {
            name: "xml".to_string(),
            attributes,
            tag_data: None,
        }
    }

    pub fn node_type(&self) -> XmlNodeType {
        match self {
            XmlNode::Document { .. } => XmlNodeType::Document,
            XmlNode::Element { .. } => XmlNodeType::Element,
            XmlNode::ProcessingInstruction { .. } => XmlNodeType::ProcessingInstruction,
            XmlNode::Declaration { .. } => XmlNodeType::Declaration,
            XmlNode::Text { .. } => XmlNodeType::Text,
            XmlNode::Comment { .. } => XmlNodeType::Comment,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            XmlNode::Element { name, .. }
            | XmlNode::ProcessingInstruction { name, .. }
            | XmlNode::Declaration { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Children of a document or element; empty for every other kind.
    pub fn children(&self) -> &[XmlNode] {
        match self {
            XmlNode::Document { children } | XmlNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<XmlNode>> {
        match self {
            XmlNode::Document { children } | XmlNode::Element { children, .. } => Some(children),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&AttrMap> {
        match self {
            XmlNode::Element { attributes, .. }
            | XmlNode::ProcessingInstruction { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attributes_mut(&mut self) -> Option<&mut AttrMap> {
        match self {
            XmlNode::Element { attributes, .. }
            | XmlNode::ProcessingInstruction { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    /// Text content of a text node.
    pub fn text_content(&self) -> Option<&str> {
        match self {
            XmlNode::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Free-form tag body of a processing instruction, declaration, or
    /// comment.
    pub fn tag_data(&self) -> Option<&str> {
        match self {
            XmlNode::ProcessingInstruction { tag_data, .. }
            | XmlNode::Declaration { tag_data, .. } => tag_data.as_deref(),
            XmlNode::Comment { text } => Some(text),
            _ => None,
        }
    }

    pub fn set_tag_data(&mut self, data: impl Into<String>) -> bool {
        match self {
            XmlNode::ProcessingInstruction { tag_data, .. }
            | XmlNode::Declaration { tag_data, .. } => {
                *tag_data = Some(data.into());
                true
            }
            XmlNode::Comment { text } => {
                *text = data.into();
                true
            }
            _ => false,
        }
    }

    pub fn insert_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), XmlError> {
        match self.attributes_mut() {
            Some(attributes) => attributes.insert(key, value),
            None => Err(XmlError::Misuse),
        }
    }

    /// Appends a child. Only documents and elements hold children, and a
    /// document can never become a child.
    pub fn append_child(&mut self, child: XmlNode) -> Result<(), XmlError> {
        if matches!(child, XmlNode::Document { .. }) {
            return Err(XmlError::Misuse);
        }
        match self.children_mut() {
            Some(children) => {
                children.push(child);
                Ok(())
            }
            None => Err(XmlError::Misuse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_uniqueness() {
        let mut node = XmlNode::element("tag");
        node.insert_attribute("a", "1").unwrap();
        node.insert_attribute("b", "2").unwrap();
        assert_eq!(node.insert_attribute("A", "3"), Err(XmlError::AttrExists));

        let attrs = node.attributes().unwrap();
        assert_eq!(attrs.get("A"), Some("1"));
        let keys: Vec<_> = attrs.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn child_rules() {
        let mut doc = XmlNode::document();
        doc.append_child(XmlNode::element("root")).unwrap();
        doc.append_child(XmlNode::comment("note")).unwrap();
        assert_eq!(doc.children().len(), 2);

        assert_eq!(
            doc.append_child(XmlNode::document()),
            Err(XmlError::Misuse)
        );

        let mut text = XmlNode::text("t");
        assert_eq!(
            text.append_child(XmlNode::element("x")),
            Err(XmlError::Misuse)
        );
    }

    #[test]
    fn xml_declaration_attributes() {
        let node = XmlNode::xml_declaration("UTF-8");
        assert_eq!(node.name(), Some("xml"));
        let attrs = node.attributes().unwrap();
        assert_eq!(attrs.get("version"), Some("1.0"));
        assert_eq!(attrs.get("encoding"), Some("UTF-8"));
    }
}
