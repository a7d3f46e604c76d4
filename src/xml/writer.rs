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

use std::path::Path;

use crate::xml::entities::{encode_attribute, encode_text};
use crate::xml::node::XmlNodeType;
use crate::{XmlNode, XmlWriteFlags};

/// The `xml` declaration's attributes in the order they must appear.
static XML_DECLARATION_ATTRIBUTES: &[&str] = &["version", "encoding", "standalone"];

/// Position of a node among its siblings, for layout decisions.
#[derive(Clone, Copy)]
struct Siblings<'a> {
    nodes: &'a [XmlNode],
    index: usize,
    parent_is_doc: bool,
}

impl Siblings<'_> {
    fn prev_is_text(&self) -> bool {
        self.index > 0 && self.nodes[self.index - 1].node_type() == XmlNodeType::Text
    }

    fn next_is_text(&self) -> bool {
        self.nodes
            .get(self.index + 1)
            .is_some_and(|node| node.node_type() == XmlNodeType::Text)
    }
}

fn indent(buf: &mut String, flags: XmlWriteFlags, depth: usize) {
    if depth == 0 {
        return;
    }
    if flags.contains(XmlWriteFlags::PRETTYPRINT_SPACE) {
        for _ in 0..depth {
            buf.push_str("  ");
        }
    } else if flags.contains(XmlWriteFlags::PRETTYPRINT_TAB) {
        for _ in 0..depth {
            buf.push('\t');
        }
    }
}

fn newline(buf: &mut String, flags: XmlWriteFlags) {
    if flags.intersects(XmlWriteFlags::PRETTYPRINT_SPACE | XmlWriteFlags::PRETTYPRINT_TAB) {
        buf.push('\n');
    }
}

fn push_name(buf: &mut String, flags: XmlWriteFlags, name: &str) {
    if flags.contains(XmlWriteFlags::LOWER_TAGS) {
        buf.push_str(&name.to_lowercase());
    } else {
        buf.push_str(name);
    }
}

fn push_attribute(buf: &mut String, flags: XmlWriteFlags, key: &str, value: &str) {
    buf.push(' ');
    if flags.contains(XmlWriteFlags::LOWER_ATTRS) {
        buf.push_str(&key.to_lowercase());
    } else {
        buf.push_str(key);
    }
    buf.push_str("=\"");
    if flags.contains(XmlWriteFlags::DONT_ENCODE_ATTRS) {
        buf.push_str(value);
    } else {
        buf.push_str(&encode_attribute(value));
    }
    buf.push('"');
}

fn write_attributes(buf: &mut String, flags: XmlWriteFlags, node: &XmlNode) {
    let Some(attributes) = node.attributes() else {
        return;
    };

    // The xml declaration requires "version encoding standalone" first,
    // in that order and lowercased.
    let is_declaration = node.node_type() == XmlNodeType::ProcessingInstruction
        && node.name() == Some("xml");
    if is_declaration {
        for &key in XML_DECLARATION_ATTRIBUTES {
            if let Some(value) = attributes.get(key) {
                push_attribute(buf, flags, key, value);
            }
        }
    }

    for (key, value) in attributes.iter() {
        if is_declaration
            && XML_DECLARATION_ATTRIBUTES
                .iter()
                .any(|fixed| key.eq_ignore_ascii_case(fixed))
        {
            continue;
        }
        push_attribute(buf, flags, key, value);
    }
}

fn single_text_child(node: &XmlNode) -> bool {
    let children = node.children();
    children.len() == 1 && children[0].node_type() == XmlNodeType::Text
}

fn write_node(
    buf: &mut String,
    flags: XmlWriteFlags,
    depth: usize,
    node: &XmlNode,
    siblings: Option<Siblings>,
) {
    let node_type = node.node_type();

    if flags.contains(XmlWriteFlags::IGNORE_COMMENTS) && node_type == XmlNodeType::Comment {
        return;
    }

    match node_type {
        XmlNodeType::Document => {
            write_children(buf, flags, depth, node);
        }

        XmlNodeType::Text => {
            let in_mixed_content = siblings.is_some_and(|s| s.nodes.len() > 1);
            if in_mixed_content && !siblings.is_some_and(|s| s.prev_is_text()) {
                indent(buf, flags, depth);
            }

            let text = node.text_content().unwrap_or_default();
            if flags.contains(XmlWriteFlags::DONT_ENCODE_TEXT) {
                buf.push_str(text);
            } else {
                buf.push_str(&encode_text(text));
            }

            if in_mixed_content && !siblings.is_some_and(|s| s.next_is_text()) {
                newline(buf, flags);
            }
        }

        XmlNodeType::Element
        | XmlNodeType::ProcessingInstruction
        | XmlNodeType::Declaration
        | XmlNodeType::Comment => {
            indent(buf, flags, depth);

            // Opening bracket sequence.
            buf.push('<');
            match node_type {
                XmlNodeType::ProcessingInstruction => buf.push('?'),
                XmlNodeType::Declaration => buf.push('!'),
                XmlNodeType::Comment => buf.push_str("!--"),
                _ => {}
            }

            if let Some(name) = node.name() {
                push_name(buf, flags, name);
            }

            write_attributes(buf, flags, node);

            // Free-form tag body (comment text, DOCTYPE internals, ...).
            if let Some(data) = node.tag_data() {
                if !data.is_empty() {
                    buf.push(' ');
                    buf.push_str(data);
                }
            }

            // Close marker of the opening tag.
            match node_type {
                XmlNodeType::ProcessingInstruction => buf.push('?'),
                XmlNodeType::Comment => buf.push_str(" --"),
                XmlNodeType::Element if node.children().is_empty() => {
                    if flags.contains(XmlWriteFlags::SELFCLOSE_SPACE) {
                        buf.push(' ');
                    }
                    buf.push('/');
                }
                _ => {}
            }
            buf.push('>');

            if !single_text_child(node) {
                newline(buf, flags);
            }

            if node_type == XmlNodeType::Element && !node.children().is_empty() {
                write_children(buf, flags, depth + 1, node);

                // Closing tag.
                if !single_text_child(node) {
                    indent(buf, flags, depth);
                }
                buf.push_str("</");
                if let Some(name) = node.name() {
                    push_name(buf, flags, name);
                }
                buf.push('>');

                if siblings.is_some_and(|s| !s.parent_is_doc) {
                    newline(buf, flags);
                }
            }
        }
    }
}

fn write_children(buf: &mut String, flags: XmlWriteFlags, depth: usize, node: &XmlNode) {
    let children = node.children();
    let parent_is_doc = node.node_type() == XmlNodeType::Document;
    let depth = if parent_is_doc { 0 } else { depth };

    for (index, child) in children.iter().enumerate() {
        write_node(
            buf,
            flags,
            depth,
            child,
            Some(Siblings {
                nodes: children,
                index,
                parent_is_doc,
            }),
        );
    }
}

/// Serializes a node (usually a document) to a string.
pub fn write(node: &XmlNode, flags: XmlWriteFlags) -> String {
    let mut out = String::new();
    write_buf(&mut out, node, flags);
    out
}

/// Serializes a node, appending to an existing buffer.
pub fn write_buf(buf: &mut String, node: &XmlNode, flags: XmlWriteFlags) {
    write_node(buf, flags, 0, node, None);
}

/// Serializes a node and writes it to a file.
pub fn write_file(
    node: &XmlNode,
    path: impl AsRef<Path>,
    flags: XmlWriteFlags,
) -> std::io::Result<()> {
    std::fs::write(path, write(node, flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::reader::read;
    use crate::XmlReadFlags;

    fn parse(input: &str) -> XmlNode {
        read(input, XmlReadFlags::empty()).unwrap()
    }

    #[test]
    fn compact_output() {
        for (input, expected) in [
            ("<a><b>x</b></a>", "<a><b>x</b></a>"),
            ("<a>t<b/></a>", "<a>t<b/></a>"),
            (
                "<?xml version=\"1.0\"?><root a=\"1\"/>",
                "<?xml version=\"1.0\"?><root a=\"1\"/>",
            ),
            ("<r><!-- note --></r>", "<r><!-- note --></r>"),
        ] {
            assert_eq!(write(&parse(input), XmlWriteFlags::empty()), expected);
        }
    }

    #[test]
    fn pretty_print_space() {
        let doc = parse("<a><b>x</b></a>");
        assert_eq!(
            write(&doc, XmlWriteFlags::PRETTYPRINT_SPACE),
            "<a>\n  <b>x</b>\n</a>"
        );

        let doc = parse("<a><b><c>x</c></b></a>");
        assert_eq!(
            write(&doc, XmlWriteFlags::PRETTYPRINT_SPACE),
            "<a>\n  <b>\n    <c>x</c>\n  </b>\n</a>"
        );

        let doc = parse("<a><b/><c/></a>");
        assert_eq!(
            write(&doc, XmlWriteFlags::PRETTYPRINT_TAB),
            "<a>\n\t<b/>\n\t<c/>\n</a>"
        );
    }

    #[test]
    fn entity_encoding_policies() {
        let doc = parse("<a v=\"x &lt; y\">a &amp; b</a>");
        assert_eq!(
            write(&doc, XmlWriteFlags::empty()),
            "<a v=\"x &lt; y\">a &amp; b</a>"
        );
        assert_eq!(
            write(&doc, XmlWriteFlags::DONT_ENCODE_TEXT | XmlWriteFlags::DONT_ENCODE_ATTRS),
            "<a v=\"x < y\">a & b</a>"
        );
    }

    #[test]
    fn declaration_attribute_order() {
        let input = "<?xml encoding=\"UTF-8\" standalone=\"yes\" version=\"1.0\"?><r/>";
        let doc = parse(input);
        assert_eq!(
            write(&doc, XmlWriteFlags::empty()),
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><r/>"
        );
    }

    #[test]
    fn case_lowering() {
        let doc = parse("<Root Attr=\"V\"><Sub>x</Sub></Root>");
        assert_eq!(
            write(&doc, XmlWriteFlags::LOWER_TAGS | XmlWriteFlags::LOWER_ATTRS),
            "<root attr=\"V\"><sub>x</sub></root>"
        );
    }

    #[test]
    fn selfclose_space() {
        let doc = parse("<a><b/></a>");
        assert_eq!(write(&doc, XmlWriteFlags::SELFCLOSE_SPACE), "<a><b /></a>");
    }

    #[test]
    fn comments_skipped() {
        let doc = parse("<a><!-- note --><b/></a>");
        assert_eq!(write(&doc, XmlWriteFlags::IGNORE_COMMENTS), "<a><b/></a>");
    }

    #[test]
    fn round_trip() {
        for input in [
            "<a><b>x</b><c>y</c></a>",
            "<?xml version=\"1.0\"?><r a=\"1\" b=\"2\">t</r>",
            "<a>x &amp; y</a>",
            "<r><![CDATA[1 < 2]]></r>",
        ] {
            let doc = parse(input);
            let written = write(&doc, XmlWriteFlags::empty());
            let reparsed = read(&written, XmlReadFlags::empty()).unwrap();
            assert_eq!(doc, reparsed, "round trip failed for {input:?}");
        }
    }
}
