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

use std::io::Read;
use std::path::Path;

use crate::xml::entities::{decode_attribute, decode_text};
use crate::xml::node::XmlNodeType;
use crate::{XmlError, XmlNode, XmlParseError, XmlReadFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagType {
    ProcessingInstruction,
    Comment,
    ElementStart,
    ElementEnd,
    ElementEmpty,
    Cdata,
    Declaration,
}

struct TagInfo {
    name: Option<String>,
    tag_type: TagType,
    /// Bytes consumed up to the start of the tag body.
    processed_len: usize,
    /// Total bytes of the tag including its end marker.
    tag_len: usize,
    /// Bytes of tag body following `processed_len`.
    body_len: usize,
}

/// Offset of the first `ch` not inside single or double quotes.
fn find_unquoted(data: &str, ch: u8) -> Option<usize> {
    let mut on_quote = 0u8;
    for (i, &byte) in data.as_bytes().iter().enumerate() {
        if byte == b'\'' || byte == b'"' {
            if on_quote == 0 {
                on_quote = byte;
            } else if byte == on_quote {
                on_quote = 0;
            }
        } else if byte == ch && on_quote == 0 {
            return Some(i);
        }
    }
    None
}

/// Scans backwards past whitespace; a hit on `ch` returns its offset, any
/// other character gives up.
fn find_nonws_reverse(data: &str, ch: u8) -> Option<usize> {
    for (i, &byte) in data.as_bytes().iter().enumerate().rev() {
        if byte.is_ascii_whitespace() {
            continue;
        }
        if byte == ch {
            return Some(i);
        }
        break;
    }
    None
}

/// Locates the tag's end marker. A start tag with a trailing `/` is
/// reclassified as an empty element. Returns the total length including
/// the marker and the length of the body before it.
fn read_tag_end(data: &str, tag_type: &mut TagType) -> Result<(usize, usize), XmlError> {
    let end_tag = match tag_type {
        TagType::Comment => "-->",
        TagType::Cdata => "]]>",
        _ => ">",
    };

    // Quotes are honored only for single-character end markers.
    let idx = if end_tag.len() > 1 {
        data.find(end_tag)
    } else {
        find_unquoted(data, b'>')
    }
    .ok_or(XmlError::MissingCloseTag)?;

    let mut body_len = idx;
    let total = idx + end_tag.len();

    if *tag_type == TagType::ProcessingInstruction {
        body_len = find_nonws_reverse(&data[..body_len], b'?')
            .ok_or(XmlError::MissingProcessingInstructionEnd)?;
    }

    if *tag_type == TagType::ElementStart {
        if let Some(slash) = find_nonws_reverse(&data[..body_len], b'/') {
            *tag_type = TagType::ElementEmpty;
            body_len = slash;
        }
    }

    Ok((total, body_len))
}

/// Classifies the tag at the start of `data` (which begins with `<`) and
/// measures its pieces.
fn read_tag_info(data: &str) -> Result<TagInfo, XmlError> {
    let bytes = data.as_bytes();
    if bytes.first() != Some(&b'<') {
        return Err(XmlError::InvalidStartTag);
    }

    let mut pos = 1;
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if pos >= bytes.len() {
        return Err(XmlError::EmptyStartTag);
    }

    let mut tag_type = match bytes[pos] {
        b'/' => {
            pos += 1;
            TagType::ElementEnd
        }
        b'?' => {
            pos += 1;
            TagType::ProcessingInstruction
        }
        b'<' => return Err(XmlError::InvalidCharInStartTag),
        b'!' => {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(XmlError::MissingDeclarationName);
            }
            if data[pos..].starts_with("--") {
                pos += 2;
                TagType::Comment
            } else if data[pos..].starts_with("[CDATA[") {
                pos += 7;
                TagType::Cdata
            } else {
                // <!DOCTYPE, <!ELEMENT, <!ATTLIST, <!ENTITY, ...
                TagType::Declaration
            }
        }
        _ => TagType::ElementStart,
    };

    if matches!(tag_type, TagType::ElementEnd | TagType::ProcessingInstruction) {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
    }

    let (end_len, mut body_len) = read_tag_end(&data[pos..], &mut tag_type)?;
    let tag_len = end_len + pos;
    let mut processed_len = pos;

    let name = if !matches!(tag_type, TagType::Cdata | TagType::Comment) {
        let body = &data[pos..pos + body_len];
        let name_len = body
            .bytes()
            .position(|byte| byte.is_ascii_whitespace())
            .unwrap_or(body.len());
        if name_len == 0 {
            return Err(XmlError::InvalidStartTag);
        }
        processed_len += name_len;
        body_len -= name_len;
        Some(body[..name_len].to_string())
    } else {
        None
    };

    Ok(TagInfo {
        name,
        tag_type,
        processed_len,
        tag_len,
        body_len,
    })
}

/// Normalizes an attribute list: trims around it, collapses unquoted
/// whitespace runs to a single space, and drops spaces around `=`.
/// Quoted content is untouched. Returns `None` for all-whitespace input.
fn strip_extra_whitespace(data: &str) -> Option<String> {
    let data = data.trim_matches(|ch: char| ch.is_ascii_whitespace());
    if data.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(data.len());
    let mut on_quote = 0u8;
    // 1 = a space is pending, -1 = just past '=', no space allowed.
    let mut request_space = 0i8;

    for &byte in data.as_bytes() {
        if on_quote != 0 {
            if byte == on_quote {
                on_quote = 0;
            }
            out.push(byte);
        } else if byte == b'\'' || byte == b'"' {
            if request_space == 1 {
                out.push(b' ');
            }
            request_space = 0;
            on_quote = byte;
            out.push(byte);
        } else if byte.is_ascii_whitespace() {
            if request_space != -1 {
                request_space = 1;
            }
        } else if byte == b'=' {
            request_space = -1;
            out.push(byte);
        } else {
            if request_space == 1 {
                out.push(b' ');
            }
            out.push(byte);
            request_space = 0;
        }
    }

    Some(String::from_utf8_lossy(&out).into_owned())
}

/// Splits on every unquoted `ch`.
fn explode_unquoted(data: &str, ch: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = data;
    while let Some(idx) = find_unquoted(rest, ch) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + 1..];
    }
    parts.push(rest);
    parts
}

/// Strips a matched pair of surrounding quotes, if any.
fn strip_surrounding_quotes(data: &str) -> &str {
    let bytes = data.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'\'' || bytes[0] == b'"')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &data[1..data.len() - 1]
    } else {
        data
    }
}

fn parse_attributes(node: &mut XmlNode, data: &str, flags: XmlReadFlags) -> Result<(), XmlError> {
    let Some(sdata) = strip_extra_whitespace(data) else {
        return Ok(());
    };

    for pair in explode_unquoted(&sdata, b' ') {
        let keyval = explode_unquoted(pair, b'=');
        let key = strip_surrounding_quotes(keyval[0]);
        let value = strip_surrounding_quotes(keyval.get(1).copied().unwrap_or(""));

        let value = if flags.contains(XmlReadFlags::DONT_DECODE_ATTRS) {
            value.to_string()
        } else {
            decode_attribute(value)
        };
        node.insert_attribute(key, value)?;
    }
    Ok(())
}

/// Applies one parsed tag to the open-element stack.
fn process_tag(
    stack: &mut Vec<XmlNode>,
    info: &TagInfo,
    body: &str,
    flags: XmlReadFlags,
) -> Result<(), XmlError> {
    match info.tag_type {
        TagType::ProcessingInstruction | TagType::ElementStart | TagType::ElementEmpty => {
            let name = info.name.as_deref().unwrap_or_default();
            let mut node = if info.tag_type == TagType::ProcessingInstruction {
                XmlNode::processing_instruction(name)
            } else {
                XmlNode::element(name)
            };
            parse_attributes(&mut node, body, flags)?;

            if info.tag_type == TagType::ElementStart {
                // Only a start tag moves the insertion point deeper.
                stack.push(node);
            } else {
                attach(stack, node)?;
            }
        }

        TagType::Declaration => {
            let mut node = XmlNode::declaration(info.name.as_deref().unwrap_or_default());
            let data = body.trim_matches(|ch: char| ch.is_ascii_whitespace());
            if !data.is_empty() {
                node.set_tag_data(data);
            }
            attach(stack, node)?;
        }

        TagType::ElementEnd => {
            if stack.len() < 2 {
                return Err(XmlError::IneligibleForClose);
            }
            let name = info.name.as_deref().unwrap_or_default();
            let matches_open = match stack.last().and_then(XmlNode::name) {
                Some(open) if flags.contains(XmlReadFlags::TAG_CASECMP) => {
                    open.eq_ignore_ascii_case(name)
                }
                Some(open) => open == name,
                None => false,
            };
            if !matches_open {
                return Err(XmlError::UnexpectedClose);
            }
            // The element is closed; hand it to its parent.
            let node = stack.pop().ok_or(XmlError::Generic)?;
            attach(stack, node)?;
        }

        TagType::Cdata => {
            // Regular character data arrives encoded, so CDATA content is
            // decoded the same way unless decoding is off.
            let text = if flags.contains(XmlReadFlags::DONT_DECODE_TEXT) {
                body.to_string()
            } else {
                decode_text(body)
            };
            attach(stack, XmlNode::text(text))?;
        }

        TagType::Comment => {
            if !flags.contains(XmlReadFlags::IGNORE_COMMENTS) {
                let text = body.trim_matches(|ch: char| ch.is_ascii_whitespace());
                attach(stack, XmlNode::comment(text))?;
            }
        }
    }

    Ok(())
}

fn attach(stack: &mut [XmlNode], node: XmlNode) -> Result<(), XmlError> {
    stack
        .last_mut()
        .ok_or(XmlError::Generic)?
        .append_child(node)
        .map_err(|_| XmlError::Generic)
}

/// Parses one tag starting at `data[0] == '<'`; returns its total length.
fn read_tag(stack: &mut Vec<XmlNode>, data: &str, flags: XmlReadFlags) -> Result<usize, XmlError> {
    let info = read_tag_info(data)?;
    let body = &data[info.processed_len..info.processed_len + info.body_len];
    process_tag(stack, &info, body, flags)?;
    Ok(info.tag_len)
}

/// Collects character data up to the next `<`, trimming surrounding
/// whitespace; returns the untrimmed length processed.
fn read_text(stack: &mut Vec<XmlNode>, data: &str, flags: XmlReadFlags) -> Result<usize, XmlError> {
    let processed_len = data.find('<').unwrap_or(data.len());
    let text = data[..processed_len].trim_matches(|ch: char| ch.is_ascii_whitespace());

    let text = if flags.contains(XmlReadFlags::DONT_DECODE_TEXT) {
        text.to_string()
    } else {
        decode_text(text)
    };
    attach(stack, XmlNode::text(text))?;

    Ok(processed_len)
}

fn doc_has_element(doc: &XmlNode) -> bool {
    doc.children()
        .iter()
        .any(|child| child.node_type() == XmlNodeType::Element)
}

fn error_at(kind: XmlError, pos: usize, data: &str) -> XmlParseError {
    let line = 1 + data.as_bytes()[..pos.min(data.len())]
        .iter()
        .filter(|&&byte| byte == b'\n')
        .count();
    XmlParseError { kind, pos, line }
}

fn read_internal(
    data: &str,
    flags: XmlReadFlags,
    stop_after_root: bool,
) -> Result<(XmlNode, usize), XmlParseError> {
    if data.is_empty() {
        return Err(error_at(XmlError::Misuse, 0, data));
    }

    let bytes = data.as_bytes();
    let mut stack = vec![XmlNode::document()];
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Content past a complete root element: either the document
        // boundary in a concatenated stream, or an error.
        if stack.len() == 1 && doc_has_element(&stack[0]) {
            if stop_after_root {
                break;
            }
            return Err(error_at(XmlError::ExpectedEnd, i, data));
        }

        let consumed = if bytes[i] == b'<' {
            read_tag(&mut stack, &data[i..], flags)
        } else {
            read_text(&mut stack, &data[i..], flags)
        }
        .map_err(|kind| error_at(kind, i, data))?;
        i += consumed;
    }

    if stack.len() > 1 {
        return Err(error_at(XmlError::MissingCloseTag, i, data));
    }
    let doc = stack.pop().unwrap_or_else(XmlNode::document);
    if !doc_has_element(&doc) {
        return Err(error_at(XmlError::NoElements, i, data));
    }

    Ok((doc, i))
}

/// Parses a complete XML document into a tree rooted at a document node.
/// Trailing content after the root element is an error.
pub fn read(data: &str, flags: XmlReadFlags) -> Result<XmlNode, XmlParseError> {
    read_internal(data, flags, false).map(|(doc, _)| doc)
}

/// Parses the first document from `data`, stopping cleanly at the end of
/// its root element. Returns the tree and the number of bytes processed,
/// which lets concatenated documents be read from one buffer.
pub fn read_first(data: &str, flags: XmlReadFlags) -> Result<(XmlNode, usize), XmlParseError> {
    read_internal(data, flags, true)
}

/// Reads and parses a file. `max_read` of 0 means no limit.
pub fn read_file(
    path: impl AsRef<Path>,
    flags: XmlReadFlags,
    max_read: usize,
) -> Result<XmlNode, XmlParseError> {
    let generic = XmlParseError {
        kind: XmlError::Generic,
        pos: 0,
        line: 1,
    };

    let mut buf = Vec::new();
    let file = std::fs::File::open(path).map_err(|_| generic)?;
    match max_read {
        0 => {
            std::io::BufReader::new(file)
                .read_to_end(&mut buf)
                .map_err(|_| generic)?;
        }
        limit => {
            file.take(limit as u64)
                .read_to_end(&mut buf)
                .map_err(|_| generic)?;
        }
    }

    read(&String::from_utf8_lossy(&buf), flags)
}
