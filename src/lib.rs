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

//! # format-codecs
//!
//! _format-codecs_ is a **text codec and format engine** written in Rust. It
//! bundles three closely related subsystems:
//!
//! - A pluggable **codec framework** converting between UTF-8 and legacy
//!   single-byte character sets (US-ASCII, ISO-8859-1 through ISO-8859-16,
//!   Windows CP1250 through CP1258, CP874, and the EBCDIC pages CP037 and
//!   CP500) as well as content-transfer encodings (RFC 3986 percent
//!   encoding in URL and form flavors, RFC 3492 Punycode, and RFC 2045
//!   Quoted-Printable), all under a uniform error-handler policy
//!   (fail, replace, or ignore).
//! - A streaming, restartable **MIME e-mail engine**: an incremental reader
//!   driven by a state machine that emits typed events for headers
//!   (including folded lines and RFC 6854 group address lists), plain
//!   bodies, and multipart preamble/parts/epilogue; and a writer that emits
//!   canonical MIME with correct boundaries, header folding, and attachment
//!   framing.
//! - A recursive-descent **XML engine** producing a typed node tree
//!   (document, element, processing instruction, declaration, text,
//!   comment) with quote-aware attribute parsing, plus a writer with
//!   pretty-printing and entity-encoding policies.
//!
//! In general this library abides by the Robustness Principle: readers make
//! a best effort to accept slightly non-conformant input (folded headers
//! with sloppy whitespace, a missing `\r\n` before a part boundary, `;`
//! used as an address separator) while the writers always emit canonical
//! output.
//!
//! ## Usage example
//!
//! ```rust
//! use format_codecs::*;
//!
//! // Transcode a string to ISO-8859-1.
//! let (bytes, _) = codecs::encode_str("café", Ehandler::Fail, Codec::Iso8859_1).unwrap();
//! assert_eq!(bytes, b"caf\xe9");
//!
//! // Parse an e-mail message.
//! let input = b"From: a@example.com\r\nTo: b@example.com\r\n\r\nhi";
//! let (message, len_read) = email::simple_read(input).unwrap();
//! assert_eq!(len_read, input.len());
//!
//! // Build an XML tree and write it back out.
//! let doc = xml::read("<root a=\"1\">t</root>", XmlReadFlags::empty()).unwrap();
//! let out = xml::write(&doc, XmlWriteFlags::empty());
//! assert_eq!(out, "<root a=\"1\">t</root>");
//! ```

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use bitflags::bitflags;
use thiserror::Error;

pub mod codecs;
pub mod email;
pub mod xml;

pub use codecs::sink::{Sink, StreamBuffer};
pub use email::reader::{EmailCallbacks, EmailReader};

/// Character set or content-transfer codec identifier.
///
/// Resolved from a string name with [`Codec::from_name`], which accepts the
/// common aliases for each codec (`latin1`, `iso-8859-1`, `cp819`, ... all
/// map to [`Codec::Iso8859_1`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Codec {
    Utf8,
    Ascii,
    Cp037,
    Cp500,
    Cp874,
    Cp1250,
    Cp1251,
    Cp1252,
    Cp1253,
    Cp1254,
    Cp1255,
    Cp1256,
    Cp1257,
    Cp1258,
    Iso8859_1,
    Iso8859_2,
    Iso8859_3,
    Iso8859_4,
    Iso8859_5,
    Iso8859_6,
    Iso8859_7,
    Iso8859_8,
    Iso8859_9,
    Iso8859_10,
    Iso8859_11,
    Iso8859_13,
    Iso8859_14,
    Iso8859_15,
    Iso8859_16,
    /// RFC 3986 percent encoding, full reserved set, space as `%20`.
    PercentUrl,
    /// RFC 3986 percent encoding, space as `+`.
    PercentUrlPlus,
    /// `application/x-www-form-urlencoded`: space as `+`, `~` encoded,
    /// `\r` and `\n` passed through.
    PercentForm,
    /// Percent encoding with the minimal forced set only.
    PercentUrlMin,
    /// Form encoding with the minimal forced set only.
    PercentFormMin,
    Punycode,
    QuotedPrintable,
    /// Unrecognized codec name. Encode and decode reject it.
    Unknown,
}

/// Policy applied when a codec encounters input it cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Ehandler {
    /// Abort the conversion on unmappable or malformed input.
    #[default]
    Fail,
    /// Substitute a replacement character (`?` toward a single-byte
    /// codepage, U+FFFD toward Unicode) and continue.
    Replace,
    /// Skip the offending input silently.
    Ignore,
}

/// Successful conversion outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecStatus {
    /// Converted without loss.
    Success,
    /// Converted, but the error handler had to intervene.
    SuccessEhandler,
}

/// Conversion failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("conversion failed")]
    Fail,
    #[error("input not valid for codec")]
    BadInput,
    #[error("invalid parameter")]
    InvalidParam,
}

/// Outcome of a codec conversion. Lossy-but-successful conversions are
/// reported as `Ok(CodecStatus::SuccessEhandler)`.
pub type CodecResult = Result<CodecStatus, CodecError>;

/// E-mail engine failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailError {
    #[error("more data required")]
    MoreData,
    #[error("invalid header")]
    HeaderInvalid,
    #[error("multipart message without a boundary")]
    MultipartNoBoundary,
    #[error("multipart boundary not followed by data")]
    MultipartMissingData,
    #[error("invalid multipart framing")]
    MultipartInvalid,
    #[error("invalid e-mail address")]
    Address,
    #[error("invalid use")]
    InvalidUse,
}

/// Non-error outcome of a reader call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Input was consumed and processed.
    Success,
    /// The input ends mid-construct. Feed the unconsumed tail again,
    /// with more data appended.
    MoreData,
}

/// Layout of an e-mail body as announced by its headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataFormat {
    #[default]
    Body,
    Multipart,
}

/// A single mailbox or group member parsed from an address header.
///
/// All fields are optional; an empty group entry (`group` set, the rest
/// unset) represents an RFC 6854 group without members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Address {
    pub group: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Ordered, case-insensitive header collection. A name holds a single
/// value; re-inserting a name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeaderMap {
    pub(crate) entries: Vec<(String, String)>,
}

/// One constituent body of a multipart message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Part {
    pub data: Vec<u8>,
    pub headers: HeaderMap,
    pub is_attachment: bool,
    pub content_type: Option<String>,
    pub transfer_encoding: Option<String>,
    pub filename: Option<String>,
}

/// An e-mail message model, produced by [`email::simple_read`] and consumed
/// by [`email::simple_write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmailMessage {
    pub headers: HeaderMap,
    pub from: Option<Address>,
    pub reply_to: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub parts: Vec<Part>,
    pub preamble: Option<String>,
    pub epilogue: Option<String>,
    pub subject: Option<String>,
}

/// Ordered attribute collection with case-insensitive unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttrMap {
    pub(crate) entries: Vec<(String, String)>,
}

/// A node in an XML tree. Documents and elements own their children;
/// a node's parent is the node whose `children` list contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum XmlNode {
    Document {
        children: Vec<XmlNode>,
    },
    Element {
        name: String,
        attributes: AttrMap,
        children: Vec<XmlNode>,
    },
    ProcessingInstruction {
        name: String,
        attributes: AttrMap,
        tag_data: Option<String>,
    },
    Declaration {
        name: String,
        tag_data: Option<String>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

/// XML engine failure kind.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlError {
    #[error("misuse")]
    Misuse,
    #[error("generic failure")]
    Generic,
    #[error("duplicate attribute")]
    AttrExists,
    #[error("document has no elements")]
    NoElements,
    #[error("invalid start tag")]
    InvalidStartTag,
    #[error("invalid character in start tag")]
    InvalidCharInStartTag,
    #[error("empty start tag")]
    EmptyStartTag,
    #[error("missing declaration name")]
    MissingDeclarationName,
    #[error("close tag for a node that cannot be closed")]
    IneligibleForClose,
    #[error("unexpected close tag")]
    UnexpectedClose,
    #[error("missing close tag")]
    MissingCloseTag,
    #[error("missing processing instruction end")]
    MissingProcessingInstructionEnd,
    #[error("expected end of document")]
    ExpectedEnd,
}

/// XML engine failure with the position it was detected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XmlParseError {
    pub kind: XmlError,
    /// Byte offset into the input.
    pub pos: usize,
    /// 1-based line derived from `pos`.
    pub line: usize,
}

impl fmt::Display for XmlParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}, offset {}", self.kind, self.line, self.pos)
    }
}

impl std::error::Error for XmlParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

bitflags! {
    /// Options for the XML reader.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct XmlReadFlags: u32 {
        /// Leave entity references in attribute values untouched.
        const DONT_DECODE_ATTRS = 0x0001;
        /// Leave entity references in text content untouched.
        const DONT_DECODE_TEXT  = 0x0002;
        /// Do not add comment nodes to the tree.
        const IGNORE_COMMENTS   = 0x0004;
        /// Match close tags case-insensitively.
        const TAG_CASECMP       = 0x0008;
    }
}

bitflags! {
    /// Options for the XML writer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct XmlWriteFlags: u32 {
        /// Indent children two spaces per depth.
        const PRETTYPRINT_SPACE = 0x0001;
        /// Indent children one tab per depth.
        const PRETTYPRINT_TAB   = 0x0002;
        /// Lowercase tag names.
        const LOWER_TAGS        = 0x0004;
        /// Lowercase attribute keys.
        const LOWER_ATTRS       = 0x0008;
        /// Write text content without entity encoding.
        const DONT_ENCODE_TEXT  = 0x0010;
        /// Write attribute values without entity encoding.
        const DONT_ENCODE_ATTRS = 0x0020;
        /// Write self-closing tags as `<name />` instead of `<name/>`.
        const SELFCLOSE_SPACE   = 0x0040;
        /// Skip comment nodes.
        const IGNORE_COMMENTS   = 0x0080;
    }
}
