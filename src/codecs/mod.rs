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

pub mod charset;
pub mod percent;
pub mod punycode;
pub mod quoted_printable;
pub mod sink;
mod tables;
pub mod utf8;

use crate::{Codec, CodecError, CodecResult, CodecStatus, Ehandler, Sink};

pub(crate) const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Two-byte marker emitted by the transfer codecs when replacing a
/// malformed escape. Note this is not the UTF-8 encoding of U+FFFD.
pub(crate) const RAW_REPLACE: [u8; 2] = [0xFF, 0xFD];

pub(crate) fn hex_val(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Encodes UTF-8 `input` into the given codec, appending to `sink`.
///
/// With [`Ehandler::Fail`] the input is validated as UTF-8 up front;
/// otherwise the per-codec implementation applies the handler policy as it
/// walks the input. Empty input succeeds without touching the sink.
pub fn encode(sink: &mut Sink, input: &[u8], ehandler: Ehandler, codec: Codec) -> CodecResult {
    if codec == Codec::Unknown {
        return Err(CodecError::InvalidParam);
    }
    if input.is_empty() {
        return Ok(CodecStatus::Success);
    }
    if codec == Codec::Utf8 {
        return utf8::utf8_to_utf8(sink, input, ehandler, true);
    }

    if ehandler == Ehandler::Fail && utf8::is_valid(input).is_err() {
        return Err(CodecError::BadInput);
    }

    if let Some(page) = charset::codepage(codec) {
        return page.encode(sink, input, ehandler);
    }

    match codec {
        Codec::PercentUrl
        | Codec::PercentUrlPlus
        | Codec::PercentForm
        | Codec::PercentUrlMin
        | Codec::PercentFormMin => percent::encode(sink, input, ehandler, codec),
        Codec::Punycode => punycode::encode(sink, input, ehandler),
        Codec::QuotedPrintable => quoted_printable::encode(sink, input, ehandler),
        _ => Err(CodecError::Fail),
    }
}

/// Decodes `input` from the given codec back to UTF-8, appending to `sink`.
pub fn decode(sink: &mut Sink, input: &[u8], ehandler: Ehandler, codec: Codec) -> CodecResult {
    if codec == Codec::Unknown {
        return Err(CodecError::InvalidParam);
    }
    if input.is_empty() {
        return Ok(CodecStatus::Success);
    }
    if codec == Codec::Utf8 {
        return utf8::utf8_to_utf8(sink, input, ehandler, false);
    }

    if let Some(page) = charset::codepage(codec) {
        return page.decode(sink, input, ehandler);
    }

    match codec {
        Codec::PercentUrl
        | Codec::PercentUrlPlus
        | Codec::PercentForm
        | Codec::PercentUrlMin
        | Codec::PercentFormMin => percent::decode(sink, input, ehandler, codec),
        Codec::Punycode => punycode::decode(sink, input, ehandler),
        Codec::QuotedPrintable => quoted_printable::decode(sink, input, ehandler),
        _ => Err(CodecError::Fail),
    }
}

/// Encodes into a fresh buffer. The buffer is discarded on error.
pub fn encode_str(
    input: impl AsRef<[u8]>,
    ehandler: Ehandler,
    codec: Codec,
) -> Result<(Vec<u8>, CodecStatus), CodecError> {
    let mut out = Vec::new();
    let status = encode(&mut Sink::Buffer(&mut out), input.as_ref(), ehandler, codec)?;
    Ok((out, status))
}

/// Decodes into a fresh buffer. The buffer is discarded on error.
///
/// The output is returned as bytes: a decode under [`Ehandler::Replace`]
/// may contain the raw replacement marker, and percent decoding does not
/// validate that its output is well-formed UTF-8.
pub fn decode_str(
    input: impl AsRef<[u8]>,
    ehandler: Ehandler,
    codec: Codec,
) -> Result<(Vec<u8>, CodecStatus), CodecError> {
    let mut out = Vec::new();
    let status = decode(&mut Sink::Buffer(&mut out), input.as_ref(), ehandler, codec)?;
    Ok((out, status))
}

impl Codec {
    /// Resolves a codec from one of its many names, case-insensitively.
    /// Unrecognized names map to [`Codec::Unknown`].
    pub fn from_name(name: &str) -> Codec {
        hashify::tiny_map_ignore_case!(name.as_bytes(),
            "utf8" => Codec::Utf8,
            "utf-8" => Codec::Utf8,
            "utf_8" => Codec::Utf8,
            "ascii" => Codec::Ascii,
            "us-ascii" => Codec::Ascii,
            "cp037" => Codec::Cp037,
            "ibm037" => Codec::Cp037,
            "ibm-037" => Codec::Cp037,
            "ibm039" => Codec::Cp037,
            "ibm-039" => Codec::Cp037,
            "cp500" => Codec::Cp500,
            "ibm500" => Codec::Cp500,
            "ibm-500" => Codec::Cp500,
            "ebcdic-cp-be" => Codec::Cp500,
            "ebcdic-cp-ch" => Codec::Cp500,
            "cp874" => Codec::Cp874,
            "windows-874" => Codec::Cp874,
            "cp1250" => Codec::Cp1250,
            "windows-1250" => Codec::Cp1250,
            "cp1251" => Codec::Cp1251,
            "windows-1251" => Codec::Cp1251,
            "cp1252" => Codec::Cp1252,
            "windows-1252" => Codec::Cp1252,
            "cp1253" => Codec::Cp1253,
            "windows-1253" => Codec::Cp1253,
            "cp1254" => Codec::Cp1254,
            "windows-1254" => Codec::Cp1254,
            "cp1255" => Codec::Cp1255,
            "windows-1255" => Codec::Cp1255,
            "cp1256" => Codec::Cp1256,
            "windows-1256" => Codec::Cp1256,
            "cp1257" => Codec::Cp1257,
            "windows-1257" => Codec::Cp1257,
            "cp1258" => Codec::Cp1258,
            "windows-1258" => Codec::Cp1258,
            "latin_1" => Codec::Iso8859_1,
            "latin-1" => Codec::Iso8859_1,
            "latin1" => Codec::Iso8859_1,
            "latin 1" => Codec::Iso8859_1,
            "latin" => Codec::Iso8859_1,
            "l1" => Codec::Iso8859_1,
            "iso-8859-1" => Codec::Iso8859_1,
            "iso8859-1" => Codec::Iso8859_1,
            "iso8859_1" => Codec::Iso8859_1,
            "iso88591" => Codec::Iso8859_1,
            "8859" => Codec::Iso8859_1,
            "88591" => Codec::Iso8859_1,
            "cp819" => Codec::Iso8859_1,
            "latin_2" => Codec::Iso8859_2,
            "latin-2" => Codec::Iso8859_2,
            "latin2" => Codec::Iso8859_2,
            "latin 2" => Codec::Iso8859_2,
            "l2" => Codec::Iso8859_2,
            "iso-8859-2" => Codec::Iso8859_2,
            "iso8859-2" => Codec::Iso8859_2,
            "iso8859_2" => Codec::Iso8859_2,
            "iso88592" => Codec::Iso8859_2,
            "88592" => Codec::Iso8859_2,
            "latin_3" => Codec::Iso8859_3,
            "latin-3" => Codec::Iso8859_3,
            "latin3" => Codec::Iso8859_3,
            "latin 3" => Codec::Iso8859_3,
            "l3" => Codec::Iso8859_3,
            "iso-8859-3" => Codec::Iso8859_3,
            "iso8859-3" => Codec::Iso8859_3,
            "iso8859_3" => Codec::Iso8859_3,
            "iso88593" => Codec::Iso8859_3,
            "88593" => Codec::Iso8859_3,
            "latin_4" => Codec::Iso8859_4,
            "latin-4" => Codec::Iso8859_4,
            "latin4" => Codec::Iso8859_4,
            "latin 4" => Codec::Iso8859_4,
            "l4" => Codec::Iso8859_4,
            "iso-8859-4" => Codec::Iso8859_4,
            "iso8859-4" => Codec::Iso8859_4,
            "iso8859_4" => Codec::Iso8859_4,
            "iso88594" => Codec::Iso8859_4,
            "88594" => Codec::Iso8859_4,
            "cyrillic" => Codec::Iso8859_5,
            "iso-8859-5" => Codec::Iso8859_5,
            "iso8859-5" => Codec::Iso8859_5,
            "iso8859_5" => Codec::Iso8859_5,
            "iso88595" => Codec::Iso8859_5,
            "88595" => Codec::Iso8859_5,
            "arabic" => Codec::Iso8859_6,
            "iso-8859-6" => Codec::Iso8859_6,
            "iso8859-6" => Codec::Iso8859_6,
            "iso8859_6" => Codec::Iso8859_6,
            "iso88596" => Codec::Iso8859_6,
            "88596" => Codec::Iso8859_6,
            "greek" => Codec::Iso8859_7,
            "greek8" => Codec::Iso8859_7,
            "iso-8859-7" => Codec::Iso8859_7,
            "iso8859-7" => Codec::Iso8859_7,
            "iso8859_7" => Codec::Iso8859_7,
            "iso88597" => Codec::Iso8859_7,
            "88597" => Codec::Iso8859_7,
            "hebrew" => Codec::Iso8859_8,
            "iso-8859-8" => Codec::Iso8859_8,
            "iso8859-8" => Codec::Iso8859_8,
            "iso8859_8" => Codec::Iso8859_8,
            "iso88598" => Codec::Iso8859_8,
            "88598" => Codec::Iso8859_8,
            "latin_5" => Codec::Iso8859_9,
            "latin-5" => Codec::Iso8859_9,
            "latin5" => Codec::Iso8859_9,
            "latin 5" => Codec::Iso8859_9,
            "l5" => Codec::Iso8859_9,
            "iso-8859-9" => Codec::Iso8859_9,
            "iso8859-9" => Codec::Iso8859_9,
            "iso8859_9" => Codec::Iso8859_9,
            "iso88599" => Codec::Iso8859_9,
            "88599" => Codec::Iso8859_9,
            "latin_6" => Codec::Iso8859_10,
            "latin-6" => Codec::Iso8859_10,
            "latin6" => Codec::Iso8859_10,
            "latin 6" => Codec::Iso8859_10,
            "l6" => Codec::Iso8859_10,
            "iso-8859-10" => Codec::Iso8859_10,
            "iso8859-10" => Codec::Iso8859_10,
            "iso8859_10" => Codec::Iso8859_10,
            "iso885910" => Codec::Iso8859_10,
            "885910" => Codec::Iso8859_10,
            "thai" => Codec::Iso8859_11,
            "iso-8859-11" => Codec::Iso8859_11,
            "iso8859-11" => Codec::Iso8859_11,
            "iso8859_11" => Codec::Iso8859_11,
            "iso885911" => Codec::Iso8859_11,
            "885911" => Codec::Iso8859_11,
            "latin_7" => Codec::Iso8859_13,
            "latin-7" => Codec::Iso8859_13,
            "latin7" => Codec::Iso8859_13,
            "latin 7" => Codec::Iso8859_13,
            "l7" => Codec::Iso8859_13,
            "iso-8859-13" => Codec::Iso8859_13,
            "iso8859-13" => Codec::Iso8859_13,
            "iso8859_13" => Codec::Iso8859_13,
            "iso885913" => Codec::Iso8859_13,
            "885913" => Codec::Iso8859_13,
            "latin_8" => Codec::Iso8859_14,
            "latin-8" => Codec::Iso8859_14,
            "latin8" => Codec::Iso8859_14,
            "latin 8" => Codec::Iso8859_14,
            "l8" => Codec::Iso8859_14,
            "iso-8859-14" => Codec::Iso8859_14,
            "iso8859-14" => Codec::Iso8859_14,
            "iso8859_14" => Codec::Iso8859_14,
            "iso885914" => Codec::Iso8859_14,
            "885914" => Codec::Iso8859_14,
            "latin_9" => Codec::Iso8859_15,
            "latin-9" => Codec::Iso8859_15,
            "latin9" => Codec::Iso8859_15,
            "latin 9" => Codec::Iso8859_15,
            "l9" => Codec::Iso8859_15,
            "iso-8859-15" => Codec::Iso8859_15,
            "iso8859-15" => Codec::Iso8859_15,
            "iso8859_15" => Codec::Iso8859_15,
            "iso885915" => Codec::Iso8859_15,
            "885915" => Codec::Iso8859_15,
            "latin_10" => Codec::Iso8859_16,
            "latin-10" => Codec::Iso8859_16,
            "latin10" => Codec::Iso8859_16,
            "latin 10" => Codec::Iso8859_16,
            "l10" => Codec::Iso8859_16,
            "iso-8859-16" => Codec::Iso8859_16,
            "iso8859-16" => Codec::Iso8859_16,
            "iso8859_16" => Codec::Iso8859_16,
            "iso885916" => Codec::Iso8859_16,
            "885916" => Codec::Iso8859_16,
            "percent" => Codec::PercentUrl,
            "url" => Codec::PercentUrl,
            "percent_plus" => Codec::PercentUrlPlus,
            "percent-plus" => Codec::PercentUrlPlus,
            "percentplus" => Codec::PercentUrlPlus,
            "url_plus" => Codec::PercentUrlPlus,
            "url-plus" => Codec::PercentUrlPlus,
            "urlplus" => Codec::PercentUrlPlus,
            "application/x-www-form-urlencoded" => Codec::PercentForm,
            "x-www-form-urlencoded" => Codec::PercentForm,
            "www-form-urlencoded" => Codec::PercentForm,
            "form-urlencoded" => Codec::PercentForm,
            "percent_min" => Codec::PercentUrlMin,
            "url_min" => Codec::PercentUrlMin,
            "form_min" => Codec::PercentFormMin,
            "form-urlencoded-min" => Codec::PercentFormMin,
            "punycode" => Codec::Punycode,
            "puny" => Codec::Punycode,
            "quoted-printable" => Codec::QuotedPrintable,
            "qp" => Codec::QuotedPrintable,
        )
        .unwrap_or(Codec::Unknown)
    }

    /// The canonical name for this codec.
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Utf8 => "utf-8",
            Codec::Ascii => "ascii",
            Codec::Cp037 => "cp037",
            Codec::Cp500 => "cp500",
            Codec::Cp874 => "cp874",
            Codec::Cp1250 => "cp1250",
            Codec::Cp1251 => "cp1251",
            Codec::Cp1252 => "cp1252",
            Codec::Cp1253 => "cp1253",
            Codec::Cp1254 => "cp1254",
            Codec::Cp1255 => "cp1255",
            Codec::Cp1256 => "cp1256",
            Codec::Cp1257 => "cp1257",
            Codec::Cp1258 => "cp1258",
            Codec::Iso8859_1 => "latin_1",
            Codec::Iso8859_2 => "latin_2",
            Codec::Iso8859_3 => "latin_3",
            Codec::Iso8859_4 => "latin_4",
            Codec::Iso8859_5 => "cyrillic",
            Codec::Iso8859_6 => "arabic",
            Codec::Iso8859_7 => "greek",
            Codec::Iso8859_8 => "hebrew",
            Codec::Iso8859_9 => "latin_5",
            Codec::Iso8859_10 => "latin_6",
            Codec::Iso8859_11 => "thai",
            Codec::Iso8859_13 => "latin_7",
            Codec::Iso8859_14 => "latin_8",
            Codec::Iso8859_15 => "latin_9",
            Codec::Iso8859_16 => "latin_10",
            Codec::PercentUrl => "percent",
            Codec::PercentUrlPlus => "percent_plus",
            Codec::PercentForm => "application/x-www-form-urlencoded",
            Codec::PercentUrlMin => "percent_min",
            Codec::PercentFormMin => "form_min",
            Codec::Punycode => "punycode",
            Codec::QuotedPrintable => "quoted-printable",
            Codec::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_aliases() {
        for (name, codec) in [
            ("utf-8", Codec::Utf8),
            ("UTF-8", Codec::Utf8),
            ("utf8", Codec::Utf8),
            ("us-ascii", Codec::Ascii),
            ("latin_1", Codec::Iso8859_1),
            ("Latin-1", Codec::Iso8859_1),
            ("ISO-8859-1", Codec::Iso8859_1),
            ("8859", Codec::Iso8859_1),
            ("cp819", Codec::Iso8859_1),
            ("l5", Codec::Iso8859_9),
            ("cyrillic", Codec::Iso8859_5),
            ("greek8", Codec::Iso8859_7),
            ("thai", Codec::Iso8859_11),
            ("windows-1252", Codec::Cp1252),
            ("ibm-037", Codec::Cp037),
            ("ebcdic-cp-be", Codec::Cp500),
            ("percent", Codec::PercentUrl),
            ("url", Codec::PercentUrl),
            ("url_plus", Codec::PercentUrlPlus),
            ("application/x-www-form-urlencoded", Codec::PercentForm),
            ("percent_min", Codec::PercentUrlMin),
            ("form_min", Codec::PercentFormMin),
            ("puny", Codec::Punycode),
            ("qp", Codec::QuotedPrintable),
            ("", Codec::Unknown),
            ("klingon", Codec::Unknown),
        ] {
            assert_eq!(Codec::from_name(name), codec, "failed for {name:?}");
        }
    }

    #[test]
    fn canonical_names_resolve_back() {
        for codec in [
            Codec::Utf8,
            Codec::Ascii,
            Codec::Cp037,
            Codec::Cp874,
            Codec::Cp1250,
            Codec::Iso8859_1,
            Codec::Iso8859_5,
            Codec::Iso8859_11,
            Codec::Iso8859_16,
            Codec::PercentUrl,
            Codec::PercentForm,
            Codec::Punycode,
            Codec::QuotedPrintable,
        ] {
            assert_eq!(Codec::from_name(codec.as_str()), codec);
        }
    }

    #[test]
    fn dispatcher_rules() {
        // Unknown codec is rejected before anything else.
        let mut out = Vec::new();
        assert_eq!(
            encode(&mut Sink::Buffer(&mut out), b"abc", Ehandler::Fail, Codec::Unknown),
            Err(CodecError::InvalidParam)
        );

        // Empty input short-circuits.
        let mut out = Vec::new();
        assert_eq!(
            encode(&mut Sink::Buffer(&mut out), b"", Ehandler::Fail, Codec::Ascii),
            Ok(CodecStatus::Success)
        );
        assert!(out.is_empty());

        // Malformed input with a Fail handler is caught up front.
        assert_eq!(
            encode_str(b"a\xffb", Ehandler::Fail, Codec::QuotedPrintable),
            Err(CodecError::BadInput)
        );

        // The same bytes pass through when the handler tolerates them.
        let (out, _) = encode_str(b"a\xffb", Ehandler::Ignore, Codec::QuotedPrintable).unwrap();
        assert_eq!(out, b"a=FFb");
    }

    #[test]
    fn round_trips() {
        for (input, codec) in [
            ("café", Codec::Iso8859_1),
            ("Привет, мир", Codec::Iso8859_5),
            ("Привет, мир", Codec::Cp1251),
            ("Γειά σου Κόσμε", Codec::Iso8859_7),
            ("שלום עולם", Codec::Cp1255),
            ("Hello, World!", Codec::Cp037),
            ("Hello [World]!", Codec::Cp500),
            ("ราคา ๑๒๓", Codec::Cp874),
            ("Zelo rada grem", Codec::Cp1250),
            ("hello world", Codec::PercentUrl),
            ("a b+c%d~e", Codec::PercentForm),
            ("bücher", Codec::Punycode),
            ("café = good\r\n", Codec::QuotedPrintable),
        ] {
            let (encoded, status) = encode_str(input, Ehandler::Fail, codec).unwrap();
            assert_eq!(status, CodecStatus::Success, "failed for {input:?}");
            let (decoded, status) = decode_str(&encoded, Ehandler::Fail, codec).unwrap();
            assert_eq!(status, CodecStatus::Success, "failed for {input:?}");
            assert_eq!(decoded, input.as_bytes(), "failed for {input:?} via {codec:?}");
        }
    }
}
