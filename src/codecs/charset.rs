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

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::codecs::utf8::{self, CP_REPLACE, UTF8_REPLACE};
use crate::codecs::tables;
use crate::{Codec, CodecError, CodecResult, CodecStatus, Ehandler, Sink};

/// Cell value for byte positions a codepage leaves undefined.
pub(crate) const UNMAPPED: u16 = 0xFFFF;

#[derive(Debug)]
pub(crate) enum PageMap {
    /// Identity through 0x9F plus a table for 0xA0..=0xFF (the ISO family
    /// keeps the C1 control block).
    Iso(&'static [u16; 96]),
    /// Identity ASCII plane plus a table for 0x80..=0xFF.
    Extended(&'static [u16; 128]),
    /// Fully remapped page (EBCDIC).
    Full(&'static [u16; 256]),
}

impl PageMap {
    fn lookup(&self, byte: u8) -> u16 {
        match self {
            PageMap::Iso(hi) => {
                if byte < 0xA0 {
                    byte as u16
                } else {
                    hi[byte as usize - 0xA0]
                }
            }
            PageMap::Extended(hi) => {
                if byte < 0x80 {
                    byte as u16
                } else {
                    hi[byte as usize - 0x80]
                }
            }
            PageMap::Full(table) => table[byte as usize],
        }
    }
}

/// A single-byte codepage: a bidirectional map between bytes and Unicode
/// codepoints. The codepoint-to-byte direction is built once on first use
/// and cached for the lifetime of the process.
#[derive(Debug)]
pub struct Codepage {
    pub(crate) name: &'static str,
    pub(crate) map: PageMap,
    pub(crate) reverse: OnceLock<HashMap<u16, u8>>,
}

impl Codepage {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The codepoint assigned to `byte`, if the page defines one.
    pub fn decode_byte(&self, byte: u8) -> Option<char> {
        let ucode = self.map.lookup(byte);
        if ucode == UNMAPPED {
            None
        } else {
            char::from_u32(ucode as u32)
        }
    }

    /// The byte assigned to `ch`, if the page can represent it.
    pub fn encode_char(&self, ch: char) -> Option<u8> {
        if (ch as u32) > 0xFFFF {
            return None;
        }
        self.reverse_map().get(&(ch as u16)).copied()
    }

    fn reverse_map(&self) -> &HashMap<u16, u8> {
        self.reverse.get_or_init(|| {
            let mut map = HashMap::with_capacity(256);
            for byte in 0..=0xFFu8 {
                let ucode = self.map.lookup(byte);
                if ucode != UNMAPPED {
                    map.insert(ucode, byte);
                }
            }
            map
        })
    }

    /// UTF-8 to codepage. Invalid UTF-8 is consumed and replaced one
    /// scalar at a time, never per byte.
    pub(crate) fn encode(&self, sink: &mut Sink, input: &[u8], ehandler: Ehandler) -> CodecResult {
        let mut input = input;
        let mut res = CodecStatus::Success;

        while !input.is_empty() {
            let byte = match utf8::get_cp(input) {
                Some((ch, len)) => {
                    input = &input[len..];
                    self.encode_char(ch)
                }
                None => {
                    input = &input[utf8::next_chr(input)..];
                    None
                }
            };

            match byte {
                Some(byte) => sink.add_byte(byte),
                None => match ehandler {
                    Ehandler::Fail => return Err(CodecError::Fail),
                    Ehandler::Replace => {
                        sink.add_byte(CP_REPLACE);
                        res = CodecStatus::SuccessEhandler;
                    }
                    Ehandler::Ignore => res = CodecStatus::SuccessEhandler,
                },
            }
        }

        Ok(res)
    }

    /// Codepage to UTF-8.
    pub(crate) fn decode(&self, sink: &mut Sink, input: &[u8], ehandler: Ehandler) -> CodecResult {
        let mut res = CodecStatus::Success;
        let mut buf = [0u8; 4];

        for &byte in input {
            match self.decode_byte(byte) {
                Some(ch) => sink.add_str(ch.encode_utf8(&mut buf)),
                None => match ehandler {
                    Ehandler::Fail => return Err(CodecError::Fail),
                    Ehandler::Replace => {
                        sink.add_str(UTF8_REPLACE.encode_utf8(&mut buf));
                        res = CodecStatus::SuccessEhandler;
                    }
                    Ehandler::Ignore => res = CodecStatus::SuccessEhandler,
                },
            }
        }

        Ok(res)
    }
}

/// The codepage behind a single-byte charset codec.
pub fn codepage(codec: Codec) -> Option<&'static Codepage> {
    match codec {
        Codec::Ascii => Some(&tables::ASCII),
        Codec::Cp037 => Some(&tables::CP037),
        Codec::Cp500 => Some(&tables::CP500),
        Codec::Cp874 => Some(&tables::CP874),
        Codec::Cp1250 => Some(&tables::CP1250),
        Codec::Cp1251 => Some(&tables::CP1251),
        Codec::Cp1252 => Some(&tables::CP1252),
        Codec::Cp1253 => Some(&tables::CP1253),
        Codec::Cp1254 => Some(&tables::CP1254),
        Codec::Cp1255 => Some(&tables::CP1255),
        Codec::Cp1256 => Some(&tables::CP1256),
        Codec::Cp1257 => Some(&tables::CP1257),
        Codec::Cp1258 => Some(&tables::CP1258),
        Codec::Iso8859_1 => Some(&tables::ISO8859_1),
        Codec::Iso8859_2 => Some(&tables::ISO8859_2),
        Codec::Iso8859_3 => Some(&tables::ISO8859_3),
        Codec::Iso8859_4 => Some(&tables::ISO8859_4),
        Codec::Iso8859_5 => Some(&tables::ISO8859_5),
        Codec::Iso8859_6 => Some(&tables::ISO8859_6),
        Codec::Iso8859_7 => Some(&tables::ISO8859_7),
        Codec::Iso8859_8 => Some(&tables::ISO8859_8),
        Codec::Iso8859_9 => Some(&tables::ISO8859_9),
        Codec::Iso8859_10 => Some(&tables::ISO8859_10),
        Codec::Iso8859_11 => Some(&tables::ISO8859_11),
        Codec::Iso8859_13 => Some(&tables::ISO8859_13),
        Codec::Iso8859_14 => Some(&tables::ISO8859_14),
        Codec::Iso8859_15 => Some(&tables::ISO8859_15),
        Codec::Iso8859_16 => Some(&tables::ISO8859_16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[Codec] = &[
        Codec::Ascii,
        Codec::Cp037,
        Codec::Cp500,
        Codec::Cp874,
        Codec::Cp1250,
        Codec::Cp1251,
        Codec::Cp1252,
        Codec::Cp1253,
        Codec::Cp1254,
        Codec::Cp1255,
        Codec::Cp1256,
        Codec::Cp1257,
        Codec::Cp1258,
        Codec::Iso8859_1,
        Codec::Iso8859_2,
        Codec::Iso8859_3,
        Codec::Iso8859_4,
        Codec::Iso8859_5,
        Codec::Iso8859_6,
        Codec::Iso8859_7,
        Codec::Iso8859_8,
        Codec::Iso8859_9,
        Codec::Iso8859_10,
        Codec::Iso8859_11,
        Codec::Iso8859_13,
        Codec::Iso8859_14,
        Codec::Iso8859_15,
        Codec::Iso8859_16,
    ];

    #[test]
    fn tables_are_bijective() {
        for &codec in ALL {
            let page = codepage(codec).unwrap();
            let mut seen = std::collections::HashSet::new();
            for byte in 0..=0xFFu8 {
                if let Some(ch) = page.decode_byte(byte) {
                    assert!(
                        seen.insert(ch),
                        "{}: duplicate mapping for U+{:04X}",
                        page.name(),
                        ch as u32
                    );
                    assert_eq!(
                        page.encode_char(ch),
                        Some(byte),
                        "{}: U+{:04X} does not round-trip to 0x{:02X}",
                        page.name(),
                        ch as u32,
                        byte
                    );
                }
            }
        }
    }

    #[test]
    fn ascii_plane_is_identity() {
        for &codec in ALL {
            if matches!(codec, Codec::Cp037 | Codec::Cp500) {
                continue;
            }
            let page = codepage(codec).unwrap();
            for byte in 0..=0x7Fu8 {
                assert_eq!(page.decode_byte(byte), Some(byte as char), "{}", page.name());
            }
        }
    }

    #[test]
    fn spot_mappings() {
        for (codec, byte, ch) in [
            (Codec::Iso8859_1, 0xE9u8, 'é'),
            (Codec::Iso8859_2, 0xB9, 'š'),
            (Codec::Iso8859_5, 0xBF, 'П'),
            (Codec::Iso8859_7, 0xE1, 'α'),
            (Codec::Iso8859_8, 0xF9, 'ש'),
            (Codec::Iso8859_9, 0xFD, 'ı'),
            (Codec::Iso8859_11, 0xA1, 'ก'),
            (Codec::Iso8859_15, 0xA4, '€'),
            (Codec::Cp874, 0x80, '€'),
            (Codec::Cp1250, 0x9A, 'š'),
            (Codec::Cp1251, 0xCF, 'П'),
            (Codec::Cp1252, 0x80, '€'),
            (Codec::Cp1252, 0x9C, 'œ'),
            (Codec::Cp1253, 0xE1, 'α'),
            (Codec::Cp1255, 0xF9, 'ש'),
            (Codec::Cp1256, 0xC7, 'ا'),
            (Codec::Cp1258, 0xFE, '₫'),
            (Codec::Cp037, 0x81, 'a'),
            (Codec::Cp037, 0xC1, 'A'),
            (Codec::Cp037, 0xF0, '0'),
            (Codec::Cp037, 0x40, ' '),
            (Codec::Cp500, 0x4A, '['),
            (Codec::Cp500, 0x5A, ']'),
        ] {
            let page = codepage(codec).unwrap();
            assert_eq!(page.decode_byte(byte), Some(ch), "{}", page.name());
            assert_eq!(page.encode_char(ch), Some(byte), "{}", page.name());
        }
    }

    #[test]
    fn encode_policy() {
        let page = codepage(Codec::Ascii).unwrap();

        let mut out = Vec::new();
        assert_eq!(
            page.encode(&mut Sink::Buffer(&mut out), "café".as_bytes(), Ehandler::Fail),
            Err(CodecError::Fail)
        );

        let mut out = Vec::new();
        assert_eq!(
            page.encode(&mut Sink::Buffer(&mut out), "café".as_bytes(), Ehandler::Replace),
            Ok(CodecStatus::SuccessEhandler)
        );
        assert_eq!(out, b"caf?");

        let mut out = Vec::new();
        assert_eq!(
            page.encode(&mut Sink::Buffer(&mut out), "café".as_bytes(), Ehandler::Ignore),
            Ok(CodecStatus::SuccessEhandler)
        );
        assert_eq!(out, b"caf");

        // One replacement per invalid scalar, not per byte.
        let mut out = Vec::new();
        assert_eq!(
            page.encode(&mut Sink::Buffer(&mut out), b"a\xe2\x82b", Ehandler::Replace),
            Ok(CodecStatus::SuccessEhandler)
        );
        assert_eq!(out, b"a?b");
    }

    #[test]
    fn decode_policy() {
        let page = codepage(Codec::Ascii).unwrap();

        let mut out = Vec::new();
        assert_eq!(
            page.decode(&mut Sink::Buffer(&mut out), b"caf\xe9", Ehandler::Fail),
            Err(CodecError::Fail)
        );

        let mut out = Vec::new();
        assert_eq!(
            page.decode(&mut Sink::Buffer(&mut out), b"caf\xe9", Ehandler::Replace),
            Ok(CodecStatus::SuccessEhandler)
        );
        assert_eq!(out, "caf\u{FFFD}".as_bytes());
    }
}
