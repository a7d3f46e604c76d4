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

use crate::{CodecError, CodecResult, CodecStatus, Ehandler, Sink};

/// Replacement emitted when substituting toward a single-byte codepage.
pub(crate) const CP_REPLACE: u8 = b'?';

/// Replacement scalar emitted when substituting toward UTF-8.
pub(crate) const UTF8_REPLACE: char = '\u{FFFD}';

/// Decodes one scalar from the front of `input`. Returns the scalar and the
/// number of bytes it occupies, or `None` when the input starts with an
/// invalid sequence (overlong forms, surrogates, and values above U+10FFFF
/// are invalid).
pub fn get_cp(input: &[u8]) -> Option<(char, usize)> {
    let valid = match core::str::from_utf8(input) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&input[..e.valid_up_to()]).unwrap_or(""),
    };
    valid.chars().next().map(|ch| (ch, ch.len_utf8()))
}

/// Encodes one scalar, returning the encoded bytes and their length.
/// Fails for surrogate values and values above U+10FFFF.
pub fn from_cp(cp: u32) -> Option<([u8; 4], usize)> {
    let ch = char::from_u32(cp)?;
    let mut buf = [0u8; 4];
    let len = ch.encode_utf8(&mut buf).len();
    Some((buf, len))
}

/// Number of bytes to advance past one scalar, valid or not. Malformed
/// sequences are skipped as a unit: an invalid lead byte advances one byte,
/// a truncated sequence advances past its continuation bytes.
pub fn next_chr(input: &[u8]) -> usize {
    let Some(&lead) = input.first() else {
        return 0;
    };

    let expect = match lead {
        0x00..=0x7F => return 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return 1,
    };

    let mut len = 1;
    while len < expect && matches!(input.get(len), Some(0x80..=0xBF)) {
        len += 1;
    }
    len
}

/// Validates the whole input. On failure returns the byte offset of the
/// first invalid scalar.
pub fn is_valid(input: &[u8]) -> Result<(), usize> {
    match core::str::from_utf8(input) {
        Ok(_) => Ok(()),
        Err(e) => Err(e.valid_up_to()),
    }
}

/// UTF-8 to UTF-8 pass: copies valid runs and applies the error handler to
/// anything else, one replacement per invalid scalar.
pub(crate) fn utf8_to_utf8(
    sink: &mut Sink,
    mut input: &[u8],
    ehandler: Ehandler,
    is_encode: bool,
) -> CodecResult {
    // Nothing to scan for when ignoring; the input is copied verbatim.
    if ehandler == Ehandler::Ignore {
        sink.add_bytes(input);
        return match is_valid(input) {
            Ok(()) => Ok(CodecStatus::Success),
            Err(_) => Ok(CodecStatus::SuccessEhandler),
        };
    }

    let mut res = CodecStatus::Success;
    while !input.is_empty() {
        match is_valid(input) {
            Ok(()) => {
                sink.add_bytes(input);
                break;
            }
            Err(valid_len) => {
                if ehandler == Ehandler::Fail {
                    return Err(CodecError::BadInput);
                }
                sink.add_bytes(&input[..valid_len]);
                res = CodecStatus::SuccessEhandler;

                if is_encode {
                    sink.add_byte(CP_REPLACE);
                } else {
                    let mut buf = [0u8; 4];
                    sink.add_str(UTF8_REPLACE.encode_utf8(&mut buf));
                }

                input = &input[valid_len + next_chr(&input[valid_len..])..];
            }
        }
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodecStatus;

    #[test]
    fn get_cp_scalars() {
        assert_eq!(get_cp(b"a"), Some(('a', 1)));
        assert_eq!(get_cp("é!".as_bytes()), Some(('é', 2)));
        assert_eq!(get_cp("☺".as_bytes()), Some(('☺', 3)));
        assert_eq!(get_cp("𝄞".as_bytes()), Some(('𝄞', 4)));
        // Truncated, overlong, lone continuation, surrogate half.
        assert_eq!(get_cp(b"\xc3"), None);
        assert_eq!(get_cp(b"\xc0\xaf"), None);
        assert_eq!(get_cp(b"\x80"), None);
        assert_eq!(get_cp(b"\xed\xa0\x80"), None);
        assert_eq!(get_cp(b""), None);
    }

    #[test]
    fn from_cp_scalars() {
        let (buf, len) = from_cp(0xE9).unwrap();
        assert_eq!(&buf[..len], "é".as_bytes());
        assert!(from_cp(0xD800).is_none());
        assert!(from_cp(0x110000).is_none());
    }

    #[test]
    fn next_chr_advance() {
        assert_eq!(next_chr(b"a"), 1);
        assert_eq!(next_chr("é".as_bytes()), 2);
        assert_eq!(next_chr(b"\xf0\x9d\x84\x9e"), 4);
        // Truncated sequence consumed as a unit.
        assert_eq!(next_chr(b"\xe2\x82"), 2);
        // Invalid lead advances a single byte.
        assert_eq!(next_chr(b"\xff\xff"), 1);
        assert_eq!(next_chr(b""), 0);
    }

    #[test]
    fn validate() {
        assert_eq!(is_valid("héllo".as_bytes()), Ok(()));
        assert_eq!(is_valid(b"ab\xffcd"), Err(2));
        assert_eq!(is_valid(b""), Ok(()));
    }

    #[test]
    fn utf8_pass_replace_per_scalar() {
        for (input, ehandler, is_encode, expected, status) in [
            (
                &b"valid"[..],
                Ehandler::Fail,
                false,
                &b"valid"[..],
                CodecStatus::Success,
            ),
            (
                b"a\xe2\x82b",
                Ehandler::Replace,
                false,
                "a\u{FFFD}b".as_bytes(),
                CodecStatus::SuccessEhandler,
            ),
            (
                b"a\xe2\x82b",
                Ehandler::Replace,
                true,
                b"a?b",
                CodecStatus::SuccessEhandler,
            ),
            (
                b"a\xff\xffb",
                Ehandler::Replace,
                true,
                b"a??b",
                CodecStatus::SuccessEhandler,
            ),
            (
                b"a\xffb",
                Ehandler::Ignore,
                false,
                b"a\xffb",
                CodecStatus::SuccessEhandler,
            ),
        ] {
            let mut out = Vec::new();
            let res = utf8_to_utf8(&mut Sink::Buffer(&mut out), input, ehandler, is_encode);
            assert_eq!(res, Ok(status), "failed for {input:?}");
            assert_eq!(out, expected, "failed for {input:?}");
        }

        let mut out = Vec::new();
        assert_eq!(
            utf8_to_utf8(&mut Sink::Buffer(&mut out), b"a\xffb", Ehandler::Fail, false),
            Err(crate::CodecError::BadInput)
        );
    }
}
