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

use crate::codecs::{hex_val, HEX_UPPER, RAW_REPLACE};
use crate::{Codec, CodecError, CodecResult, CodecStatus, Ehandler, Sink};

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

pub(crate) fn encode(
    sink: &mut Sink,
    input: &[u8],
    _ehandler: Ehandler,
    codec: Codec,
) -> CodecResult {
    for &byte in input {
        // Controls, non-ASCII, and '%' are encoded in every variant.
        let mut process = byte < 0x21 || byte > 0x7E || byte == b'%';
        if !process {
            process = match codec {
                Codec::PercentUrl | Codec::PercentUrlPlus => !is_unreserved(byte),
                Codec::PercentForm => !is_unreserved(byte) || byte == b'~',
                Codec::PercentUrlMin => false,
                Codec::PercentFormMin => byte == b'+' || byte == b'~',
                _ => false,
            };
        }

        // Line breaks survive form encoding.
        if matches!(codec, Codec::PercentForm | Codec::PercentFormMin)
            && (byte == b'\r' || byte == b'\n')
        {
            process = false;
        }

        if !process {
            sink.add_byte(byte);
            continue;
        }

        if byte == b' ' {
            match codec {
                Codec::PercentUrl | Codec::PercentUrlMin => sink.add_str("%20"),
                Codec::PercentUrlPlus | Codec::PercentForm | Codec::PercentFormMin => {
                    sink.add_byte(b'+')
                }
                _ => {}
            }
            continue;
        }

        sink.add_byte(b'%');
        sink.add_byte(HEX_UPPER[(byte >> 4) as usize]);
        sink.add_byte(HEX_UPPER[(byte & 0x0F) as usize]);
    }

    Ok(CodecStatus::Success)
}

pub(crate) fn decode(
    sink: &mut Sink,
    input: &[u8],
    ehandler: Ehandler,
    codec: Codec,
) -> CodecResult {
    if ehandler == Ehandler::Fail && !input.is_ascii() {
        return Err(CodecError::BadInput);
    }

    let plus_is_space = matches!(
        codec,
        Codec::PercentUrlPlus | Codec::PercentForm | Codec::PercentFormMin
    );
    let mut res = CodecStatus::Success;
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        i += 1;

        if byte == b'+' && plus_is_space {
            sink.add_byte(b' ');
            continue;
        }

        if byte != b'%' {
            sink.add_byte(byte);
            continue;
        }

        if input.len() - i < 2 {
            match ehandler {
                Ehandler::Fail => return Err(CodecError::Fail),
                Ehandler::Replace => {
                    sink.add_bytes(&RAW_REPLACE);
                    i = input.len();
                    res = CodecStatus::SuccessEhandler;
                }
                Ehandler::Ignore => res = CodecStatus::SuccessEhandler,
            }
            continue;
        }

        let pair = (hex_val(input[i]), hex_val(input[i + 1]));
        i += 2;
        match pair {
            (Some(hi), Some(lo)) => sink.add_byte((hi << 4) | lo),
            _ => match ehandler {
                Ehandler::Fail => return Err(CodecError::Fail),
                Ehandler::Replace => {
                    sink.add_bytes(&RAW_REPLACE);
                    res = CodecStatus::SuccessEhandler;
                }
                Ehandler::Ignore => res = CodecStatus::SuccessEhandler,
            },
        }
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(input: &str, codec: Codec) -> String {
        let mut out = Vec::new();
        encode(&mut Sink::Buffer(&mut out), input.as_bytes(), Ehandler::Fail, codec).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn dec(input: &str, codec: Codec) -> Vec<u8> {
        let mut out = Vec::new();
        decode(&mut Sink::Buffer(&mut out), input.as_bytes(), Ehandler::Fail, codec).unwrap();
        out
    }

    #[test]
    fn encode_variants() {
        for (input, codec, expected) in [
            ("hello world/?&=+", Codec::PercentUrl, "hello%20world%2F%3F%26%3D%2B"),
            ("hello world/?&=+", Codec::PercentUrlPlus, "hello+world%2F%3F%26%3D%2B"),
            ("hello world/?&=+", Codec::PercentForm, "hello+world%2F%3F%26%3D%2B"),
            ("a~b", Codec::PercentUrl, "a~b"),
            ("a~b", Codec::PercentUrlPlus, "a~b"),
            ("a~b", Codec::PercentForm, "a%7Eb"),
            ("a\r\nb", Codec::PercentForm, "a\r\nb"),
            ("a\r\nb", Codec::PercentUrl, "a%0D%0Ab"),
            ("100%", Codec::PercentUrl, "100%25"),
            ("café", Codec::PercentUrl, "caf%C3%A9"),
            // Minimal variants leave reserved characters alone.
            ("hello world/?&=+", Codec::PercentUrlMin, "hello%20world/?&=+"),
            ("hello world/?&=+", Codec::PercentFormMin, "hello+world/?&=%2B"),
            ("a~b", Codec::PercentFormMin, "a%7Eb"),
            ("a\r\nb", Codec::PercentFormMin, "a\r\nb"),
        ] {
            assert_eq!(enc(input, codec), expected, "failed for {input:?} {codec:?}");
        }
    }

    #[test]
    fn decode_variants() {
        for (input, codec, expected) in [
            ("hello%20world%2F%3F%26%3D%2B", Codec::PercentUrl, &b"hello world/?&=+"[..]),
            ("hello+world", Codec::PercentUrl, b"hello+world"),
            ("hello+world", Codec::PercentUrlPlus, b"hello world"),
            ("hello+world", Codec::PercentForm, b"hello world"),
            ("caf%C3%A9", Codec::PercentUrl, "café".as_bytes()),
            ("caf%c3%a9", Codec::PercentUrl, "café".as_bytes()),
        ] {
            assert_eq!(dec(input, codec), expected, "failed for {input:?}");
        }
    }

    #[test]
    fn decode_bad_sequences() {
        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), b"a%zzb", Ehandler::Fail, Codec::PercentUrl),
            Err(CodecError::Fail)
        );

        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), b"a%zzb", Ehandler::Replace, Codec::PercentUrl),
            Ok(CodecStatus::SuccessEhandler)
        );
        assert_eq!(out, b"a\xff\xfdb");

        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), b"a%zzb", Ehandler::Ignore, Codec::PercentUrl),
            Ok(CodecStatus::SuccessEhandler)
        );
        assert_eq!(out, b"ab");

        // '%' with fewer than two bytes remaining.
        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), b"ab%1", Ehandler::Replace, Codec::PercentUrl),
            Ok(CodecStatus::SuccessEhandler)
        );
        assert_eq!(out, b"ab\xff\xfd");

        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), b"ab%", Ehandler::Fail, Codec::PercentUrl),
            Err(CodecError::Fail)
        );

        // Non-ASCII input rejected up front when failing hard.
        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), b"a\xffb", Ehandler::Fail, Codec::PercentUrl),
            Err(CodecError::BadInput)
        );
    }
}
