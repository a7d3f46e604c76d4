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
use crate::{CodecError, CodecResult, CodecStatus, Ehandler, Sink};

pub(crate) fn encode(sink: &mut Sink, input: &[u8], _ehandler: Ehandler) -> CodecResult {
    let mut col = 0usize;

    for &byte in input {
        // Tab, \r, \n, and printable ASCII other than '=' pass verbatim.
        // RFC 2045 lists 33-60 and 62-126 as safe; space and tab are fine
        // as long as they do not end a line, which the soft break below
        // never allows.
        if byte != b'\t' && byte != b'\r' && byte != b'\n' && (byte < 32 || byte == b'=' || byte > 126)
        {
            sink.add_byte(b'=');
            sink.add_byte(HEX_UPPER[(byte >> 4) as usize]);
            sink.add_byte(HEX_UPPER[(byte & 0x0F) as usize]);
            col += 3;
        } else {
            sink.add_byte(byte);
            col += 1;
        }

        if byte == b'\n' {
            col = 0;
        }

        // Hard cap is 76 columns; break early rather than look ahead.
        if col > 72 {
            sink.add_str("=\r\n");
            col = 0;
        }
    }

    Ok(CodecStatus::Success)
}

pub(crate) fn decode(sink: &mut Sink, input: &[u8], ehandler: Ehandler) -> CodecResult {
    let mut res = CodecStatus::Success;
    let mut i = 0;

    while i < input.len() {
        // Copy the literal run up to the next escape.
        match input[i..].iter().position(|&byte| byte == b'=') {
            None => {
                sink.add_bytes(&input[i..]);
                break;
            }
            Some(run) => {
                sink.add_bytes(&input[i..i + run]);
                i += run + 1;
            }
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

        if input[i] == b'\r' && input[i + 1] == b'\n' {
            // Soft line break; the line continues without a newline.
            i += 2;
            continue;
        }

        match (hex_val(input[i]), hex_val(input[i + 1])) {
            (Some(hi), Some(lo)) => {
                sink.add_byte((hi << 4) | lo);
                i += 2;
            }
            // Not \r\n and not a hex pair. The '=' is dropped and decoding
            // resumes right after it; it may have been an errant escape.
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
