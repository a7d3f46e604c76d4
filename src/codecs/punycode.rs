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

// RFC 3492 section 5 parameters.
const BASE: u32 = 36;
const TMIN: u32 = 1;
const TMAX: u32 = 26;
const SKEW: u32 = 38;
const DAMP: u32 = 700;
const INITIAL_BIAS: u32 = 72;
const INITIAL_N: u32 = 128;

fn adapt(mut delta: u32, numpoints: u32, firsttime: bool) -> u32 {
    delta /= if firsttime { DAMP } else { 2 };
    delta += delta / numpoints;

    let mut k = 0;
    while delta > ((BASE - TMIN) * TMAX) / 2 {
        delta /= BASE - TMIN;
        k += BASE;
    }
    k + ((BASE - TMIN + 1) * delta) / (delta + SKEW)
}

fn encode_digit(d: u32) -> u8 {
    if d <= 25 {
        b'a' + d as u8
    } else {
        b'0' + (d - 26) as u8
    }
}

/// Returns `BASE` for bytes that are not Punycode digits.
fn decode_digit(byte: u8) -> u32 {
    match byte {
        b'A'..=b'Z' => (byte - b'A') as u32,
        b'a'..=b'z' => (byte - b'a') as u32,
        b'0'..=b'9' => (byte - b'0') as u32 + 26,
        _ => BASE,
    }
}

fn threshold(k: u32, bias: u32) -> u32 {
    if k <= bias + TMIN {
        TMIN
    } else if k >= bias + TMAX {
        TMAX
    } else {
        k - bias
    }
}

/// Punycode is deterministic; the error handler has no role here. Input
/// that is not valid UTF-8 is rejected outright.
pub(crate) fn encode(sink: &mut Sink, input: &[u8], _ehandler: Ehandler) -> CodecResult {
    // All ASCII, nothing to encode.
    if input.is_ascii() {
        sink.add_bytes(input);
        sink.add_byte(b'-');
        return Ok(CodecStatus::Success);
    }

    let input = core::str::from_utf8(input).map_err(|_| CodecError::BadInput)?;

    // Basic codepoints are copied through in order; the rest are processed
    // smallest first, each exactly once.
    let mut non_basic: Vec<u32> = Vec::new();
    let mut h: u32 = 0;
    for ch in input.chars() {
        let cp = ch as u32;
        if cp < INITIAL_N {
            h += 1;
            sink.add_byte(cp as u8);
        } else {
            non_basic.push(cp);
        }
    }
    non_basic.sort_unstable();
    non_basic.dedup();

    let b = h;
    if h != 0 {
        sink.add_byte(b'-');
    }

    let mut n = INITIAL_N;
    let mut delta: u32 = 0;
    let mut bias = INITIAL_BIAS;

    for &m in &non_basic {
        delta = (m - n)
            .checked_mul(h + 1)
            .and_then(|inc| delta.checked_add(inc))
            .ok_or(CodecError::Fail)?;
        n = m;

        for cp in input.chars().map(|ch| ch as u32) {
            if cp < n {
                delta = delta.checked_add(1).ok_or(CodecError::Fail)?;
                continue;
            }
            if cp > n {
                continue;
            }

            // Found a position for this codepoint; emit its variable
            // length digit string.
            let mut q = delta;
            let mut k = BASE;
            loop {
                let t = threshold(k, bias);
                if q < t {
                    break;
                }
                sink.add_byte(encode_digit(t + (q - t) % (BASE - t)));
                q = (q - t) / (BASE - t);
                k += BASE;
            }
            sink.add_byte(encode_digit(q));

            bias = adapt(delta, h + 1, h == b);
            delta = 0;
            h += 1;
        }

        delta = delta.checked_add(1).ok_or(CodecError::Fail)?;
        n = n.checked_add(1).ok_or(CodecError::Fail)?;
    }

    Ok(CodecStatus::Success)
}

pub(crate) fn decode(sink: &mut Sink, input: &[u8], _ehandler: Ehandler) -> CodecResult {
    // Punycode transfers ASCII only.
    if !input.is_ascii() {
        return Err(CodecError::BadInput);
    }

    // Everything before the last delimiter is copied through; the digits
    // after it are decoded into insertion positions.
    let (basic, tail) = match input.iter().rposition(|&byte| byte == b'-') {
        Some(delim) => (&input[..delim], &input[delim + 1..]),
        None => (&input[..0], input),
    };

    let mut output: Vec<char> = basic.iter().map(|&byte| byte as char).collect();

    let mut i: u32 = 0;
    let mut bias = INITIAL_BIAS;
    let mut n = INITIAL_N;
    let mut pos = 0;

    while pos < tail.len() {
        let oldi = i;
        let mut w: u32 = 1;
        let mut k = BASE;

        loop {
            let d = match tail.get(pos) {
                Some(&byte) => decode_digit(byte),
                None => return Err(CodecError::Fail),
            };
            pos += 1;
            if d >= BASE {
                return Err(CodecError::Fail);
            }

            i = d
                .checked_mul(w)
                .and_then(|dw| i.checked_add(dw))
                .ok_or(CodecError::Fail)?;

            let t = threshold(k, bias);
            if d < t {
                break;
            }
            w = w.checked_mul(BASE - t).ok_or(CodecError::Fail)?;
            k += BASE;
        }

        let len = output.len() as u32 + 1;
        bias = adapt(i - oldi, len, oldi == 0);
        n = n.checked_add(i / len).ok_or(CodecError::Fail)?;
        i %= len;

        let ch = char::from_u32(n).ok_or(CodecError::Fail)?;
        output.insert(i as usize, ch);
        i += 1;
    }

    let decoded: String = output.into_iter().collect();
    sink.add_str(&decoded);
    Ok(CodecStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(input: &str) -> String {
        let mut out = Vec::new();
        encode(&mut Sink::Buffer(&mut out), input.as_bytes(), Ehandler::Fail).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn dec(input: &str) -> String {
        let mut out = Vec::new();
        decode(&mut Sink::Buffer(&mut out), input.as_bytes(), Ehandler::Fail).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn round_trip_samples() {
        // RFC 3492 section 7.1 worked examples and friends.
        for (decoded, encoded) in [
            ("bücher", "bcher-kva"),
            ("mañana", "maana-pta"),
            ("例え", "r8jz45g"),
            ("テスト", "zckzah"),
            ("ليهمابتكلموشعربي؟", "egbpdaj6bu4bxfgehfvwxn"),
            ("他们为什么不说中文", "ihqwcrb4cv8a8dqg056pqjye"),
            ("Pročprostěnemluvíčesky", "Proprostnemluvesky-uyb24dma41a"),
            ("☺", "74h"),
            ("abc", "abc-"),
            ("", "-"),
        ] {
            assert_eq!(enc(decoded), encoded, "encode failed for {decoded:?}");
            assert_eq!(dec(encoded), decoded, "decode failed for {encoded:?}");
        }
    }

    #[test]
    fn mixed_case_decoding() {
        assert_eq!(dec("BCHER-KVA"), "BÜCHER");
    }

    #[test]
    fn rejects_bad_input() {
        let mut out = Vec::new();
        assert_eq!(
            encode(&mut Sink::Buffer(&mut out), b"b\xfccher", Ehandler::Fail),
            Err(CodecError::BadInput)
        );

        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), "bücher".as_bytes(), Ehandler::Fail),
            Err(CodecError::BadInput)
        );

        // A control character is not a valid digit.
        let mut out = Vec::new();
        assert_eq!(
            decode(&mut Sink::Buffer(&mut out), b"ab-\x01c", Ehandler::Fail),
            Err(CodecError::Fail)
        );
    }
}
