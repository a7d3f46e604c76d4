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

type Entity = (char, &'static str);

static TEXT_ENCODE_ENTITIES: &[Entity] = &[
    ('"', "&quot;"),
    ('\'', "&apos;"),
    ('&', "&amp;"),
    ('>', "&gt;"),
    ('<', "&lt;"),
];

static TEXT_DECODE_ENTITIES: &[Entity] = &[
    ('"', "&quot;"),
    ('\'', "&apos;"),
    ('&', "&amp;"),
    ('>', "&gt;"),
    ('<', "&lt;"),
    ('\u{A}', "&#xA;"),
    ('\u{D}', "&#xD;"),
];

// Apostrophes and relational signs are safe inside a quoted attribute.
static ATTRIBUTE_ENTITIES: &[Entity] = &[('"', "&quot;"), ('&', "&amp;"), ('<', "&lt;")];

fn encode_with(input: &str, entities: &[Entity]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run_start = 0;

    for (i, ch) in input.char_indices() {
        if let Some((_, encoded)) = entities.iter().find(|(ent, _)| *ent == ch) {
            out.push_str(&input[run_start..i]);
            out.push_str(encoded);
            run_start = i + ch.len_utf8();
        }
    }

    out.push_str(&input[run_start..]);
    out
}

fn decode_with(input: &str, entities: &[Entity]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];

        // Entity names match case-insensitively; anything unrecognized is
        // copied through as a literal ampersand. Compare as bytes so a
        // multi-byte character after the '&' cannot split a slice.
        match entities.iter().find(|(_, encoded)| {
            let rest = rest.as_bytes();
            rest.len() >= encoded.len()
                && rest[..encoded.len()].eq_ignore_ascii_case(encoded.as_bytes())
        }) {
            Some((ch, encoded)) => {
                out.push(*ch);
                rest = &rest[encoded.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

pub(crate) fn encode_text(input: &str) -> String {
    encode_with(input, TEXT_ENCODE_ENTITIES)
}

pub(crate) fn decode_text(input: &str) -> String {
    decode_with(input, TEXT_DECODE_ENTITIES)
}

pub(crate) fn encode_attribute(input: &str) -> String {
    encode_with(input, ATTRIBUTE_ENTITIES)
}

pub(crate) fn decode_attribute(input: &str) -> String {
    decode_with(input, ATTRIBUTE_ENTITIES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_entities() {
        assert_eq!(encode_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(encode_text("\"quote\" 'tick'"), "&quot;quote&quot; &apos;tick&apos;");
        assert_eq!(encode_text("plain"), "plain");
        assert_eq!(encode_text(""), "");

        assert_eq!(decode_text("a &lt; b &amp; c &gt; d"), "a < b & c > d");
        assert_eq!(decode_text("&QUOT;x&APOS;"), "\"x'");
        assert_eq!(decode_text("line&#xA;break&#xD;"), "line\nbreak\r");
        // Unknown entities pass through.
        assert_eq!(decode_text("fish &chips; &"), "fish &chips; &");
    }

    #[test]
    fn attribute_entities() {
        assert_eq!(encode_attribute("a<b&c\"d'e>f"), "a&lt;b&amp;c&quot;d'e>f");
        assert_eq!(decode_attribute("a&lt;b&amp;c&quot;d"), "a<b&c\"d");
        // The text-only entities stay encoded in attributes.
        assert_eq!(decode_attribute("&gt;&apos;"), "&gt;&apos;");
    }

    #[test]
    fn round_trip() {
        for input in ["a < b & \"c\"", "nothing special", "&amp; already encoded"] {
            assert_eq!(decode_text(&encode_text(input)), input);
        }
    }
}
