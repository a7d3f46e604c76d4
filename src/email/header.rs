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

use crate::email::stream::ByteStream;
use crate::EmailError;

pub(crate) enum HeaderState {
    /// The blank line closing the header block was consumed.
    End,
    /// One logical header, unfolded.
    Header(String, String),
    /// The input ends mid-header; nothing was consumed.
    MoreData,
    /// Structurally invalid header.
    Invalid,
}

/// Scans the next logical header off the stream. Folded continuation lines
/// (leading space or tab) are joined with a single space, because data such
/// as an address list may be split across lines at arbitrary whitespace.
pub(crate) fn next_header(stream: &mut ByteStream) -> HeaderState {
    // An empty line is the end of the header block.
    if stream.try_skip(b"\r\n") {
        return HeaderState::End;
    }

    let start = stream.offset();
    let mut logical: Vec<u8> = Vec::new();

    loop {
        let Some(line_len) = stream.find(b"\r\n") else {
            stream.seek(start);
            return HeaderState::MoreData;
        };
        logical.extend_from_slice(&stream.remaining()[..line_len]);
        stream.consume(line_len + 2);

        // Without a byte of lookahead we cannot tell a new header from a
        // continuation line or the end of the block.
        if stream.is_empty() {
            stream.seek(start);
            return HeaderState::MoreData;
        }

        let mut folded = false;
        while matches!(stream.peek(), Some(b' ' | b'\t')) {
            stream.consume(1);
            folded = true;
        }
        if folded {
            logical.push(b' ');
        } else {
            break;
        }
    }

    let logical = String::from_utf8_lossy(&logical);

    // The first ':' separates key and value.
    let Some((key, value)) = logical.split_once(':') else {
        return HeaderState::Invalid;
    };

    // Whitespace between the key and the separator is not allowed.
    if key.len() != key.trim_end().len() {
        return HeaderState::Invalid;
    }
    let key = key.trim();
    if key.is_empty() {
        return HeaderState::Invalid;
    }

    // A header may come without a value; whitespace around one is noise.
    HeaderState::Header(key.to_string(), value.trim().to_string())
}

/// Splits on `delim` occurrences that sit outside double quotes, honoring
/// backslash escapes. Quotes and escapes are preserved in the parts.
/// `max` of 0 means unlimited; otherwise the remainder lands in the last
/// part.
pub(crate) fn split_quoted(input: &str, delim: char, max: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut in_quote = false;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            cur.push(ch);
            escaped = false;
        } else if ch == '\\' {
            cur.push(ch);
            escaped = true;
        } else if ch == '"' {
            cur.push(ch);
            in_quote = !in_quote;
        } else if ch == delim && !in_quote && (max == 0 || parts.len() + 1 < max) {
            parts.push(std::mem::take(&mut cur));
        } else {
            cur.push(ch);
        }
    }
    parts.push(cur);
    parts
}

/// Strips one level of surrounding double quotes and unescapes the
/// content. Unquoted input is returned as is.
pub(crate) fn unquote(input: &str) -> String {
    let bytes = input.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'"' || bytes[bytes.len() - 1] != b'"' {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut escaped = false;
    for ch in input[1..input.len() - 1].chars() {
        if escaped {
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Checks the shape of an e-mail address: one `@`, a dot-atom local part,
/// and a plausible domain. Deliberately permissive about single-label
/// domains, which occur on local networks.
pub fn verify_email_address(address: &str) -> bool {
    if address.is_empty() || address.len() > 254 {
        return false;
    }

    let Some((local, domain)) = address.rsplit_once('@') else {
        return false;
    };

    if local.is_empty()
        || local.len() > 64
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
        || !local
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(ch))
    {
        return false;
    }

    !domain.is_empty()
        && domain.len() <= 253
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        })
}

/// Walks an address header value and hands every resolved address to the
/// callback. Handles the full RFC 6854 shape: single addresses, comma
/// separated lists, named groups, group lists, and the `;` separator some
/// clients use in place of a comma. An empty group is reported once with
/// no name or address.
pub(crate) fn process_address<F>(value: &str, mut callback: F) -> Result<(), EmailError>
where
    F: FnMut(Option<&str>, Option<&str>, Option<&str>) -> Result<(), EmailError>,
{
    for segment in split_quoted(value, ';', 0) {
        let group_split = split_quoted(&segment, ':', 2);

        let (group_name, address_part) = if group_split.len() > 1 {
            let name = unquote(group_split[0].trim()).trim().to_string();
            (
                if name.is_empty() { None } else { Some(name) },
                group_split[1].clone(),
            )
        } else {
            (None, group_split[0].clone())
        };

        let addresses: Vec<String> = split_quoted(&address_part, ',', 0)
            .into_iter()
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .collect();

        if addresses.is_empty() {
            // Groups are allowed to be empty; anything else here is noise
            // such as a trailing separator.
            if let Some(group) = &group_name {
                callback(Some(group), None, None)?;
            }
            continue;
        }

        for address in addresses {
            let parts = split_quoted(&address, '<', 2);
            let (name, mailbox) = if parts.len() > 1 {
                let name = unquote(parts[0].trim()).trim().to_string();
                let mailbox = parts[1].trim();
                let mailbox = mailbox.strip_suffix('>').unwrap_or(mailbox).trim();
                (
                    if name.is_empty() { None } else { Some(name) },
                    mailbox.to_string(),
                )
            } else {
                (None, unquote(parts[0].trim()).trim().to_string())
            };

            if !verify_email_address(&mailbox) {
                return Err(EmailError::Address);
            }

            callback(group_name.as_deref(), name.as_deref(), Some(&mailbox))?;
        }
    }

    Ok(())
}

/// Content-Disposition: whether the part is an attachment, and the
/// `filename=` parameter when present.
pub(crate) fn parse_disposition(value: &str) -> (bool, Option<String>) {
    let is_attachment = value
        .trim_start()
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("attachment"));

    let mut filename = None;
    for param in value.split(';') {
        if let Some(rest) = strip_param(param, "filename=") {
            filename = Some(param_value(rest));
        }
    }

    (is_attachment, filename)
}

/// Content-Type: the value with its `name=` parameter stripped, plus the
/// `name=` value when present.
pub(crate) fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut kept: Vec<&str> = Vec::new();
    let mut filename = None;

    for param in value.split(';') {
        match strip_param(param, "name=") {
            Some(rest) if filename.is_none() => filename = Some(param_value(rest)),
            _ => {
                let param = param.trim();
                if !param.is_empty() {
                    kept.push(param);
                }
            }
        }
    }

    (kept.join("; "), filename)
}

fn strip_param<'a>(param: &'a str, key: &str) -> Option<&'a str> {
    let param = param.trim();
    if param.len() >= key.len() && param[..key.len()].eq_ignore_ascii_case(key) {
        Some(&param[key.len()..])
    } else {
        None
    }
}

fn param_value(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('"') {
        inner
            .split_once('"')
            .map_or(inner, |(value, _)| value)
            .to_string()
    } else {
        raw.to_string()
    }
}

/// Content-Type `boundary=` parameter, prefixed with the leading `--` it
/// is transmitted with.
pub(crate) fn extract_boundary(value: &str) -> Option<Vec<u8>> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.find("boundary=")?;
    let mut rest = &value[idx + "boundary=".len()..];

    if let Some(stripped) = rest.strip_prefix('"') {
        rest = stripped;
    }
    let end = rest
        .find(|ch| matches!(ch, ';' | '\r' | '\n' | '"'))
        .unwrap_or(rest.len());
    let boundary = &rest[..end];
    if boundary.is_empty() {
        return None;
    }

    let mut full = Vec::with_capacity(boundary.len() + 2);
    full.extend_from_slice(b"--");
    full.extend_from_slice(boundary.as_bytes());
    Some(full)
}
