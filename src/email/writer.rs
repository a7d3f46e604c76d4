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

use rand::Rng;

use crate::{Address, EmailError, EmailMessage};

/// Recommended line length limit; the true maximum is 998.
const LINE_LEN: usize = 78;

/// Writes the message as a canonical MIME document.
///
/// A message must carry a From address and at least one recipient;
/// anything else is [`EmailError::InvalidUse`].
pub fn simple_write(message: &EmailMessage) -> Result<String, EmailError> {
    let mut out = String::new();
    simple_write_buf(message, &mut out)?;
    Ok(out)
}

/// Like [`simple_write`], appending to an existing buffer. The buffer is
/// restored to its original length on error.
pub fn simple_write_buf(message: &EmailMessage, buf: &mut String) -> Result<(), EmailError> {
    let start_len = buf.len();
    let boundary = gen_boundary();

    if let Err(err) = write_message(message, buf, &boundary) {
        buf.truncate(start_len);
        return Err(err);
    }
    Ok(())
}

fn write_message(message: &EmailMessage, buf: &mut String, boundary: &str) -> Result<(), EmailError> {
    write_headers(message, buf, boundary)?;
    write_preamble(message, buf);
    write_parts(message, buf, boundary);
    write_epilogue(message, buf);
    Ok(())
}

/// 12 dashes followed by 28 pseudo-random printable characters, skipping
/// `:;<=>?` and `` \]^_` `` so the boundary stays inert in headers.
fn gen_boundary() -> String {
    let mut rng = rand::thread_rng();
    let mut boundary = String::with_capacity(40);

    boundary.push_str("------------");
    for _ in 0..28 {
        let ch = loop {
            let num: u8 = 48 + rng.gen_range(0..74);
            if !(58..=63).contains(&num) && !(92..=96).contains(&num) {
                break num;
            }
        };
        boundary.push(ch as char);
    }

    boundary
}

/// Appends `key: value`, folding the value over multiple lines when the
/// header exceeds the recommended length. Continuation lines begin with
/// the whitespace they were folded at.
fn add_header_entry(buf: &mut String, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }

    if key.len() + 2 + value.len() <= LINE_LEN {
        buf.push_str(key);
        buf.push_str(": ");
        buf.push_str(value);
        buf.push_str("\r\n");
        return;
    }

    let full = format!("{key}: {value}");
    let bytes = full.as_bytes();
    let is_ws = |byte: u8| byte == b' ' || byte == b'\t';

    let mut mark = 0;
    let mut fit = 0;
    let mut pos = 0;

    while let Some(rel) = bytes[pos..].iter().position(|&byte| is_ws(byte)) {
        let token_end = pos + rel;
        let line_len = token_end - mark;
        pos = token_end + 1;

        if line_len < LINE_LEN {
            fit = line_len;
            continue;
        }

        // A single token longer than the limit goes out on its own line.
        if fit == 0 {
            fit = line_len;
        }

        buf.push_str(&full[mark..mark + fit]);
        buf.push_str("\r\n");
        mark += fit;
        fit = 0;

        // Rescan from the fold point; the whitespace there starts the
        // continuation line.
        pos = mark;
        while pos < bytes.len() && is_ws(bytes[pos]) {
            pos += 1;
        }
    }

    if mark < full.len() {
        buf.push_str(&full[mark..]);
        buf.push_str("\r\n");
    }
}

/// `address`, or `"name" <address>` with `<>,@.` escaped inside the
/// quotes.
fn format_address(name: Option<&str>, address: Option<&str>) -> Option<String> {
    let address = address.filter(|address| !address.is_empty())?;

    let name = match name {
        Some(name) if !name.is_empty() => name,
        _ => return Some(address.to_string()),
    };

    let mut out = String::with_capacity(name.len() + address.len() + 6);
    out.push('"');
    for ch in name.chars() {
        if matches!(ch, '<' | '>' | ',' | '@' | '.' | '"' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push_str("\" <");
    out.push_str(address);
    out.push('>');
    Some(out)
}

fn format_group(group: Option<&str>, address_list: &str) -> String {
    match group {
        Some(group) if !group.is_empty() => format!("{group}: {address_list}"),
        _ => address_list.to_string(),
    }
}

fn write_single_address(buf: &mut String, key: &str, address: &Address) -> bool {
    if address.is_empty() {
        return false;
    }

    let formatted = format_address(address.name.as_deref(), address.address.as_deref());
    let full = format_group(address.group.as_deref(), formatted.as_deref().unwrap_or(""));
    if full.is_empty() {
        return false;
    }

    add_header_entry(buf, key, &full);
    true
}

/// Groups the recipients by group name (insertion order), joins addresses
/// with `, ` inside a group and groups with `; `, non-grouped entries
/// last.
fn write_recipients(buf: &mut String, key: &str, recipients: &[Address]) {
    if recipients.is_empty() {
        return;
    }

    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
    let mut ungrouped: Vec<String> = Vec::new();

    for recipient in recipients {
        let formatted = format_address(recipient.name.as_deref(), recipient.address.as_deref());

        match recipient.group.as_deref().filter(|group| !group.is_empty()) {
            Some(group) => {
                let idx = match groups
                    .iter()
                    .position(|(name, _)| name.eq_ignore_ascii_case(group))
                {
                    Some(idx) => idx,
                    None => {
                        groups.push((group, Vec::new()));
                        groups.len() - 1
                    }
                };
                // An empty member is a valid empty group; add nothing.
                if let Some(formatted) = formatted {
                    groups[idx].1.push(formatted);
                }
            }
            None => {
                if let Some(formatted) = formatted {
                    ungrouped.push(formatted);
                }
            }
        }
    }

    let mut entries: Vec<String> = groups
        .into_iter()
        .map(|(group, members)| format_group(Some(group), &members.join(", ")))
        .collect();
    if !ungrouped.is_empty() {
        entries.push(ungrouped.join(", "));
    }

    add_header_entry(buf, key, &entries.join("; "));
}

fn write_headers(message: &EmailMessage, buf: &mut String, boundary: &str) -> Result<(), EmailError> {
    let from = message.from.as_ref().ok_or(EmailError::InvalidUse)?;
    if !write_single_address(buf, "From", from) {
        return Err(EmailError::InvalidUse);
    }

    if let Some(reply_to) = &message.reply_to {
        write_single_address(buf, "Reply-To", reply_to);
    }

    for (key, value) in message.headers.iter() {
        // The content type is controlled by the writer.
        if key.eq_ignore_ascii_case("Content-Type") {
            continue;
        }
        add_header_entry(buf, key, value);
    }

    if message.to.is_empty() && message.cc.is_empty() && message.bcc.is_empty() {
        return Err(EmailError::InvalidUse);
    }
    write_recipients(buf, "To", &message.to);
    write_recipients(buf, "CC", &message.cc);
    write_recipients(buf, "BCC", &message.bcc);

    add_header_entry(
        buf,
        "Content-Type",
        &format!("multipart/alternative; boundary=\"{boundary}\""),
    );

    if let Some(subject) = &message.subject {
        add_header_entry(buf, "Subject", subject);
    }

    buf.push_str("\r\n");
    Ok(())
}

fn write_preamble(message: &EmailMessage, buf: &mut String) {
    if let Some(preamble) = message.preamble.as_deref().filter(|text| !text.is_empty()) {
        buf.push_str(preamble);
        buf.push_str("\r\n");
    }
}

fn write_parts(message: &EmailMessage, buf: &mut String, boundary: &str) {
    for part in &message.parts {
        buf.push_str("--");
        buf.push_str(boundary);
        buf.push_str("\r\n");

        for (key, value) in part.headers.iter() {
            add_header_entry(buf, key, value);
        }

        if part.is_attachment {
            if let Some(content_type) = part.content_type.as_deref().filter(|ct| !ct.is_empty()) {
                match part.filename.as_deref().filter(|name| !name.is_empty()) {
                    Some(filename) => add_header_entry(
                        buf,
                        "Content-Type",
                        &format!("{content_type}; name=\"{filename}\""),
                    ),
                    None => add_header_entry(buf, "Content-Type", content_type),
                }
            }

            let disposition = match part.filename.as_deref().filter(|name| !name.is_empty()) {
                Some(filename) => format!("attachment; filename=\"{filename}\""),
                None => "attachment".to_string(),
            };
            add_header_entry(buf, "Content-Disposition", &disposition);

            if let Some(encoding) = part
                .transfer_encoding
                .as_deref()
                .filter(|encoding| !encoding.is_empty())
            {
                add_header_entry(buf, "Content-Transfer-Encoding", encoding);
            }
        }

        buf.push_str("\r\n");
        buf.push_str(&String::from_utf8_lossy(&part.data));
        buf.push_str("\r\n");
    }

    // A multipart message needs at least one part, even an empty one.
    if message.parts.is_empty() {
        buf.push_str("--");
        buf.push_str(boundary);
        buf.push_str("\r\n\r\n");
    }

    buf.push_str("--");
    buf.push_str(boundary);
    buf.push_str("--");
}

fn write_epilogue(message: &EmailMessage, buf: &mut String) {
    if let Some(epilogue) = message.epilogue.as_deref().filter(|text| !text.is_empty()) {
        buf.push_str("\r\n");
        buf.push_str(epilogue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeaderMap;

    fn base_message() -> EmailMessage {
        let mut message = EmailMessage::new();
        message.set_from(Address::new(None::<&str>, Some("Boss"), Some("boss@example.com")));
        message.add_to(Address::new(None::<&str>, None::<&str>, Some("staff@example.com")));
        message.set_subject("report");
        message
    }

    fn boundary_of(output: &str) -> String {
        let idx = output.find("boundary=\"").unwrap() + "boundary=\"".len();
        let end = output[idx..].find('"').unwrap();
        output[idx..idx + end].to_string()
    }

    #[test]
    fn boundary_shape() {
        let boundary = gen_boundary();
        assert_eq!(boundary.len(), 40);
        assert!(boundary.starts_with("------------"));
        for byte in boundary.bytes().skip(12) {
            assert!((48..=121).contains(&byte));
            assert!(!(58..=63).contains(&byte), "bad byte {byte}");
            assert!(!(92..=96).contains(&byte), "bad byte {byte}");
        }
    }

    #[test]
    fn header_folding() {
        let mut buf = String::new();
        add_header_entry(&mut buf, "X-Short", "fits on one line");
        assert_eq!(buf, "X-Short: fits on one line\r\n");

        let mut buf = String::new();
        let value = "token ".repeat(30);
        add_header_entry(&mut buf, "X-Long", value.trim_end());
        for line in buf.trim_end().split("\r\n") {
            assert!(line.len() <= LINE_LEN, "line too long: {line:?}");
        }
        // Continuation lines begin with whitespace.
        for line in buf.trim_end().split("\r\n").skip(1) {
            assert!(line.starts_with(' '), "unfolded line: {line:?}");
        }
        // Nothing was lost in the folds.
        assert_eq!(
            buf.replace("\r\n", "").replace("  ", " "),
            format!("X-Long: {}", value.trim_end())
        );
    }

    #[test]
    fn address_formatting() {
        assert_eq!(format_address(None, Some("a@b.com")), Some("a@b.com".to_string()));
        assert_eq!(
            format_address(Some("John Smith"), Some("j@b.com")),
            Some("\"John Smith\" <j@b.com>".to_string())
        );
        assert_eq!(
            format_address(Some("j@x"), Some("j@b.com")),
            Some("\"j\\@x\" <j@b.com>".to_string())
        );
        assert_eq!(format_address(Some("name"), None), None);
    }

    #[test]
    fn canonical_output() {
        let mut message = base_message();
        message.headers.insert("X-Mailer", "format-codecs");
        message.add_part(b"Hello!".to_vec(), HeaderMap::new());

        let output = simple_write(&message).unwrap();
        let boundary = boundary_of(&output);

        let expected = format!(
            "From: \"Boss\" <boss@example.com>\r\n\
             X-Mailer: format-codecs\r\n\
             To: staff@example.com\r\n\
             Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\
             Subject: report\r\n\
             \r\n\
             --{boundary}\r\n\
             \r\n\
             Hello!\r\n\
             --{boundary}--"
        );
        assert_eq!(output, expected);
    }

    #[test]
    fn grouped_recipients() {
        let mut message = base_message();
        message.to.clear();
        message.add_to(Address::new(Some("Friends"), None::<&str>, Some("a@example.com")));
        message.add_to(Address::new(Some("Friends"), Some("Bee"), Some("b@example.com")));
        message.add_to(Address::new(Some("Empty"), None::<&str>, None::<&str>));
        message.add_to(Address::new(None::<&str>, None::<&str>, Some("c@example.com")));

        let output = simple_write(&message).unwrap();
        assert!(
            output.contains(
                "To: Friends: a@example.com, \"Bee\" <b@example.com>; Empty: ; c@example.com\r\n"
            ),
            "got: {output}"
        );
    }

    #[test]
    fn attachment_headers() {
        let mut message = base_message();
        message.add_part(b"body".to_vec(), HeaderMap::new());
        message.add_attachment(
            b"AAAA".to_vec(),
            HeaderMap::new(),
            Some("application/octet-stream".to_string()),
            Some("base64".to_string()),
            Some("data.bin".to_string()),
        );

        let output = simple_write(&message).unwrap();
        assert!(output.contains("Content-Type: application/octet-stream; name=\"data.bin\"\r\n"));
        assert!(output.contains("Content-Disposition: attachment; filename=\"data.bin\"\r\n"));
        assert!(output.contains("Content-Transfer-Encoding: base64\r\n"));
    }

    #[test]
    fn preamble_and_epilogue() {
        let mut message = base_message();
        message.add_part(b"body".to_vec(), HeaderMap::new());
        message.set_preamble("lead-in");
        message.set_epilogue("tail");

        let output = simple_write(&message).unwrap();
        let boundary = boundary_of(&output);
        assert!(output.contains(&format!("\r\n\r\nlead-in\r\n--{boundary}\r\n")));
        assert!(output.ends_with(&format!("--{boundary}--\r\ntail")));
    }

    #[test]
    fn incomplete_messages_are_rejected() {
        let message = EmailMessage::new();
        assert_eq!(simple_write(&message), Err(EmailError::InvalidUse));

        // From alone is not enough; a recipient is required.
        let mut message = EmailMessage::new();
        message.set_from(Address::new(None::<&str>, None::<&str>, Some("a@b.com")));
        assert_eq!(simple_write(&message), Err(EmailError::InvalidUse));
    }
}
