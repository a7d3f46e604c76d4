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

use crate::email::header::{next_header, HeaderState};
use crate::email::reader::{EmailCallbacks, EmailReader};
use crate::email::stream::ByteStream;
use crate::{Address, EmailError, EmailMessage, HeaderMap, ReadState};

#[derive(Default)]
struct MessageBuilder {
    message: EmailMessage,
}

impl MessageBuilder {
    fn push_text(target: &mut Option<String>, data: &[u8]) {
        target
            .get_or_insert_with(String::new)
            .push_str(&String::from_utf8_lossy(data));
    }
}

impl EmailCallbacks for MessageBuilder {
    fn on_header(&mut self, key: &str, value: &str) -> Result<(), EmailError> {
        // The address headers and the subject arrive through their typed
        // callbacks; everything else is kept verbatim.
        for routed in ["To", "From", "CC", "BCC", "Reply-To", "Subject"] {
            if key.eq_ignore_ascii_case(routed) {
                return Ok(());
            }
        }
        self.message.headers.insert(key, value);
        Ok(())
    }

    fn on_to(
        &mut self,
        group: Option<&str>,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), EmailError> {
        self.message.add_to(Address::new(group, name, address));
        Ok(())
    }

    fn on_from(
        &mut self,
        group: Option<&str>,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), EmailError> {
        self.message.set_from(Address::new(group, name, address));
        Ok(())
    }

    fn on_cc(
        &mut self,
        group: Option<&str>,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), EmailError> {
        self.message.add_cc(Address::new(group, name, address));
        Ok(())
    }

    fn on_bcc(
        &mut self,
        group: Option<&str>,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), EmailError> {
        self.message.add_bcc(Address::new(group, name, address));
        Ok(())
    }

    fn on_reply_to(
        &mut self,
        group: Option<&str>,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<(), EmailError> {
        self.message.set_reply_to(Address::new(group, name, address));
        Ok(())
    }

    fn on_subject(&mut self, subject: &str) -> Result<(), EmailError> {
        self.message.set_subject(subject);
        Ok(())
    }

    fn on_body(&mut self, data: &[u8]) -> Result<(), EmailError> {
        if self.message.parts.is_empty() {
            self.message.add_part(Vec::new(), HeaderMap::new());
        }
        self.message.part_append_data(0, data);
        Ok(())
    }

    fn on_multipart_preamble(&mut self, data: &[u8]) -> Result<(), EmailError> {
        Self::push_text(&mut self.message.preamble, data);
        Ok(())
    }

    fn on_multipart_header(&mut self, key: &str, value: &str, idx: usize) -> Result<(), EmailError> {
        self.message.part_at(idx).headers.insert(key, value);
        Ok(())
    }

    fn on_multipart_header_attachment(
        &mut self,
        content_type: Option<&str>,
        transfer_encoding: Option<&str>,
        filename: Option<&str>,
        idx: usize,
    ) -> Result<(), EmailError> {
        let part = self.message.part_at(idx);
        part.is_attachment = true;
        part.content_type = content_type.map(str::to_string);
        part.transfer_encoding = transfer_encoding.map(str::to_string);
        part.filename = filename.map(str::to_string);

        // These are rebuilt from the attachment info when writing.
        part.headers.remove("Content-Type");
        part.headers.remove("Content-Disposition");
        part.headers.remove("Content-Transfer-Encoding");
        Ok(())
    }

    fn on_multipart_data(&mut self, data: &[u8], idx: usize) -> Result<(), EmailError> {
        self.message.part_at(idx).data.extend_from_slice(data);
        Ok(())
    }

    fn on_multipart_epilogue(&mut self, data: &[u8]) -> Result<(), EmailError> {
        Self::push_text(&mut self.message.epilogue, data);
        Ok(())
    }
}

/// Parses a complete message held in `data` into an [`EmailMessage`].
/// Returns the message and the number of bytes consumed; input that ends
/// mid-message is [`EmailError::MoreData`].
pub fn simple_read(data: &[u8]) -> Result<(EmailMessage, usize), EmailError> {
    let mut reader = EmailReader::new(MessageBuilder::default());
    let (state, len_read) = reader.read(data)?;

    if state == ReadState::MoreData {
        return Err(EmailError::MoreData);
    }
    Ok((reader.into_callbacks().message, len_read))
}

/// Splits a message into its header block and raw body without parsing
/// the body. The headers land in a [`HeaderMap`] as is, unfolded.
pub fn split_header_body(data: &[u8]) -> Result<(HeaderMap, Vec<u8>), EmailError> {
    if data.is_empty() {
        return Err(EmailError::MoreData);
    }

    let mut stream = ByteStream::new(data);
    let mut headers = HeaderMap::new();

    loop {
        match next_header(&mut stream) {
            HeaderState::End => return Ok((headers, stream.remaining().to_vec())),
            HeaderState::Header(key, value) => headers.insert(key, value),
            HeaderState::MoreData => return Err(EmailError::MoreData),
            HeaderState::Invalid => return Err(EmailError::HeaderInvalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_plain_body() {
        let input = b"From: a@b\r\nTo: x@y\r\n\r\nhi";
        let (message, len_read) = simple_read(input).unwrap();

        assert_eq!(len_read, input.len());
        assert_eq!(
            message.from,
            Some(Address::new(None::<&str>, None::<&str>, Some("a@b")))
        );
        assert_eq!(
            message.to,
            [Address::new(None::<&str>, None::<&str>, Some("x@y"))]
        );
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].data, b"hi");
    }

    #[test]
    fn read_multipart() {
        let input = b"From: a@b.com\r\n\
To: c@d.com\r\n\
Subject: files\r\n\
X-Custom: kept\r\n\
Content-Type: multipart/mixed; boundary=\"xyz\"\r\n\
\r\n\
intro\r\n\
--xyz\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\n\
--xyz\r\n\
Content-Type: text/csv; name=\"t.csv\"\r\n\
Content-Disposition: attachment; filename=\"t.csv\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
QQ==\r\n\
--xyz--\r\n\
outro";

        let (message, len_read) = simple_read(input).unwrap();
        assert_eq!(len_read, input.len());

        assert_eq!(message.subject.as_deref(), Some("files"));
        assert_eq!(message.headers.get("X-Custom"), Some("kept"));
        assert_eq!(message.preamble.as_deref(), Some("intro"));
        assert_eq!(message.epilogue.as_deref(), Some("outro"));

        assert_eq!(message.parts.len(), 2);
        assert!(!message.parts[0].is_attachment);
        assert_eq!(message.parts[0].headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(message.parts[0].data, b"hello");

        let attachment = &message.parts[1];
        assert!(attachment.is_attachment);
        assert_eq!(attachment.content_type.as_deref(), Some("text/csv"));
        assert_eq!(attachment.transfer_encoding.as_deref(), Some("base64"));
        assert_eq!(attachment.filename.as_deref(), Some("t.csv"));
        assert_eq!(attachment.data, b"QQ==");
        assert!(!attachment.headers.contains_key("Content-Disposition"));
    }

    #[test]
    fn incomplete_input() {
        assert_eq!(
            simple_read(b"From: a@b\r\nTo: partial"),
            Err(EmailError::MoreData)
        );
    }

    #[test]
    fn write_then_read_round_trip() {
        let input = b"From: \"Boss\" <boss@example.com>\r\n\
To: staff@example.com\r\n\
Subject: report\r\n\
\r\n\
All good.";
        let (message, _) = simple_read(input).unwrap();
        let output = crate::email::simple_write(&message).unwrap();
        let (reparsed, _) = simple_read(output.as_bytes()).unwrap();

        assert_eq!(reparsed.from, message.from);
        assert_eq!(reparsed.to, message.to);
        assert_eq!(reparsed.subject, message.subject);
        assert_eq!(reparsed.parts[0].data, message.parts[0].data);
    }

    #[test]
    fn header_body_split() {
        let (headers, body) = split_header_body(b"A: 1\r\nB: 2\r\n\r\nrest here").unwrap();
        assert_eq!(headers.get("a"), Some("1"));
        assert_eq!(headers.get("B"), Some("2"));
        assert_eq!(body, b"rest here");

        assert_eq!(
            split_header_body(b"A: 1\r\nB: 2\r\n"),
            Err(EmailError::MoreData)
        );
    }
}
