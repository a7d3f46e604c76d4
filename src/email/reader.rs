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

use crate::email::header::{
    extract_boundary, next_header, parse_content_type, parse_disposition, process_address,
    HeaderState,
};
use crate::email::stream::ByteStream;
use crate::{DataFormat, EmailError, ReadState};

/// Event sink for [`EmailReader`]. Every method has a no-op default, so an
/// implementation only picks up the events it cares about. Returning an
/// error from any callback halts the reader and surfaces the error from
/// [`EmailReader::read`].
pub trait EmailCallbacks {
    fn on_header(&mut self, _key: &str, _value: &str) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_to(
        &mut self,
        _group: Option<&str>,
        _name: Option<&str>,
        _address: Option<&str>,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_from(
        &mut self,
        _group: Option<&str>,
        _name: Option<&str>,
        _address: Option<&str>,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_cc(
        &mut self,
        _group: Option<&str>,
        _name: Option<&str>,
        _address: Option<&str>,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_bcc(
        &mut self,
        _group: Option<&str>,
        _name: Option<&str>,
        _address: Option<&str>,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_reply_to(
        &mut self,
        _group: Option<&str>,
        _name: Option<&str>,
        _address: Option<&str>,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_subject(&mut self, _subject: &str) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_header_done(&mut self, _format: DataFormat) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_body(&mut self, _data: &[u8]) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_preamble(&mut self, _data: &[u8]) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_preamble_done(&mut self) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_header(
        &mut self,
        _key: &str,
        _value: &str,
        _idx: usize,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_header_attachment(
        &mut self,
        _content_type: Option<&str>,
        _transfer_encoding: Option<&str>,
        _filename: Option<&str>,
        _idx: usize,
    ) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_header_done(&mut self, _idx: usize) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_data(&mut self, _data: &[u8], _idx: usize) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_data_done(&mut self, _idx: usize) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_data_finished(&mut self) -> Result<(), EmailError> {
        Ok(())
    }

    fn on_multipart_epilogue(&mut self, _data: &[u8]) -> Result<(), EmailError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Header,
    Body,
    MultipartPreamble,
    MultipartHeader,
    MultipartData,
    MultipartCheckEnd,
    MultipartEpilogue,
    Done,
}

enum Step {
    Next(State),
    Wait,
}

/// Streaming MIME e-mail reader.
///
/// `read` consumes as much of the input as it can and reports how far it
/// got; the caller keeps the unconsumed tail and calls again once more
/// bytes have arrived. The state machine picks up exactly where it
/// stopped, so a message can be fed in arbitrary chunks.
pub struct EmailReader<C> {
    callbacks: C,
    state: State,
    data_format: DataFormat,
    boundary: Vec<u8>,
    part_idx: usize,
    part_is_attachment: bool,
    part_content_type: Option<String>,
    part_transfer_encoding: Option<String>,
    part_filename: Option<String>,
}

impl<C: EmailCallbacks> EmailReader<C> {
    pub fn new(callbacks: C) -> Self {
        EmailReader {
            callbacks,
            state: State::Start,
            data_format: DataFormat::Body,
            boundary: Vec::new(),
            part_idx: 0,
            part_is_attachment: false,
            part_content_type: None,
            part_transfer_encoding: None,
            part_filename: None,
        }
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn into_callbacks(self) -> C {
        self.callbacks
    }

    /// Runs the state machine over `data`. Returns how the input was left
    /// (`Success`, or `MoreData` when the stream ends mid-construct) along
    /// with the number of bytes consumed; the caller must carry the
    /// unconsumed tail over into the next call.
    pub fn read(&mut self, data: &[u8]) -> Result<(ReadState, usize), EmailError> {
        if data.is_empty() {
            return Err(EmailError::InvalidUse);
        }

        let mut stream = ByteStream::new(data);
        let mut res = ReadState::MoreData;

        loop {
            let step = match self.state {
                State::Start => self.state_start(&mut stream),
                State::Header => self.state_header(&mut stream),
                State::Body => self.state_body(&mut stream, &mut res),
                State::MultipartPreamble => self.state_preamble(&mut stream),
                State::MultipartHeader => self.state_multipart_header(&mut stream),
                State::MultipartData => self.state_data(&mut stream),
                State::MultipartCheckEnd => self.state_check_end(&mut stream),
                State::MultipartEpilogue => self.state_epilogue(&mut stream, &mut res),
                State::Done => {
                    res = ReadState::Success;
                    Ok(Step::Wait)
                }
            }?;

            match step {
                Step::Next(next) => self.state = next,
                Step::Wait => break,
            }
        }

        Ok((res, stream.offset()))
    }

    fn state_start(&mut self, stream: &mut ByteStream) -> Result<Step, EmailError> {
        // Eat any newlines that might precede the data.
        stream.skip_whitespace();
        if stream.is_empty() {
            return Ok(Step::Wait);
        }
        Ok(Step::Next(State::Header))
    }

    fn state_header(&mut self, stream: &mut ByteStream) -> Result<Step, EmailError> {
        if stream.is_empty() {
            return Ok(Step::Wait);
        }

        loop {
            match next_header(stream) {
                HeaderState::MoreData => return Ok(Step::Wait),
                HeaderState::Invalid => return Err(EmailError::HeaderInvalid),
                HeaderState::End => break,
                HeaderState::Header(key, value) => self.process_header(&key, &value)?,
            }
            if stream.is_empty() {
                return Ok(Step::Wait);
            }
        }

        self.callbacks.on_header_done(self.data_format)?;
        Ok(Step::Next(match self.data_format {
            DataFormat::Body => State::Body,
            DataFormat::Multipart => State::MultipartPreamble,
        }))
    }

    fn process_header(&mut self, key: &str, value: &str) -> Result<(), EmailError> {
        self.callbacks.on_header(key, value)?;

        if key.eq_ignore_ascii_case("To") {
            let callbacks = &mut self.callbacks;
            process_address(value, |group, name, address| {
                callbacks.on_to(group, name, address)
            })
        } else if key.eq_ignore_ascii_case("From") {
            let callbacks = &mut self.callbacks;
            process_address(value, |group, name, address| {
                callbacks.on_from(group, name, address)
            })
        } else if key.eq_ignore_ascii_case("CC") {
            let callbacks = &mut self.callbacks;
            process_address(value, |group, name, address| {
                callbacks.on_cc(group, name, address)
            })
        } else if key.eq_ignore_ascii_case("BCC") {
            let callbacks = &mut self.callbacks;
            process_address(value, |group, name, address| {
                callbacks.on_bcc(group, name, address)
            })
        } else if key.eq_ignore_ascii_case("Reply-To") {
            let callbacks = &mut self.callbacks;
            process_address(value, |group, name, address| {
                callbacks.on_reply_to(group, name, address)
            })
        } else if key.eq_ignore_ascii_case("Subject") {
            self.callbacks.on_subject(value)
        } else if key.eq_ignore_ascii_case("Content-Type") {
            self.process_content_type(value)
        } else {
            Ok(())
        }
    }

    fn process_content_type(&mut self, value: &str) -> Result<(), EmailError> {
        // The format defaults to a plain body; only multipart changes how
        // the data that follows is framed.
        if !value.to_ascii_lowercase().contains("multipart") {
            return Ok(());
        }

        self.data_format = DataFormat::Multipart;
        match extract_boundary(value) {
            Some(boundary) => {
                self.boundary = boundary;
                Ok(())
            }
            None => Err(EmailError::MultipartNoBoundary),
        }
    }

    fn state_body(&mut self, stream: &mut ByteStream, res: &mut ReadState) -> Result<Step, EmailError> {
        if stream.is_empty() {
            return Ok(Step::Wait);
        }

        self.callbacks.on_body(stream.remaining())?;
        stream.consume(stream.len());
        *res = ReadState::Success;
        Ok(Step::Wait)
    }

    fn state_preamble(&mut self, stream: &mut ByteStream) -> Result<Step, EmailError> {
        if stream.is_empty() {
            return Ok(Step::Wait);
        }

        // All data before the first boundary. Nothing is consumed until
        // the boundary itself is in the buffer.
        let Some(raw_len) = stream.find(&self.boundary) else {
            return Ok(Step::Wait);
        };
        let after = raw_len + self.boundary.len();
        let remaining = stream.remaining();

        // Look at what follows the boundary before committing to it.
        let mut full_read = false;
        if remaining.len() - after >= 2 {
            match &remaining[after..after + 2] {
                // An ending boundary here means the message has no parts.
                b"--" => return Err(EmailError::MultipartMissingData),
                b"\r\n" => full_read = true,
                _ => return Err(EmailError::MultipartInvalid),
            }
        }

        // The data before the boundary ends with a framing \r\n that is
        // not part of the preamble. Only a missing preamble omits it.
        let mut data_len = raw_len;
        if data_len == 1 {
            return Err(EmailError::MultipartInvalid);
        }
        if data_len >= 2 {
            if &remaining[data_len - 2..data_len] != b"\r\n" {
                return Err(EmailError::MultipartInvalid);
            }
            data_len -= 2;
        }

        if data_len != 0 {
            self.callbacks.on_multipart_preamble(&remaining[..data_len])?;
        }

        if full_read {
            stream.consume(after + 2);
            self.callbacks.on_multipart_preamble_done()?;
            Ok(Step::Next(State::MultipartHeader))
        } else {
            // The line end after the boundary has not arrived yet.
            stream.consume(raw_len);
            Ok(Step::Wait)
        }
    }

    fn state_multipart_header(&mut self, stream: &mut ByteStream) -> Result<Step, EmailError> {
        if stream.is_empty() {
            return Ok(Step::Wait);
        }

        loop {
            match next_header(stream) {
                HeaderState::MoreData => return Ok(Step::Wait),
                HeaderState::Invalid => return Err(EmailError::HeaderInvalid),
                HeaderState::End => break,
                HeaderState::Header(key, value) => self.process_multipart_header(&key, &value)?,
            }
            if stream.is_empty() {
                return Ok(Step::Wait);
            }
        }

        if self.part_is_attachment {
            self.callbacks.on_multipart_header_attachment(
                self.part_content_type.as_deref(),
                self.part_transfer_encoding.as_deref(),
                self.part_filename.as_deref(),
                self.part_idx,
            )?;
        }
        self.callbacks.on_multipart_header_done(self.part_idx)?;

        self.part_is_attachment = false;
        self.part_content_type = None;
        self.part_transfer_encoding = None;
        self.part_filename = None;

        Ok(Step::Next(State::MultipartData))
    }

    fn process_multipart_header(&mut self, key: &str, value: &str) -> Result<(), EmailError> {
        self.callbacks.on_multipart_header(key, value, self.part_idx)?;

        if key.eq_ignore_ascii_case("Content-Transfer-Encoding") {
            self.part_transfer_encoding = Some(value.to_string());
        } else if key.eq_ignore_ascii_case("Content-Disposition") {
            let (is_attachment, filename) = parse_disposition(value);
            if is_attachment {
                self.part_is_attachment = true;
                if filename.as_deref().is_some_and(|name| !name.is_empty()) {
                    self.part_filename = filename;
                }
            }
        } else if key.eq_ignore_ascii_case("Content-Type") {
            let (content_type, filename) = parse_content_type(value);
            self.part_content_type = Some(content_type);
            // Content-Disposition's filename wins over Content-Type's name.
            if self.part_filename.is_none() {
                self.part_filename = filename;
            }
        }

        Ok(())
    }

    fn state_data(&mut self, stream: &mut ByteStream) -> Result<Step, EmailError> {
        if stream.is_empty() {
            return Ok(Step::Wait);
        }

        let Some(raw_len) = stream.find(&self.boundary) else {
            return Ok(Step::Wait);
        };
        let remaining = stream.remaining();

        // The data and the boundary are separated by a \r\n that belongs
        // to the framing. It should always be there, but a part without
        // one is tolerated.
        let mut data_len = raw_len;
        if data_len >= 2 && &remaining[data_len - 2..data_len] == b"\r\n" {
            data_len -= 2;
        }

        if data_len != 0 {
            self.callbacks.on_multipart_data(&remaining[..data_len], self.part_idx)?;
        }
        stream.consume(raw_len + self.boundary.len());

        self.callbacks.on_multipart_data_done(self.part_idx)?;
        self.part_idx += 1;
        Ok(Step::Next(State::MultipartCheckEnd))
    }

    fn state_check_end(&mut self, stream: &mut ByteStream) -> Result<Step, EmailError> {
        if stream.len() < 2 {
            return Ok(Step::Wait);
        }

        if stream.try_skip(b"--") {
            // Closing boundary; a line end after it belongs to the framing.
            stream.try_skip(b"\r\n");
            self.callbacks.on_multipart_data_finished()?;
            Ok(Step::Next(State::MultipartEpilogue))
        } else if stream.try_skip(b"\r\n") {
            Ok(Step::Next(State::MultipartHeader))
        } else {
            Err(EmailError::MultipartInvalid)
        }
    }

    fn state_epilogue(
        &mut self,
        stream: &mut ByteStream,
        res: &mut ReadState,
    ) -> Result<Step, EmailError> {
        if stream.is_empty() {
            *res = ReadState::Success;
            return Ok(Step::Next(State::Done));
        }

        self.callbacks.on_multipart_epilogue(stream.remaining())?;
        stream.consume(stream.len());
        *res = ReadState::Success;
        Ok(Step::Wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Events(Vec<String>);

    impl EmailCallbacks for Events {
        fn on_header(&mut self, key: &str, value: &str) -> Result<(), EmailError> {
            self.0.push(format!("header {key}={value}"));
            Ok(())
        }

        fn on_to(
            &mut self,
            group: Option<&str>,
            name: Option<&str>,
            address: Option<&str>,
        ) -> Result<(), EmailError> {
            self.0.push(format!("to {group:?} {name:?} {address:?}"));
            Ok(())
        }

        fn on_from(
            &mut self,
            group: Option<&str>,
            name: Option<&str>,
            address: Option<&str>,
        ) -> Result<(), EmailError> {
            self.0.push(format!("from {group:?} {name:?} {address:?}"));
            Ok(())
        }

        fn on_subject(&mut self, subject: &str) -> Result<(), EmailError> {
            self.0.push(format!("subject {subject}"));
            Ok(())
        }

        fn on_header_done(&mut self, format: DataFormat) -> Result<(), EmailError> {
            self.0.push(format!("header_done {format:?}"));
            Ok(())
        }

        fn on_body(&mut self, data: &[u8]) -> Result<(), EmailError> {
            self.0.push(format!("body {}", String::from_utf8_lossy(data)));
            Ok(())
        }

        fn on_multipart_preamble(&mut self, data: &[u8]) -> Result<(), EmailError> {
            self.0.push(format!("preamble {}", String::from_utf8_lossy(data)));
            Ok(())
        }

        fn on_multipart_preamble_done(&mut self) -> Result<(), EmailError> {
            self.0.push("preamble_done".into());
            Ok(())
        }

        fn on_multipart_header(
            &mut self,
            key: &str,
            value: &str,
            idx: usize,
        ) -> Result<(), EmailError> {
            self.0.push(format!("part_header[{idx}] {key}={value}"));
            Ok(())
        }

        fn on_multipart_header_attachment(
            &mut self,
            content_type: Option<&str>,
            transfer_encoding: Option<&str>,
            filename: Option<&str>,
            idx: usize,
        ) -> Result<(), EmailError> {
            self.0.push(format!(
                "attachment[{idx}] {content_type:?} {transfer_encoding:?} {filename:?}"
            ));
            Ok(())
        }

        fn on_multipart_header_done(&mut self, idx: usize) -> Result<(), EmailError> {
            self.0.push(format!("part_header_done[{idx}]"));
            Ok(())
        }

        fn on_multipart_data(&mut self, data: &[u8], idx: usize) -> Result<(), EmailError> {
            self.0
                .push(format!("part_data[{idx}] {}", String::from_utf8_lossy(data)));
            Ok(())
        }

        fn on_multipart_data_done(&mut self, idx: usize) -> Result<(), EmailError> {
            self.0.push(format!("part_data_done[{idx}]"));
            Ok(())
        }

        fn on_multipart_data_finished(&mut self) -> Result<(), EmailError> {
            self.0.push("data_finished".into());
            Ok(())
        }

        fn on_multipart_epilogue(&mut self, data: &[u8]) -> Result<(), EmailError> {
            self.0.push(format!("epilogue {}", String::from_utf8_lossy(data)));
            Ok(())
        }
    }

    #[test]
    fn plain_body_single_call() {
        let input = b"From: a@b\r\nTo: x@y\r\n\r\nhi";
        let mut reader = EmailReader::new(Events::default());
        let (state, len_read) = reader.read(input).unwrap();

        assert_eq!(state, ReadState::Success);
        assert_eq!(len_read, input.len());
        assert_eq!(
            reader.callbacks().0,
            [
                "header From=a@b",
                "from None None Some(\"a@b\")",
                "header To=x@y",
                "to None None Some(\"x@y\")",
                "header_done Body",
                "body hi",
            ]
        );
    }

    #[test]
    fn plain_body_chunked() {
        let input = b"From: a@b\r\nTo: x@y\r\n\r\nhi";
        let mut reader = EmailReader::new(Events::default());

        let mut pending: Vec<u8> = Vec::new();
        let mut last_state = ReadState::MoreData;
        for chunk in input.chunks(5) {
            pending.extend_from_slice(chunk);
            let (state, len_read) = reader.read(&pending).unwrap();
            pending.drain(..len_read);
            last_state = state;
        }

        assert_eq!(last_state, ReadState::Success);
        assert!(pending.is_empty());
        assert_eq!(
            reader.callbacks().0,
            [
                "header From=a@b",
                "from None None Some(\"a@b\")",
                "header To=x@y",
                "to None None Some(\"x@y\")",
                "header_done Body",
                "body hi",
            ]
        );
    }

    const MULTIPART: &[u8] = b"From: boss@example.com\r\n\
To: staff@example.com\r\n\
Subject: report\r\n\
Content-Type: multipart/mixed; boundary=\"frontier\"\r\n\
\r\n\
This is the preamble.\r\n\
--frontier\r\n\
Content-Type: text/plain\r\n\
\r\n\
Body text.\r\n\
--frontier\r\n\
Content-Type: application/octet-stream; name=\"data.bin\"\r\n\
Content-Disposition: attachment; filename=\"data.bin\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAAA\r\n\
--frontier--\r\n\
The epilogue.";

    fn multipart_events() -> Vec<&'static str> {
        vec![
            "header From=boss@example.com",
            "from None None Some(\"boss@example.com\")",
            "header To=staff@example.com",
            "to None None Some(\"staff@example.com\")",
            "header Subject=report",
            "subject report",
            "header Content-Type=multipart/mixed; boundary=\"frontier\"",
            "header_done Multipart",
            "preamble This is the preamble.",
            "preamble_done",
            "part_header[0] Content-Type=text/plain",
            "part_header_done[0]",
            "part_data[0] Body text.",
            "part_data_done[0]",
            "part_header[1] Content-Type=application/octet-stream; name=\"data.bin\"",
            "part_header[1] Content-Disposition=attachment; filename=\"data.bin\"",
            "part_header[1] Content-Transfer-Encoding=base64",
            "attachment[1] Some(\"application/octet-stream\") Some(\"base64\") Some(\"data.bin\")",
            "part_header_done[1]",
            "part_data[1] AAAA",
            "part_data_done[1]",
            "data_finished",
            "epilogue The epilogue.",
        ]
    }

    #[test]
    fn multipart_single_call() {
        let mut reader = EmailReader::new(Events::default());
        let (state, len_read) = reader.read(MULTIPART).unwrap();

        assert_eq!(state, ReadState::Success);
        assert_eq!(len_read, MULTIPART.len());
        assert_eq!(reader.callbacks().0, multipart_events());
    }

    #[test]
    fn multipart_chunked_same_events() {
        // Without an epilogue: once the closing boundary is consumed the
        // message is complete, and bytes arriving after that point are no
        // longer part of it.
        let input = {
            let cut = MULTIPART.len() - b"The epilogue.".len();
            &MULTIPART[..cut]
        };
        let expected = {
            let mut events = multipart_events();
            events.pop();
            events
        };

        for chunk_size in [1, 3, 7, 16] {
            let mut reader = EmailReader::new(Events::default());
            let mut pending: Vec<u8> = Vec::new();
            for chunk in input.chunks(chunk_size) {
                pending.extend_from_slice(chunk);
                let (_, len_read) = reader.read(&pending).unwrap();
                pending.drain(..len_read);
            }
            assert_eq!(reader.callbacks().0, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn missing_boundary_is_an_error() {
        let input = b"Content-Type: multipart/mixed\r\n\r\n";
        let mut reader = EmailReader::new(Events::default());
        assert_eq!(reader.read(input), Err(EmailError::MultipartNoBoundary));
    }

    #[test]
    fn immediate_close_is_missing_data() {
        let input = b"Content-Type: multipart/mixed; boundary=x\r\n\r\n--x--\r\n";
        let mut reader = EmailReader::new(Events::default());
        assert_eq!(reader.read(input), Err(EmailError::MultipartMissingData));
    }

    #[test]
    fn empty_input_is_invalid_use() {
        let mut reader = EmailReader::new(Events::default());
        assert_eq!(reader.read(b""), Err(EmailError::InvalidUse));
    }

    #[test]
    fn callback_errors_propagate() {
        struct Failing;
        impl EmailCallbacks for Failing {
            fn on_subject(&mut self, _subject: &str) -> Result<(), EmailError> {
                Err(EmailError::InvalidUse)
            }
        }

        let mut reader = EmailReader::new(Failing);
        assert_eq!(
            reader.read(b"Subject: x\r\n\r\nbody"),
            Err(EmailError::InvalidUse)
        );
    }
}
