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

use crate::email::header::process_address;
use crate::{Address, EmailError, EmailMessage, HeaderMap, Part};

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap::default()
    }

    /// Inserts or replaces a header. Name matching is case-insensitive;
    /// the original key case and position are kept on replacement.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&key))
        {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(idx).1)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Address {
    pub fn new(
        group: Option<impl Into<String>>,
        name: Option<impl Into<String>>,
        address: Option<impl Into<String>>,
    ) -> Self {
        Address {
            group: group.map(Into::into),
            name: name.map(Into::into),
            address: address.map(Into::into),
        }
    }

    /// True when no field is set; used to signal "no address".
    pub fn is_empty(&self) -> bool {
        fn blank(field: &Option<String>) -> bool {
            field.as_deref().map_or(true, str::is_empty)
        }
        blank(&self.group) && blank(&self.name) && blank(&self.address)
    }
}

impl EmailMessage {
    pub fn new() -> Self {
        EmailMessage::default()
    }

    /// Inserts a header, routing the recognized ones: To/CC/BCC append to
    /// the address lists, From/Reply-To set the single address, Subject
    /// sets the subject. Everything else lands in the header map.
    pub fn headers_insert(&mut self, key: &str, value: &str) -> Result<(), EmailError> {
        if key.eq_ignore_ascii_case("To") {
            Self::append_addresses(&mut self.to, value)
        } else if key.eq_ignore_ascii_case("CC") {
            Self::append_addresses(&mut self.cc, value)
        } else if key.eq_ignore_ascii_case("BCC") {
            Self::append_addresses(&mut self.bcc, value)
        } else if key.eq_ignore_ascii_case("From") {
            self.from = Self::single_address(value)?;
            Ok(())
        } else if key.eq_ignore_ascii_case("Reply-To") {
            self.reply_to = Self::single_address(value)?;
            Ok(())
        } else if key.eq_ignore_ascii_case("Subject") {
            self.subject = Some(value.to_string());
            Ok(())
        } else {
            self.headers.insert(key, value);
            Ok(())
        }
    }

    /// Inserts every entry of `headers` through [`Self::headers_insert`].
    pub fn set_headers(&mut self, headers: &HeaderMap) -> Result<(), EmailError> {
        for (key, value) in headers.iter() {
            self.headers_insert(key, value)?;
        }
        Ok(())
    }

    fn append_addresses(list: &mut Vec<Address>, value: &str) -> Result<(), EmailError> {
        process_address(value, |group, name, address| {
            list.push(Address::new(group, name, address));
            Ok(())
        })
    }

    fn single_address(value: &str) -> Result<Option<Address>, EmailError> {
        let mut single = None;
        process_address(value, |group, name, address| {
            single = Some(Address::new(group, name, address));
            Ok(())
        })?;
        Ok(single)
    }

    pub fn add_to(&mut self, address: Address) {
        self.to.push(address);
    }

    pub fn add_cc(&mut self, address: Address) {
        self.cc.push(address);
    }

    pub fn add_bcc(&mut self, address: Address) {
        self.bcc.push(address);
    }

    pub fn set_from(&mut self, address: Address) {
        self.from = Some(address);
    }

    pub fn set_reply_to(&mut self, address: Address) {
        self.reply_to = Some(address);
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
    }

    pub fn set_preamble(&mut self, preamble: impl Into<String>) {
        self.preamble = Some(preamble.into());
    }

    pub fn set_epilogue(&mut self, epilogue: impl Into<String>) {
        self.epilogue = Some(epilogue.into());
    }

    /// Appends a body part, returning its index.
    pub fn add_part(&mut self, data: Vec<u8>, headers: HeaderMap) -> usize {
        self.parts.push(Part {
            data,
            headers,
            ..Part::default()
        });
        self.parts.len() - 1
    }

    /// Appends an attachment part, returning its index.
    pub fn add_attachment(
        &mut self,
        data: Vec<u8>,
        headers: HeaderMap,
        content_type: Option<String>,
        transfer_encoding: Option<String>,
        filename: Option<String>,
    ) -> usize {
        self.parts.push(Part {
            data,
            headers,
            is_attachment: true,
            content_type,
            transfer_encoding,
            filename,
        });
        self.parts.len() - 1
    }

    /// Appends bytes to an existing part's data.
    pub fn part_append_data(&mut self, idx: usize, data: &[u8]) -> bool {
        match self.parts.get_mut(idx) {
            Some(part) => {
                part.data.extend_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Makes sure a part exists at `idx`, growing the list with empty
    /// parts as needed, and returns it.
    pub(crate) fn part_at(&mut self, idx: usize) -> &mut Part {
        while self.parts.len() <= idx {
            self.parts.push(Part::default());
        }
        &mut self.parts[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_semantics() {
        let mut map = HeaderMap::new();
        map.insert("X-One", "1");
        map.insert("X-Two", "2");
        map.insert("x-one", "replaced");

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("X-ONE"), Some("replaced"));
        // Order and original case survive replacement.
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, [("X-One", "replaced"), ("X-Two", "2")]);

        assert_eq!(map.remove("x-two"), Some("2".to_string()));
        assert!(!map.contains_key("X-Two"));
    }

    #[test]
    fn header_routing() {
        let mut message = EmailMessage::new();
        message.headers_insert("From", "Boss <boss@example.com>").unwrap();
        message
            .headers_insert("To", "a@example.com; Friends: b@example.com;")
            .unwrap();
        message.headers_insert("Subject", "status").unwrap();
        message.headers_insert("X-Priority", "1").unwrap();

        assert_eq!(
            message.from,
            Some(Address::new(None::<&str>, Some("Boss"), Some("boss@example.com")))
        );
        assert_eq!(message.to.len(), 2);
        assert_eq!(message.to[1].group.as_deref(), Some("Friends"));
        assert_eq!(message.subject.as_deref(), Some("status"));
        assert_eq!(message.headers.get("X-Priority"), Some("1"));
        assert!(!message.headers.contains_key("Subject"));
    }

    #[test]
    fn address_empty() {
        assert!(Address::default().is_empty());
        assert!(Address::new(Some(""), None::<&str>, None::<&str>).is_empty());
        assert!(!Address::new(None::<&str>, None::<&str>, Some("a@b")).is_empty());
    }
}
