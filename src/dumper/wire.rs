//! Wire serializer.
//!
//! Output is a textual record `k1="v1",k2="v2",children=[{...},{...}]`. Values that may contain
//! delimiters are base64 encoded and tagged with a `<key>encoded="N"` field.
//! The writer has a fixed capacity: once an append would cross `capacity - headroom` the writer
//! becomes full and drops every further append, except closing delimiters of already opened
//! scopes, so a truncated output stays balanced.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt::{Display, Formatter};

pub const DEFAULT_CAPACITY: usize = 1_000_000;
pub const DEFAULT_HEADROOM: usize = 100;

/// Discriminator of an encoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Raw bytes.
    Bytes = 1,
    /// UTF-16 code units.
    Utf16 = 2,
    /// UTF-32 code units.
    Utf32 = 3,
}

impl Encoding {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Encoding for code units of `width` bytes.
    pub fn for_unit_width(width: usize) -> Self {
        match width {
            2 => Encoding::Utf16,
            4 => Encoding::Utf32,
            _ => Encoding::Bytes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Nothing usable was produced.
    Malformed,
    /// Dump finished normally.
    Complete,
    /// Output hit the size cap.
    Truncated,
}

impl ReplyStatus {
    pub fn marker(self) -> u8 {
        match self {
            ReplyStatus::Malformed => b'f',
            ReplyStatus::Complete => b't',
            ReplyStatus::Truncated => b'+',
        }
    }
}

/// Result of a single request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub payload: String,
}

impl Reply {
    pub fn malformed() -> Self {
        Self {
            status: ReplyStatus::Malformed,
            payload: String::new(),
        }
    }

    /// Write reply into a fixed size transport buffer: marker byte, payload, NUL terminator.
    /// A payload not fitting into the buffer is cut and the marker set to truncated.
    /// Return number of written bytes.
    pub fn write_transport(&self, buf: &mut [u8]) -> usize {
        if buf.len() < 2 {
            return 0;
        }
        let room = buf.len() - 2;
        let payload = self.payload.as_bytes();
        let (status, payload) = if payload.len() > room {
            (ReplyStatus::Truncated, &payload[..room])
        } else {
            (self.status, payload)
        };
        buf[0] = status.marker();
        buf[1..1 + payload.len()].copy_from_slice(payload);
        buf[1 + payload.len()] = 0;
        payload.len() + 2
    }

    pub fn to_transport(&self) -> Vec<u8> {
        let mut buf = vec![0; self.payload.len() + 2];
        let written = self.write_transport(&mut buf);
        buf.truncate(written);
        buf
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.status.marker() as char, self.payload)
    }
}

/// Saved writer state.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    len: usize,
    open: Vec<u8>,
    dropped: usize,
    full: bool,
}

pub struct WireWriter {
    buf: String,
    limit: usize,
    full: bool,
    /// Closers of opened scopes.
    open: Vec<u8>,
    /// Number of scopes whose opener was dropped because of a full buffer.
    dropped: usize,
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_HEADROOM)
    }
}

impl WireWriter {
    pub fn new(capacity: usize, headroom: usize) -> Self {
        Self {
            buf: String::new(),
            limit: capacity.saturating_sub(headroom),
            full: false,
            open: vec![],
            dropped: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    fn push_token(&mut self, token: &str) -> bool {
        if self.full {
            return false;
        }
        if self.buf.len() + token.len() > self.limit {
            self.full = true;
            return false;
        }
        self.buf.push_str(token);
        true
    }

    fn needs_comma(&self) -> bool {
        matches!(self.buf.as_bytes().last(), Some(b'}' | b'"' | b']'))
    }

    fn key_token(&self, key: &str) -> String {
        let mut token = String::with_capacity(key.len() + 3);
        if self.needs_comma() {
            token.push(',');
        }
        token.push_str(key);
        token.push('=');
        token
    }

    fn open(&mut self, token: &str, closer: u8) {
        if self.push_token(token) {
            self.open.push(closer);
        } else {
            self.dropped += 1;
        }
    }

    fn close(&mut self) {
        if self.dropped > 0 {
            self.dropped -= 1;
            return;
        }
        if let Some(closer) = self.open.pop() {
            // closers are always written, headroom is reserved for them
            self.buf.push(closer as char);
        }
    }

    /// Put `key="value"`, value must not contain quotes.
    pub fn put_item(&mut self, key: &str, value: impl Display) {
        let value = value.to_string();
        debug_assert!(!value.contains('"'), "unescaped value: {value}");
        let mut token = self.key_token(key);
        token.push('"');
        token.push_str(&value);
        token.push('"');
        self.push_token(&token);
    }

    /// Put `key="<n items>"`.
    pub fn put_item_count(&mut self, key: &str, n: impl Display) {
        self.put_item(key, format_args!("<{n} items>"));
    }

    /// Put an address as hex, `<null>` for zero.
    pub fn put_address(&mut self, key: &str, addr: usize) {
        if addr == 0 {
            self.put_item(key, "<null>");
        } else {
            self.put_item(key, format_args!("{addr:#x}"));
        }
    }

    /// Open `key="` for a value assembled with [`WireWriter::push_text`]/[`WireWriter::push_base64`].
    pub fn begin_item(&mut self, key: &str) {
        let mut token = self.key_token(key);
        token.push('"');
        self.open(&token, b'"');
    }

    pub fn end_item(&mut self) {
        self.close();
    }

    /// Append plain text inside an opened item.
    pub fn push_text(&mut self, text: &str) {
        if self.dropped == 0 {
            self.push_token(text);
        }
    }

    /// Append base64 of `data` inside an opened item. Only complete 4 character groups
    /// are written.
    pub fn push_base64(&mut self, data: &[u8]) {
        if self.full || self.dropped > 0 {
            return;
        }
        let encoded = STANDARD.encode(data);
        let room = self.limit.saturating_sub(self.buf.len());
        let take = (room / 4 * 4).min(encoded.len());
        self.buf.push_str(&encoded[..take]);
        if take < encoded.len() {
            self.full = true;
        }
    }

    /// Put `key="<base64>"` and `keyencoded="N"`.
    pub fn put_encoded(&mut self, key: &str, data: &[u8], encoding: Encoding) {
        self.begin_item(key);
        self.push_base64(data);
        self.end_item();
        self.put_item(&format!("{key}encoded"), encoding.code());
    }

    pub fn begin_hash(&mut self) {
        let token = if self.needs_comma() { ",{" } else { "{" };
        self.open(token, b'}');
    }

    pub fn end_hash(&mut self) {
        self.close();
    }

    /// Open `key=[`.
    pub fn begin_list(&mut self, key: &str) {
        let mut token = self.key_token(key);
        token.push('[');
        self.open(&token, b']');
    }

    pub fn end_list(&mut self) {
        self.close();
    }

    pub fn begin_children(&mut self) {
        self.begin_list("children");
    }

    pub fn end_children(&mut self) {
        self.end_list();
    }

    /// Put `"value"` element into an opened list.
    pub fn put_list_item(&mut self, value: impl Display) {
        let value = value.to_string();
        debug_assert!(!value.contains('"'), "unescaped value: {value}");
        let comma = if self.needs_comma() { "," } else { "" };
        self.push_token(&format!("{comma}\"{value}\""));
    }

    /// Open `key={` for a nested record.
    pub fn begin_record(&mut self, key: &str) {
        let mut token = self.key_token(key);
        token.push('{');
        self.open(&token, b'}');
    }

    pub fn end_record(&mut self) {
        self.close();
    }

    /// Put synthetic child that marks a cut children list.
    pub fn put_ellipsis(&mut self, inner_type: &str, total: impl Display) {
        self.begin_hash();
        self.put_item("name", "<incomplete>");
        self.put_item("value", format_args!("<{total} items, cut>"));
        self.put_item("type", inner_type);
        self.put_item("numchild", 0);
        self.end_hash();
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.buf.len(),
            open: self.open.clone(),
            dropped: self.dropped,
            full: self.full,
        }
    }

    /// Discard everything written after a checkpoint.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.buf.truncate(checkpoint.len);
        self.open = checkpoint.open;
        self.dropped = checkpoint.dropped;
        self.full = checkpoint.full;
    }

    /// Close every opened scope and build a reply.
    pub fn finish(mut self) -> Reply {
        self.dropped = 0;
        while !self.open.is_empty() {
            self.close();
        }
        Reply {
            status: if self.full {
                ReplyStatus::Truncated
            } else {
                ReplyStatus::Complete
            },
            payload: self.buf,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    // ----------------------------------------- test helpers ------------------------------------------

    /// Check delimiter balance, quote pairing and comma placement of a wire text.
    pub(crate) fn assert_well_formed(text: &str) {
        let mut depth: Vec<u8> = vec![];
        let mut in_quote = false;
        let mut prev = 0u8;
        for &c in text.as_bytes() {
            if in_quote {
                if c == b'"' {
                    in_quote = false;
                }
                prev = c;
                continue;
            }
            match c {
                b'"' => in_quote = true,
                b'{' => depth.push(b'}'),
                b'[' => depth.push(b']'),
                b'}' | b']' => {
                    assert_eq!(depth.pop(), Some(c), "unbalanced `{}` in {text}", c as char);
                    assert_ne!(prev, b',', "comma before closer in {text}");
                }
                b',' => assert_ne!(prev, b',', "double comma in {text}"),
                _ => {}
            }
            prev = c;
        }
        assert!(!in_quote, "unterminated quote in {text}");
        assert!(depth.is_empty(), "unclosed scope in {text}");
    }

    // ---------------------------------------------------------------------------------------------

    #[test]
    fn test_base64_scenario() {
        let mut w = WireWriter::default();
        w.put_encoded("value", b"hi", Encoding::Bytes);
        assert_eq!(w.as_str(), r#"value="aGk=",valueencoded="1""#);
    }

    #[test]
    fn test_base64_roundtrip() {
        let mut rng = rand::thread_rng();
        for len in 0..200 {
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let encoded = STANDARD.encode(&data);
            assert!(encoded.is_ascii());
            assert!(!encoded.contains(['{', '}', ',', '"']));
            assert_eq!(STANDARD.decode(&encoded).unwrap(), data);
        }
    }

    #[test]
    fn test_comma_rule() {
        let mut w = WireWriter::default();
        w.put_item("iname", "local.x");
        w.put_item("value", "1");
        w.begin_children();
        w.begin_hash();
        w.put_item("name", "0");
        w.end_hash();
        w.begin_hash();
        w.put_item("name", "1");
        w.end_hash();
        w.end_children();
        w.put_item("numchild", 2);
        assert_eq!(
            w.as_str(),
            r#"iname="local.x",value="1",children=[{name="0"},{name="1"}],numchild="2""#
        );
        assert_well_formed(w.as_str());
    }

    #[test]
    fn test_lists_and_records() {
        let mut w = WireWriter::default();
        w.begin_list("dumpers");
        w.put_list_item("QString");
        w.put_list_item("QList");
        w.end_list();
        w.begin_record("sizes");
        w.put_item("int", 4);
        w.put_item("char*", 8);
        w.end_record();
        assert_eq!(
            w.as_str(),
            r#"dumpers=["QString","QList"],sizes={int="4",char*="8"}"#
        );
    }

    #[test]
    fn test_truncation_stays_balanced() {
        let mut w = WireWriter::new(160, 20);
        w.put_item("iname", "local.list");
        w.begin_children();
        for i in 0..100 {
            w.begin_hash();
            w.put_item("name", i);
            w.put_encoded("value", b"some payload bytes", Encoding::Bytes);
            w.end_hash();
        }
        w.end_children();
        assert!(w.is_full());

        let reply = w.finish();
        assert_eq!(reply.status, ReplyStatus::Truncated);
        assert!(reply.payload.len() <= 160);
        assert_well_formed(&reply.payload);
    }

    #[test]
    fn test_random_writes_well_formed() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let capacity = rng.gen_range(20..400);
            let mut w = WireWriter::new(capacity, 10);
            let mut depth = 0;
            for _ in 0..rng.gen_range(0..60) {
                match rng.gen_range(0..6) {
                    0 => w.put_item("k", rng.gen::<u16>()),
                    1 => {
                        w.begin_hash();
                        depth += 1;
                    }
                    2 => {
                        w.begin_children();
                        depth += 1;
                    }
                    3 if depth > 0 => {
                        w.end_hash();
                        depth -= 1;
                    }
                    4 => {
                        let len = rng.gen_range(0..40);
                        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                        w.put_encoded("v", &data, Encoding::Bytes);
                    }
                    _ => w.put_item_count("value", rng.gen::<u8>()),
                }
            }
            assert_well_formed(&w.finish().payload);
        }
    }

    #[test]
    fn test_rollback() {
        let mut w = WireWriter::default();
        w.put_item("iname", "x");
        let cp = w.checkpoint();
        w.begin_children();
        w.begin_hash();
        w.put_item("name", "0");
        w.rollback(cp);
        w.put_item("value", "<not accessible>");
        let reply = w.finish();
        assert_eq!(reply.status, ReplyStatus::Complete);
        assert_eq!(reply.payload, r#"iname="x",value="<not accessible>""#);
    }

    #[test]
    fn test_transport() {
        let reply = Reply {
            status: ReplyStatus::Complete,
            payload: r#"value="1""#.to_string(),
        };
        assert_eq!(reply.to_transport(), b"tvalue=\"1\"\0");

        let mut small = [0xFF; 6];
        assert_eq!(reply.write_transport(&mut small), 6);
        assert_eq!(&small, b"+valu\0");

        assert_eq!(Reply::malformed().to_transport(), b"f\0");
        assert_eq!(reply.to_string(), r#"tvalue="1""#);
    }
}
