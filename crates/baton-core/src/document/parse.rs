//! Tolerant markup parser producing a `node::Element` tree.
//!
//! The document is written by this crate but lives in a place humans (and
//! other tools) can edit, so the parser never fails: unknown constructs are
//! kept as `Raw` nodes, unmatched close tags are kept verbatim, and elements
//! left open at the end of input are closed implicitly.

use super::node::{Element, Node, is_void};

/// Elements whose content is not markup.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea"];

pub fn parse(input: &str) -> Element {
    let mut parser = Parser {
        input,
        pos: 0,
        stack: vec![Element::root()],
    };
    parser.run();
    parser.finish()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    stack: Vec<Element>,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn push_node(&mut self, node: Node) {
        if let Some(top) = self.stack.last_mut() {
            top.children.push(node);
        }
    }

    fn run(&mut self) {
        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                self.consume_until_after("-->");
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.consume_until_after(">");
            } else if rest.starts_with("</") {
                self.close_tag();
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.open_tag();
            } else {
                self.text();
            }
        }
    }

    /// Consume through `terminator` (or to end of input) as a raw node.
    fn consume_until_after(&mut self, terminator: &str) {
        let rest = self.rest();
        let end = rest
            .find(terminator)
            .map(|i| i + terminator.len())
            .unwrap_or(rest.len());
        self.push_node(Node::Raw(rest[..end].to_string()));
        self.pos += end;
    }

    fn text(&mut self) {
        let rest = self.rest();
        // A lone '<' that does not start a tag is plain text.
        let skip = usize::from(rest.starts_with('<'));
        let end = rest[skip..].find('<').map(|i| i + skip).unwrap_or(rest.len());
        let text = &rest[..end];
        match self.stack.last_mut().and_then(|top| top.children.last_mut()) {
            Some(Node::Text(prev)) => prev.push_str(text),
            _ => self.push_node(Node::Text(text.to_string())),
        }
        self.pos += end;
    }

    fn close_tag(&mut self) {
        let rest = self.rest();
        let Some(end) = rest.find('>') else {
            self.push_node(Node::Raw(rest.to_string()));
            self.pos = self.input.len();
            return;
        };
        let raw = &rest[..=end];
        let name = rest[2..end].trim().to_ascii_lowercase();
        self.pos += end + 1;

        // Index 0 is the synthetic root and is never closed.
        let open_index = self
            .stack
            .iter()
            .rposition(|el| !el.is_root() && el.tag.eq_ignore_ascii_case(&name));
        match open_index {
            Some(index) => {
                while self.stack.len() > index {
                    self.pop_into_parent();
                }
            }
            None => self.push_node(Node::Raw(raw.to_string())),
        }
    }

    fn pop_into_parent(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        if let Some(el) = self.stack.pop() {
            self.push_node(Node::Element(el));
        }
    }

    fn open_tag(&mut self) {
        let input = self.input;
        let bytes = input.as_bytes();
        let start = self.pos;
        let mut i = start + 1;
        while i < bytes.len() && !is_tag_delimiter(bytes[i]) {
            i += 1;
        }
        let tag = input[start + 1..i].to_ascii_lowercase();

        let mut attrs = Vec::new();
        let mut self_closing = false;
        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    i += 1;
                    if i < bytes.len() && bytes[i] == b'>' {
                        self_closing = true;
                        i += 1;
                        break;
                    }
                }
                _ => {
                    let name_start = i;
                    while i < bytes.len() && !is_tag_delimiter(bytes[i]) && bytes[i] != b'=' {
                        i += 1;
                    }
                    let name = input[name_start..i].to_string();
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    if i < bytes.len() && bytes[i] == b'=' {
                        i += 1;
                        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                            i += 1;
                        }
                        let (value, next) = self.attr_value(i);
                        attrs.push((name, Some(value)));
                        i = next;
                    } else if !name.is_empty() {
                        attrs.push((name, None));
                    } else {
                        // Unparseable byte inside a tag; skip it.
                        i += 1;
                    }
                }
            }
        }
        self.pos = i;

        let element = Element {
            tag,
            attrs,
            children: Vec::new(),
        };
        if self_closing || is_void(&element.tag) {
            self.push_node(Node::Element(element));
        } else if RAW_TEXT_TAGS.contains(&element.tag.as_str()) {
            self.raw_text_element(element);
        } else {
            self.stack.push(element);
        }
    }

    /// Read an attribute value starting at byte `i`. Returns the decoded value
    /// and the index just past it.
    fn attr_value(&self, i: usize) -> (String, usize) {
        let bytes = self.input.as_bytes();
        if i >= bytes.len() {
            return (String::new(), i);
        }
        let quote = bytes[i];
        if quote == b'"' || quote == b'\'' {
            let body = &self.input[i + 1..];
            return match body.find(char::from(quote)) {
                Some(end) => (decode_entities(&body[..end]), i + 1 + end + 1),
                None => (decode_entities(body), bytes.len()),
            };
        }
        let mut end = i;
        while end < bytes.len() && !bytes[end].is_ascii_whitespace() && bytes[end] != b'>' {
            end += 1;
        }
        (decode_entities(&self.input[i..end]), end)
    }

    fn raw_text_element(&mut self, mut element: Element) {
        let rest = self.rest();
        let close = format!("</{}", element.tag);
        let lower = rest.to_ascii_lowercase();
        let (content_end, after) = match lower.find(&close) {
            Some(at) => {
                let gt = rest[at..].find('>').map(|g| at + g + 1).unwrap_or(rest.len());
                (at, gt)
            }
            None => (rest.len(), rest.len()),
        };
        if content_end > 0 {
            element
                .children
                .push(Node::Text(rest[..content_end].to_string()));
        }
        self.pos += after;
        self.push_node(Node::Element(element));
    }

    fn finish(mut self) -> Element {
        while self.stack.len() > 1 {
            self.pop_into_parent();
        }
        self.stack.pop().unwrap_or_else(Element::root)
    }
}

fn is_tag_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'>' || b == b'/'
}

/// Longest reference decoded, `&#x10FFFF;` included.
const MAX_REFERENCE_LEN: usize = 10;

/// Decode character references in an attribute value. Anything that is not a
/// known reference stays as written.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= MAX_REFERENCE_LEN)
            .and_then(|end| decode_reference(&rest[1..end]).map(|c| (c, end + 1)));
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
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

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
