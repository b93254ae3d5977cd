//! A small markup tree.
//!
//! Only the handful of containers and entries the merger knows about are ever
//! looked up, so this is not a DOM: elements keep their attributes in order,
//! text is kept raw (entities are not decoded), and anything the parser does
//! not model (comments, doctypes, stray close tags) is kept as an opaque `Raw`
//! node. Attribute values are held decoded and written back double-quoted and
//! escaped, so ids compare by value whatever characters they carry.
//! Serializing a parsed tree reproduces the input for well-formed markup that
//! double-quotes its attributes.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Raw(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

/// An element. The synthetic document root has an empty tag and serializes
/// as its children only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, Option<String>)>,
    pub children: Vec<Node>,
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn is_void(tag: &str) -> bool {
    VOID_TAGS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn root() -> Self {
        Self::new("")
    }

    pub fn is_root(&self) -> bool {
        self.tag.is_empty()
    }

    /// Builder: add an attribute with a value.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), Some(value.into())));
        self
    }

    /// Builder: add a valueless attribute such as `open`.
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.attrs.push((name.into(), None));
        self
    }

    /// Builder: append a child.
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Builder: append pre-rendered markup verbatim. Empty markup adds nothing.
    pub fn raw(mut self, markup: impl Into<String>) -> Self {
        let markup = markup.into();
        if !markup.is_empty() {
            self.children.push(Node::Raw(markup));
        }
        self
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn id(&self) -> Option<&str> {
        self.get_attr("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.get_attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    pub fn set_content(&mut self, nodes: Vec<Node>) {
        self.children = nodes;
    }

    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Depth-first search for the first element matching `pred`, self included.
    pub fn find(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        if pred(self) {
            return Some(self);
        }
        self.element_children().find_map(|child| child.find(pred))
    }

    pub fn find_mut(&mut self, pred: &dyn Fn(&Element) -> bool) -> Option<&mut Element> {
        if pred(self) {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Element(el) = child
                && let Some(found) = el.find_mut(pred)
            {
                return Some(found);
            }
        }
        None
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.find(&|el| el.id() == Some(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.find_mut(&|el| el.id() == Some(id))
    }

    pub fn find_by_class_mut(&mut self, class: &str) -> Option<&mut Element> {
        self.find_mut(&|el| el.has_class(class))
    }

    /// Replace the first descendant element with the given id. Returns whether
    /// a replacement happened.
    pub fn replace_by_id(&mut self, id: &str, replacement: Element) -> bool {
        match self.parent_of_mut(id) {
            Some((parent, index)) => {
                parent.children[index] = Node::Element(replacement);
                true
            }
            None => false,
        }
    }

    fn parent_of_mut(&mut self, id: &str) -> Option<(&mut Element, usize)> {
        let position = self
            .children
            .iter()
            .position(|c| c.as_element().is_some_and(|el| el.id() == Some(id)));
        if let Some(index) = position {
            return Some((self, index));
        }
        for child in &mut self.children {
            if let Node::Element(el) = child
                && let Some(found) = el.parent_of_mut(id)
            {
                return Some(found);
            }
        }
        None
    }

    /// Remove every descendant element matching `pred`. Returns how many were
    /// removed.
    pub fn remove_where(&mut self, pred: &dyn Fn(&Element) -> bool) -> usize {
        let before = self.children.len();
        self.children
            .retain(|c| !c.as_element().is_some_and(|el| pred(el)));
        let mut removed = before - self.children.len();
        for child in &mut self.children {
            if let Node::Element(el) = child {
                removed += el.remove_where(pred);
            }
        }
        removed
    }
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

fn write_attrs(f: &mut fmt::Formatter<'_>, attrs: &[(String, Option<String>)]) -> fmt::Result {
    for (name, value) in attrs {
        match value {
            None => write!(f, " {name}")?,
            Some(v) => write!(f, " {name}=\"{}\"", escape_attr(v))?,
        }
    }
    Ok(())
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            for child in &self.children {
                write!(f, "{child}")?;
            }
            return Ok(());
        }

        write!(f, "<{}", self.tag)?;
        write_attrs(f, &self.attrs)?;
        f.write_str(">")?;
        if is_void(&self.tag) {
            return Ok(());
        }
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.tag)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(el) => write!(f, "{el}"),
            Node::Text(text) | Node::Raw(text) => f.write_str(text),
        }
    }
}
