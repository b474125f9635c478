//! Arena-backed element tree and the CSS-subset selector engine.
//!
//! The agent never owns a real browser DOM; the host hands it signals that
//! reference nodes inside a [`Document`]. The document is an owned arena
//! (`NodeId` indices with parent links), so mutation buckets, selector
//! queries and containment checks all work on plain value state. Removed
//! nodes stay in the arena but are detached from the tree, which keeps them
//! matchable for `removed`-type assertions while making them unreachable
//! from queries.
//!
//! Selectors cover the subset the declaration surface needs: tag, `#id`,
//! `.class`, `[attr]`, `[attr=value]` simple selectors combined into
//! compounds, plus descendant combinators (whitespace).

use std::collections::BTreeMap;

use crate::result::{VigilarError, VigilarResult};

/// Handle to a node inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Geometry used by the visibility predicate.
///
/// An element counts as visible iff it has a non-zero offset width/height
/// or at least one client rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Offset width in pixels
    pub offset_width: u32,
    /// Offset height in pixels
    pub offset_height: u32,
    /// Number of client rects
    pub client_rects: usize,
}

impl Layout {
    /// Layout of a rendered element
    #[must_use]
    pub const fn visible() -> Self {
        Self {
            offset_width: 1,
            offset_height: 1,
            client_rects: 1,
        }
    }

    /// Layout of an element that does not render (e.g. `display: none`)
    #[must_use]
    pub const fn hidden() -> Self {
        Self {
            offset_width: 0,
            offset_height: 0,
            client_rects: 0,
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::visible()
    }
}

/// Load-related element properties inspected by the property resolver
/// when the original load/error event was missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    /// `<img>` properties
    Image {
        /// The `complete` flag
        complete: bool,
        /// Rendered natural width; zero means the image failed to render
        natural_width: u32,
    },
    /// `<video>` properties
    Video {
        /// `readyState`; `>= 3` means enough data to play
        ready_state: u8,
    },
}

#[derive(Debug)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    layout: Layout,
    media: Option<MediaState>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            layout: Layout::default(),
            media: None,
        }
    }
}

/// Owned element tree.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Create a document with an empty `body` root
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("body")],
        }
    }

    /// The root node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(tag));
        id
    }

    /// Start building a detached element
    pub fn build(&mut self, tag: &str) -> ElementBuilder<'_> {
        let id = self.create_element(tag);
        ElementBuilder { doc: self, id }
    }

    /// Attach `child` as the last child of `parent`, detaching it from any
    /// previous parent first
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.remove(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Detach a node (and its subtree) from the tree. The node stays in the
    /// arena: `removed`-bucket matching still sees its attributes.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Parent of a node, if attached
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Tag name (lowercase)
    #[must_use]
    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.0].tag
    }

    /// Set an attribute value
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id.0]
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    /// Remove an attribute
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.nodes[id.0].attrs.remove(name);
    }

    /// Attribute value, if present
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0].attrs.get(name).map(String::as_str)
    }

    /// All attributes of a node
    #[must_use]
    pub fn attrs(&self, id: NodeId) -> &BTreeMap<String, String> {
        &self.nodes[id.0].attrs
    }

    /// Set the node's own text
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.0].text = text.to_string();
    }

    /// Concatenated text of the node and its subtree (`textContent`)
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        out.push_str(&self.nodes[id.0].text);
        for child in self.nodes[id.0].children.clone() {
            self.collect_text(child, out);
        }
    }

    /// Whether the node has the given class
    #[must_use]
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|v| v.split_whitespace().any(|c| c == class))
    }

    /// Set layout geometry
    pub fn set_layout(&mut self, id: NodeId, layout: Layout) {
        self.nodes[id.0].layout = layout;
    }

    /// The visibility predicate: non-zero offset size or at least one
    /// client rect
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        let layout = self.nodes[id.0].layout;
        layout.offset_width > 0 || layout.offset_height > 0 || layout.client_rects > 0
    }

    /// Set media load properties
    pub fn set_media(&mut self, id: NodeId, media: MediaState) {
        self.nodes[id.0].media = Some(media);
    }

    /// Media load properties, if any
    #[must_use]
    pub fn media(&self, id: NodeId) -> Option<MediaState> {
        self.nodes[id.0].media
    }

    /// Whether `node` is `ancestor` or a descendant of it
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.nodes[id.0].parent;
        }
        false
    }

    /// Pre-order descendants of a node (excluding the node itself)
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_descendants(id, &mut out);
        out
    }

    fn walk_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.nodes[id.0].children {
            out.push(*child);
            self.walk_descendants(*child, out);
        }
    }

    /// Whether the node matches a selector (ancestor constraints included)
    #[must_use]
    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        selector.matches(self, id)
    }

    /// First attached element matching the selector, in document order
    #[must_use]
    pub fn query(&self, selector: &Selector) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|id| selector.matches(self, *id))
    }

    /// All attached elements matching the selector, in document order
    #[must_use]
    pub fn query_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    /// All attached elements carrying the given attribute, in document order
    #[must_use]
    pub fn elements_with_attr(&self, name: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|id| self.attr(*id, name).is_some())
            .collect()
    }

    /// Serialized HTML of the node and its subtree, used for the
    /// `element_snapshot` diagnostic field
    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        let mut out = String::new();
        out.push('<');
        out.push_str(&node.tag);
        for (name, value) in &node.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        out.push('>');
        out.push_str(&escape_text(&node.text));
        for child in &node.children {
            out.push_str(&self.outer_html(*child));
        }
        out.push_str("</");
        out.push_str(&node.tag);
        out.push('>');
        out
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Fluent builder for constructing elements in tests and host adapters.
#[derive(Debug)]
pub struct ElementBuilder<'a> {
    doc: &'a mut Document,
    id: NodeId,
}

impl ElementBuilder<'_> {
    /// Set an attribute
    #[must_use]
    pub fn attr(self, name: &str, value: &str) -> Self {
        self.doc.set_attr(self.id, name, value);
        self
    }

    /// Append a class to the `class` attribute
    #[must_use]
    pub fn class(self, class: &str) -> Self {
        let merged = match self.doc.attr(self.id, "class") {
            Some(existing) => format!("{existing} {class}"),
            None => class.to_string(),
        };
        self.doc.set_attr(self.id, "class", &merged);
        self
    }

    /// Set the node's own text
    #[must_use]
    pub fn text(self, text: &str) -> Self {
        self.doc.set_text(self.id, text);
        self
    }

    /// Mark the element as not rendering
    #[must_use]
    pub fn hidden(self) -> Self {
        self.doc.set_layout(self.id, Layout::hidden());
        self
    }

    /// Set media load properties
    #[must_use]
    pub fn media(self, media: MediaState) -> Self {
        self.doc.set_media(self.id, media);
        self
    }

    /// Finish building, leaving the element detached
    #[must_use]
    pub fn detached(self) -> NodeId {
        self.id
    }

    /// Attach to a parent and return the node id
    pub fn append_to(self, parent: NodeId) -> NodeId {
        self.doc.append(parent, self.id);
        self.id
    }

    /// Attach to the document root and return the node id.
    ///
    /// The builder already holds the document mutably, so the root id
    /// cannot be fetched from outside the chain.
    pub fn append_to_root(self) -> NodeId {
        let root = self.doc.root();
        self.doc.append(root, self.id);
        self.id
    }
}

// =============================================================================
// SELECTOR
// =============================================================================

/// Attribute constraint inside a compound selector
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

/// One compound simple selector (`img.logo#main[alt=x]`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if doc.tag(id) != tag {
                return false;
            }
        }
        if let Some(expected) = &self.id {
            if doc.attr(id, "id") != Some(expected.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| doc.has_class(id, c)) {
            return false;
        }
        self.attrs.iter().all(|a| match &a.value {
            Some(v) => doc.attr(id, &a.name) == Some(v.as_str()),
            None => doc.attr(id, &a.name).is_some(),
        })
    }
}

/// Parsed CSS-subset selector: compounds joined by descendant combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    compounds: Vec<Compound>,
}

impl Selector {
    /// Parse a selector string.
    ///
    /// # Errors
    ///
    /// Returns [`VigilarError::Selector`] for empty input or syntax outside
    /// the supported subset.
    pub fn parse(input: &str) -> VigilarResult<Self> {
        let compounds: Vec<Compound> = input
            .split_whitespace()
            .map(parse_compound)
            .collect::<VigilarResult<_>>()?;
        if compounds.is_empty() {
            return Err(VigilarError::Selector {
                selector: input.to_string(),
                message: "empty selector".to_string(),
            });
        }
        Ok(Self { compounds })
    }

    /// Whether the node matches, walking ancestors for descendant parts.
    /// Greedy bottom-up matching is complete for descendant-only chains.
    #[must_use]
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let last = self.compounds.len() - 1;
        if !self.compounds[last].matches(doc, id) {
            return false;
        }
        let mut remaining = last;
        let mut cur = doc.parent(id);
        while remaining > 0 {
            match cur {
                None => return false,
                Some(p) => {
                    if self.compounds[remaining - 1].matches(doc, p) {
                        remaining -= 1;
                    }
                    cur = doc.parent(p);
                }
            }
        }
        true
    }
}

impl std::str::FromStr for Selector {
    type Err = VigilarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(token: &str) -> VigilarResult<Compound> {
    let err = |message: &str| VigilarError::Selector {
        selector: token.to_string(),
        message: message.to_string(),
    };

    let mut compound = Compound::default();
    let mut chars = token.chars().peekable();

    // optional leading tag name or universal selector
    if let Some(&c) = chars.peek() {
        if c == '*' {
            chars.next();
        } else if is_ident_char(c) {
            let mut tag = String::new();
            while let Some(&c) = chars.peek() {
                if is_ident_char(c) {
                    tag.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '#' | '.' => {
                let mut ident = String::new();
                while let Some(&n) = chars.peek() {
                    if is_ident_char(n) {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident.is_empty() {
                    return Err(err("expected identifier"));
                }
                if c == '#' {
                    compound.id = Some(ident);
                } else {
                    compound.classes.push(ident);
                }
            }
            '[' => {
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(n) => body.push(n),
                        None => return Err(err("unterminated attribute selector")),
                    }
                }
                let (name, value) = match body.split_once('=') {
                    Some((n, v)) => {
                        let v = v.trim_matches(|q| q == '"' || q == '\'');
                        (n.trim(), Some(v.to_string()))
                    }
                    None => (body.trim(), None),
                };
                if name.is_empty() {
                    return Err(err("empty attribute name"));
                }
                compound.attrs.push(AttrMatch {
                    name: name.to_string(),
                    value,
                });
            }
            other => {
                return Err(err(&format!("unsupported selector syntax '{other}'")));
            }
        }
    }

    if compound.is_empty() {
        return Err(err("empty compound selector"));
    }
    Ok(compound)
}
