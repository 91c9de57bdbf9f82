//! Arena-backed element tree.
//!
//! A [`Document`] owns every [`Element`] in a flat vector. Elements refer to
//! their parent and children by [`NodeId`], so the parent link is a plain
//! index and never an ownership edge.

use std::borrow::Cow;
use std::cell::RefCell;
use std::ops::Index;

use crate::codec::{DEFAULT_DECIMAL_PRECISION, LeafValue, normalize_decimal};
use crate::error::{GpxError, Result};
use crate::query::CachedView;
use crate::registry::{ElementKind, class_for};

/// Stable handle to an element inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) kind: ElementKind,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    /// Raw character data; for leaves it is kept only when decoding failed.
    pub(crate) text: String,
    /// Text between the children of an opaque element, keyed by the number
    /// of children preceding it.
    pub(crate) text_runs: Vec<(usize, String)>,
    pub(crate) value: Option<LeafValue>,
    /// Bumped on every child insertion or removal.
    pub(crate) revision: u64,
    pub(crate) views: RefCell<Vec<CachedView>>,
}

impl Element {
    pub(crate) fn new(name: String, kind: ElementKind, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            kind,
            attributes,
            children: Vec::new(),
            parent: None,
            text: String::new(),
            text_runs: Vec::new(),
            value: None,
            revision: 0,
            views: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn is_leaf_text(&self) -> bool {
        self.kind.is_leaf_text()
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Decoded scalar of a leaf. `None` for composites and undecodable leaves.
    pub fn value(&self) -> Option<&LeafValue> {
        self.value.as_ref()
    }

    /// Undecoded text: the content of opaque elements and of leaves whose
    /// text did not decode.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_runs(&self) -> &[(usize, String)] {
        &self.text_runs
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Attribute text as it is written out. Decimal attributes such as
    /// `lat` are re-encoded at `precision`; unreadable numbers stay verbatim.
    pub fn attribute_text<'a>(&self, key: &str, value: &'a str, precision: usize) -> Cow<'a, str> {
        if self.kind.decimal_attributes().iter().any(|name| *name == key) {
            if let Some(fixed) = normalize_decimal(value, precision) {
                return Cow::Owned(fixed);
            }
        }
        Cow::Borrowed(value)
    }
}

/// A tree of elements with a single root.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Element>,
    root: NodeId,
}

impl Index<NodeId> for Document {
    type Output = Element;

    fn index(&self, id: NodeId) -> &Element {
        &self.nodes[id.index()]
    }
}

impl Document {
    /// An empty document whose root element is `root_name`.
    pub fn new(root_name: &str) -> Self {
        let kind = class_for(root_name, ElementKind::Document);
        let mut nodes = Vec::new();
        let root = push_node(&mut nodes, Element::new(root_name.to_string(), kind, Vec::new()));
        Self { nodes, root }
    }

    pub(crate) fn from_parts(nodes: Vec<Element>, root: NodeId) -> Self {
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Element> {
        self.nodes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut Element {
        &mut self.nodes[id.index()]
    }

    /// Number of elements ever allocated, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a detached element of an explicit kind.
    pub fn create_element(&mut self, name: &str, kind: ElementKind) -> NodeId {
        push_node(&mut self.nodes, Element::new(name.to_string(), kind, Vec::new()))
    }

    /// Allocate a detached element whose kind is resolved as if it appeared
    /// inside an element of kind `defining`.
    pub fn create_child_element(&mut self, defining: ElementKind, name: &str) -> NodeId {
        let kind = class_for(name, defining);
        self.create_element(name, kind)
    }

    /// Allocate a detached leaf-text element holding `value`.
    pub fn create_leaf(&mut self, name: &str, value: LeafValue) -> NodeId {
        let kind = ElementKind::Leaf(value.kind());
        let mut element = Element::new(name.to_string(), kind, Vec::new());
        element.value = Some(value);
        push_node(&mut self.nodes, element)
    }

    /// Set or replace an attribute, keeping the position of an existing key.
    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        let value = value.into();
        let attributes = &mut self.get_mut(id).attributes;
        match attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => attributes.push((key.to_string(), value)),
        }
    }

    /// Replace the scalar of a leaf-text element.
    pub fn set_value(&mut self, id: NodeId, value: LeafValue) -> Result<()> {
        let element = self.get_mut(id);
        if !element.is_leaf_text() {
            return Err(GpxError::NotALeaf(element.name.clone()));
        }
        element.kind = ElementKind::Leaf(value.kind());
        element.value = Some(value);
        element.text.clear();
        Ok(())
    }

    /// Depth-first, document-order walk of the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![id];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self[next].children.iter().rev().copied());
            Some(next)
        })
    }

    /// Attached leaves whose text failed to decode.
    pub fn invalid_leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(self.root)
            .filter(move |id| self[*id].is_leaf_text() && self[*id].value.is_none())
    }

    /// Structural equality of two subtrees: names, attributes, leaf values
    /// and child order. Whitespace and arena layout are ignored, and decimal
    /// attributes compare at the default precision.
    pub fn content_eq(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        let (x, y) = (&self[a], &other[b]);
        let same_attributes = x.attributes.len() == y.attributes.len()
            && x.attributes.iter().zip(&y.attributes).all(|((ka, va), (kb, vb))| {
                ka == kb
                    && x.attribute_text(ka, va, DEFAULT_DECIMAL_PRECISION)
                        == y.attribute_text(kb, vb, DEFAULT_DECIMAL_PRECISION)
            });
        x.name == y.name
            && x.kind == y.kind
            && same_attributes
            && x.value == y.value
            && x.text.trim() == y.text.trim()
            && x.text_runs == y.text_runs
            && x.children.len() == y.children.len()
            && x
                .children
                .iter()
                .zip(&y.children)
                .all(|(ca, cb)| self.content_eq(*ca, other, *cb))
    }

    /// Link `child` under `parent` at absolute position `position`.
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId, position: usize) {
        let tag = self[child].name.clone();
        self.get_mut(child).parent = Some(parent);
        let element = self.get_mut(parent);
        element.children.insert(position, child);
        for (at, _) in element.text_runs.iter_mut() {
            if *at > position {
                *at += 1;
            }
        }
        element.children_changed(&tag);
    }
}

pub(crate) fn push_node(nodes: &mut Vec<Element>, element: Element) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(element);
    id
}
