//! Child lookups by tag name, memoized per element, and the mutations that
//! invalidate them.
//!
//! Kinds list the tags they keep a view of in
//! [`ElementKind::cached_views`](crate::registry::ElementKind::cached_views).
//! A view remembers the element revision it was computed at and is rebuilt
//! on the first read after a mutation touching its tag.

use std::rc::Rc;

use crate::error::{GpxError, Result};
use crate::node::{Document, Element, NodeId};

#[derive(Debug)]
pub(crate) struct CachedView {
    tag: &'static str,
    revision: u64,
    members: Rc<[NodeId]>,
}

impl Element {
    /// Record a child mutation. Views over other tags stay valid.
    pub(crate) fn children_changed(&mut self, tag: &str) {
        let previous = self.revision;
        self.revision += 1;
        let current = self.revision;
        for view in self.views.get_mut().iter_mut() {
            if view.tag != tag && view.revision == previous {
                view.revision = current;
            }
        }
    }

    fn caches(&self, tag: &str) -> Option<&'static str> {
        self.kind.cached_views().iter().copied().find(|t| *t == tag)
    }
}

impl Document {
    /// Children of `parent` named `tag`, in document order.
    pub fn children_named(&self, parent: NodeId, tag: &str) -> Rc<[NodeId]> {
        let element = &self[parent];
        let Some(cached_tag) = element.caches(tag) else {
            return self.collect_children_named(parent, tag);
        };

        if let Some(view) = element
            .views
            .borrow()
            .iter()
            .find(|v| v.tag == tag && v.revision == element.revision)
        {
            return Rc::clone(&view.members);
        }

        let members = self.collect_children_named(parent, tag);
        let mut views = element.views.borrow_mut();
        views.retain(|v| v.tag != tag);
        views.push(CachedView {
            tag: cached_tag,
            revision: element.revision,
            members: Rc::clone(&members),
        });
        members
    }

    pub fn first_child_named(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        if self[parent].caches(tag).is_some() {
            return self.children_named(parent, tag).first().copied();
        }
        self.same_tag_children(parent, tag).next()
    }

    pub fn last_child_named(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        if self[parent].caches(tag).is_some() {
            return self.children_named(parent, tag).last().copied();
        }
        self.same_tag_children(parent, tag).last()
    }

    pub fn count_children_named(&self, parent: NodeId, tag: &str) -> usize {
        if self[parent].caches(tag).is_some() {
            return self.children_named(parent, tag).len();
        }
        self.same_tag_children(parent, tag).count()
    }

    /// Insert a detached `child` so that exactly `index` children with the
    /// same tag precede it.
    ///
    /// The child goes immediately before the `index`-th same-tag sibling, or
    /// immediately after the last one when `index` equals their count. With
    /// no same-tag sibling at all it is appended.
    pub fn insert_child(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<()> {
        self.check_attachable(parent, child)?;

        let element = &self[parent];
        let tag = &self[child].name;
        let positions: Vec<usize> = element
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| self[**c].name == *tag)
            .map(|(position, _)| position)
            .collect();

        if index > positions.len() {
            return Err(GpxError::IndexOutOfRange {
                parent: element.name.clone(),
                tag: tag.clone(),
                index,
                count: positions.len(),
            });
        }

        let position = match positions.get(index) {
            Some(position) => *position,
            None => positions
                .last()
                .map_or(element.children.len(), |last| last + 1),
        };
        self.attach(parent, child, position);
        Ok(())
    }

    /// Insert a detached `child` at the end of its same-tag group.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let count = self.same_tag_children(parent, &self[child].name).count();
        self.insert_child(parent, child, count)
    }

    /// Detach every child named `tag`. Returns how many were removed.
    pub fn remove_children_named(&mut self, parent: NodeId, tag: &str) -> usize {
        let (removed, kept): (Vec<NodeId>, Vec<NodeId>) = self[parent]
            .children
            .iter()
            .copied()
            .partition(|c| self[*c].name == tag);
        if removed.is_empty() {
            return 0;
        }

        for id in &removed {
            self.get_mut(*id).parent = None;
        }
        let element = self.get_mut(parent);
        for (at, _) in element.text_runs.iter_mut() {
            *at = element.children[..*at]
                .iter()
                .filter(|c| !removed.contains(c))
                .count();
        }
        element.children = kept;
        element.children_changed(tag);
        removed.len()
    }

    fn collect_children_named(&self, parent: NodeId, tag: &str) -> Rc<[NodeId]> {
        self.same_tag_children(parent, tag).collect()
    }

    fn same_tag_children<'a>(
        &'a self,
        parent: NodeId,
        tag: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self[parent]
            .children
            .iter()
            .copied()
            .filter(move |c| self[*c].name == tag)
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<()> {
        if self[parent].is_leaf_text() {
            return Err(GpxError::LeafParent(self[parent].name.clone()));
        }
        if self[child].parent.is_some() || child == self.root() {
            return Err(GpxError::AlreadyAttached(self[child].name.clone()));
        }
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(GpxError::Cycle(self[child].name.clone()));
            }
            ancestor = self[id].parent;
        }
        Ok(())
    }
}
