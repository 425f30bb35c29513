//! The uid → node registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::node::SceneNode;

/// Lookup table from node uid to the live node object.
///
/// Owned by the resource database and shared (via `Rc`) with every load
/// context that needs to resolve node-uid pointers. Every node reachable
/// from the root that carries a non-zero uid is present exactly once.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    root_uid: u32,
    root: Option<Rc<RefCell<SceneNode>>>,
    nodes: HashMap<u32, Rc<RefCell<SceneNode>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uid of the scene root.
    pub fn root_uid(&self) -> u32 {
        self.root_uid
    }

    /// The scene root node.
    pub fn root(&self) -> Option<Rc<RefCell<SceneNode>>> {
        self.root.clone()
    }

    /// Install `node` as the scene root (registering it as well).
    pub fn set_root(&mut self, node: Rc<RefCell<SceneNode>>) {
        self.root_uid = node.borrow().uid;
        self.register(Rc::clone(&node));
        self.root = Some(node);
    }

    /// Resolve a uid. The root uid resolves to the root directly; uid 0 is
    /// never a node.
    pub fn find(&self, uid: u32) -> Option<Rc<RefCell<SceneNode>>> {
        if uid == 0 {
            return None;
        }
        if uid == self.root_uid {
            return self.root.clone();
        }
        self.nodes.get(&uid).cloned()
    }

    /// Register a node under its uid.
    ///
    /// Nodes with uid 0 are not registered. A duplicate uid keeps the first
    /// registration and logs the collision.
    pub fn register(&mut self, node: Rc<RefCell<SceneNode>>) {
        let uid = node.borrow().uid;
        if uid == 0 {
            return;
        }
        if let Some(existing) = self.nodes.get(&uid) {
            if !Rc::ptr_eq(existing, &node) {
                log::warn!("duplicate node uid {uid:#010x}, keeping the first registration");
            }
            return;
        }
        self.nodes.insert(uid, node);
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every registered node, root first, in stable uid order after it.
    pub fn nodes(&self) -> Vec<Rc<RefCell<SceneNode>>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        if let Some(root) = &self.root {
            out.push(Rc::clone(root));
        }
        let mut uids: Vec<u32> = self
            .nodes
            .keys()
            .copied()
            .filter(|&uid| uid != self.root_uid)
            .collect();
        uids.sort_unstable();
        for uid in uids {
            out.push(Rc::clone(&self.nodes[&uid]));
        }
        out
    }
}
