//! The `NODE` chunk codec: scene graph ⇄ blob.
//!
//! Chunk payload layout:
//!
//! ```text
//! 0x00  root uid    u32
//! 0x04  node count  u32
//! 0x08  nodes       pointer (8-byte slot) → packed node record array
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ResourceError;
use crate::load::LoadContext;
use crate::platform::Platform;
use crate::relocation::Relocation;
use crate::save::{SaveContext, SaveOutput};
use crate::serializable::ResourceSerializable;

use super::node::{SceneNode, NODE_RECORD_SIZE};
use super::registry::NodeRegistry;

const GRAPH_HEADER_SIZE: usize = 0x10;

/// Materialize a `NODE` chunk into the registry and wire up parent/child
/// links.
pub(crate) fn load_graph(
    data: &[u8],
    relocations: &[Relocation],
    platform: Platform,
    version: u32,
    registry: &Rc<RefCell<NodeRegistry>>,
) -> Result<(), ResourceError> {
    let mut ctx = LoadContext::new(data, relocations, platform, version)
        .with_registry(Rc::clone(registry));
    let root_uid = ctx.read_u32(0x00);
    let count = ctx.read_u32(0x04) as usize;
    ctx.set_position(0x08);
    let nodes = ctx.load_shared_array_pointer::<SceneNode>(count)?;

    {
        let mut registry = registry.borrow_mut();
        for node in &nodes {
            if node.borrow().uid == root_uid {
                registry.set_root(Rc::clone(node));
            } else {
                registry.register(Rc::clone(node));
            }
        }
    }

    // Parents may appear after their children in the array, so links are
    // resolved in a second pass once every uid is registered.
    let registry_ref = registry.borrow();
    for node in &nodes {
        let (uid, parent_uid) = {
            let node = node.borrow();
            (node.uid, node.parent_uid)
        };
        if uid == root_uid {
            continue;
        }
        let parent = if parent_uid != 0 {
            registry_ref.find(parent_uid)
        } else {
            registry_ref.root()
        };
        match parent {
            Some(parent) => SceneNode::link(&parent, node),
            None => log::warn!("node {uid:#010x} references missing parent {parent_uid:#010x}"),
        }
    }

    Ok(())
}

/// Serialize the registry's graph back into `NODE` chunk blobs.
pub(crate) fn save_graph(
    registry: &NodeRegistry,
    platform: Platform,
    version: u32,
) -> SaveOutput {
    let nodes = registry.nodes();
    let mut ctx = SaveContext::new(platform, version);

    let header = ctx.allocate(GRAPH_HEADER_SIZE, 16, false);
    ctx.write_u32(&header, 0x00, registry.root_uid());
    ctx.write_u32(&header, 0x04, nodes.len() as u32);
    let array = ctx.save_generic_pointer(&header, 0x08, nodes.len() * NODE_RECORD_SIZE, 16);
    for (index, node) in nodes.iter().enumerate() {
        let record = array.at(index * NODE_RECORD_SIZE, NODE_RECORD_SIZE);
        node.borrow().save(&mut ctx, &record);
    }

    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeKind;

    fn shared(node: SceneNode) -> Rc<RefCell<SceneNode>> {
        Rc::new(RefCell::new(node))
    }

    #[test]
    fn graph_roundtrip_links_parents() {
        let mut registry = NodeRegistry::new();
        let root = shared(SceneNode::new("Scene"));
        let folder = shared(SceneNode::new("markers"));
        let marker = shared(SceneNode::new("start").with_kind(NodeKind::Marker { index: 0 }));
        registry.set_root(Rc::clone(&root));
        registry.register(Rc::clone(&folder));
        registry.register(Rc::clone(&marker));
        SceneNode::link(&root, &folder);
        SceneNode::link(&folder, &marker);

        let output = save_graph(&registry, Platform::Win32, 2);

        let reloaded = Rc::new(RefCell::new(NodeRegistry::new()));
        load_graph(
            &output.data,
            &output.relocations,
            Platform::Win32,
            2,
            &reloaded,
        )
        .unwrap();

        let reloaded = reloaded.borrow();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.root_uid(), root.borrow().uid);

        let marker_uid = marker.borrow().uid;
        let found = reloaded.find(marker_uid).unwrap();
        assert_eq!(found.borrow().name, "start");
        assert_eq!(found.borrow().kind, NodeKind::Marker { index: 0 });

        let found_parent = found.borrow().parent().unwrap();
        assert_eq!(found_parent.borrow().name, "markers");
        let found_root = found_parent.borrow().parent().unwrap();
        assert_eq!(found_root.borrow().uid, reloaded.root_uid());
        assert_eq!(found_root.borrow().children().len(), 1);
    }

    #[test]
    fn orphan_nodes_attach_to_root() {
        let mut registry = NodeRegistry::new();
        let root = shared(SceneNode::new("Scene"));
        let stray = shared(SceneNode::new("stray"));
        registry.set_root(Rc::clone(&root));
        registry.register(Rc::clone(&stray));

        let output = save_graph(&registry, Platform::WiiU, 2);
        let reloaded = Rc::new(RefCell::new(NodeRegistry::new()));
        load_graph(
            &output.data,
            &output.relocations,
            Platform::WiiU,
            2,
            &reloaded,
        )
        .unwrap();

        let reloaded = reloaded.borrow();
        let root = reloaded.root().unwrap();
        assert_eq!(root.borrow().children().len(), 1);
        assert_eq!(root.borrow().children()[0].borrow().name, "stray");
    }
}
