//! Scene graph nodes, the uid registry, and the node-chunk codec.

mod graph;
mod node;
mod registry;

pub use node::{uid_from_name, NodeKind, SceneNode, IDENTITY_MATRIX};
pub use registry::NodeRegistry;

pub(crate) use graph::{load_graph, save_graph};
pub(crate) use node::NODE_RECORD_SIZE;
