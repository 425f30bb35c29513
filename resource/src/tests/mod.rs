//! Whole-database fixtures shared by the load and round-trip tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::collision::{BvhKind, BvhNode, CollisionMesh, CollisionSection};
use crate::navigation::{NavLink, NavMesh, RacingLine, RacingSegment, Waypoint};
use crate::scene::{NodeKind, SceneNode};
use crate::{ChunkKind, Platform, ResourceChunk, ResourceDatabase};

mod roundtrip_test;

pub(crate) const NAV_CHUNK: u32 = 0x10;
pub(crate) const COLL_CHUNK: u32 = 0x20;
pub(crate) const BUFF_CHUNK: u32 = 0x30;

/// A small but complete track database: a scene graph with a marker node, a
/// collision mesh with a shared BVH leaf, a cyclic navigation mesh whose
/// racing line references the marker, and a raw geometry buffer chunk.
pub(crate) fn build_track_database(platform: Platform) -> ResourceDatabase {
    let mut db = ResourceDatabase::new(platform);

    // Scene graph.
    let markers = db.add_owned_node(SceneNode::new("markers"));
    let mut start = SceneNode::new("start_line").with_kind(NodeKind::Marker { index: 0 });
    start.parent_uid = markers.borrow().uid;
    let start = db.add_owned_node(start);
    db.add_owned_node(
        SceneNode::new("track_geo").with_kind(NodeKind::Mesh {
            buffer_chunk: BUFF_CHUNK,
        }),
    );

    // Collision: two branches sharing one leaf.
    let leaf = Rc::new(RefCell::new(BvhNode {
        min: [0.0; 3],
        max: [8.0, 1.0, 8.0],
        kind: BvhKind::Leaf {
            first_triangle: 0,
            triangle_count: 2,
        },
    }));
    let left = Rc::new(RefCell::new(BvhNode {
        min: [0.0; 3],
        max: [8.0, 1.0, 4.0],
        kind: BvhKind::Branch {
            children: vec![Rc::clone(&leaf)],
        },
    }));
    let collision = CollisionMesh {
        sections: vec![CollisionSection {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [8.0, 0.0, 0.0],
                [0.0, 0.0, 8.0],
                [8.0, 1.0, 8.0],
            ],
            triangles: vec![[0, 1, 2], [1, 3, 2]],
            bvh: Some(Rc::new(RefCell::new(BvhNode {
                min: [0.0; 3],
                max: [8.0, 1.0, 8.0],
                kind: BvhKind::Branch {
                    children: vec![left, leaf],
                },
            }))),
            bounds_min: [0.0; 3],
            bounds_max: [8.0, 1.0, 8.0],
        }],
    };
    db.save_resource(ChunkKind::COLLISION, COLL_CHUNK, "track_collision", &collision);

    // Navigation: two waypoints, links both ways, one lap line that visits
    // the first waypoint twice.
    let a = Rc::new(RefCell::new(Waypoint::new("gate_a", [0.0, 0.0, 0.0])));
    let b = Rc::new(RefCell::new(Waypoint::new("gate_b", [8.0, 0.0, 8.0])));
    a.borrow_mut().flags = 0x1;
    let ab = Rc::new(RefCell::new(NavLink {
        from: Some(Rc::clone(&a)),
        to: Some(Rc::clone(&b)),
        width: 4.0,
        one_way: false,
    }));
    let ba = Rc::new(RefCell::new(NavLink {
        from: Some(Rc::clone(&b)),
        to: Some(Rc::clone(&a)),
        width: 4.0,
        one_way: true,
    }));
    a.borrow_mut().set_links(&[Rc::clone(&ab), Rc::clone(&ba)]);
    b.borrow_mut().set_links(&[Rc::clone(&ab), Rc::clone(&ba)]);
    let nav = NavMesh {
        waypoints: vec![Rc::clone(&a), Rc::clone(&b)],
        links: vec![ab, ba],
        racing_lines: vec![RacingLine {
            lap: true,
            marker: Some(start),
            segments: vec![
                RacingSegment {
                    waypoint: Some(Rc::clone(&a)),
                    speed: 30.0,
                },
                RacingSegment {
                    waypoint: Some(b),
                    speed: 55.0,
                },
                RacingSegment {
                    waypoint: Some(a),
                    speed: 30.0,
                },
            ],
        }],
        ..NavMesh::default()
    };
    db.save_resource(ChunkKind::NAVIGATION, NAV_CHUNK, "track_nav", &nav);

    // Raw geometry payload, carried through untouched.
    let mut geometry = ResourceChunk::new(ChunkKind::BUFFER, BUFF_CHUNK, "track_geo_vtx");
    geometry.gpu_data = (0..64u8).collect();
    db.add_chunk(geometry);

    db
}
