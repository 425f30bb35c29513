//! Round-trip tests: build a database, save, reload, verify structure and
//! reference-sharing topology.

use std::cell::RefCell;
use std::rc::Rc;

use crate::collision::{BvhKind, CollisionMesh};
use crate::navigation::NavMesh;
use crate::scene::{uid_from_name, SceneNode};
use crate::{ChunkKind, Platform, ResourceDatabase};

use super::{build_track_database, BUFF_CHUNK, COLL_CHUNK, NAV_CHUNK};

/// Compare two node trees structurally, ignoring child order (the registry
/// re-serializes children in uid order).
fn compare_nodes(left: &Rc<RefCell<SceneNode>>, right: &Rc<RefCell<SceneNode>>, path: &str) {
    let left = left.borrow();
    let right = right.borrow();
    assert_eq!(left.name, right.name, "{path}: name mismatch");
    assert_eq!(left.uid, right.uid, "{path}: uid mismatch");
    assert_eq!(left.kind, right.kind, "{path}: kind mismatch");
    assert_eq!(left.transform, right.transform, "{path}: transform mismatch");
    assert_eq!(
        left.children().len(),
        right.children().len(),
        "{path}: child count mismatch"
    );

    let mut left_children: Vec<_> = left.children().to_vec();
    let mut right_children: Vec<_> = right.children().to_vec();
    left_children.sort_by_key(|c| c.borrow().uid);
    right_children.sort_by_key(|c| c.borrow().uid);
    for (l, r) in left_children.iter().zip(&right_children) {
        let child_path = format!("{path}/{}", l.borrow().name);
        compare_nodes(l, r, &child_path);
    }
}

fn roundtrip(platform: Platform) -> (ResourceDatabase, ResourceDatabase) {
    let original = build_track_database(platform);
    let reloaded = ResourceDatabase::from_bytes(&original.to_bytes()).unwrap();
    (original, reloaded)
}

#[test]
fn scene_graph_roundtrips_on_every_platform() {
    for platform in [
        Platform::Win32,
        Platform::Win64,
        Platform::WiiU,
        Platform::Ps3,
    ] {
        let (original, reloaded) = roundtrip(platform);
        assert_eq!(reloaded.platform(), platform);
        compare_nodes(
            &original.root().unwrap(),
            &reloaded.root().unwrap(),
            "scene",
        );
    }
}

#[test]
fn chunks_survive_with_kind_and_payload() {
    let (original, reloaded) = roundtrip(Platform::Win64);
    assert_eq!(original.chunks().len(), reloaded.chunks().len());

    let geometry = reloaded.find_chunk_by_id(BUFF_CHUNK).unwrap();
    assert_eq!(geometry.kind, ChunkKind::BUFFER);
    assert_eq!(geometry.name, "track_geo_vtx");
    assert_eq!(geometry.gpu_data, (0..64u8).collect::<Vec<_>>());

    assert!(reloaded.find_chunk_by_name("track_collision").is_some());
    assert!(reloaded.find_chunk_by_name("track_nav").is_some());
}

#[test]
fn navigation_topology_is_preserved() {
    for platform in [Platform::Win32, Platform::Win64, Platform::WiiU] {
        let (_, reloaded) = roundtrip(platform);
        let nav: NavMesh = reloaded.load_resource(NAV_CHUNK).unwrap();

        assert_eq!(nav.waypoints.len(), 2, "{platform:?}");
        assert_eq!(nav.links.len(), 2, "{platform:?}");

        // Links and waypoints reference each other as one set of objects.
        let ab = nav.links[0].borrow();
        assert!(Rc::ptr_eq(ab.from.as_ref().unwrap(), &nav.waypoints[0]));
        assert!(Rc::ptr_eq(ab.to.as_ref().unwrap(), &nav.waypoints[1]));
        let back_links = nav.waypoints[0].borrow().links();
        assert_eq!(back_links.len(), 2);
        assert!(Rc::ptr_eq(&back_links[0], &nav.links[0]));

        // The lap line visits gate_a twice — through the same object.
        let line = &nav.racing_lines[0];
        assert!(line.lap);
        assert_eq!(line.segments.len(), 3);
        let first = line.segments[0].waypoint.as_ref().unwrap();
        let last = line.segments[2].waypoint.as_ref().unwrap();
        assert!(Rc::ptr_eq(first, last));
        assert!(Rc::ptr_eq(first, &nav.waypoints[0]));
        assert_eq!(line.segments[1].speed, 55.0);

        // Waypoint payloads survive the byte trip.
        assert_eq!(nav.waypoints[0].borrow().name, "gate_a");
        assert_eq!(nav.waypoints[0].borrow().flags, 0x1);
        assert_eq!(nav.waypoints[1].borrow().position, [8.0, 0.0, 8.0]);
    }
}

#[test]
fn racing_line_marker_resolves_to_registered_node() {
    let (_, reloaded) = roundtrip(Platform::Win64);
    let nav: NavMesh = reloaded.load_resource(NAV_CHUNK).unwrap();

    let marker = nav.racing_lines[0].marker.as_ref().expect("marker lost");
    let registered = reloaded.find_node(uid_from_name("start_line")).unwrap();
    assert!(Rc::ptr_eq(marker, &registered));
    assert_eq!(marker.borrow().name, "start_line");
}

#[test]
fn collision_shared_leaf_stays_shared() {
    for platform in [Platform::Win32, Platform::WiiU] {
        let (_, reloaded) = roundtrip(platform);
        let collision: CollisionMesh = reloaded.load_resource(COLL_CHUNK).unwrap();

        let section = &collision.sections[0];
        assert_eq!(section.vertices.len(), 4);
        assert_eq!(section.triangles, vec![[0, 1, 2], [1, 3, 2]]);

        let root = section.bvh.as_ref().unwrap().borrow();
        let BvhKind::Branch { children } = &root.kind else {
            panic!("bvh root should be a branch");
        };
        let left = children[0].borrow();
        let BvhKind::Branch {
            children: left_children,
        } = &left.kind
        else {
            panic!("left bvh child should be a branch");
        };
        assert!(
            Rc::ptr_eq(&left_children[0], &children[1]),
            "{platform:?}: shared leaf split into two objects"
        );
    }
}

#[test]
fn save_load_save_is_stable() {
    let (_, first) = roundtrip(Platform::WiiU);
    let second_bytes = first.to_bytes();
    let second = ResourceDatabase::from_bytes(&second_bytes).unwrap();
    let third_bytes = second.to_bytes();
    // Two saves of the same loaded state are byte-identical: allocation
    // order is load order once the graph has been through one trip.
    assert_eq!(second_bytes, third_bytes);
}
