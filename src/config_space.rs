use std::collections::{BTreeMap, HashMap, HashSet};
use serde_derive::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use crate::core::{Error, TemplateId};
use crate::geometry::{Cell, ModuleShape, ShapeRegistry, Socket};
use crate::memo::{Memo, MemoCalc};

/// Why a candidate offset for a socket pair was thrown out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Display, Serialize, Deserialize)]
pub enum Rejection {
    // Symmetric regime: floor overlap is not exactly the door cell.
    TooMany,
    None,
    WrongCell,
    // Symmetric regime: a wall lands on the partner's floor away from the door.
    WallOverlap,
    // Asymmetric regime.
    DoorNotFloor,
    RayFloorOverlap,
    RayWallOverlap,
}

/// Observational counters. Nothing in the solver reads these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub rejected: BTreeMap<Rejection, usize>,
    pub accepted: usize,
}

impl RejectionCounts {
    pub fn reject(&mut self, r: Rejection) {
        *self.rejected.entry(r).or_default() += 1;
    }

    pub fn get(&self, r: Rejection) -> usize {
        self.rejected.get(&r).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &RejectionCounts) {
        for (r, n) in &other.rejected {
            *self.rejected.entry(*r).or_default() += n;
        }
        self.accepted += other.accepted;
    }
}

/// One way of realizing an offset: which socket of the fixed module docks with
/// which socket of the moving one, and how deep the connector is bitten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Docking {
    pub offset: Cell,
    pub fixed_socket: usize,
    pub moving_socket: usize,
    pub depth: u32,
}

/// The legal translations of a moving module relative to a fixed one. Not
/// symmetric in general.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Docking>", into = "Vec<Docking>")]
pub struct ConfigurationSpace {
    dockings: Vec<Docking>,
    offsets: HashSet<Cell>,
}

impl From<Vec<Docking>> for ConfigurationSpace {
    fn from(mut dockings: Vec<Docking>) -> Self {
        dockings.sort();
        dockings.dedup();
        let offsets = dockings.iter().map(|d| d.offset).collect();
        ConfigurationSpace { dockings, offsets }
    }
}

impl From<ConfigurationSpace> for Vec<Docking> {
    fn from(space: ConfigurationSpace) -> Self {
        space.dockings
    }
}

impl ConfigurationSpace {
    pub fn contains(&self, offset: Cell) -> bool {
        self.offsets.contains(&offset)
    }

    pub fn is_empty(&self) -> bool { self.offsets.is_empty() }

    /// Number of distinct offsets.
    pub fn len(&self) -> usize { self.offsets.len() }

    pub fn offsets(&self) -> &HashSet<Cell> { &self.offsets }

    pub fn dockings(&self) -> &[Docking] { &self.dockings }

    pub fn dockings_at(&self, offset: Cell) -> impl Iterator<Item = &Docking> + '_ {
        self.dockings.iter().filter(move |d| d.offset == offset)
    }
}

/// Strict single-cell docking between two rooms (or two connectors): the
/// moving socket lands exactly on the fixed socket and that is the only place
/// their floors meet.
fn dock_symmetric(fixed: &ModuleShape, moving: &ModuleShape, a: &Socket, b: &Socket) -> Result<Cell, Rejection> {
    let delta = a.cell - b.cell;
    let mut overlap = 0;
    let mut wrong_cell = false;
    for c in &moving.floor {
        let p = *c + delta;
        if fixed.floor.contains(&p) {
            overlap += 1;
            if p != a.cell {
                wrong_cell = true;
            }
        }
    }
    if overlap == 0 {
        return Err(Rejection::None);
    } else if overlap > 1 {
        return Err(Rejection::TooMany);
    } else if wrong_cell {
        return Err(Rejection::WrongCell);
    }
    let moving_walls_on_floor = moving.walls.iter()
        .map(|c| *c + delta)
        .any(|p| p != a.cell && fixed.floor.contains(&p));
    let fixed_walls_on_floor = fixed.walls.iter()
        .any(|c| *c != a.cell && moving.floor.contains(&(*c - delta)));
    if moving_walls_on_floor || fixed_walls_on_floor {
        return Err(Rejection::WallOverlap);
    }
    Ok(delta)
}

/// Variable-depth docking between a connector and a room. Returns the offset
/// of the moving module for bite depth `depth`, expressed in the fixed
/// module's frame.
fn dock_at_depth(
    fixed: &ModuleShape, moving: &ModuleShape, a: &Socket, b: &Socket, depth: u32,
) -> Result<Cell, Rejection> {
    let connector_is_fixed = fixed.is_connector();
    let (conn, conn_sock, room, room_sock) = if connector_is_fixed {
        (fixed, a, moving, b)
    } else {
        (moving, b, fixed, a)
    };
    let conn_door = conn_sock.ray_cell(depth);
    if !conn.floor.contains(&conn_door) || !room.floor.contains(&room_sock.cell) {
        return Err(Rejection::DoorNotFloor);
    }
    // Offsets that bring each module into the fixed frame; one of them is zero.
    let (conn_off, room_off) = if connector_is_fixed {
        (Cell::ORIGIN, conn_door - room_sock.cell)
    } else {
        (room_sock.cell - conn_door, Cell::ORIGIN)
    };
    let door = room_sock.cell + room_off;
    let ray: HashSet<Cell> = (0..=depth).map(|i| conn_sock.ray_cell(i) + conn_off).collect();
    let mut wall_mask = ray.clone();
    let t = conn_sock.side.tangent();
    for i in 0..depth {
        let c = conn_sock.ray_cell(i) + conn_off;
        wall_mask.insert(c + t);
        wall_mask.insert(c - t);
    }
    wall_mask.insert(door);

    for c in &room.floor {
        let p = *c + room_off;
        if conn.floor.contains(&(p - conn_off)) && !ray.contains(&p) {
            return Err(Rejection::RayFloorOverlap);
        }
    }
    let conn_walls_on_floor = conn.walls.iter()
        .map(|c| *c + conn_off)
        .any(|p| room.floor.contains(&(p - room_off)) && !wall_mask.contains(&p));
    let room_walls_on_floor = room.walls.iter()
        .map(|c| *c + room_off)
        .any(|p| conn.floor.contains(&(p - conn_off)) && !wall_mask.contains(&p));
    if conn_walls_on_floor || room_walls_on_floor {
        return Err(Rejection::RayWallOverlap);
    }
    Ok(if connector_is_fixed { room_off } else { conn_off })
}

/// Computes the configuration space of `moving` relative to `fixed`. Empty
/// shapes give an empty space.
pub fn compute_space(fixed: &ModuleShape, moving: &ModuleShape, counts: &mut RejectionCounts) -> ConfigurationSpace {
    let mut dockings = Vec::new();
    if fixed.is_empty() || moving.is_empty() {
        return ConfigurationSpace::default();
    }
    let asymmetric = fixed.is_connector() != moving.is_connector();
    for (ai, a) in fixed.sockets.iter().enumerate() {
        for (bi, b) in moving.sockets.iter().enumerate() {
            // Only opposite-facing sockets can ever dock.
            if a.side != b.side.opposite() {
                continue;
            }
            if !asymmetric {
                match dock_symmetric(fixed, moving, a, b) {
                    Ok(offset) => {
                        counts.accepted += 1;
                        dockings.push(Docking { offset, fixed_socket: ai, moving_socket: bi, depth: 0 });
                    },
                    Err(r) => counts.reject(r),
                }
                continue;
            }
            let bite = if fixed.is_connector() { a.bite_depth } else { b.bite_depth };
            for depth in 0..bite.max(1) {
                match dock_at_depth(fixed, moving, a, b, depth) {
                    Ok(offset) => {
                        counts.accepted += 1;
                        dockings.push(Docking { offset, fixed_socket: ai, moving_socket: bi, depth });
                    },
                    Err(r) => counts.reject(r),
                }
            }
        }
    }
    ConfigurationSpace::from(dockings)
}

struct SpaceCalc<'a> {
    shapes: &'a ShapeRegistry,
    counts: RejectionCounts,
}

impl <'a> MemoCalc<(TemplateId, TemplateId), ConfigurationSpace> for SpaceCalc<'a> {
    fn calc(&mut self, key: &(TemplateId, TemplateId)) -> ConfigurationSpace {
        match (self.shapes.get(key.0), self.shapes.get(key.1)) {
            (Some(fixed), Some(moving)) => compute_space(fixed, moving, &mut self.counts),
            _ => ConfigurationSpace::default(),
        }
    }
}

/// Mutable precompute phase of the library. Spaces are memoized by template
/// pair; freeze() hands back the read-only library.
pub struct ConfigSpaceBuilder<'a> {
    memo: Memo<(TemplateId, TemplateId), ConfigurationSpace, SpaceCalc<'a>>,
    count_rejections: bool,
}

impl <'a> ConfigSpaceBuilder<'a> {
    pub fn new(shapes: &'a ShapeRegistry, count_rejections: bool) -> Self {
        ConfigSpaceBuilder {
            memo: Memo::new(SpaceCalc { shapes, counts: RejectionCounts::default() }),
            count_rejections,
        }
    }

    pub fn space(&mut self, fixed: TemplateId, moving: TemplateId) -> &ConfigurationSpace {
        self.memo.get(&(fixed, moving))
    }

    pub fn space_all(&mut self) -> &mut Self {
        let ids: Vec<TemplateId> = self.memo.calc().shapes.ids().collect();
        for f in &ids {
            for m in &ids {
                self.memo.get(&(*f, *m));
            }
        }
        self
    }

    pub fn freeze(self) -> ConfigSpaceLibrary {
        let count_rejections = self.count_rejections;
        let (spaces, calc) = self.memo.into_parts();
        ConfigSpaceLibrary {
            spaces,
            counts: if count_rejections { Some(calc.counts) } else { None },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LibraryEntry {
    fixed: TemplateId,
    moving: TemplateId,
    space: ConfigurationSpace,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LibraryRepr {
    entries: Vec<LibraryEntry>,
    counts: Option<RejectionCounts>,
}

/// Frozen, read-only configuration spaces. Safe to share between attempts
/// running on different threads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "LibraryRepr", into = "LibraryRepr")]
pub struct ConfigSpaceLibrary {
    spaces: HashMap<(TemplateId, TemplateId), ConfigurationSpace>,
    counts: Option<RejectionCounts>,
}

impl From<LibraryRepr> for ConfigSpaceLibrary {
    fn from(repr: LibraryRepr) -> Self {
        ConfigSpaceLibrary {
            spaces: repr.entries.into_iter().map(|e| ((e.fixed, e.moving), e.space)).collect(),
            counts: repr.counts,
        }
    }
}

impl From<ConfigSpaceLibrary> for LibraryRepr {
    fn from(lib: ConfigSpaceLibrary) -> Self {
        let mut entries: Vec<LibraryEntry> = lib.spaces.into_iter()
            .map(|((fixed, moving), space)| LibraryEntry { fixed, moving, space })
            .collect();
        entries.sort_by_key(|e| (e.fixed, e.moving));
        LibraryRepr { entries, counts: lib.counts }
    }
}

impl ConfigSpaceLibrary {
    /// Precomputes every ordered pair of registered templates.
    pub fn precompute_all(shapes: &ShapeRegistry, count_rejections: bool) -> Self {
        let mut b = ConfigSpaceBuilder::new(shapes, count_rejections);
        b.space_all();
        b.freeze()
    }

    pub fn space(&self, fixed: TemplateId, moving: TemplateId) -> Option<&ConfigurationSpace> {
        self.spaces.get(&(fixed, moving))
    }

    /// Whether `offset` is a legal placement of `moving` relative to `fixed`.
    /// Pairs that were never precomputed are an error rather than a miss.
    pub fn allows(&self, fixed: TemplateId, moving: TemplateId, offset: Cell) -> Result<bool, Error> {
        match self.space(fixed, moving) {
            Some(s) => Ok(s.contains(offset)),
            None => Err(Error::new(format!("no configuration space for ({}, {})", fixed, moving))),
        }
    }

    pub fn counts(&self) -> Option<&RejectionCounts> { self.counts.as_ref() }

    pub fn len(&self) -> usize { self.spaces.len() }

    pub fn is_empty(&self) -> bool { self.spaces.is_empty() }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod test {
    use crate::core::Role;
    use crate::geometry::{ShapeBuilder, Side};
    use crate::geometry::test_util::{ew_corridor, rect_room};
    use super::*;

    fn floor_overlap(fixed: &ModuleShape, moving: &ModuleShape, delta: Cell) -> usize {
        moving.floor.iter().filter(|c| fixed.floor.contains(&(**c + delta))).count()
    }

    #[test]
    fn test_two_rooms_dock_once() {
        let a = rect_room("a", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let b = rect_room("b", 3, 3, &[Side::West]).build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        let space = compute_space(&a, &b, &mut counts);
        assert_eq!(space.len(), 1);
        // A's east door is (3, 1); B's west door is (-1, 1).
        assert!(space.contains(Cell::new(4, 0)));
        assert_eq!(floor_overlap(&a, &b, Cell::new(4, 0)), 1);
        let d = space.dockings()[0];
        assert_eq!((d.fixed_socket, d.moving_socket, d.depth), (0, 0, 0));
        assert_eq!(counts.accepted, 1);
    }

    #[test]
    fn test_same_side_sockets_never_dock() {
        let a = rect_room("a", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let b = rect_room("b", 3, 3, &[Side::East]).build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        assert!(compute_space(&a, &b, &mut counts).is_empty());
        assert_eq!(counts, RejectionCounts::default());
    }

    #[test]
    fn test_space_is_not_symmetric() {
        let a = rect_room("a", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let b = rect_room("b", 3, 3, &[Side::West]).build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        let ab = compute_space(&a, &b, &mut counts);
        let ba = compute_space(&b, &a, &mut counts);
        assert!(ab.contains(Cell::new(4, 0)));
        assert!(ba.contains(Cell::new(-4, 0)));
        assert!(!ba.contains(Cell::new(4, 0)));
    }

    #[test]
    fn test_symmetric_rejects_too_much_overlap() {
        // Socket sits inside the floor, so docking would overlap whole rows.
        let mut ab = ShapeBuilder::new("a", Role::Room);
        ab.walled_rect(Cell::ORIGIN, 3, 3);
        ab.socket(Socket::new(Side::East, Cell::new(1, 1)));
        let a = ab.build(TemplateId(0)).unwrap();
        let b = rect_room("b", 3, 3, &[Side::West]).build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        let space = compute_space(&a, &b, &mut counts);
        assert!(space.is_empty());
        assert_eq!(counts.get(Rejection::TooMany), 1);
    }

    #[test]
    fn test_symmetric_rejects_wall_on_floor() {
        let a = rect_room("a", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let mut bb = rect_room("b", 3, 3, &[Side::West]);
        let mut counts = RejectionCounts::default();
        assert!(compute_space(&a, &bb.build(TemplateId(1)).unwrap(), &mut counts).contains(Cell::new(4, 0)));
        // A stray wall just outside B's door lands on A's floor at (2, 1).
        bb.wall(Cell::new(-2, 1));
        let b = bb.build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        assert!(compute_space(&a, &b, &mut counts).is_empty());
        assert_eq!(counts.get(Rejection::WallOverlap), 1);
    }

    #[test]
    fn test_connector_depths() {
        let corridor = ew_corridor("c", 5, 3).build(TemplateId(0)).unwrap();
        let room = rect_room("r", 3, 3, &[Side::West]).build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        // Room hangs off the corridor's east end.
        let space = compute_space(&corridor, &room, &mut counts);
        assert!(!space.is_empty());
        assert!(space.len() <= 3);
        let mut depths: Vec<u32> = space.dockings().iter().map(|d| d.depth).collect();
        depths.sort();
        depths.dedup();
        assert_eq!(depths.len(), space.len());
        for d in space.dockings() {
            // Corridor east socket at (4, 0) bites west into the corridor; the
            // room's west door lands on (4 - depth, 0).
            let door = Cell::new(4 - d.depth as i32, 0);
            assert_eq!(d.offset, door - Cell::new(-1, 1));
            // No floor overlap outside the carved ray.
            for c in &room.floor {
                let p = *c + d.offset;
                if corridor.floor.contains(&p) {
                    assert!(p.y == 0 && p.x >= door.x && p.x <= 4, "{} outside ray", p);
                }
            }
        }
    }

    #[test]
    fn test_connector_depth_rejected_by_side_alcove() {
        // An alcove beside the corridor's east end gets in the way of deeper
        // bites: at depth 1 the room's wall lands on it, at depth 2 its floor.
        let mut cb = ew_corridor("c", 6, 3);
        cb.floor(Cell::new(4, 1));
        let corridor = cb.build(TemplateId(0)).unwrap();
        let room = rect_room("r", 3, 3, &[Side::West]).build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        let space = compute_space(&corridor, &room, &mut counts);
        assert_eq!(space.len(), 1);
        assert_eq!(space.dockings()[0].depth, 0);
        assert_eq!(counts.get(Rejection::RayWallOverlap), 1);
        assert_eq!(counts.get(Rejection::RayFloorOverlap), 1);
    }

    #[test]
    fn test_room_fixed_connector_moving() {
        let room = rect_room("r", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let corridor = ew_corridor("c", 5, 1).build(TemplateId(1)).unwrap();
        let mut counts = RejectionCounts::default();
        let space = compute_space(&room, &corridor, &mut counts);
        // Corridor west end sits on the room's east door at (3, 1).
        assert_eq!(space.len(), 1);
        assert!(space.contains(Cell::new(3, 1)));
    }

    #[test]
    fn test_empty_shape_gives_empty_space() {
        let a = rect_room("a", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let mut empty = a.clone();
        empty.floor.clear();
        let mut counts = RejectionCounts::default();
        assert!(compute_space(&a, &empty, &mut counts).is_empty());
        assert!(compute_space(&empty, &a, &mut counts).is_empty());
    }

    #[test]
    fn test_builder_memoizes_and_freezes() {
        let mut shapes = ShapeRegistry::new();
        let a = shapes.register(&rect_room("a", 3, 3, &[Side::East])).unwrap();
        let b = shapes.register(&rect_room("b", 3, 3, &[Side::West])).unwrap();
        let mut builder = ConfigSpaceBuilder::new(&shapes, true);
        assert_eq!(builder.space(a, b).len(), 1);
        assert_eq!(builder.space(a, b).len(), 1);
        let lib = builder.freeze();
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.allows(a, b, Cell::new(4, 0)), Ok(true));
        assert_eq!(lib.allows(a, b, Cell::new(5, 0)), Ok(false));
        assert!(lib.allows(b, a, Cell::new(-4, 0)).is_err());
        assert_eq!(lib.counts().map(|c| c.accepted), Some(1));
    }

    #[test]
    fn test_library_json_round_trip() {
        let mut shapes = ShapeRegistry::new();
        shapes.register(&rect_room("a", 3, 3, &[Side::East, Side::West])).unwrap();
        shapes.register(&ew_corridor("c", 4, 2)).unwrap();
        let lib = ConfigSpaceLibrary::precompute_all(&shapes, false);
        assert_eq!(lib.len(), 4);
        let json = lib.to_json().unwrap();
        let back = ConfigSpaceLibrary::from_json(&json).unwrap();
        assert_eq!(back, lib);
    }

    mod proptests {
        use std::collections::BTreeSet;
        use proptest::prelude::*;
        use crate::geometry::test_util::ns_corridor;
        use super::*;

        // A walled w×h room with one socket per side, each at `at` along its
        // side (clamped), so sockets need not sit in the middle.
        fn room(id: u32, w: i32, h: i32, at: (i32, i32, i32, i32)) -> ModuleShape {
            let mut b = ShapeBuilder::new("r", Role::Room);
            b.walled_rect(Cell::ORIGIN, w, h)
                .socket(Socket::new(Side::North, Cell::new(at.0 % w, -1)))
                .socket(Socket::new(Side::East, Cell::new(w, at.1 % h)))
                .socket(Socket::new(Side::South, Cell::new(at.2 % w, h)))
                .socket(Socket::new(Side::West, Cell::new(-1, at.3 % h)));
            b.build(TemplateId(id)).unwrap()
        }

        fn room_strategy(id: u32) -> impl Strategy<Value = ModuleShape> {
            (1i32..7, 1i32..7, (0i32..7, 0i32..7, 0i32..7, 0i32..7))
                .prop_map(move |(w, h, at)| room(id, w, h, at))
        }

        // Straight corridor, optionally with a side alcove somewhere along it.
        fn corridor_strategy(id: u32) -> impl Strategy<Value = ModuleShape> {
            (any::<bool>(), 1i32..8, 1u32..5, proptest::option::of((0i32..8, any::<bool>())))
                .prop_map(move |(ew, len, bite, alcove)| {
                    let mut b = if ew { ew_corridor("c", len, bite) } else { ns_corridor("c", len, bite) };
                    if let Some((i, left)) = alcove {
                        let along = i % len;
                        let off = if left { -1 } else { 1 };
                        b.floor(if ew { Cell::new(along, off) } else { Cell::new(off, along) });
                    }
                    b.build(TemplateId(id)).unwrap()
                })
        }

        fn overlap(fixed: &ModuleShape, moving: &ModuleShape, delta: Cell) -> BTreeSet<Cell> {
            moving.floor.iter().map(|c| *c + delta).filter(|p| fixed.floor.contains(p)).collect()
        }

        fn check_asymmetric(fixed: &ModuleShape, moving: &ModuleShape) -> Result<(), TestCaseError> {
            let mut counts = RejectionCounts::default();
            let space = compute_space(fixed, moving, &mut counts);
            let mut per_pair: BTreeMap<(usize, usize), Vec<u32>> = BTreeMap::new();
            for d in space.dockings() {
                let (sock, conn_off) = if fixed.is_connector() {
                    (&fixed.sockets[d.fixed_socket], Cell::ORIGIN)
                } else {
                    (&moving.sockets[d.moving_socket], d.offset)
                };
                prop_assert!(d.depth < sock.bite_depth);
                let ray: BTreeSet<Cell> = (0..=d.depth).map(|i| sock.ray_cell(i) + conn_off).collect();
                for p in overlap(fixed, moving, d.offset) {
                    prop_assert!(ray.contains(&p), "{} of {:?} outside ray {:?}", p, d, ray);
                }
                per_pair.entry((d.fixed_socket, d.moving_socket)).or_default().push(d.depth);
            }
            for ((f, m), depths) in per_pair {
                let bite = if fixed.is_connector() { fixed.sockets[f].bite_depth } else { moving.sockets[m].bite_depth };
                prop_assert!(depths.len() as u32 <= bite);
                let distinct: BTreeSet<u32> = depths.iter().copied().collect();
                prop_assert_eq!(distinct.len(), depths.len());
            }
            Ok(())
        }

        proptest! {
            #[test]
            fn room_dockings_share_exactly_the_door(a in room_strategy(0), b in room_strategy(1)) {
                let mut counts = RejectionCounts::default();
                let space = compute_space(&a, &b, &mut counts);
                for d in space.dockings() {
                    let sa = &a.sockets[d.fixed_socket];
                    let sb = &b.sockets[d.moving_socket];
                    prop_assert_eq!(d.offset, sa.cell - sb.cell);
                    prop_assert_eq!(d.depth, 0);
                    prop_assert_eq!(overlap(&a, &b, d.offset), BTreeSet::from([sa.cell]));
                }
                prop_assert_eq!(counts.accepted, space.dockings().len());
            }

            #[test]
            fn connector_dockings_stay_on_the_ray(c in corridor_strategy(0), r in room_strategy(1)) {
                check_asymmetric(&c, &r)?;
                check_asymmetric(&r, &c)?;
            }
        }
    }
}
