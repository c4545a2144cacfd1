use std::collections::BTreeSet;
use std::fmt::Display;
use std::ops::{Add, Mul, Neg, Sub};
use serde_derive::{Deserialize, Serialize};
use strum_macros::EnumIter;
use crate::core::{Error, Role, TemplateId};

/// Integer grid coordinate. The grid is unbounded; y grows to the south.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const ORIGIN: Cell = Cell { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Cell { x, y }
    }

    pub fn manhattan(&self, other: Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl Add for Cell {
    type Output = Cell;
    fn add(self, rhs: Cell) -> Cell { Cell::new(self.x + rhs.x, self.y + rhs.y) }
}

impl Sub for Cell {
    type Output = Cell;
    fn sub(self, rhs: Cell) -> Cell { Cell::new(self.x - rhs.x, self.y - rhs.y) }
}

impl Neg for Cell {
    type Output = Cell;
    fn neg(self) -> Cell { Cell::new(-self.x, -self.y) }
}

impl Mul<i32> for Cell {
    type Output = Cell;
    fn mul(self, k: i32) -> Cell { Cell::new(self.x * k, self.y * k) }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The side of a module a socket faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Serialize, Deserialize, strum_macros::Display)]
pub enum Side {
    North,
    East,
    South,
    West,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::North => Side::South,
            Side::East => Side::West,
            Side::South => Side::North,
            Side::West => Side::East,
        }
    }

    /// Unit step that leaves the module through this side.
    pub fn outward(self) -> Cell {
        match self {
            Side::North => Cell::new(0, -1),
            Side::East => Cell::new(1, 0),
            Side::South => Cell::new(0, 1),
            Side::West => Cell::new(-1, 0),
        }
    }

    /// Unit step into the module, along the depth axis of a socket.
    pub fn inward(self) -> Cell {
        -self.outward()
    }

    /// Unit step perpendicular to the depth axis.
    pub fn tangent(self) -> Cell {
        match self {
            Side::North | Side::South => Cell::new(1, 0),
            Side::East | Side::West => Cell::new(0, 1),
        }
    }
}

/// Sockets sharing a span id on the same module are locked together: using
/// any one of them blocks the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanId(pub u32);

/// A docking point on a module boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socket {
    pub side: Side,
    // Offset from the module root.
    pub cell: Cell,
    // How many cells a docking partner may penetrate inward from `cell`.
    // Always at least 1; 1 means strict single-cell docking.
    pub bite_depth: u32,
    pub width: u32,
    pub span: Option<SpanId>,
}

impl Socket {
    pub fn new(side: Side, cell: Cell) -> Self {
        Socket { side, cell, bite_depth: 1, width: 1, span: None }
    }

    pub fn with_bite_depth(mut self, depth: u32) -> Self {
        self.bite_depth = depth.max(1);
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn with_span(mut self, span: SpanId) -> Self {
        self.span = Some(span);
        self
    }

    /// Whether a socket on a partner module could dock with this one at all.
    pub fn faces(&self, other: &Socket) -> bool {
        self.side == other.side.opposite() && self.width == other.width
    }

    /// The cell `depth` steps inward from the socket (in local coordinates).
    pub fn ray_cell(&self, depth: u32) -> Cell {
        self.cell + self.side.inward() * depth as i32
    }
}

/// The discrete geometry of one module template in module-local coordinates.
/// Floor and wall sets are disjoint; socket cells are always floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleShape {
    pub template: TemplateId,
    pub name: String,
    pub role: Role,
    pub floor: BTreeSet<Cell>,
    pub walls: BTreeSet<Cell>,
    pub sockets: Vec<Socket>,
}

impl ModuleShape {
    pub fn is_empty(&self) -> bool {
        self.floor.is_empty()
    }

    pub fn is_connector(&self) -> bool {
        self.role == Role::Connector
    }

    pub fn socket(&self, index: usize) -> Option<&Socket> {
        self.sockets.get(index)
    }

    /// Indices of sockets that could dock with a partner socket on `side`
    /// with the given width.
    pub fn sockets_facing(&self, side: Side, width: u32) -> Vec<usize> {
        self.sockets.iter().enumerate()
            .filter(|(_, s)| s.side == side.opposite() && s.width == width)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Builds a ModuleShape while maintaining the floor/wall invariants.
pub struct ShapeBuilder {
    name: String,
    role: Role,
    floor: BTreeSet<Cell>,
    walls: BTreeSet<Cell>,
    sockets: Vec<Socket>,
}

impl ShapeBuilder {
    pub fn new<S: Into<String>>(name: S, role: Role) -> Self {
        ShapeBuilder {
            name: name.into(),
            role,
            floor: BTreeSet::new(),
            walls: BTreeSet::new(),
            sockets: Vec::new(),
        }
    }

    pub fn floor(&mut self, cell: Cell) -> &mut Self {
        self.walls.remove(&cell);
        self.floor.insert(cell);
        self
    }

    pub fn wall(&mut self, cell: Cell) -> &mut Self {
        if !self.floor.contains(&cell) {
            self.walls.insert(cell);
        }
        self
    }

    /// Fills a w×h floor rectangle at `origin` and rings it with walls.
    pub fn walled_rect(&mut self, origin: Cell, w: i32, h: i32) -> &mut Self {
        for y in -1..=h {
            for x in -1..=w {
                let c = origin + Cell::new(x, y);
                if x < 0 || y < 0 || x >= w || y >= h {
                    self.wall(c);
                } else {
                    self.floor(c);
                }
            }
        }
        self
    }

    pub fn socket(&mut self, socket: Socket) -> &mut Self {
        self.sockets.push(socket);
        self
    }

    pub fn build(&self, template: TemplateId) -> Result<ModuleShape, Error> {
        if self.sockets.is_empty() {
            return Err(Error::new(format!("module {:?} has no sockets", self.name)));
        }
        let mut floor = self.floor.clone();
        let mut walls = self.walls.clone();
        for s in &self.sockets {
            // Doors are carved through walls.
            walls.remove(&s.cell);
            floor.insert(s.cell);
        }
        Ok(ModuleShape {
            template,
            name: self.name.clone(),
            role: self.role,
            floor,
            walls,
            sockets: self.sockets.clone(),
        })
    }
}

/// Explicit registry of template shapes, indexed by TemplateId.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeRegistry {
    shapes: Vec<ModuleShape>,
}

impl ShapeRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn next_id(&self) -> TemplateId {
        TemplateId(self.shapes.len() as u32)
    }

    pub fn register(&mut self, builder: &ShapeBuilder) -> Result<TemplateId, Error> {
        let id = self.next_id();
        let shape = builder.build(id)?;
        self.shapes.push(shape);
        Ok(id)
    }

    /// Register a shape produced elsewhere (e.g. by a ShapeSource). Its
    /// template id must be the next free one.
    pub fn insert(&mut self, shape: ModuleShape) -> Result<TemplateId, Error> {
        let id = self.next_id();
        if shape.template != id {
            return Err(Error::new(format!(
                "shape {:?} has id {} but the next free id is {}", shape.name, shape.template, id,
            )));
        }
        self.shapes.push(shape);
        Ok(id)
    }

    pub fn get(&self, id: TemplateId) -> Option<&ModuleShape> {
        self.shapes.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<&ModuleShape> {
        self.shapes.iter().find(|s| s.name == name)
    }

    pub fn ids(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.shapes.iter().map(|s| s.template)
    }

    pub fn len(&self) -> usize { self.shapes.len() }

    pub fn is_empty(&self) -> bool { self.shapes.is_empty() }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;

    /// w×h walled room with one socket in the middle of each listed side.
    pub fn rect_room(name: &str, w: i32, h: i32, sides: &[Side]) -> ShapeBuilder {
        let mut b = ShapeBuilder::new(name, Role::Room);
        b.walled_rect(Cell::ORIGIN, w, h);
        for side in sides {
            let cell = match side {
                Side::North => Cell::new(w / 2, -1),
                Side::South => Cell::new(w / 2, h),
                Side::West => Cell::new(-1, h / 2),
                Side::East => Cell::new(w, h / 2),
            };
            b.socket(Socket::new(*side, cell));
        }
        b
    }

    /// Straight east-west corridor of the given length, walls on both sides
    /// and sockets at both ends with the given bite depth.
    pub fn ew_corridor(name: &str, len: i32, bite: u32) -> ShapeBuilder {
        let mut b = ShapeBuilder::new(name, Role::Connector);
        for x in 0..len {
            b.floor(Cell::new(x, 0));
            b.wall(Cell::new(x, -1));
            b.wall(Cell::new(x, 1));
        }
        b.socket(Socket::new(Side::West, Cell::new(0, 0)).with_bite_depth(bite));
        b.socket(Socket::new(Side::East, Cell::new(len - 1, 0)).with_bite_depth(bite));
        b
    }

    /// Straight north-south corridor, the vertical twin of ew_corridor.
    pub fn ns_corridor(name: &str, len: i32, bite: u32) -> ShapeBuilder {
        let mut b = ShapeBuilder::new(name, Role::Connector);
        for y in 0..len {
            b.floor(Cell::new(0, y));
            b.wall(Cell::new(-1, y));
            b.wall(Cell::new(1, y));
        }
        b.socket(Socket::new(Side::North, Cell::new(0, 0)).with_bite_depth(bite));
        b.socket(Socket::new(Side::South, Cell::new(0, len - 1)).with_bite_depth(bite));
        b
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;
    use super::*;
    use super::test_util::*;

    #[test]
    fn test_side_opposite_is_involution() {
        for side in Side::iter() {
            assert_ne!(side.opposite(), side);
            assert_eq!(side.opposite().opposite(), side);
            assert_eq!(side.inward() + side.outward(), Cell::ORIGIN);
            assert_eq!(side.opposite().outward(), side.inward());
            // Tangent is perpendicular to the depth axis.
            let t = side.tangent();
            let o = side.outward();
            assert_eq!(t.x * o.x + t.y * o.y, 0);
        }
    }

    #[test]
    fn test_socket_cells_forced_to_floor() {
        let shape = rect_room("r", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let door = Cell::new(3, 1);
        assert!(shape.floor.contains(&door));
        assert!(!shape.walls.contains(&door));
        assert_eq!(shape.floor.len(), 10);
        assert_eq!(shape.walls.len(), 15);
        assert!(shape.floor.is_disjoint(&shape.walls));
    }

    #[test]
    fn test_builder_requires_sockets() {
        let mut b = ShapeBuilder::new("closet", Role::Room);
        b.walled_rect(Cell::ORIGIN, 2, 2);
        assert!(b.build(TemplateId(0)).is_err());
    }

    #[test]
    fn test_ray_cell_goes_inward() {
        let s = Socket::new(Side::West, Cell::new(0, 0)).with_bite_depth(3);
        assert_eq!(s.ray_cell(0), Cell::new(0, 0));
        assert_eq!(s.ray_cell(2), Cell::new(2, 0));
        let n = Socket::new(Side::North, Cell::new(1, -1));
        assert_eq!(n.ray_cell(1), Cell::new(1, 0));
    }

    #[test]
    fn test_registry_ids_are_dense() {
        let mut reg = ShapeRegistry::new();
        let a = reg.register(&rect_room("a", 3, 3, &[Side::East])).unwrap();
        let b = reg.register(&ew_corridor("c", 4, 2)).unwrap();
        assert_eq!(a, TemplateId(0));
        assert_eq!(b, TemplateId(1));
        assert_eq!(reg.get(b).map(|s| s.role), Some(Role::Connector));
        assert_eq!(reg.by_name("a").map(|s| s.template), Some(a));
        let stray = rect_room("x", 2, 2, &[Side::West]).build(TemplateId(7)).unwrap();
        assert!(reg.insert(stray).is_err());
    }

    #[test]
    fn test_sockets_facing() {
        let shape = rect_room("r", 3, 3, &[Side::East, Side::West]).build(TemplateId(0)).unwrap();
        // A partner socket facing West docks with our East socket.
        assert_eq!(shape.sockets_facing(Side::West, 1), vec![0]);
        assert_eq!(shape.sockets_facing(Side::West, 2), Vec::<usize>::new());
    }
}
