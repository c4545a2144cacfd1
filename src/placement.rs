use std::collections::BTreeSet;
use serde_derive::{Deserialize, Serialize};
use crate::core::{EdgeKey, NodeId, Role, TemplateId};
use crate::geometry::{Cell, ModuleShape, Socket};

/// A socket of a committed placement, by position in the placement stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SocketRef {
    pub placement: usize,
    pub socket: usize,
}

impl SocketRef {
    pub fn new(placement: usize, socket: usize) -> Self {
        SocketRef { placement, socket }
    }
}

/// A module instance at an absolute position. `floor` and `walls` are in
/// world coordinates and reflect any carving done so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub role: Role,
    pub template: TemplateId,
    pub root: Cell,
    pub floor: BTreeSet<Cell>,
    pub walls: BTreeSet<Cell>,
    // Every socket this placement's commit step used, its own and earlier
    // placements'.
    pub consumed: Vec<SocketRef>,
    pub node: Option<NodeId>,
    pub edge: Option<EdgeKey>,
}

impl Placement {
    pub fn new(shape: &ModuleShape, root: Cell) -> Self {
        Placement {
            role: shape.role,
            template: shape.template,
            root,
            floor: shape.floor.iter().map(|c| *c + root).collect(),
            walls: shape.walls.iter().map(|c| *c + root).collect(),
            consumed: Vec::new(),
            node: None,
            edge: None,
        }
    }

    pub fn for_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    pub fn for_edge(mut self, edge: EdgeKey) -> Self {
        self.edge = Some(edge);
        self
    }

    /// World position of a socket of this placement.
    pub fn socket_cell(&self, socket: &Socket) -> Cell {
        socket.cell + self.root
    }

    /// Carves a doorway through `socket` bitten to `depth`. Returns the cells
    /// changed as (floor removed, walls removed, floor added).
    pub(crate) fn carve(&mut self, socket: &Socket, depth: u32) -> Carving {
        let mut carving = Carving::default();
        let t = socket.side.tangent();
        for i in 0..depth {
            let c = socket.ray_cell(i) + self.root;
            if self.floor.remove(&c) {
                carving.floor_removed.push(c);
            }
            for w in [c, c + t, c - t] {
                if self.walls.remove(&w) {
                    carving.walls_removed.push(w);
                }
            }
        }
        let door = socket.ray_cell(depth) + self.root;
        if self.walls.remove(&door) {
            carving.walls_removed.push(door);
        }
        if self.floor.insert(door) {
            carving.floor_added.push(door);
        }
        carving
    }
}

/// Cells changed by one carve, enough to undo it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Carving {
    pub floor_removed: Vec<Cell>,
    pub walls_removed: Vec<Cell>,
    pub floor_added: Vec<Cell>,
}

#[cfg(test)]
mod test {
    use crate::geometry::Side;
    use crate::geometry::test_util::{ew_corridor, rect_room};
    use super::*;

    #[test]
    fn test_new_translates_cells() {
        let shape = rect_room("r", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let p = Placement::new(&shape, Cell::new(10, -5)).for_node(NodeId(2));
        assert!(p.floor.contains(&Cell::new(13, -4)));
        assert!(p.walls.contains(&Cell::new(9, -6)));
        assert_eq!(p.socket_cell(&shape.sockets[0]), Cell::new(13, -4));
        assert_eq!(p.node, Some(NodeId(2)));
    }

    #[test]
    fn test_carve_shortens_corridor() {
        let shape = ew_corridor("c", 5, 3).build(TemplateId(0)).unwrap();
        let mut p = Placement::new(&shape, Cell::ORIGIN);
        // Bite two cells off the east end.
        let carving = p.carve(&shape.sockets[1], 2);
        assert_eq!(carving.floor_removed.len(), 2);
        assert_eq!(carving.walls_removed.len(), 4);
        assert!(carving.floor_added.is_empty());
        assert!(p.floor.contains(&Cell::new(2, 0)));
        assert!(!p.floor.contains(&Cell::new(3, 0)));
        assert!(!p.walls.contains(&Cell::new(4, 1)));
        assert!(p.walls.contains(&Cell::new(2, 1)));
    }

    #[test]
    fn test_carve_at_depth_zero_opens_door() {
        let shape = rect_room("r", 3, 3, &[Side::East]).build(TemplateId(0)).unwrap();
        let mut p = Placement::new(&shape, Cell::ORIGIN);
        let before = p.clone();
        assert_eq!(p.carve(&shape.sockets[0], 0), Carving::default());
        assert_eq!(p, before);
    }
}
