use std::collections::{HashMap, HashSet};
use bit_set::BitSet;
use crate::core::{EdgeKey, NodeId};
use crate::geometry::{Cell, Socket, SpanId};
use crate::placement::{Carving, Placement, SocketRef};

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Placed,
    Socket(SocketRef, Option<SpanId>),
    Edge(EdgeKey),
    Carve(usize, Carving),
}

/// Journal position to roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(usize);

fn incr(counts: &mut HashMap<Cell, u32>, c: Cell) {
    *counts.entry(c).or_default() += 1;
}

fn decr(counts: &mut HashMap<Cell, u32>, c: Cell) {
    if let Some(n) = counts.get_mut(&c) {
        *n -= 1;
        if *n == 0 {
            counts.remove(&c);
        }
    }
}

/// All mutable search state of one attempt: the placement stack, reference
/// counted occupancy, socket usage and the set of realized edges. Every
/// mutation is journaled and undone in reverse order by rollback, so rolling
/// back to a checkpoint gives a ledger equal to the one that existed when the
/// checkpoint was taken.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    placements: Vec<Placement>,
    floor: HashMap<Cell, u32>,
    walls: HashMap<Cell, u32>,
    used: Vec<BitSet>,
    spans: HashMap<(usize, SpanId), u32>,
    nodes: HashMap<NodeId, usize>,
    edges: HashSet<EdgeKey>,
    journal: Vec<Entry>,
    // Journal length at the moment each placement was pushed.
    marks: Vec<usize>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    /// Number of committed placements.
    pub fn depth(&self) -> usize { self.placements.len() }

    pub fn placements(&self) -> &[Placement] { &self.placements }

    pub fn placement(&self, index: usize) -> Option<&Placement> {
        self.placements.get(index)
    }

    pub fn node_placement(&self, node: NodeId) -> Option<usize> {
        self.nodes.get(&node).copied()
    }

    pub fn placed_nodes(&self) -> usize { self.nodes.len() }

    pub fn is_edge_placed(&self, edge: EdgeKey) -> bool {
        self.edges.contains(&edge)
    }

    pub fn placed_edges(&self) -> usize { self.edges.len() }

    pub fn floor_count(&self, c: Cell) -> u32 {
        self.floor.get(&c).copied().unwrap_or(0)
    }

    pub fn wall_count(&self, c: Cell) -> u32 {
        self.walls.get(&c).copied().unwrap_or(0)
    }

    pub fn is_socket_used(&self, sref: SocketRef) -> bool {
        self.used.get(sref.placement).map_or(false, |b| b.contains(sref.socket))
    }

    /// A socket is available if neither it nor any socket sharing its span
    /// has been used.
    pub fn is_available(&self, sref: SocketRef, span: Option<SpanId>) -> bool {
        if sref.placement >= self.placements.len() || self.is_socket_used(sref) {
            return false;
        }
        match span {
            Some(s) => !self.spans.contains_key(&(sref.placement, s)),
            None => true,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    /// Pushes a placement and adds its cells to the occupancy. Records its
    /// node and edge, if any. Returns its index in the stack.
    pub fn commit(&mut self, placement: Placement) -> usize {
        let index = self.placements.len();
        for c in &placement.floor {
            incr(&mut self.floor, *c);
        }
        for c in &placement.walls {
            incr(&mut self.walls, *c);
        }
        if let Some(n) = placement.node {
            self.nodes.insert(n, index);
        }
        if let Some(e) = placement.edge {
            self.edges.insert(e);
        }
        self.marks.push(self.journal.len());
        self.journal.push(Entry::Placed);
        self.used.push(BitSet::new());
        self.placements.push(placement);
        index
    }

    /// Marks a socket used and locks its span. Marking a used socket again
    /// does nothing.
    pub fn mark_socket(&mut self, sref: SocketRef, span: Option<SpanId>) {
        let Some(bits) = self.used.get_mut(sref.placement) else {
            return;
        };
        if !bits.insert(sref.socket) {
            return;
        }
        if let Some(s) = span {
            *self.spans.entry((sref.placement, s)).or_default() += 1;
        }
        self.journal.push(Entry::Socket(sref, span));
    }

    /// Records an edge realized without a new placement.
    pub fn link_edge(&mut self, edge: EdgeKey) {
        if self.edges.insert(edge) {
            self.journal.push(Entry::Edge(edge));
        }
    }

    /// Carves a doorway through a socket of a committed placement and updates
    /// the occupancy to match.
    pub fn carve(&mut self, index: usize, socket: &Socket, depth: u32) {
        let Some(p) = self.placements.get_mut(index) else {
            return;
        };
        let carving = p.carve(socket, depth);
        for c in &carving.floor_removed {
            decr(&mut self.floor, *c);
        }
        for c in &carving.walls_removed {
            decr(&mut self.walls, *c);
        }
        for c in &carving.floor_added {
            incr(&mut self.floor, *c);
        }
        self.journal.push(Entry::Carve(index, carving));
    }

    fn undo(&mut self, entry: Entry) {
        match entry {
            Entry::Placed => {
                self.marks.pop();
                self.used.pop();
                if let Some(p) = self.placements.pop() {
                    for c in &p.floor {
                        decr(&mut self.floor, *c);
                    }
                    for c in &p.walls {
                        decr(&mut self.walls, *c);
                    }
                    if let Some(n) = p.node {
                        self.nodes.remove(&n);
                    }
                    if let Some(e) = p.edge {
                        self.edges.remove(&e);
                    }
                }
            },
            Entry::Socket(sref, span) => {
                if let Some(bits) = self.used.get_mut(sref.placement) {
                    bits.remove(sref.socket);
                }
                if let Some(s) = span {
                    let key = (sref.placement, s);
                    if let Some(n) = self.spans.get_mut(&key) {
                        *n -= 1;
                        if *n == 0 {
                            self.spans.remove(&key);
                        }
                    }
                }
            },
            Entry::Edge(e) => {
                self.edges.remove(&e);
            },
            Entry::Carve(index, carving) => {
                let Some(p) = self.placements.get_mut(index) else {
                    return;
                };
                for c in carving.floor_added {
                    p.floor.remove(&c);
                    decr(&mut self.floor, c);
                }
                for c in carving.walls_removed {
                    p.walls.insert(c);
                    incr(&mut self.walls, c);
                }
                for c in carving.floor_removed {
                    p.floor.insert(c);
                    incr(&mut self.floor, c);
                }
            },
        }
    }

    /// Undoes every mutation made after `cp`. Returns the number of journal
    /// entries undone.
    pub fn rollback(&mut self, cp: Checkpoint) -> usize {
        let mut undone = 0;
        while self.journal.len() > cp.0 {
            match self.journal.pop() {
                Some(e) => self.undo(e),
                None => break,
            }
            undone += 1;
        }
        undone
    }

    /// Rolls back until exactly `depth` placements remain, along with every
    /// other mutation made after the placement at `depth` was pushed.
    pub fn rollback_to_depth(&mut self, depth: usize) -> usize {
        match self.marks.get(depth) {
            Some(m) => self.rollback(Checkpoint(*m)),
            None => 0,
        }
    }

    /// Whether the occupancy equals what the committed placements imply.
    pub fn is_consistent(&self) -> bool {
        let mut floor = HashMap::new();
        let mut walls = HashMap::new();
        for p in &self.placements {
            for c in &p.floor {
                incr(&mut floor, *c);
            }
            for c in &p.walls {
                incr(&mut walls, *c);
            }
        }
        floor == self.floor && walls == self.walls
    }

    /// Whether `floor` and `walls` can be added without clashing with the
    /// committed cells of any placement outside `exempt`. Floor may not meet
    /// floor or wall; walls may meet walls but not floor. The exempt
    /// placements' own overlap is governed by the configuration spaces.
    pub fn clashes<'a, F, W>(&self, floor: F, walls: W, exempt: &[usize]) -> bool
    where
        F: IntoIterator<Item = &'a Cell>,
        W: IntoIterator<Item = &'a Cell>,
    {
        let exempt: Vec<&Placement> = exempt.iter().filter_map(|i| self.placements.get(*i)).collect();
        let other_floor = |c: &Cell| {
            let own = exempt.iter().filter(|p| p.floor.contains(c)).count() as u32;
            self.floor_count(*c) > own
        };
        let other_wall = |c: &Cell| {
            let own = exempt.iter().filter(|p| p.walls.contains(c)).count() as u32;
            self.wall_count(*c) > own
        };
        floor.into_iter().any(|c| other_floor(c) || other_wall(c))
            || walls.into_iter().any(|c| other_floor(c))
    }
}

#[cfg(test)]
mod test {
    use crate::core::{Role, TemplateId};
    use crate::geometry::{ShapeBuilder, Side};
    use crate::geometry::test_util::{ew_corridor, rect_room};
    use super::*;

    fn room_at(root: Cell, node: u32) -> Placement {
        let shape = rect_room("r", 3, 3, &[Side::East, Side::West]).build(TemplateId(0)).unwrap();
        Placement::new(&shape, root).for_node(NodeId(node))
    }

    #[test]
    fn test_shared_walls_are_counted() {
        let mut ledger = Ledger::new();
        ledger.commit(room_at(Cell::ORIGIN, 0));
        // Second room shares the wall column x = 3.
        ledger.commit(room_at(Cell::new(4, 0), 1));
        assert_eq!(ledger.wall_count(Cell::new(3, 0)), 2);
        // Both rooms' doors sit on (3, 1).
        assert_eq!(ledger.floor_count(Cell::new(3, 1)), 2);
        ledger.rollback_to_depth(1);
        assert_eq!(ledger.wall_count(Cell::new(3, 0)), 1);
        assert_eq!(ledger.node_placement(NodeId(1)), None);
        assert_eq!(ledger.node_placement(NodeId(0)), Some(0));
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_span_locks_siblings() {
        let mut b = ShapeBuilder::new("r", Role::Room);
        b.walled_rect(Cell::ORIGIN, 3, 3)
            .socket(Socket::new(Side::East, Cell::new(3, 0)).with_span(SpanId(0)))
            .socket(Socket::new(Side::East, Cell::new(3, 2)).with_span(SpanId(0)))
            .socket(Socket::new(Side::West, Cell::new(-1, 1)));
        let shape = b.build(TemplateId(0)).unwrap();
        let mut ledger = Ledger::new();
        let p = ledger.commit(Placement::new(&shape, Cell::ORIGIN));
        let cp = ledger.checkpoint();
        ledger.mark_socket(SocketRef::new(p, 0), shape.sockets[0].span);
        assert!(!ledger.is_available(SocketRef::new(p, 0), shape.sockets[0].span));
        assert!(!ledger.is_available(SocketRef::new(p, 1), shape.sockets[1].span));
        assert!(ledger.is_available(SocketRef::new(p, 2), shape.sockets[2].span));
        assert_eq!(ledger.rollback(cp), 1);
        assert!(ledger.is_available(SocketRef::new(p, 1), shape.sockets[1].span));
        assert!(!ledger.is_available(SocketRef::new(p + 1, 0), None));
    }

    #[test]
    fn test_carve_is_undone() {
        let shape = ew_corridor("c", 5, 3).build(TemplateId(0)).unwrap();
        let mut ledger = Ledger::new();
        ledger.commit(Placement::new(&shape, Cell::ORIGIN));
        let before = ledger.clone();
        let cp = ledger.checkpoint();
        ledger.carve(0, &shape.sockets[1], 2);
        assert_eq!(ledger.floor_count(Cell::new(4, 0)), 0);
        assert!(ledger.is_consistent());
        ledger.rollback(cp);
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_clashes() {
        let mut ledger = Ledger::new();
        ledger.commit(room_at(Cell::ORIGIN, 0));
        let other = room_at(Cell::new(4, 0), 1);
        // Shares a door cell with room 0, which only an exemption allows.
        assert!(ledger.clashes(&other.floor, &other.walls, &[]));
        assert!(!ledger.clashes(&other.floor, &other.walls, &[0]));
        let far = room_at(Cell::new(20, 0), 2);
        assert!(!ledger.clashes(&far.floor, &far.walls, &[]));
        let inside = room_at(Cell::new(1, 0), 3);
        assert!(ledger.clashes(&inside.floor, &inside.walls, &[]));
    }

    #[test]
    fn test_link_edge_rolls_back() {
        let mut ledger = Ledger::new();
        ledger.commit(room_at(Cell::ORIGIN, 0));
        ledger.commit(room_at(Cell::new(4, 0), 1));
        let e = EdgeKey::new(NodeId(0), NodeId(1));
        let cp = ledger.checkpoint();
        ledger.link_edge(e);
        ledger.link_edge(e);
        assert!(ledger.is_edge_placed(e));
        assert_eq!(ledger.rollback(cp), 1);
        assert!(!ledger.is_edge_placed(e));
    }

    mod proptests {
        use proptest::prelude::*;
        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Commit(i32, i32),
            Mark(usize, usize),
            Link(u32, u32),
            Carve(usize, usize, u32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (-6i32..6, -6i32..6).prop_map(|(x, y)| Op::Commit(x, y)),
                (0usize..6, 0usize..3).prop_map(|(p, s)| Op::Mark(p, s)),
                (0u32..4, 0u32..4).prop_map(|(a, b)| Op::Link(a, b)),
                (0usize..6, 0usize..2, 0u32..3).prop_map(|(p, s, d)| Op::Carve(p, s, d)),
            ]
        }

        proptest! {
            #[test]
            fn rollback_restores_prior_state(
                prefix in proptest::collection::vec(op(), 0..6),
                ops in proptest::collection::vec(op(), 1..30),
            ) {
                let corridor = ew_corridor("c", 4, 3).build(TemplateId(0)).unwrap();
                let mut b = ShapeBuilder::new("r", Role::Room);
                b.walled_rect(Cell::ORIGIN, 2, 2)
                    .socket(Socket::new(Side::East, Cell::new(2, 0)).with_span(SpanId(1)))
                    .socket(Socket::new(Side::East, Cell::new(2, 1)).with_span(SpanId(1)));
                let room = b.build(TemplateId(1)).unwrap();
                let shapes = [&corridor, &room];
                let apply = |ledger: &mut Ledger, op: &Op| match op {
                    Op::Commit(x, y) => {
                        let shape = shapes[(x + y).rem_euclid(2) as usize];
                        ledger.commit(Placement::new(shape, Cell::new(*x, *y)));
                    },
                    Op::Mark(p, s) => {
                        if let Some(pl) = ledger.placement(*p) {
                            let shape = shapes[pl.template.index()];
                            if let Some(sock) = shape.socket(*s) {
                                ledger.mark_socket(SocketRef::new(*p, *s), sock.span);
                            }
                        }
                    },
                    Op::Link(a, b) => {
                        if a != b {
                            ledger.link_edge(EdgeKey::new(NodeId(*a), NodeId(*b)));
                        }
                    },
                    Op::Carve(p, s, d) => {
                        if let Some(pl) = ledger.placement(*p) {
                            let shape = shapes[pl.template.index()];
                            if let Some(sock) = shape.socket(*s) {
                                let sock = sock.clone();
                                ledger.carve(*p, &sock, *d);
                            }
                        }
                    },
                };
                let mut ledger = Ledger::new();
                for op in &prefix {
                    apply(&mut ledger, op);
                }
                let before = ledger.clone();
                let cp = ledger.checkpoint();
                for op in &ops {
                    apply(&mut ledger, op);
                    prop_assert!(ledger.is_consistent());
                }
                ledger.rollback(cp);
                prop_assert_eq!(&ledger, &before);
                ledger.rollback_to_depth(0);
                prop_assert_eq!(ledger.depth(), 0);
                ledger.rollback(Ledger::new().checkpoint());
                prop_assert_eq!(ledger, Ledger::new());
            }
        }
    }
}
