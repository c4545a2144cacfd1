use std::collections::HashSet;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use serde_derive::{Deserialize, Serialize};
use strum_macros::EnumIter;
use tracing::{debug, info, trace};
use crate::catalog::{Catalog, Slot};
use crate::config::SolverConfig;
use crate::config_space::{ConfigSpaceLibrary, Docking};
use crate::core::{EdgeKey, Error, NodeId, Role, TemplateId};
use crate::debug::NullObserver;
use crate::geometry::{Cell, ModuleShape, ShapeRegistry, Side, Socket};
use crate::graph::{Chain, LevelGraph, Layout};
use crate::ledger::{Checkpoint, Ledger};
use crate::placement::{Placement, SocketRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum_macros::Display, Serialize, Deserialize)]
pub enum FailureKind {
    ConfigurationSpaceEmpty,
    SocketExhausted,
    OverlapRejected,
    DeadlineExceeded,
    InvariantViolation,
}

impl FailureKind {
    /// Whether the search may back up and try another candidate.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            FailureKind::ConfigurationSpaceEmpty | FailureKind::SocketExhausted | FailureKind::OverlapRejected,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub nodes_placed: usize,
    pub nodes_total: usize,
    pub edges_placed: usize,
    pub edges_total: usize,
}

impl Progress {
    fn score(&self) -> usize {
        self.nodes_placed + self.edges_placed
    }

    pub fn is_complete(&self) -> bool {
        self.nodes_placed == self.nodes_total && self.edges_placed == self.edges_total
    }
}

impl Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f, "nodes {}/{}, edges {}/{}",
            self.nodes_placed, self.nodes_total, self.edges_placed, self.edges_total,
        )
    }
}

/// Why a solve failed, with how far it got.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveError {
    pub kind: FailureKind,
    pub message: String,
    pub progress: Progress,
}

impl SolveError {
    pub fn new<S: Into<String>>(kind: FailureKind, message: S, progress: Progress) -> Self {
        SolveError { kind, message: message.into(), progress }
    }
}

impl Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} [{}]", self.kind, self.message, self.progress)
    }
}

impl std::error::Error for SolveError {}

/// A complete assignment of modules: one room per node and one connector per
/// edge, except edges realized by rooms docking directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub seed: u64,
    // Number of commit steps taken, including ones later rolled back.
    pub steps: usize,
    pub placements: Vec<Placement>,
}

impl Solution {
    pub fn room(&self, node: NodeId) -> Option<&Placement> {
        self.placements.iter().find(|p| p.node == Some(node))
    }

    pub fn connector(&self, edge: EdgeKey) -> Option<&Placement> {
        self.placements.iter().find(|p| p.edge == Some(edge))
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEvent {
    Seeded { node: NodeId, template: TemplateId, root: Cell },
    // A connector (and, unless both ends were already placed, a room) was
    // committed for the edge.
    Committed { edge: EdgeKey, connector: TemplateId, room: Option<TemplateId>, depth: usize },
    // Two placed rooms were docked directly.
    Linked { edge: EdgeKey, depth: usize },
    RolledBack { edge: Option<EdgeKey>, depth: usize, undone: usize },
    Rejected { edge: EdgeKey, kind: FailureKind },
    Finished { solved: bool, progress: Progress },
}

// Mostly for debugging, a StepObserver sees every event of the search along
// with the ledger as it stands right after the event. It is far easier to
// inject one of these when a layout refuses to solve than to instrument the
// engine itself.
pub trait StepObserver {
    fn after_step(&mut self, event: &SearchEvent, ledger: &Ledger);
}

/// Backtracking placement search over frozen shapes, spaces and catalog.
/// The engine itself holds no search state; every solve starts from an empty
/// ledger.
pub struct PlacementEngine<'a, C: Catalog> {
    shapes: &'a ShapeRegistry,
    library: &'a ConfigSpaceLibrary,
    catalog: &'a C,
    config: SolverConfig,
    stop: Option<&'a AtomicBool>,
}

impl <'a, C: Catalog> PlacementEngine<'a, C> {
    pub fn new(shapes: &'a ShapeRegistry, library: &'a ConfigSpaceLibrary, catalog: &'a C, config: SolverConfig) -> Self {
        PlacementEngine { shapes, library, catalog, config, stop: None }
    }

    /// Cancel the search (as if the deadline passed) once `stop` is set.
    pub fn with_stop(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn config(&self) -> &SolverConfig { &self.config }

    pub fn solve(&self, graph: &LevelGraph, chains: &[Chain], layout: Option<&Layout>) -> Result<Solution, SolveError> {
        self.solve_observed(graph, chains, layout, &mut NullObserver)
    }

    pub fn solve_observed(
        &self, graph: &LevelGraph, chains: &[Chain], layout: Option<&Layout>, observer: &mut dyn StepObserver,
    ) -> Result<Solution, SolveError> {
        let mut search = Search {
            shapes: self.shapes,
            library: self.library,
            catalog: self.catalog,
            config: &self.config,
            stop: self.stop,
            graph,
            layout,
            observer,
            order: Vec::new(),
            ledger: Ledger::new(),
            rng: ChaCha20Rng::seed_from_u64(self.config.seed),
            deadline: Instant::now() + self.config.deadline(),
            steps: 0,
            best: Progress::default(),
            last_tried: String::new(),
        };
        let result = search.run(chains);
        let progress = search.progress();
        search.emit(SearchEvent::Finished { solved: result.is_ok(), progress });
        match &result {
            Ok(s) => debug!(seed = self.config.seed, steps = s.steps, "solved"),
            Err(e) => debug!(seed = self.config.seed, kind = %e.kind, %progress, "failed: {}", e.message),
        }
        result
    }
}

/// Builds a placement of `shape` at `root` with the given doors already
/// carved.
fn carved(shape: &ModuleShape, root: Cell, doors: &[(usize, u32)]) -> Placement {
    let mut p = Placement::new(shape, root);
    for (s, depth) in doors {
        if let Some(socket) = shape.socket(*s) {
            p.carve(socket, *depth);
        }
    }
    p
}

// Connector ends as (primary socket, primary depth, secondary socket,
// secondary depth).
type Ends = (usize, u32, usize, u32);

struct Search<'e, C: Catalog> {
    shapes: &'e ShapeRegistry,
    library: &'e ConfigSpaceLibrary,
    catalog: &'e C,
    config: &'e SolverConfig,
    stop: Option<&'e AtomicBool>,
    graph: &'e LevelGraph,
    layout: Option<&'e Layout>,
    observer: &'e mut dyn StepObserver,
    // Flattened chain edges.
    order: Vec<(NodeId, NodeId)>,
    ledger: Ledger,
    rng: ChaCha20Rng,
    deadline: Instant,
    steps: usize,
    best: Progress,
    last_tried: String,
}

impl <'e, C: Catalog> Search<'e, C> {
    fn emit(&mut self, event: SearchEvent) {
        self.observer.after_step(&event, &self.ledger);
    }

    fn progress(&self) -> Progress {
        Progress {
            nodes_placed: self.ledger.placed_nodes(),
            nodes_total: self.graph.node_count(),
            edges_placed: self.ledger.placed_edges(),
            edges_total: self.graph.edge_count(),
        }
    }

    fn fail<S: Into<String>>(&self, kind: FailureKind, message: S) -> SolveError {
        SolveError::new(kind, message, self.progress())
    }

    fn violation<S: Into<String>>(&self, message: S) -> SolveError {
        self.fail(FailureKind::InvariantViolation, message)
    }

    fn check_deadline(&self) -> Result<(), SolveError> {
        if self.stop.map_or(false, |s| s.load(Ordering::Relaxed)) {
            return Err(self.fail(FailureKind::DeadlineExceeded, "stopped by another attempt"));
        }
        if Instant::now() >= self.deadline {
            return Err(self.fail(
                FailureKind::DeadlineExceeded,
                format!("deadline of {} ms passed", self.config.deadline_ms),
            ));
        }
        Ok(())
    }

    fn shape(&self, t: TemplateId) -> Result<&'e ModuleShape, SolveError> {
        let shapes = self.shapes;
        shapes.get(t).ok_or_else(|| self.violation(format!("unknown template {}", t)))
    }

    fn allows(&self, fixed: TemplateId, moving: TemplateId, offset: Cell) -> Result<bool, SolveError> {
        self.library.allows(fixed, moving, offset).map_err(|e| self.violation(e.message()))
    }

    /// Catalog templates for a slot, shuffled. A template whose role does not
    /// match the slot is a data error.
    fn templates(&mut self, slot: Slot<'_>, side: Option<Side>, width: Option<u32>, role: Role) -> Result<Vec<TemplateId>, SolveError> {
        let mut ts = self.catalog.templates_for(slot, side, width);
        for t in &ts {
            let shape = self.shape(*t)?;
            if shape.role != role {
                return Err(self.violation(format!(
                    "catalog offers {} ({}, a {}) for {}", t, shape.name, shape.role, slot,
                )));
            }
        }
        ts.shuffle(&mut self.rng);
        Ok(ts)
    }

    fn anchor(&self, index: usize) -> Result<(TemplateId, Cell), SolveError> {
        self.ledger.placement(index)
            .map(|p| (p.template, p.root))
            .ok_or_else(|| self.violation(format!("no placement {}", index)))
    }

    fn available_sockets(&mut self, index: usize, shape: &ModuleShape) -> Vec<usize> {
        let mut socks: Vec<usize> = shape.sockets.iter().enumerate()
            .filter(|(i, s)| self.ledger.is_available(SocketRef::new(index, *i), s.span))
            .map(|(i, _)| i)
            .collect();
        socks.shuffle(&mut self.rng);
        socks
    }

    /// Every way a connector can hang off a socket facing it: which of its
    /// sockets docks there and how deep, and which other socket leads on.
    fn connector_ends(&mut self, conn: &ModuleShape, facing: &Socket) -> Vec<Ends> {
        let mut ends = Vec::new();
        for p in conn.sockets_facing(facing.side, facing.width) {
            let sp = &conn.sockets[p];
            for (q, sq) in conn.sockets.iter().enumerate() {
                if q == p || (sp.span.is_some() && sp.span == sq.span) {
                    continue;
                }
                for x1 in 0..sp.bite_depth {
                    for x2 in 0..sq.bite_depth {
                        ends.push((p, x1, q, x2));
                    }
                }
            }
        }
        ends.shuffle(&mut self.rng);
        ends
    }

    /// Rooms that can dock on a connector's secondary door, as (template,
    /// socket, root). Sorted by distance to the hint when there is one.
    fn room_candidates(
        &mut self, room_type: &str, conn: TemplateId, conn_root: Cell, secondary: &Socket, door: Cell,
        hint: Option<Cell>,
    ) -> Result<Vec<(TemplateId, usize, Cell)>, SolveError> {
        let mut cands = Vec::new();
        let rooms = self.templates(
            Slot::Room(room_type), Some(secondary.side.opposite()), Some(secondary.width), Role::Room,
        )?;
        for tr in rooms {
            let shape = self.shape(tr)?;
            for r in shape.sockets_facing(secondary.side, secondary.width) {
                let root = door - shape.sockets[r].cell;
                if self.allows(conn, tr, root - conn_root)? {
                    cands.push((tr, r, root));
                }
            }
        }
        cands.shuffle(&mut self.rng);
        if let Some(h) = hint {
            cands.sort_by_key(|c| c.2.manhattan(h));
        }
        Ok(cands)
    }

    /// Checks the chains against the graph and flattens them. Returns the
    /// node to seed, if the graph has any nodes.
    fn validate(&mut self, chains: &[Chain]) -> Result<Option<NodeId>, SolveError> {
        let graph = self.graph;
        let mut seen = HashSet::new();
        for chain in chains {
            for &(a, b) in &chain.edges {
                for n in [a, b] {
                    if graph.room_type(n).is_none() {
                        return Err(self.violation(format!("chains name unknown node {}", n)));
                    }
                }
                let key = EdgeKey::new(a, b);
                if !graph.contains_edge(a, b) {
                    return Err(self.violation(format!("edge {} is not in the graph", key)));
                }
                if !seen.insert(key) {
                    return Err(self.violation(format!("edge {} appears in the chains twice", key)));
                }
                self.order.push((a, b));
            }
        }
        if let Some(e) = graph.edges().find(|e| !seen.contains(e)) {
            return Err(self.violation(format!("edge {} is not in any chain", e)));
        }
        let seed = match self.order.first() {
            Some(&(a, _)) => a,
            None => {
                return match graph.node_count() {
                    0 => Ok(None),
                    1 => Ok(graph.nodes().next()),
                    _ => Err(self.violation("graph has several nodes but no chains")),
                };
            },
        };
        let mut reached = HashSet::from([seed]);
        for &(a, b) in &self.order {
            if !reached.contains(&a) && !reached.contains(&b) {
                return Err(self.violation(format!(
                    "edge {} is reached before either endpoint is placed", EdgeKey::new(a, b),
                )));
            }
            reached.insert(a);
            reached.insert(b);
        }
        if let Some(n) = graph.nodes().find(|n| !reached.contains(n)) {
            return Err(self.violation(format!("node {} is not reached by the chains", n)));
        }
        Ok(Some(seed))
    }

    fn run(&mut self, chains: &[Chain]) -> Result<Solution, SolveError> {
        self.check_deadline()?;
        if let Some(node) = self.validate(chains)? {
            self.seed(node)?;
        }
        Ok(Solution {
            seed: self.config.seed,
            steps: self.steps,
            placements: self.ledger.placements().to_vec(),
        })
    }

    fn seed(&mut self, node: NodeId) -> Result<(), SolveError> {
        let graph = self.graph;
        let room_type = graph.room_type(node)
            .ok_or_else(|| self.violation(format!("unknown node {}", node)))?;
        let templates = self.templates(Slot::Room(room_type), None, None, Role::Room)?;
        if templates.is_empty() {
            return Err(self.violation(format!("no templates for {}", Slot::Room(room_type))));
        }
        let root = self.layout.and_then(|l| l.get(node)).unwrap_or(Cell::ORIGIN);
        let mut last = None;
        for t in templates {
            let shape = self.shape(t)?;
            let cp = self.ledger.checkpoint();
            self.ledger.commit(Placement::new(shape, root).for_node(node));
            self.last_tried = format!("{} ({}) for {}", t, shape.name, node);
            debug!(%node, template = %t, %root, "seeded");
            self.emit(SearchEvent::Seeded { node, template: t, root });
            match self.search(0) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind.is_recoverable() => {
                    let undone = self.ledger.rollback(cp);
                    self.emit(SearchEvent::RolledBack { edge: None, depth: self.ledger.depth(), undone });
                    last = Some(e);
                },
                Err(e) => return Err(e),
            }
        }
        let kind = last.as_ref().map_or(FailureKind::SocketExhausted, |e| e.kind);
        let message = match last {
            Some(e) => format!("no layout from {}; last failure: {}", node, e.message),
            None => format!("no layout from {}", node),
        };
        Err(SolveError::new(kind, message, self.best))
    }

    fn search(&mut self, pos: usize) -> Result<(), SolveError> {
        self.check_deadline()?;
        let progress = self.progress();
        if progress.score() > self.best.score() {
            self.best = progress;
        }
        let Some(&(u, v)) = self.order.get(pos) else {
            return Ok(());
        };
        let edge = EdgeKey::new(u, v);
        match (self.ledger.node_placement(u), self.ledger.node_placement(v)) {
            (None, None) => Err(self.violation(format!("edge {} reached with neither endpoint placed", edge))),
            (Some(a), None) => self.extend(pos, edge, a, v),
            (None, Some(a)) => self.extend(pos, edge, a, u),
            (Some(a), Some(b)) => self.close(pos, edge, a, b),
        }
    }

    /// Recurses past a step committed since `cp`, rolling it back if the rest
    /// of the search fails recoverably.
    fn descend(&mut self, pos: usize, edge: EdgeKey, cp: Checkpoint) -> Result<(), SolveError> {
        self.steps += 1;
        match self.search(pos + 1) {
            Ok(()) => Ok(()),
            Err(e) if e.kind.is_recoverable() => {
                let undone = self.ledger.rollback(cp);
                let depth = self.ledger.depth();
                if self.config.trace_steps {
                    trace!(%edge, depth, undone, "rolled back");
                }
                self.emit(SearchEvent::RolledBack { edge: Some(edge), depth, undone });
                Err(e)
            },
            Err(e) => Err(e),
        }
    }

    fn exhausted(&mut self, edge: EdgeKey, kind: FailureKind) -> SolveError {
        self.emit(SearchEvent::Rejected { edge, kind });
        self.fail(kind, format!("nothing fits edge {}; last tried {}", edge, self.last_tried))
    }

    /// Places a connector and a new room for `target` off the placed room at
    /// `anchor`.
    fn extend(&mut self, pos: usize, edge: EdgeKey, anchor: usize, target: NodeId) -> Result<(), SolveError> {
        let graph = self.graph;
        let (anchor_t, anchor_root) = self.anchor(anchor)?;
        let anchor_shape = self.shape(anchor_t)?;
        let conn_type = graph.connection_type(edge)
            .ok_or_else(|| self.violation(format!("edge {} has no connection type", edge)))?;
        let room_type = graph.room_type(target)
            .ok_or_else(|| self.violation(format!("node {} has no room type", target)))?;
        let hint = self.layout.and_then(|l| l.get(target));
        let mut last = FailureKind::SocketExhausted;
        let mut sockets = self.available_sockets(anchor, anchor_shape);
        if let Some(h) = hint {
            sockets.sort_by_key(|s| (anchor_root + anchor_shape.sockets[*s].cell).manhattan(h));
        }
        for a in sockets {
            self.check_deadline()?;
            let sa = &anchor_shape.sockets[a];
            let door_a = anchor_root + sa.cell;
            let conns = self.templates(
                Slot::Connection(conn_type), Some(sa.side.opposite()), Some(sa.width), Role::Connector,
            )?;
            for tc in conns {
                let conn = self.shape(tc)?;
                for (p, x1, q, x2) in self.connector_ends(conn, sa) {
                    let (sp, sq) = (&conn.sockets[p], &conn.sockets[q]);
                    let conn_root = door_a - sp.ray_cell(x1);
                    if !self.allows(anchor_t, tc, conn_root - anchor_root)? {
                        last = FailureKind::ConfigurationSpaceEmpty;
                        continue;
                    }
                    let connector = carved(conn, conn_root, &[(p, x1), (q, x2)]).for_edge(edge);
                    if self.ledger.clashes(&connector.floor, &connector.walls, &[anchor]) {
                        last = FailureKind::OverlapRejected;
                        continue;
                    }
                    let door_b = conn_root + sq.ray_cell(x2);
                    let rooms = self.room_candidates(room_type, tc, conn_root, sq, door_b, hint)?;
                    if rooms.is_empty() {
                        last = FailureKind::ConfigurationSpaceEmpty;
                        continue;
                    }
                    for (tr, r, room_root) in rooms {
                        let room_shape = self.shape(tr)?;
                        let sr = &room_shape.sockets[r];
                        self.last_tried = format!(
                            "{} ({}) at {} via {} ({})", tr, room_shape.name, room_root, tc, conn.name,
                        );
                        let room = carved(room_shape, room_root, &[(r, 0)]).for_node(target);
                        if self.ledger.clashes(&room.floor, &room.walls, &[]) {
                            last = FailureKind::OverlapRejected;
                            continue;
                        }
                        let cp = self.ledger.checkpoint();
                        self.ledger.mark_socket(SocketRef::new(anchor, a), sa.span);
                        self.ledger.carve(anchor, sa, 0);
                        let ci = self.ledger.depth();
                        let mut connector = connector.clone();
                        connector.consumed = vec![
                            SocketRef::new(anchor, a), SocketRef::new(ci, p), SocketRef::new(ci, q),
                        ];
                        self.ledger.commit(connector);
                        self.ledger.mark_socket(SocketRef::new(ci, p), sp.span);
                        self.ledger.mark_socket(SocketRef::new(ci, q), sq.span);
                        let mut room = room;
                        room.consumed = vec![SocketRef::new(ci + 1, r)];
                        let ri = self.ledger.commit(room);
                        self.ledger.mark_socket(SocketRef::new(ri, r), sr.span);
                        if self.config.trace_steps {
                            trace!(%edge, connector = %tc, room = %tr, root = %room_root, depth = ri + 1, "committed");
                        }
                        self.emit(SearchEvent::Committed { edge, connector: tc, room: Some(tr), depth: ri + 1 });
                        match self.descend(pos, edge, cp) {
                            Ok(()) => return Ok(()),
                            Err(e) if e.kind.is_recoverable() => last = e.kind,
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
        }
        Err(self.exhausted(edge, last))
    }

    /// Realizes an edge between two placed rooms: directly if they already
    /// touch through a free socket pair, otherwise through a connector whose
    /// far door lands on a free socket of `v`.
    fn close(&mut self, pos: usize, edge: EdgeKey, u: usize, v: usize) -> Result<(), SolveError> {
        let (graph, library) = (self.graph, self.library);
        let (tu, ru) = self.anchor(u)?;
        let (tv, rv) = self.anchor(v)?;
        let (su, sv) = (self.shape(tu)?, self.shape(tv)?);
        let mut last = FailureKind::SocketExhausted;

        let space = library.space(tu, tv)
            .ok_or_else(|| self.violation(format!("no configuration space for ({}, {})", tu, tv)))?;
        let mut docks: Vec<Docking> = space.dockings_at(rv - ru).copied().collect();
        docks.shuffle(&mut self.rng);
        for d in docks {
            let (a, b) = (d.fixed_socket, d.moving_socket);
            let (Some(sa), Some(sb)) = (su.socket(a), sv.socket(b)) else {
                return Err(self.violation(format!(
                    "configuration space for ({}, {}) names sockets {} and {} that the shapes lack", tu, tv, a, b,
                )));
            };
            if !sa.faces(sb)
                || !self.ledger.is_available(SocketRef::new(u, a), sa.span)
                || !self.ledger.is_available(SocketRef::new(v, b), sb.span) {
                continue;
            }
            let cp = self.ledger.checkpoint();
            self.ledger.mark_socket(SocketRef::new(u, a), sa.span);
            self.ledger.mark_socket(SocketRef::new(v, b), sb.span);
            self.ledger.carve(u, sa, 0);
            self.ledger.carve(v, sb, 0);
            self.ledger.link_edge(edge);
            let depth = self.ledger.depth();
            if self.config.trace_steps {
                trace!(%edge, depth, "linked");
            }
            self.emit(SearchEvent::Linked { edge, depth });
            match self.descend(pos, edge, cp) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind.is_recoverable() => last = e.kind,
                Err(e) => return Err(e),
            }
        }

        let conn_type = graph.connection_type(edge)
            .ok_or_else(|| self.violation(format!("edge {} has no connection type", edge)))?;
        for a in self.available_sockets(u, su) {
            self.check_deadline()?;
            let sa = &su.sockets[a];
            let door_a = ru + sa.cell;
            let conns = self.templates(
                Slot::Connection(conn_type), Some(sa.side.opposite()), Some(sa.width), Role::Connector,
            )?;
            for tc in conns {
                let conn = self.shape(tc)?;
                for (p, x1, q, x2) in self.connector_ends(conn, sa) {
                    let (sp, sq) = (&conn.sockets[p], &conn.sockets[q]);
                    let conn_root = door_a - sp.ray_cell(x1);
                    let door_b = conn_root + sq.ray_cell(x2);
                    let ledger = &self.ledger;
                    let found = sv.sockets.iter().enumerate().find(|(b, sb)| {
                        rv + sb.cell == door_b && sq.faces(sb) && ledger.is_available(SocketRef::new(v, *b), sb.span)
                    });
                    let Some((b, sb)) = found else {
                        last = FailureKind::SocketExhausted;
                        continue;
                    };
                    if !self.allows(tu, tc, conn_root - ru)? || !self.allows(tc, tv, rv - conn_root)? {
                        last = FailureKind::ConfigurationSpaceEmpty;
                        continue;
                    }
                    self.last_tried = format!("{} ({}) at {}", tc, conn.name, conn_root);
                    let mut connector = carved(conn, conn_root, &[(p, x1), (q, x2)]).for_edge(edge);
                    if self.ledger.clashes(&connector.floor, &connector.walls, &[u, v]) {
                        last = FailureKind::OverlapRejected;
                        continue;
                    }
                    let cp = self.ledger.checkpoint();
                    self.ledger.mark_socket(SocketRef::new(u, a), sa.span);
                    self.ledger.carve(u, sa, 0);
                    let ci = self.ledger.depth();
                    connector.consumed = vec![
                        SocketRef::new(u, a), SocketRef::new(ci, p), SocketRef::new(ci, q), SocketRef::new(v, b),
                    ];
                    self.ledger.commit(connector);
                    self.ledger.mark_socket(SocketRef::new(ci, p), sp.span);
                    self.ledger.mark_socket(SocketRef::new(ci, q), sq.span);
                    self.ledger.mark_socket(SocketRef::new(v, b), sb.span);
                    self.ledger.carve(v, sb, 0);
                    if self.config.trace_steps {
                        trace!(%edge, connector = %tc, depth = ci + 1, "committed between placed rooms");
                    }
                    self.emit(SearchEvent::Committed { edge, connector: tc, room: None, depth: ci + 1 });
                    match self.descend(pos, edge, cp) {
                        Ok(()) => return Ok(()),
                        Err(e) if e.kind.is_recoverable() => last = e.kind,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Err(self.exhausted(edge, last))
    }
}

fn pick(results: Vec<Result<Solution, SolveError>>) -> Result<Solution, SolveError> {
    let mut last = None;
    for r in results {
        match r {
            Ok(s) => return Ok(s),
            Err(e) => {
                let hard = e.kind == FailureKind::InvariantViolation;
                if hard || last.as_ref().map_or(true, |l: &SolveError| l.kind != FailureKind::InvariantViolation) {
                    last = Some(e);
                }
            },
        }
    }
    Err(last.unwrap_or_else(|| SolveError::new(FailureKind::InvariantViolation, "no attempts", Progress::default())))
}

/// Runs up to `config.attempts` independent attempts with seeds `seed`,
/// `seed + 1`, ... and returns the first solution. Gives up at once on an
/// invariant violation. With `config.parallel` the attempts race on scoped
/// threads and the first to finish successfully wins.
pub fn solve_attempts<C: Catalog + Sync>(
    shapes: &ShapeRegistry, library: &ConfigSpaceLibrary, catalog: &C, config: &SolverConfig,
    graph: &LevelGraph, chains: &[Chain], layout: Option<&Layout>,
) -> Result<Solution, SolveError> {
    let seeds: Vec<u64> = (0..config.attempts.max(1) as u64).map(|i| config.seed.wrapping_add(i)).collect();
    if config.parallel && seeds.len() > 1 {
        let stop = AtomicBool::new(false);
        let results = std::thread::scope(|s| {
            let handles: Vec<_> = seeds.iter().map(|seed| {
                let cfg = config.clone().with_seed(*seed);
                let stop = &stop;
                s.spawn(move || {
                    let engine = PlacementEngine::new(shapes, library, catalog, cfg).with_stop(stop);
                    let r = engine.solve(graph, chains, layout);
                    match &r {
                        Ok(sol) => {
                            info!(seed = sol.seed, steps = sol.steps, "attempt solved");
                            stop.store(true, Ordering::Relaxed);
                        },
                        Err(e) => {
                            info!(seed = engine.config().seed, kind = %e.kind, "attempt failed: {}", e.message);
                            if e.kind == FailureKind::InvariantViolation {
                                stop.store(true, Ordering::Relaxed);
                            }
                        },
                    }
                    r
                })
            }).collect();
            handles.into_iter().map(|h| {
                h.join().unwrap_or_else(|_| Err(SolveError::new(
                    FailureKind::InvariantViolation, "attempt panicked", Progress::default(),
                )))
            }).collect::<Vec<_>>()
        });
        return pick(results);
    }
    let mut last = None;
    for seed in seeds {
        let engine = PlacementEngine::new(shapes, library, catalog, config.clone().with_seed(seed));
        match engine.solve(graph, chains, layout) {
            Ok(sol) => {
                info!(seed, steps = sol.steps, "attempt solved");
                return Ok(sol);
            },
            Err(e) => {
                info!(seed, kind = %e.kind, "attempt failed: {}", e.message);
                if e.kind == FailureKind::InvariantViolation {
                    return Err(e);
                }
                last = Some(e);
            },
        }
    }
    Err(last.unwrap_or_else(|| SolveError::new(FailureKind::InvariantViolation, "no attempts", Progress::default())))
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use crate::catalog::StaticCatalog;
    use crate::geometry::test_util::{ew_corridor, ns_corridor, rect_room};
    use super::*;

    /// A 3×3 room with a door on every side plus straight corridors of
    /// length 3 both ways. Rooms are "room", corridors "hall".
    pub fn small_world() -> (ShapeRegistry, StaticCatalog) {
        let mut shapes = ShapeRegistry::new();
        let all = [Side::North, Side::East, Side::South, Side::West];
        let room = shapes.register(&rect_room("room", 3, 3, &all)).unwrap();
        let ew = shapes.register(&ew_corridor("ew", 3, 1)).unwrap();
        let ns = shapes.register(&ns_corridor("ns", 3, 1)).unwrap();
        let mut catalog = StaticCatalog::new();
        catalog.add_room("room", shapes.get(room).unwrap());
        for t in [ew, ns] {
            catalog.add_connection("hall", shapes.get(t).unwrap());
        }
        (shapes, catalog)
    }

    /// A path graph 0-1-...-(n-1) with its single chain.
    pub fn path_graph(n: u32) -> (LevelGraph, Vec<Chain>) {
        let graph = LevelGraph::from_parts(
            (0..n).map(|i| (NodeId(i), "room".to_string())),
            (1..n).map(|i| ((NodeId(i - 1), NodeId(i)), "hall".to_string())),
        ).unwrap();
        let ids: Vec<u32> = (0..n).collect();
        (graph, vec![Chain::path(&ids)])
    }

    /// Fails the test if two placements put floor on the same cell anywhere
    /// but a consumed socket, or a wall on another placement's floor.
    pub fn assert_no_overlap(shapes: &ShapeRegistry, solution: &Solution) {
        let doors: HashSet<Cell> = solution.placements.iter()
            .flat_map(|p| p.consumed.iter())
            .filter_map(|s| {
                let owner = solution.placements.get(s.placement)?;
                let socket = shapes.get(owner.template)?.socket(s.socket)?;
                Some(owner.socket_cell(socket))
            })
            .collect();
        for (i, p) in solution.placements.iter().enumerate() {
            for (j, q) in solution.placements.iter().enumerate().skip(i + 1) {
                for c in p.floor.intersection(&q.floor) {
                    assert!(doors.contains(c), "placements {} and {} share floor {}", i, j, c);
                }
                assert!(p.walls.is_disjoint(&q.floor), "wall of {} on floor of {}", i, j);
                assert!(q.walls.is_disjoint(&p.floor), "wall of {} on floor of {}", j, i);
            }
        }
    }
}
