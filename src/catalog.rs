use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use crate::core::TemplateId;
use crate::geometry::{ModuleShape, Side};

/// What a template is being looked up for: a graph node of some room type or
/// a graph edge of some connection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<'a> {
    Room(&'a str),
    Connection(&'a str),
}

impl <'a> Display for Slot<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Room(t) => write!(f, "room type {:?}", t),
            Slot::Connection(t) => write!(f, "connection type {:?}", t),
        }
    }
}

/// Template lookup. Implementations return the templates usable for `slot`
/// that expose a socket on `side` (if given) with `width` (if given), in a
/// stable order. The engine shuffles them itself.
pub trait Catalog {
    fn templates_for(&self, slot: Slot<'_>, side: Option<Side>, width: Option<u32>) -> Vec<TemplateId>;
}

/// In-memory catalog built up front from registered shapes.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    rooms: BTreeMap<String, Vec<TemplateId>>,
    connections: BTreeMap<String, Vec<TemplateId>>,
    signatures: HashMap<TemplateId, Vec<(Side, u32)>>,
}

impl StaticCatalog {
    pub fn new() -> Self { Self::default() }

    fn signature(&mut self, shape: &ModuleShape) {
        self.signatures.insert(
            shape.template,
            shape.sockets.iter().map(|s| (s.side, s.width)).collect(),
        );
    }

    pub fn add_room<S: Into<String>>(&mut self, room_type: S, shape: &ModuleShape) -> &mut Self {
        self.signature(shape);
        self.rooms.entry(room_type.into()).or_default().push(shape.template);
        self
    }

    pub fn add_connection<S: Into<String>>(&mut self, conn_type: S, shape: &ModuleShape) -> &mut Self {
        self.signature(shape);
        self.connections.entry(conn_type.into()).or_default().push(shape.template);
        self
    }

    fn exposes(&self, t: TemplateId, side: Option<Side>, width: Option<u32>) -> bool {
        match self.signatures.get(&t) {
            Some(sig) => sig.iter().any(|(s, w)| {
                side.map_or(true, |x| x == *s) && width.map_or(true, |x| x == *w)
            }),
            None => false,
        }
    }
}

impl Catalog for StaticCatalog {
    fn templates_for(&self, slot: Slot<'_>, side: Option<Side>, width: Option<u32>) -> Vec<TemplateId> {
        let list = match slot {
            Slot::Room(t) => self.rooms.get(t),
            Slot::Connection(t) => self.connections.get(t),
        };
        list.map(|ts| {
            ts.iter().copied().filter(|t| self.exposes(*t, side, width)).collect()
        }).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use crate::geometry::ShapeRegistry;
    use crate::geometry::test_util::{ew_corridor, ns_corridor, rect_room};
    use super::*;

    #[test]
    fn test_lookup_filters_by_side() {
        let mut shapes = ShapeRegistry::new();
        let a = shapes.register(&rect_room("a", 3, 3, &[Side::East])).unwrap();
        let b = shapes.register(&rect_room("b", 3, 3, &[Side::West, Side::North])).unwrap();
        let ew = shapes.register(&ew_corridor("ew", 4, 1)).unwrap();
        let ns = shapes.register(&ns_corridor("ns", 4, 1)).unwrap();
        let mut cat = StaticCatalog::new();
        for t in [a, b] {
            cat.add_room("room", shapes.get(t).unwrap());
        }
        for t in [ew, ns] {
            cat.add_connection("hall", shapes.get(t).unwrap());
        }
        assert_eq!(cat.templates_for(Slot::Room("room"), None, None), vec![a, b]);
        assert_eq!(cat.templates_for(Slot::Room("room"), Some(Side::West), Some(1)), vec![b]);
        assert_eq!(cat.templates_for(Slot::Room("room"), Some(Side::West), Some(2)), vec![]);
        assert_eq!(cat.templates_for(Slot::Connection("hall"), Some(Side::South), None), vec![ns]);
        assert_eq!(cat.templates_for(Slot::Connection("vent"), None, None), vec![]);
        assert_eq!(Slot::Room("room").to_string(), "room type \"room\"");
    }
}
