use std::collections::HashSet;
use serde_derive::{Deserialize, Serialize};
use crate::catalog::StaticCatalog;
use crate::core::{Error, Role, TemplateId};
use crate::geometry::{Cell, ModuleShape, ShapeBuilder, ShapeRegistry, Side, Socket, SpanId};

/// Produces the discrete geometry of a template.
pub trait ShapeSource {
    fn build_shape(&self, template: TemplateId) -> Result<ModuleShape, Error>;
}

fn one() -> u32 { 1 }

/// A module drawn as text. Each line is a row (y grows downward) and each
/// character a column, with the top-left character at the module root.
///
/// - `.` floor
/// - `#` wall
/// - ` ` nothing
/// - `^`, `>`, `v`, `<` a socket facing north, east, south or west
///
/// Sockets are numbered in reading order. `spans` groups socket numbers that
/// lock together; `bite_depth` and `width` apply to every socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateArt {
    pub name: String,
    pub role: Role,
    pub art: Vec<String>,
    #[serde(default = "one")]
    pub bite_depth: u32,
    #[serde(default = "one")]
    pub width: u32,
    #[serde(default)]
    pub spans: Vec<Vec<usize>>,
    // Room or connection types this template can fill.
    #[serde(default)]
    pub kinds: Vec<String>,
}

impl TemplateArt {
    pub fn new<S: Into<String>>(name: S, role: Role, art: &str) -> Self {
        TemplateArt {
            name: name.into(),
            role,
            art: art.lines().map(|l| l.trim_end_matches('\r').to_string()).collect(),
            bite_depth: 1,
            width: 1,
            spans: Vec::new(),
            kinds: Vec::new(),
        }
    }

    pub fn bite_depth(mut self, depth: u32) -> Self {
        self.bite_depth = depth;
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn span(mut self, sockets: &[usize]) -> Self {
        self.spans.push(sockets.to_vec());
        self
    }

    pub fn kind<S: Into<String>>(mut self, kind: S) -> Self {
        self.kinds.push(kind.into());
        self
    }

    fn parse(&self) -> Result<ShapeBuilder, Error> {
        let mut b = ShapeBuilder::new(self.name.clone(), self.role);
        let mut sockets = Vec::new();
        for (y, line) in self.art.iter().enumerate() {
            for (x, c) in line.chars().enumerate() {
                let cell = Cell::new(x as i32, y as i32);
                let side = match c {
                    ' ' => continue,
                    '.' => {
                        b.floor(cell);
                        continue;
                    },
                    '#' => {
                        b.wall(cell);
                        continue;
                    },
                    '^' => Side::North,
                    '>' => Side::East,
                    'v' => Side::South,
                    '<' => Side::West,
                    _ => return Err(Error::new(format!(
                        "{}: unknown glyph {:?} at {}", self.name, c, cell,
                    ))),
                };
                sockets.push(Socket::new(side, cell)
                    .with_bite_depth(self.bite_depth)
                    .with_width(self.width));
            }
        }
        let mut seen = HashSet::new();
        for (i, group) in self.spans.iter().enumerate() {
            for s in group {
                if !seen.insert(*s) {
                    return Err(Error::new(format!("{}: socket {} is in two spans", self.name, s)));
                }
                match sockets.get_mut(*s) {
                    Some(socket) => socket.span = Some(SpanId(i as u32)),
                    None => return Err(Error::new(format!(
                        "{}: span names socket {} but there are only {}", self.name, s, sockets.len(),
                    ))),
                }
            }
        }
        for s in sockets {
            b.socket(s);
        }
        Ok(b)
    }
}

/// Shape source over a list of ASCII templates. Template ids are positions in
/// the list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsciiShapeSource {
    templates: Vec<TemplateArt>,
}

impl AsciiShapeSource {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, art: TemplateArt) -> TemplateId {
        self.templates.push(art);
        TemplateId(self.templates.len() as u32 - 1)
    }

    pub fn len(&self) -> usize { self.templates.len() }

    pub fn is_empty(&self) -> bool { self.templates.is_empty() }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Builds every template into a fresh registry and files each one in a
    /// catalog under its kinds.
    pub fn load(&self) -> Result<(ShapeRegistry, StaticCatalog), Error> {
        let mut shapes = ShapeRegistry::new();
        let mut catalog = StaticCatalog::new();
        for i in 0..self.templates.len() {
            let id = shapes.insert(self.build_shape(TemplateId(i as u32))?)?;
            let shape = shapes.get(id).ok_or(Error::new_const("registry lost a shape"))?;
            for kind in &self.templates[i].kinds {
                match shape.role {
                    Role::Room => catalog.add_room(kind.clone(), shape),
                    Role::Connector => catalog.add_connection(kind.clone(), shape),
                };
            }
        }
        Ok((shapes, catalog))
    }
}

impl ShapeSource for AsciiShapeSource {
    fn build_shape(&self, template: TemplateId) -> Result<ModuleShape, Error> {
        let art = self.templates.get(template.index())
            .ok_or_else(|| Error::new(format!("unknown template {}", template)))?;
        art.parse()?.build(template)
    }
}

const SQUARE_ROOM: &str = "\
##^##
#...#
<...>
#...#
##v##";

const LONG_ROOM: &str = "\
###^###
#.....#
<.....>
#.....#
###v###";

const EW_HALL: &str = "\
####
<..>
####";

const NS_HALL: &str = "\
#^#
#.#
#.#
#v#";

/// A small module set: two room shapes of type "room" and straight halls of
/// type "hall" that may bite two cells deep into a room.
pub fn starter_set() -> AsciiShapeSource {
    let mut src = AsciiShapeSource::new();
    src.add(TemplateArt::new("square", Role::Room, SQUARE_ROOM).kind("room"));
    src.add(TemplateArt::new("long", Role::Room, LONG_ROOM).kind("room"));
    src.add(TemplateArt::new("ew-hall", Role::Connector, EW_HALL).bite_depth(2).kind("hall"));
    src.add(TemplateArt::new("ns-hall", Role::Connector, NS_HALL).bite_depth(2).kind("hall"));
    src
}
