//! Reading, editing, and writing xschem schematic (`.sch`) and symbol (`.sym`) files.
//!
//! A file is an ordered list of [`Record`]s. Order is significant and is
//! preserved by [`parse`] and [`write`], so an untouched file round-trips.
#![warn(missing_docs)]

use arcstr::ArcStr;
use indexmap::IndexMap;

pub mod error;
pub mod parser;
pub mod schematic;
pub mod writer;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use parser::{parse, parse_file};
pub use schematic::Schematic;
pub use writer::{write, write_file};

/// A single element of a schematic or symbol file.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// The version header (`v {...}`).
    Version(Version),
    /// A line on a drawing layer (`L`).
    Line(Segment),
    /// A rectangle on a drawing layer (`B`).
    Rect(Segment),
    /// An arc (`A`).
    Arc(Arc),
    /// A polygon (`P`).
    Polygon(Polygon),
    /// A text label (`T`).
    Text(Text),
    /// A wire (`N`).
    Wire(Wire),
    /// A component instance (`C`).
    Component(Component),
    /// Global SPICE text (`S {...}`).
    Spice(ArcStr),
    /// Global Verilog text (`V {...}`).
    Verilog(ArcStr),
    /// Global VHDL text (`G {...}`).
    Vhdl(ArcStr),
    /// Global tEDAx text (`E {...}`).
    Tedax(ArcStr),
    /// Global properties (`K {...}`).
    GlobalProperties(Properties),
    /// A symbol embedded in the file between `[` and `]` lines.
    EmbeddedSymbol(Vec<Record>),
}

/// The version header of a file.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Version {
    /// The xschem version that wrote the file.
    pub version: ArcStr,
    /// The file format version.
    pub file_version: ArcStr,
    /// The full header text, including the version line and any license text.
    pub text: ArcStr,
}

/// Geometry shared by lines and rectangles: a layer and two corner points.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Segment {
    /// The drawing layer.
    pub layer: i32,
    /// First x coordinate.
    pub x1: f64,
    /// First y coordinate.
    pub y1: f64,
    /// Second x coordinate.
    pub x2: f64,
    /// Second y coordinate.
    pub y2: f64,
    /// Attached properties.
    pub properties: Properties,
}

/// An arc.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Arc {
    /// The drawing layer.
    pub layer: i32,
    /// Center x coordinate.
    pub center_x: f64,
    /// Center y coordinate.
    pub center_y: f64,
    /// The radius.
    pub radius: f64,
    /// Start angle in degrees.
    pub start_angle: f64,
    /// Sweep angle in degrees.
    pub sweep_angle: f64,
    /// Attached properties.
    pub properties: Properties,
}

/// A point of a [`Polygon`].
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Point {
    /// The x coordinate.
    pub x: f64,
    /// The y coordinate.
    pub y: f64,
}

/// A polygon.
///
/// The point count written to disk is always `points.len()`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Polygon {
    /// The drawing layer.
    pub layer: i32,
    /// The vertices, in order.
    pub points: Vec<Point>,
    /// Attached properties.
    pub properties: Properties,
}

/// A text label.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    /// The displayed text.
    pub text: ArcStr,
    /// Anchor x coordinate.
    pub x: f64,
    /// Anchor y coordinate.
    pub y: f64,
    /// Rotation.
    pub rotation: i32,
    /// Mirror flag (0 or 1).
    pub mirror: i32,
    /// Horizontal size.
    pub h_size: f64,
    /// Vertical size.
    pub v_size: f64,
    /// Attached properties.
    pub properties: Properties,
}

/// A wire.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Wire {
    /// First x coordinate.
    pub x1: f64,
    /// First y coordinate.
    pub y1: f64,
    /// Second x coordinate.
    pub x2: f64,
    /// Second y coordinate.
    pub y2: f64,
    /// Attached properties.
    pub properties: Properties,
}

/// A component instance.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Component {
    /// Path of the instantiated symbol, e.g. `devices/vsource.sym`.
    pub symbol: ArcStr,
    /// Placement x coordinate.
    pub x: f64,
    /// Placement y coordinate.
    pub y: f64,
    /// Rotation.
    pub rotation: i32,
    /// Flip flag (0 or 1).
    pub flip: i32,
    /// Instance properties.
    pub properties: Properties,
}

/// Property key-value pairs, in file order.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Properties {
    values: IndexMap<ArcStr, ArcStr>,
}

impl Default for Text {
    fn default() -> Self {
        Self {
            text: ArcStr::new(),
            x: 0.,
            y: 0.,
            rotation: 0,
            mirror: 0,
            h_size: 1.,
            v_size: 1.,
            properties: Properties::default(),
        }
    }
}

impl Record {
    /// The leading token identifying this record kind on disk.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Version(_) => "v",
            Self::Line(_) => "L",
            Self::Rect(_) => "B",
            Self::Arc(_) => "A",
            Self::Polygon(_) => "P",
            Self::Text(_) => "T",
            Self::Wire(_) => "N",
            Self::Component(_) => "C",
            Self::Spice(_) => "S",
            Self::Verilog(_) => "V",
            Self::Vhdl(_) => "G",
            Self::Tedax(_) => "E",
            Self::GlobalProperties(_) => "K",
            Self::EmbeddedSymbol(_) => "[",
        }
    }

    /// The properties attached to this record, if it carries any.
    pub fn properties(&self) -> Option<&Properties> {
        match self {
            Self::Line(s) | Self::Rect(s) => Some(&s.properties),
            Self::Arc(a) => Some(&a.properties),
            Self::Polygon(p) => Some(&p.properties),
            Self::Text(t) => Some(&t.properties),
            Self::Wire(w) => Some(&w.properties),
            Self::Component(c) => Some(&c.properties),
            Self::GlobalProperties(p) => Some(p),
            Self::Version(_)
            | Self::Spice(_)
            | Self::Verilog(_)
            | Self::Vhdl(_)
            | Self::Tedax(_)
            | Self::EmbeddedSymbol(_) => None,
        }
    }

    /// Returns the component in this record, if it is one.
    pub fn as_component(&self) -> Option<&Component> {
        match self {
            Self::Component(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the component in this record mutably, if it is one.
    pub fn as_component_mut(&mut self) -> Option<&mut Component> {
        match self {
            Self::Component(c) => Some(c),
            _ => None,
        }
    }
}

impl Polygon {
    /// The number of vertices.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

impl Component {
    /// Creates a component instantiating `symbol` at the origin.
    pub fn new(symbol: impl Into<ArcStr>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Places the component at the given coordinates.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Sets a property, returning the component.
    pub fn with(mut self, key: impl Into<ArcStr>, value: impl Into<ArcStr>) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// The instance name (the `name` property).
    pub fn name(&self) -> Option<&ArcStr> {
        self.properties.get("name")
    }
}

impl Properties {
    /// Creates an empty property set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key-value pair.
    ///
    /// An existing key keeps its position and has its value replaced.
    pub fn insert(&mut self, k: impl Into<ArcStr>, v: impl Into<ArcStr>) -> Option<ArcStr> {
        self.values.insert(k.into(), v.into())
    }

    /// Gets the value corresponding to the given key.
    pub fn get(&self, k: &str) -> Option<&ArcStr> {
        self.values.get(k)
    }

    /// Returns `true` if the given key is present.
    pub fn contains_key(&self, k: &str) -> bool {
        self.values.contains_key(k)
    }

    /// Removes a key, preserving the order of the remaining keys.
    pub fn remove(&mut self, k: &str) -> Option<ArcStr> {
        self.values.shift_remove(k)
    }

    /// Merges the given pairs into this property set.
    pub fn merge<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<ArcStr>,
        V: Into<ArcStr>,
    {
        for (k, v) in pairs {
            self.insert(k, v);
        }
    }

    /// An iterator over all key-value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &ArcStr)> {
        self.values.iter()
    }

    /// The number of properties.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no properties.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<ArcStr>, V: Into<ArcStr>> FromIterator<(K, V)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut props = Self::new();
        props.merge(iter);
        props
    }
}
