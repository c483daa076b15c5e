//! xschem file parser.
//!
//! Parsing is total: lines that cannot be interpreted are skipped
//! rather than reported as errors.

pub mod props;
#[cfg(test)]
mod tests;

use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;

use arcstr::ArcStr;
use lazy_static::lazy_static;
use regex::Regex;

pub use self::props::parse_properties;
use crate::error::{Error, Result};
use crate::{Arc, Component, Point, Polygon, Properties, Record, Segment, Text, Version, Wire};

lazy_static! {
    static ref VERSION_RE: Regex =
        Regex::new(r"xschem\s+version=([0-9.A-Za-z]+)\s+file_version=([0-9.]+)").unwrap();
}

/// Parses the contents of an xschem file.
pub fn parse(data: &str) -> Vec<Record> {
    Parser::new(data).parse()
}

/// Reads and parses the xschem file at `path`.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    tracing::debug!("reading xschem file: {:?}", path);
    let data = std::fs::read_to_string(path).map_err(|err| Error::FailedToRead {
        path: path.into(),
        err,
    })?;
    Ok(parse(&data))
}

/// Parses xschem files line by line.
///
/// A physical line that opens more braces than it closes is joined with
/// the following lines until the braces balance, forming one logical line.
#[derive(Clone, Debug)]
pub struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser over the given file contents.
    pub fn new(data: &'a str) -> Self {
        Self {
            lines: data.split('\n').collect(),
            pos: 0,
        }
    }

    /// Parses all remaining records.
    pub fn parse(mut self) -> Vec<Record> {
        self.records(false)
    }

    fn records(&mut self, embedded: bool) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(line) = self.next_logical_line() {
            match &*line {
                "[" => {
                    let symbol = self.records(true);
                    records.push(Record::EmbeddedSymbol(symbol));
                }
                "]" if embedded => return records,
                line => match parse_record(line) {
                    Some(record) => records.push(record),
                    None => tracing::trace!(line, "skipping unrecognized line"),
                },
            }
        }
        records
    }

    fn next_logical_line(&mut self) -> Option<Cow<'a, str>> {
        loop {
            let line: &'a str = self.lines.get(self.pos).copied()?.trim();
            self.pos += 1;
            if line.is_empty() {
                continue;
            }

            let mut depth = brace_depth(line);
            if depth <= 0 {
                return Some(Cow::Borrowed(line));
            }

            let mut block = line.to_string();
            while depth > 0 {
                let Some(next) = self.lines.get(self.pos) else {
                    break;
                };
                self.pos += 1;
                block.push('\n');
                block.push_str(next);
                depth += brace_depth(next);
            }
            return Some(Cow::Owned(block));
        }
    }
}

fn brace_depth(line: &str) -> i64 {
    line.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

/// Parses one logical line into a record.
///
/// Returns [`None`] if the line is not a recognized record
/// or lacks the fields its record kind requires.
pub fn parse_record(line: &str) -> Option<Record> {
    let line = line.trim();
    let (tag, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let record = match tag {
        "v" => Record::Version(parse_version(rest)?),
        "S" => Record::Spice(raw_block(rest)?),
        "V" => Record::Verilog(raw_block(rest)?),
        "G" => Record::Vhdl(raw_block(rest)?),
        "E" => Record::Tedax(raw_block(rest)?),
        "K" => Record::GlobalProperties(parse_properties(rest)),
        "L" => Record::Line(parse_segment(rest)?),
        "B" => Record::Rect(parse_segment(rest)?),
        "A" => Record::Arc(parse_arc(rest)?),
        "P" => Record::Polygon(parse_polygon(rest)?),
        "N" => Record::Wire(parse_wire(rest)?),
        "T" => Record::Text(parse_text(rest)?),
        "C" => Record::Component(parse_component(rest)?),
        _ => return None,
    };
    Some(record)
}

/// The text between the leading `{` and the last `}`, trimmed.
fn raw_block(rest: &str) -> Option<ArcStr> {
    let inner = rest.strip_prefix('{')?;
    let end = inner.rfind('}')?;
    Some(inner[..end].trim().into())
}

fn parse_version(rest: &str) -> Option<Version> {
    let text = raw_block(rest)?;
    let caps = VERSION_RE.captures(&text)?;
    Some(Version {
        version: caps[1].into(),
        file_version: caps[2].into(),
        text: text.clone(),
    })
}

/// Splits `fields {props}` into its whitespace-separated fields and properties.
fn fields_and_properties(s: &str) -> (Vec<&str>, Properties) {
    match s.find('{') {
        Some(i) => (s[..i].split_whitespace().collect(), parse_properties(&s[i..])),
        None => (s.split_whitespace().collect(), Properties::new()),
    }
}

fn num<T: FromStr>(field: &str) -> Option<T> {
    field.parse().ok()
}

fn parse_segment(rest: &str) -> Option<Segment> {
    let (fields, properties) = fields_and_properties(rest);
    let [layer, x1, y1, x2, y2, ..] = fields[..] else {
        return None;
    };
    Some(Segment {
        layer: num(layer)?,
        x1: num(x1)?,
        y1: num(y1)?,
        x2: num(x2)?,
        y2: num(y2)?,
        properties,
    })
}

fn parse_arc(rest: &str) -> Option<Arc> {
    let (fields, properties) = fields_and_properties(rest);
    let [layer, cx, cy, r, start, sweep, ..] = fields[..] else {
        return None;
    };
    Some(Arc {
        layer: num(layer)?,
        center_x: num(cx)?,
        center_y: num(cy)?,
        radius: num(r)?,
        start_angle: num(start)?,
        sweep_angle: num(sweep)?,
        properties,
    })
}

fn parse_polygon(rest: &str) -> Option<Polygon> {
    let (fields, properties) = fields_and_properties(rest);
    let [layer, count, ref coords @ ..] = fields[..] else {
        return None;
    };
    let count: usize = num(count)?;
    if coords.len() < 2 * count {
        return None;
    }
    let points = coords[..2 * count]
        .chunks_exact(2)
        .map(|xy| {
            Some(Point {
                x: num(xy[0])?,
                y: num(xy[1])?,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(Polygon {
        layer: num(layer)?,
        points,
        properties,
    })
}

fn parse_wire(rest: &str) -> Option<Wire> {
    let (fields, properties) = fields_and_properties(rest);
    let [x1, y1, x2, y2, ..] = fields[..] else {
        return None;
    };
    Some(Wire {
        x1: num(x1)?,
        y1: num(y1)?,
        x2: num(x2)?,
        y2: num(y2)?,
        properties,
    })
}

/// Splits `{head} tail` into `head` and `tail`.
///
/// `head` ends at the first closing brace.
fn braced_head(rest: &str) -> Option<(&str, &str)> {
    let inner = rest.strip_prefix('{')?;
    let end = inner.find('}')?;
    Some((&inner[..end], &inner[end + 1..]))
}

fn parse_text(rest: &str) -> Option<Text> {
    let (text, tail) = braced_head(rest)?;
    let (fields, properties) = fields_and_properties(tail);
    let [x, y, rotation, mirror, h_size, v_size, ..] = fields[..] else {
        return None;
    };
    Some(Text {
        text: text.into(),
        x: num(x)?,
        y: num(y)?,
        rotation: num(rotation)?,
        mirror: num(mirror)?,
        h_size: num(h_size)?,
        v_size: num(v_size)?,
        properties,
    })
}

fn parse_component(rest: &str) -> Option<Component> {
    let (symbol, tail) = braced_head(rest)?;
    let (fields, properties) = fields_and_properties(tail);
    let [x, y, rotation, flip, ..] = fields[..] else {
        return None;
    };
    Some(Component {
        symbol: symbol.into(),
        x: num(x)?,
        y: num(y)?,
        rotation: num(rotation)?,
        flip: num(flip)?,
        properties,
    })
}
