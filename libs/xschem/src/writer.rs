//! xschem file writer.

use std::borrow::Cow;
use std::path::Path;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::{Properties, Record};

/// Serializes records to xschem file text.
///
/// Each record ends with a newline, so no records yield an empty string.
pub fn write(records: &[Record]) -> String {
    let mut out = records.iter().map(write_record).join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Serializes records and writes them to `path`.
pub fn write_file(records: &[Record], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    tracing::debug!("writing xschem file: {:?}", path);
    std::fs::write(path, write(records)).map_err(|err| Error::FailedToWrite {
        path: path.into(),
        err,
    })
}

/// Serializes a single record, without a trailing newline.
pub fn write_record(record: &Record) -> String {
    match record {
        Record::Version(v) => {
            if v.text.trim().is_empty() {
                format!(
                    "v {{xschem version={} file_version={}\n}}",
                    v.version, v.file_version
                )
            } else {
                format!("v {{{}\n}}", v.text)
            }
        }
        Record::Line(s) | Record::Rect(s) => format!(
            "{} {} {} {} {} {} {}",
            record.tag(),
            s.layer,
            format_number(s.x1),
            format_number(s.y1),
            format_number(s.x2),
            format_number(s.y2),
            format_properties(&s.properties)
        ),
        Record::Arc(a) => format!(
            "A {} {} {} {} {} {} {}",
            a.layer,
            format_number(a.center_x),
            format_number(a.center_y),
            format_number(a.radius),
            format_number(a.start_angle),
            format_number(a.sweep_angle),
            format_properties(&a.properties)
        ),
        Record::Polygon(p) => {
            let coords = p
                .points
                .iter()
                .map(|pt| format!("{} {}", format_number(pt.x), format_number(pt.y)))
                .join(" ");
            format!(
                "P {} {} {} {}",
                p.layer,
                p.point_count(),
                coords,
                format_properties(&p.properties)
            )
        }
        Record::Text(t) => format!(
            "T {{{}}} {} {} {} {} {} {} {}",
            t.text,
            format_number(t.x),
            format_number(t.y),
            t.rotation,
            t.mirror,
            format_number(t.h_size),
            format_number(t.v_size),
            format_properties(&t.properties)
        ),
        Record::Wire(w) => format!(
            "N {} {} {} {} {}",
            format_number(w.x1),
            format_number(w.y1),
            format_number(w.x2),
            format_number(w.y2),
            format_properties(&w.properties)
        ),
        Record::Component(c) => format!(
            "C {{{}}} {} {} {} {} {}",
            c.symbol,
            format_number(c.x),
            format_number(c.y),
            c.rotation,
            c.flip,
            format_properties(&c.properties)
        ),
        Record::Spice(s) | Record::Verilog(s) | Record::Vhdl(s) | Record::Tedax(s) => {
            format!("{} {{{}}}", record.tag(), s)
        }
        Record::GlobalProperties(p) => format!("K {}", format_properties(p)),
        Record::EmbeddedSymbol(records) => {
            format!("[\n{}\n]", records.iter().map(write_record).join("\n"))
        }
    }
}

/// Formats a coordinate or size.
///
/// Integral values are written without a fractional part;
/// all others use the shortest text that reads back as the same value.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Formats a property block, including its braces.
///
/// Up to two pairs share a line with the braces; more are written one per line.
pub fn format_properties(props: &Properties) -> String {
    if props.is_empty() {
        return "{}".to_string();
    }
    let mut pairs = props.iter().map(|(k, v)| format!("{}={}", k, quote(v)));
    if props.len() > 2 {
        format!("{{{}\n}}", pairs.join("\n"))
    } else {
        format!("{{{}}}", pairs.join(" "))
    }
}

/// Quotes a property value if it would not otherwise read back intact.
pub fn quote(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '=' | '"' | '\\'));
    if !needs_quotes {
        return Cow::Borrowed(value);
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    Cow::Owned(format!("\"{escaped}\""))
}
