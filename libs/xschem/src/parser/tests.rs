use super::*;

use std::path::PathBuf;

use test_log::test;

pub const TEST_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data");

#[inline]
pub fn test_data(file_name: &str) -> PathBuf {
    PathBuf::from(TEST_DATA_DIR).join(file_name)
}

#[test]
fn parse_property_block() {
    let props = parse_properties(r#"{name=R1 value="10 k" note="say \"hi\"" path=a\b}"#);
    assert_eq!(props.len(), 4);
    assert_eq!(props.get("name").unwrap(), "R1");
    assert_eq!(props.get("value").unwrap(), "10 k");
    assert_eq!(props.get("note").unwrap(), "say \"hi\"");
    assert_eq!(props.get("path").unwrap(), "a\\b");
}

#[test]
fn parse_property_block_spacing_and_bare_words() {
    let props = parse_properties("{ flag name = x1   lab=GND }");
    let pairs = props
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(pairs, vec![("name", "x1"), ("lab", "GND")]);
}

#[test]
fn parse_property_block_empty_and_multiline() {
    assert!(parse_properties("{}").is_empty());
    assert!(parse_properties("").is_empty());

    let props = parse_properties("{name=C1\nm=1\nvalue=\"\"\n}");
    assert_eq!(props.get("m").unwrap(), "1");
    assert_eq!(props.get("value").unwrap(), "");
}

#[test]
fn parse_unterminated_quote() {
    let props = parse_properties(r#"{name=x value="open"#);
    assert_eq!(props.get("value").unwrap(), "open");
}

#[test]
fn parse_component_line() {
    let record = parse_record("C {devices/res.sym} 10.5 -20 1 0 {name=R1 value=1k}").unwrap();
    let Record::Component(c) = record else {
        panic!("expected a component, found {record:?}");
    };
    assert_eq!(c.symbol, "devices/res.sym");
    assert_eq!(c.x, 10.5);
    assert_eq!(c.y, -20.);
    assert_eq!(c.rotation, 1);
    assert_eq!(c.flip, 0);
    assert_eq!(c.name().unwrap(), "R1");
}

#[test]
fn component_properties_use_first_brace_after_symbol() {
    let record = parse_record(r#"C {a.sym} 0 0 0 0 {name=x1 expr="{w}"}"#).unwrap();
    let c = record.as_component().unwrap();
    assert_eq!(c.properties.get("expr").unwrap(), "{w}");
}

#[test]
fn short_lines_are_skipped() {
    assert_eq!(parse_record("C {devices/res.sym} 0 0 {}"), None);
    assert_eq!(parse_record("L 4 0 0 10 {}"), None);
    assert_eq!(parse_record("N 0 0 10 {}"), None);
    assert_eq!(parse_record("P 4 3 0 0 1 1 {}"), None);
    assert_eq!(parse_record("A 4 0 0 1 0 {}"), None);
    assert_eq!(parse_record("L 4 zero 0 10 10 {}"), None);
    assert_eq!(parse_record("X 1 2 3"), None);
}

#[test]
fn unrecognized_lines_are_ignored() {
    let records = parse("Q what is this\nN 0 0 10 0 {lab=a}\n\n   \n");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tag(), "N");
}

#[test]
fn parse_polygon_points() {
    let Some(Record::Polygon(p)) = parse_record("P 4 3 0 0 10 0 10 10 {fill=true}") else {
        panic!("expected a polygon");
    };
    assert_eq!(p.layer, 4);
    assert_eq!(p.point_count(), 3);
    assert_eq!(p.points[2], Point { x: 10., y: 10. });
    assert_eq!(p.properties.get("fill").unwrap(), "true");
}

#[test]
fn version_without_match_is_dropped() {
    assert_eq!(parse_record("v {not a version}"), None);
    let Some(Record::Version(v)) = parse_record("v {xschem version=3.4.5 file_version=1.2\n}")
    else {
        panic!("expected a version");
    };
    assert_eq!(v.version, "3.4.5");
    assert_eq!(v.file_version, "1.2");
}

#[test]
fn embedded_symbols_nest() {
    let src = "C {inv.sym} 0 0 0 0 {name=x1}\n[\nv {xschem version=3.4.5 file_version=1.2}\nL 4 0 0 10 0 {}\n]\nN 0 0 1 1 {}\n";
    let records = parse(src);
    assert_eq!(records.len(), 3);
    let Record::EmbeddedSymbol(inner) = &records[1] else {
        panic!("expected an embedded symbol, found {:?}", records[1]);
    };
    assert_eq!(inner.len(), 2);
    assert_eq!(inner[1].tag(), "L");
    assert_eq!(records[2].tag(), "N");
}

#[test]
fn parse_opamp_testbench() {
    let records = parse_file(test_data("opamp_tb.sch")).unwrap();
    assert_eq!(records.len(), 21);

    let Record::Version(v) = &records[0] else {
        panic!("expected a version header");
    };
    assert_eq!(v.version, "3.4.5");
    assert!(v.text.contains("Apache License"));

    assert_eq!(records[1], Record::Vhdl(ArcStr::new()));
    let Record::Rect(graph) = &records[7] else {
        panic!("expected a rectangle");
    };
    assert_eq!(graph.properties.get("node").unwrap(), "vout vin");
    assert_eq!(graph.properties.get("y1").unwrap(), "-0.1");

    let code = records
        .iter()
        .filter_map(Record::as_component)
        .find(|c| c.symbol == "devices/code_shown.sym")
        .unwrap();
    let value = code.properties.get("value").unwrap();
    assert!(value.starts_with("\n.control\n"));
    assert!(value.contains("echo \"GAIN_DB: $&GAIN_DB\""));
}

#[test]
fn missing_file_fails_to_read() {
    let err = parse_file(test_data("does_not_exist.sch")).unwrap_err();
    assert!(matches!(err, Error::FailedToRead { .. }));
}
