use std::path::PathBuf;

use arcstr::ArcStr;
use test_log::test;

use crate::schematic::{CODE_SYMBOL, CORNER_SYMBOL};
use crate::writer::{format_number, format_properties, quote, write_record};
use crate::*;

const TEST_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data");

fn opamp_tb() -> PathBuf {
    PathBuf::from(TEST_DATA_DIR).join("opamp_tb.sch")
}

#[test]
fn numbers_are_written_compactly() {
    assert_eq!(format_number(0.), "0");
    assert_eq!(format_number(-120.), "-120");
    assert_eq!(format_number(10.5), "10.5");
    assert_eq!(format_number(0.1), "0.1");
    assert_eq!(format_number(1e-7), "0.0000001");
}

#[test]
fn values_are_quoted_when_needed() {
    assert_eq!(quote("1k"), "1k");
    assert_eq!(quote(""), "\"\"");
    assert_eq!(quote("DC 0.9"), "\"DC 0.9\"");
    assert_eq!(quote("a=b"), "\"a=b\"");
    assert_eq!(quote("say \"hi\""), r#""say \"hi\"""#);
    assert_eq!(quote(r"a\b"), r#""a\\b""#);
}

#[test]
fn property_layout() {
    assert_eq!(format_properties(&Properties::new()), "{}");

    let two: Properties = [("name", "R1"), ("value", "1k")].into_iter().collect();
    assert_eq!(format_properties(&two), "{name=R1 value=1k}");

    let three: Properties = [("name", "C1"), ("m", "1"), ("value", "1 p")]
        .into_iter()
        .collect();
    assert_eq!(format_properties(&three), "{name=C1\nm=1\nvalue=\"1 p\"\n}");
}

#[test]
fn write_records() {
    let c = Component::new("devices/res.sym")
        .at(10., -20.5)
        .with("name", "R1");
    assert_eq!(
        write_record(&Record::Component(c)),
        "C {devices/res.sym} 10 -20.5 0 0 {name=R1}"
    );

    let p = Polygon {
        layer: 4,
        points: vec![Point { x: 0., y: 0. }, Point { x: 1.5, y: 2. }],
        properties: Properties::new(),
    };
    assert_eq!(write_record(&Record::Polygon(p)), "P 4 2 0 0 1.5 2 {}");

    let v = Version {
        version: "3.4.5".into(),
        file_version: "1.2".into(),
        text: ArcStr::new(),
    };
    assert_eq!(
        write_record(&Record::Version(v)),
        "v {xschem version=3.4.5 file_version=1.2\n}"
    );

    assert_eq!(write_record(&Record::Spice(".param w=1".into())), "S {.param w=1}");
    assert_eq!(
        write_record(&Record::EmbeddedSymbol(vec![Record::Tedax(ArcStr::new())])),
        "[\nE {}\n]"
    );
}

#[test]
fn output_ends_with_newline() {
    assert!(write(&[Record::Vhdl(ArcStr::new())]).ends_with("G {}\n"));
}

#[test]
fn no_records_write_an_empty_file() {
    assert_eq!(write(&[]), "");
    assert!(parse(&write(&[])).is_empty());
}

#[test]
fn awkward_values_read_back_intact() {
    let values = [
        "}",
        "{",
        "\\",
        "\"",
        "a=b c",
        "line1\nline2",
        "",
        "{x} \"y\" \\z",
        "tcleval([expr 2*3])",
    ];
    for value in values {
        let record = Record::Component(
            Component::new("devices/vsource.sym")
                .with("name", "V1")
                .with("value", value),
        );
        let records = parse(&write(&[record]));
        assert_eq!(records.len(), 1, "value {value:?}");
        let Record::Component(component) = &records[0] else {
            panic!("expected a component for value {value:?}, got {:?}", records[0]);
        };
        assert_eq!(component.properties.get("name").map(|v| v.as_str()), Some("V1"));
        assert_eq!(
            component.properties.get("value").map(|v| v.as_str()),
            Some(value),
            "value {value:?}"
        );
    }
}

#[test]
fn roundtrip_is_stable() {
    let records = parse_file(opamp_tb()).unwrap();
    let text = write(&records);
    let reparsed = parse(&text);
    assert_eq!(records, reparsed);
    assert_eq!(write(&reparsed), text);
}

#[test]
fn roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("copy.sch");

    let sch = Schematic::load(opamp_tb()).unwrap();
    sch.save(&path).unwrap();
    let copy = Schematic::load(&path).unwrap();
    assert_eq!(sch, copy);
}

#[test]
fn save_to_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = Schematic::new()
        .save(dir.path().join("missing/out.sch"))
        .unwrap_err();
    assert!(matches!(err, Error::FailedToWrite { .. }));
}

#[test]
fn find_components() {
    let sch = Schematic::load(opamp_tb()).unwrap();

    assert_eq!(sch.components().count(), 7);
    assert_eq!(
        sch.find_by_reference("devices/vsource.sym")
            .unwrap()
            .name()
            .unwrap(),
        "V1"
    );
    assert_eq!(sch.find_all_by_reference("devices/vsource.sym").len(), 2);
    assert!(sch.find_by_reference("devices/res.sym").is_none());

    let c1 = sch.find_by_name("C1").unwrap();
    assert_eq!(c1.properties.get("device").unwrap(), "ceramic capacitor");
    assert!(sch.find_by_name("C2").is_none());

    let sources = sch.find_by_pattern("^V").unwrap();
    let names = sources
        .iter()
        .map(|c| c.name().unwrap().as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["V1", "VDD"]);

    assert_eq!(sch.find_by_symbol_pattern(r"^devices/").unwrap().len(), 5);
    assert!(matches!(
        sch.find_by_pattern("("),
        Err(Error::InvalidPattern(_))
    ));
}

#[test]
fn update_component_properties() {
    let mut sch = Schematic::load(opamp_tb()).unwrap();

    assert!(sch.update_properties("V1", [("value", "DC 1.2 AC 1"), ("extra", "1")]));
    assert!(!sch.update_properties("V9", [("value", "0")]));

    let v1 = sch.find_by_name("V1").unwrap();
    let keys = v1.properties.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, vec!["name", "value", "savecurrent", "extra"]);
    assert_eq!(v1.properties.get("value").unwrap(), "DC 1.2 AC 1");

    let missing = sch.update_parameters([
        ("VDD", vec![("value", "1.7")]),
        ("VSS", vec![("value", "0")]),
    ]);
    assert_eq!(missing, vec![ArcStr::from("VSS")]);
    assert_eq!(
        sch.find_by_name("VDD").unwrap().properties.get("value").unwrap(),
        "1.7"
    );
}

#[test]
fn edits_do_not_affect_clones() {
    let original = Schematic::load(opamp_tb()).unwrap();
    let mut copy = original.clone();
    copy.update_properties("C1", [("value", "2p")]);
    assert_eq!(
        original.find_by_name("C1").unwrap().properties.get("value").unwrap(),
        "1p"
    );
}

#[test]
fn replace_symbol_reference() {
    let mut sch = Schematic::load(opamp_tb()).unwrap();
    let n = sch.replace_reference(
        "opamps/two_stage/two_stage.sym",
        "opamps/two_stage_fast/two_stage_fast.sym",
    );
    assert_eq!(n, 1);
    assert!(sch.to_text().contains("C {opamps/two_stage_fast/two_stage_fast.sym} 0 0 0 0 {name=x1}"));
    assert_eq!(sch.replace_reference("nothing.sym", "other.sym"), 0);
}

#[test]
fn simulation_setup_is_added_once() {
    let mut sch = Schematic::parse("C {devices/res.sym} 0 0 0 0 {name=R1}\n");

    let code = sch.ensure_simulation_setup();
    assert_eq!(code.symbol, CODE_SYMBOL);
    assert_eq!(code.properties.get("value").unwrap(), "");
    code.properties.insert("value", ".op");

    assert_eq!(sch.records().len(), 3);
    let corner = sch.find_by_reference(CORNER_SYMBOL).unwrap();
    assert_eq!((corner.x, corner.y), (300., -100.));
    assert_eq!(corner.properties.get("corner").unwrap(), "tt");

    let code = sch.ensure_simulation_setup();
    assert_eq!(code.properties.get("value").unwrap(), ".op");
    assert_eq!(sch.records().len(), 3);
}

#[test]
fn simulation_setup_reuses_existing_components() {
    let mut sch = Schematic::load(opamp_tb()).unwrap();
    let before = sch.records().len();
    let code = sch.ensure_simulation_setup();
    assert!(code.properties.get("value").unwrap().contains(".control"));
    assert_eq!(sch.records().len(), before);
}
