//! Human-readable variant reports.

use std::fs;
use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use itertools::Itertools;
use lazy_static::lazy_static;
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::Result;
use crate::evaluate::TestResult;
use crate::variant::VariantSpec;

pub(crate) const TEMPLATES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");

lazy_static! {
    pub(crate) static ref TEMPLATES: Tera = {
        match Tera::new(&format!("{TEMPLATES_PATH}/*")) {
            Ok(t) => t,
            Err(e) => {
                panic!("Encountered errors while parsing Tera templates: {e}");
            }
        }
    };
}

#[derive(Serialize)]
struct ReadmeContext<'a> {
    name: &'a str,
    circuit_type: &'a str,
    short: &'a str,
    parameters: Vec<ParameterLine<'a>>,
    tests: Vec<TestSection>,
}

#[derive(Serialize)]
struct ParameterLine<'a> {
    name: &'a str,
    values: String,
}

#[derive(Serialize)]
struct TestSection {
    title: String,
    lines: Vec<String>,
}

/// Renders the README of a simulated variant.
///
/// Metric values are printed with six significant digits, followed by
/// the metric's unit from `units` if it has one.
pub fn render_readme(
    name: &str,
    circuit_type: &str,
    spec: &VariantSpec,
    results: &IndexMap<ArcStr, TestResult>,
    units: &IndexMap<ArcStr, ArcStr>,
) -> Result<String> {
    let parameters = spec
        .params
        .iter()
        .map(|(component, params)| ParameterLine {
            name: component,
            values: params.iter().map(|(k, v)| format!("{k}={v}")).join(", "),
        })
        .collect();
    let tests = results
        .iter()
        .map(|(test, result)| TestSection {
            title: title_case(test),
            lines: result_lines(result, units),
        })
        .collect();
    let ctx = Context::from_serialize(ReadmeContext {
        name,
        circuit_type,
        short: &spec.short,
        parameters,
        tests,
    })?;
    Ok(TEMPLATES.render("README.md", &ctx)?)
}

/// Writes `README.md` into `folder`, returning its path.
pub fn write_readme(
    folder: impl AsRef<Path>,
    name: &str,
    circuit_type: &str,
    spec: &VariantSpec,
    results: &IndexMap<ArcStr, TestResult>,
    units: &IndexMap<ArcStr, ArcStr>,
) -> Result<PathBuf> {
    let path = folder.as_ref().join("README.md");
    let readme = render_readme(name, circuit_type, spec, results, units)?;
    fs::write(&path, readme)?;
    Ok(path)
}

fn result_lines(result: &TestResult, units: &IndexMap<ArcStr, ArcStr>) -> Vec<String> {
    match result {
        TestResult::Completed(output) => output
            .metrics
            .iter()
            .map(|(metric, &value)| match units.get(metric) {
                Some(unit) if !unit.is_empty() => {
                    format!("{metric}: {} {unit}", format_general(value))
                }
                _ => format!("{metric}: {}", format_general(value)),
            })
            .collect(),
        TestResult::TimedOut => vec!["Result: timed out".to_string()],
        TestResult::Failed { error, .. } => vec![format!("Result: {error}")],
    }
}

/// `dc_gain` becomes `Dc Gain`.
fn title_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .join(" ")
}

/// Formats `value` with six significant digits, switching to scientific
/// notation for very large or small magnitudes.
pub fn format_general(value: f64) -> String {
    if value == 0. || !value.is_finite() {
        return format!("{value}").to_lowercase();
    }
    let sci = format!("{value:.5e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return sci;
    };
    if (-4..6).contains(&exp) {
        let fixed = format!("{:.*}", (5 - exp) as usize, value);
        trim_fraction(&fixed).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
