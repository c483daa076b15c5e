use std::path::Path;

use lazy_static::lazy_static;
use serde::Serialize;
use tera::{Context, Tera};

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

/// Arguments of the netlisting script, each quoted for the shell.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NetlistScriptContext {
    pub(crate) xschem: String,
    pub(crate) testbench: String,
    pub(crate) netlist_dir: String,
    pub(crate) log_path: String,
}

impl NetlistScriptContext {
    pub(crate) fn new(xschem: &Path, testbench: &Path, netlist_dir: &Path, log_path: &Path) -> Self {
        Self {
            xschem: shell_quote(xschem),
            testbench: shell_quote(testbench),
            netlist_dir: shell_quote(netlist_dir),
            log_path: shell_quote(log_path),
        }
    }
}

/// Arguments of the simulation script, each quoted for the shell.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimulateScriptContext {
    pub(crate) ngspice: String,
    pub(crate) netlist: String,
    pub(crate) log_path: String,
}

impl SimulateScriptContext {
    pub(crate) fn new(ngspice: &Path, netlist: &Path, log_path: &Path) -> Self {
        Self {
            ngspice: shell_quote(ngspice),
            netlist: shell_quote(netlist),
            log_path: shell_quote(log_path),
        }
    }
}

/// Wraps `path` in single quotes so bash treats it as one literal word.
///
/// Embedded single quotes become `'\''`.
pub(crate) fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

pub(crate) fn write_netlist_script(
    ctx: NetlistScriptContext,
    path: impl AsRef<Path>,
) -> crate::error::Result<()> {
    render_to("netlist.sh", ctx, path)
}

pub(crate) fn write_simulate_script(
    ctx: SimulateScriptContext,
    path: impl AsRef<Path>,
) -> crate::error::Result<()> {
    render_to("simulate.sh", ctx, path)
}

fn render_to(
    template: &str,
    ctx: impl Serialize,
    path: impl AsRef<Path>,
) -> crate::error::Result<()> {
    let ctx = Context::from_serialize(ctx)?;
    let mut f = std::fs::File::create(path.as_ref())?;
    TEMPLATES.render_to(template, &ctx, &mut f)?;

    Ok(())
}
