//! Generation of sized circuit variants from template schematics.
//!
//! A template directory holds `{type}.sch`, `{type}.sym`, and `{type}_tb.sch`.
//! A variant named `name` with short code `short` is written to
//! `{output_dir}/{type}_{name}/` as:
//!
//! ```text
//! {type}_{short}.sch
//! {type}_{short}.sym
//! tb/{type}_{short}_{test}_tb.sch
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use xschem::Schematic;

use crate::config::{CircuitConfig, ComponentParams, SourceNaming, TestSpec, Tests};
use crate::error::{Error, Result};

/// A named parameter set to materialize as a variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Short code used in generated file names.
    pub short: ArcStr,
    /// Component properties to apply to the template schematic.
    pub params: ComponentParams,
}

impl VariantSpec {
    /// Creates a new variant specification.
    pub fn new(short: impl Into<ArcStr>, params: ComponentParams) -> Self {
        Self {
            short: short.into(),
            params,
        }
    }
}

/// The files of a generated variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// The variant's folder.
    pub folder: PathBuf,
    /// The variant's short code.
    pub short: ArcStr,
    /// The sized main schematic.
    pub schematic: PathBuf,
    /// The variant's symbol.
    pub symbol: PathBuf,
    /// Testbench schematics keyed by test name, in test order.
    pub testbenches: IndexMap<ArcStr, PathBuf>,
}

/// Creates variants of one circuit type.
#[derive(Debug, Clone)]
pub struct VariantGenerator {
    template_dir: PathBuf,
    output_dir: PathBuf,
    circuit_type: ArcStr,
    naming: SourceNaming,
}

impl VariantGenerator {
    /// Creates a generator reading templates from `template_dir` and writing
    /// variants to `output_dir`.
    pub fn new(
        template_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        circuit_type: impl Into<ArcStr>,
    ) -> Self {
        Self {
            template_dir: template_dir.into(),
            output_dir: output_dir.into(),
            circuit_type: circuit_type.into(),
            naming: SourceNaming::default(),
        }
    }

    /// Creates a generator from a circuit configuration.
    pub fn from_config(config: &CircuitConfig) -> Self {
        Self::new(
            &config.template_dir,
            &config.output_dir,
            config.circuit_type.clone(),
        )
        .with_naming(config.source_naming)
    }

    /// Sets the source name convention.
    #[inline]
    pub fn with_naming(mut self, naming: SourceNaming) -> Self {
        self.naming = naming;
        self
    }

    /// The circuit type.
    #[inline]
    pub fn circuit_type(&self) -> &ArcStr {
        &self.circuit_type
    }

    /// The folder of the variant named `name`.
    pub fn folder(&self, name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}", self.circuit_type, name))
    }

    fn template(&self, suffix: &str) -> Result<PathBuf> {
        let path = self
            .template_dir
            .join(format!("{}{}", self.circuit_type, suffix));
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::TemplateNotFound(path))
        }
    }

    /// The library reference of symbol `file` in directory `dir`.
    fn symbol_reference(&self, dir: &Path, file: &str) -> String {
        let dir = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}s/{}/{}", self.circuit_type, dir, file)
    }

    /// Creates the variant `name` from `spec` with one testbench per test.
    ///
    /// Components in `spec` that the template lacks are skipped. All
    /// template files are checked before anything is written. If writing
    /// fails, the variant's folder is removed.
    pub fn create_variant(&self, name: &str, spec: &VariantSpec, tests: &Tests) -> Result<Variant> {
        let templates = Templates {
            schematic: self.template(".sch")?,
            symbol: self.template(".sym")?,
            testbench: if tests.is_empty() {
                None
            } else {
                Some(self.template("_tb.sch")?)
            },
        };

        let folder = self.folder(name);
        tracing::debug!(name, short = %spec.short, ?folder, "creating variant");
        match self.write_variant(&folder, &templates, spec, tests) {
            Ok(variant) => Ok(variant),
            Err(err) => {
                tracing::warn!(name, %err, "failed to create variant");
                remove_folder(&folder);
                Err(err)
            }
        }
    }

    fn write_variant(
        &self,
        folder: &Path,
        templates: &Templates,
        spec: &VariantSpec,
        tests: &Tests,
    ) -> Result<Variant> {
        fs::create_dir_all(folder.join("tb"))?;
        let stem = format!("{}_{}", self.circuit_type, spec.short);

        let mut sch = Schematic::load(&templates.schematic)?;
        for (component, props) in &spec.params {
            let props = props.iter().map(|(k, v)| (k.clone(), v.clone()));
            if !sch.update_properties(component, props) {
                tracing::debug!(%component, "component not in template, skipping");
            }
        }
        let schematic = folder.join(format!("{stem}.sch"));
        sch.save(&schematic)?;

        let symbol = folder.join(format!("{stem}.sym"));
        fs::copy(&templates.symbol, &symbol)?;

        let mut testbenches = IndexMap::new();
        if let Some(template) = &templates.testbench {
            let template = Schematic::load(template)?;
            let old_ref =
                self.symbol_reference(&self.template_dir, &format!("{}.sym", self.circuit_type));
            let new_ref = self.symbol_reference(folder, &format!("{stem}.sym"));
            for (test, test_spec) in tests {
                let mut tb = template.clone();
                if tb.replace_reference(&old_ref, &new_ref) == 0 {
                    tracing::warn!(reference = %old_ref, "testbench does not instantiate the template symbol");
                }
                self.apply_test(&mut tb, test_spec);
                let path = folder.join("tb").join(format!("{stem}_{test}_tb.sch"));
                tb.save(&path)?;
                testbenches.insert(test.clone(), path);
            }
        }

        Ok(Variant {
            folder: folder.to_path_buf(),
            short: spec.short.clone(),
            schematic,
            symbol,
            testbenches,
        })
    }

    fn apply_test(&self, tb: &mut Schematic, spec: &TestSpec) {
        for (source, value) in &spec.sources {
            let component = self.naming.component_name(source);
            if !tb.update_properties(&component, [("value", value.clone())]) {
                tracing::warn!(%source, %component, "source component not found");
            }
        }
        if let Some(spice) = &spec.spice {
            tb.ensure_simulation_setup()
                .properties
                .insert("value", spice.clone());
        }
    }
}

struct Templates {
    schematic: PathBuf,
    symbol: PathBuf,
    testbench: Option<PathBuf>,
}

/// Removes a variant folder, logging instead of failing.
pub(crate) fn remove_folder(folder: &Path) {
    if let Err(err) = fs::remove_dir_all(folder) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(?folder, %err, "failed to remove variant folder");
        }
    }
}
