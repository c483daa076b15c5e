//! High-level access to the records of a schematic.

use std::path::Path;

use arcstr::ArcStr;
use regex::Regex;

use crate::error::Result;
use crate::{parser, writer, Component, Record};

/// Symbol providing the process corner in simulation testbenches.
pub const CORNER_SYMBOL: &str = "sky130_fd_pr/corner.sym";
/// Symbol holding simulation control code in testbenches.
pub const CODE_SYMBOL: &str = "devices/code_shown.sym";

/// A parsed schematic or symbol.
///
/// The schematic exclusively owns its records.
/// Use [`Clone`] to obtain an independent copy for editing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Schematic {
    records: Vec<Record>,
}

impl Schematic {
    /// Creates an empty schematic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a schematic from existing records.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Parses schematic text.
    pub fn parse(data: &str) -> Self {
        Self::from_records(parser::parse(data))
    }

    /// Loads the schematic at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_records(parser::parse_file(path)?))
    }

    /// Writes the schematic to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        writer::write_file(&self.records, path)
    }

    /// Serializes the schematic to xschem file text.
    pub fn to_text(&self) -> String {
        writer::write(&self.records)
    }

    /// The records, in file order.
    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Mutable access to the records.
    #[inline]
    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    /// Consumes the schematic, returning its records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Appends a record.
    pub fn push(&mut self, record: impl Into<Record>) {
        self.records.push(record.into());
    }

    /// Iterates over top-level components in file order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.records.iter().filter_map(Record::as_component)
    }

    /// Iterates mutably over top-level components in file order.
    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.records.iter_mut().filter_map(Record::as_component_mut)
    }

    /// The first component instantiating `symbol`.
    pub fn find_by_reference(&self, symbol: &str) -> Option<&Component> {
        self.components().find(|c| c.symbol == symbol)
    }

    /// The first component instantiating `symbol`, mutably.
    pub fn find_by_reference_mut(&mut self, symbol: &str) -> Option<&mut Component> {
        self.components_mut().find(|c| c.symbol == symbol)
    }

    /// All components instantiating `symbol`.
    pub fn find_all_by_reference(&self, symbol: &str) -> Vec<&Component> {
        self.components().filter(|c| c.symbol == symbol).collect()
    }

    /// The first component whose `name` property equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&Component> {
        self.components()
            .find(|c| c.name().is_some_and(|n| n == name))
    }

    /// The first component whose `name` property equals `name`, mutably.
    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.components_mut()
            .find(|c| c.name().is_some_and(|n| n == name))
    }

    /// All components whose name contains a match of the regular expression `pattern`.
    pub fn find_by_pattern(&self, pattern: &str) -> Result<Vec<&Component>> {
        let re = Regex::new(pattern)?;
        Ok(self
            .components()
            .filter(|c| c.name().is_some_and(|n| re.is_match(n)))
            .collect())
    }

    /// All components whose symbol path contains a match of the regular expression `pattern`.
    pub fn find_by_symbol_pattern(&self, pattern: &str) -> Result<Vec<&Component>> {
        let re = Regex::new(pattern)?;
        Ok(self
            .components()
            .filter(|c| re.is_match(&c.symbol))
            .collect())
    }

    /// Merges `props` into the properties of the component named `name`.
    ///
    /// Returns `false` if no such component exists.
    pub fn update_properties<K, V>(
        &mut self,
        name: &str,
        props: impl IntoIterator<Item = (K, V)>,
    ) -> bool
    where
        K: Into<ArcStr>,
        V: Into<ArcStr>,
    {
        match self.find_by_name_mut(name) {
            Some(component) => {
                component.properties.merge(props);
                true
            }
            None => false,
        }
    }

    /// Applies property updates to several components by name.
    ///
    /// Returns the names of components that were not found.
    pub fn update_parameters<'a, P, K, V>(
        &mut self,
        updates: impl IntoIterator<Item = (&'a str, P)>,
    ) -> Vec<ArcStr>
    where
        P: IntoIterator<Item = (K, V)>,
        K: Into<ArcStr>,
        V: Into<ArcStr>,
    {
        let mut missing = Vec::new();
        for (name, props) in updates {
            if !self.update_properties(name, props) {
                tracing::warn!(component = name, "component not found");
                missing.push(ArcStr::from(name));
            }
        }
        missing
    }

    /// Rewrites every component instantiating `old` to instantiate `new`.
    ///
    /// Returns the number of components changed.
    pub fn replace_reference(&mut self, old: &str, new: &str) -> usize {
        let new = ArcStr::from(new);
        let mut count = 0;
        for component in self.components_mut().filter(|c| c.symbol == old) {
            component.symbol = new.clone();
            count += 1;
        }
        count
    }

    /// Ensures the schematic has a process corner and a simulation code block.
    ///
    /// Missing components are appended with default placement and properties.
    /// Returns the code component.
    pub fn ensure_simulation_setup(&mut self) -> &mut Component {
        if self.find_by_reference(CORNER_SYMBOL).is_none() {
            tracing::debug!("adding corner component");
            self.push(
                Component::new(CORNER_SYMBOL)
                    .at(300., -100.)
                    .with("name", "CORNER")
                    .with("only_toplevel", "false")
                    .with("corner", "tt"),
            );
        }

        let idx = match self.position_by_reference(CODE_SYMBOL) {
            Some(idx) => idx,
            None => {
                tracing::debug!("adding simulation code component");
                self.push(
                    Component::new(CODE_SYMBOL)
                        .at(240., 120.)
                        .with("name", "s1")
                        .with("only_toplevel", "false")
                        .with("value", ""),
                );
                self.records.len() - 1
            }
        };
        match &mut self.records[idx] {
            Record::Component(c) => c,
            _ => unreachable!("index refers to a component"),
        }
    }

    fn position_by_reference(&self, symbol: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.as_component().is_some_and(|c| c.symbol == symbol))
    }
}

impl From<Component> for Record {
    fn from(value: Component) -> Self {
        Record::Component(value)
    }
}

impl From<Vec<Record>> for Schematic {
    fn from(value: Vec<Record>) -> Self {
        Self::from_records(value)
    }
}
