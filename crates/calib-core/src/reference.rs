//! Reference datasets and the providers that supply them per site.

use std::collections::BTreeMap;
use std::path::Path;

use calib_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::table::Table;

/// Reference tables of one site, keyed by reference type
/// (e.g. `annual_clinical_incidence_by_age`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceDataset {
    tables: BTreeMap<String, Table>,
}

impl ReferenceDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, reference_type: impl Into<String>, table: Table) -> Self {
        self.tables.insert(reference_type.into(), table);
        self
    }

    pub fn insert(&mut self, reference_type: impl Into<String>, table: Table) {
        self.tables.insert(reference_type.into(), table);
    }

    pub fn get(&self, reference_type: &str) -> Option<&Table> {
        self.tables.get(reference_type)
    }

    pub fn contains(&self, reference_type: &str) -> bool {
        self.tables.contains_key(reference_type)
    }

    pub fn reference_types(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Parse `{"<reference_type>": {"dims": [..], "columns": [..], "rows": [..]}, ...}`.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn read_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// Source of reference tables for calibration sites.
pub trait ReferenceProvider {
    /// The table of `reference_type` for `site`, if the provider has one.
    fn get_reference_data(&self, site: &str, reference_type: &str) -> Option<Table>;
}

/// A single dataset serves every site.
impl ReferenceProvider for ReferenceDataset {
    fn get_reference_data(&self, _site: &str, reference_type: &str) -> Option<Table> {
        self.get(reference_type).cloned()
    }
}

/// Datasets keyed by site name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteReferences {
    sites: BTreeMap<String, ReferenceDataset>,
}

impl SiteReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site(mut self, site: impl Into<String>, dataset: ReferenceDataset) -> Self {
        self.sites.insert(site.into(), dataset);
        self
    }

    pub fn site(&self, site: &str) -> Option<&ReferenceDataset> {
        self.sites.get(site)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(Error::from)
    }
}

impl ReferenceProvider for SiteReferences {
    fn get_reference_data(&self, site: &str, reference_type: &str) -> Option<Table> {
        self.sites.get(site)?.get(reference_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::BinValue;

    fn incidence() -> Table {
        let mut t = Table::new(
            ["Age Bin"],
            ["Annual Clinical Incidence by Age Bin", "Average Population by Age Bin"],
        );
        t.push_row(vec![BinValue::Number(1.0)], vec![3.2, 50.0]).unwrap();
        t.push_row(vec![BinValue::Number(5.0)], vec![4.1, 50.0]).unwrap();
        t
    }

    #[test]
    fn dataset_serves_every_site() {
        let ds = ReferenceDataset::new().with_table("annual_clinical_incidence_by_age", incidence());
        assert!(ds
            .get_reference_data("Dielmo", "annual_clinical_incidence_by_age")
            .is_some());
        assert!(ds.get_reference_data("Dielmo", "prevalence_by_round").is_none());
    }

    #[test]
    fn site_references_are_scoped() {
        let refs = SiteReferences::new().with_site(
            "Dielmo",
            ReferenceDataset::new().with_table("annual_clinical_incidence_by_age", incidence()),
        );
        assert!(refs
            .get_reference_data("Dielmo", "annual_clinical_incidence_by_age")
            .is_some());
        assert!(refs
            .get_reference_data("Ndiop", "annual_clinical_incidence_by_age")
            .is_none());
    }

    #[test]
    fn dataset_from_json() {
        let json = r#"{
            "prevalence_by_round": {
                "dims": ["region", "round"],
                "columns": ["New Diagnostic Prevalence"],
                "rows": [
                    {"key": ["all", 1], "values": [0.31]},
                    {"key": ["all", 2], "values": [0.22]}
                ]
            }
        }"#;
        let ds = ReferenceDataset::from_json_str(json).unwrap();
        let t = ds.get("prevalence_by_round").unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[0].key[0], BinValue::Label("all".into()));
        assert_eq!(t.rows()[1].key[1], BinValue::Number(2.0));
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let json = r#"{"x": {"dims": ["a"], "columns": ["v"], "rows": [{"key": [], "values": [1.0]}]}}"#;
        assert!(ReferenceDataset::from_json_str(json).is_err());
    }
}
