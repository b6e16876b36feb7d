//! Calibration sites: a named reference dataset and the analyzers bound to it.

use std::collections::BTreeMap;

use calib_common::{Error, Result};
use tracing::{info, warn};

use crate::analyzer::{Analyzer, AnalyzerSetup, AnalyzerSpec};
use crate::logging::event_names;
use crate::record::SimMetadata;
use crate::reference::{ReferenceDataset, ReferenceProvider};
use crate::table::Table;

/// A calibration site.
///
/// The reference tables are fixed at construction. Every analyzer is an
/// independent copy of its spec, so the same spec list can be bound to
/// several sites without sharing state.
#[derive(Debug)]
pub struct CalibSite {
    name: String,
    reference: ReferenceDataset,
    analyzers: Vec<Analyzer>,
}

impl CalibSite {
    /// Build a site and bind its analyzers.
    ///
    /// Fails with a configuration error when `specs` is empty, when two
    /// analyzers share a name, or when an analyzer needs a reference type
    /// the provider does not have for this site. `setups` maps analyzer
    /// names to setup keys overlaid on that analyzer's configuration.
    pub fn new<P>(
        name: impl Into<String>,
        provider: &P,
        specs: &[AnalyzerSpec],
        setups: &BTreeMap<String, AnalyzerSetup>,
    ) -> Result<Self>
    where
        P: ReferenceProvider + ?Sized,
    {
        let name = name.into();
        if specs.is_empty() {
            return Err(Error::configuration(
                &name,
                "",
                "each site must enable at least one analyzer",
            ));
        }

        let mut reference = ReferenceDataset::new();
        let mut prepared = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut spec = spec.clone();
            if prepared.iter().any(|p: &AnalyzerSpec| p.name == spec.name) {
                return Err(Error::configuration(
                    &name,
                    &spec.name,
                    "analyzer names must be unique within a site",
                ));
            }

            for reference_type in spec.required_reference_types() {
                if reference.contains(reference_type) {
                    continue;
                }
                let table = provider
                    .get_reference_data(&name, reference_type)
                    .ok_or_else(|| {
                        Error::configuration(
                            &name,
                            &spec.name,
                            format!("missing reference data '{}'", reference_type),
                        )
                    })?;
                reference.insert(reference_type, table);
            }

            match setups.get(&spec.name) {
                Some(setup) => spec.apply_setup(&name, setup)?,
                None => warn!(site = %name, analyzer = %spec.name, "no analyzer setup provided"),
            }
            prepared.push(spec);
        }

        let mut site = CalibSite {
            name,
            reference,
            analyzers: Vec::with_capacity(prepared.len()),
        };
        for spec in prepared {
            let analyzer = Analyzer::bind(&site.name, spec, |reference_type| {
                site.get_reference_data(reference_type).cloned()
            })?;
            site.analyzers.push(analyzer);
        }

        info!(
            target: event_names::SITE_READY,
            site = %site.name,
            analyzers = site.analyzers.len(),
            reference_types = site.reference.len(),
            "site ready"
        );
        Ok(site)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The reference table of one type, as fixed at construction.
    pub fn get_reference_data(&self, reference_type: &str) -> Result<&Table> {
        self.reference
            .get(reference_type)
            .ok_or_else(|| Error::MissingReference {
                site: self.name.clone(),
                reference_type: reference_type.to_string(),
            })
    }

    pub fn reference(&self) -> &ReferenceDataset {
        &self.reference
    }

    pub fn analyzers(&self) -> &[Analyzer] {
        &self.analyzers
    }

    pub fn analyzers_mut(&mut self) -> &mut [Analyzer] {
        &mut self.analyzers
    }

    /// Whether a simulation was run for this site.
    pub fn filter(&self, metadata: &SimMetadata) -> bool {
        metadata.site_tag == self.name
    }
}
