//! Re-indexing helpers that bring simulation channels onto reference bins.
//!
//! Simulation reports are indexed by elapsed time (and the report's own
//! age/density bins); reference data is binned by age, season, density and
//! so on. These helpers derive the missing dimensions, turn rates into counts
//! and finally re-aggregate onto the reference's index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use calib_common::{Error, Result};
use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::table::{BinKey, BinValue, Table};

pub const TIME_DIM: &str = "Time";
pub const AGE_DIM: &str = "Age Bin";
pub const SEASON_DIM: &str = "Season";

const DAYS_PER_YEAR: f64 = 365.0;

static REBIN_LOCK: Mutex<()> = Mutex::new(());

/// Enter the process-wide rebinning critical section.
///
/// Every analyzer holds this guard across its count conversion and the
/// `aggregate_on_index` call that follows it, and nowhere else.
pub fn rebin_guard() -> MutexGuard<'static, ()> {
    REBIN_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set `Age Bin` to elapsed years (`Time / 365`) for a birth cohort.
///
/// Replaces any existing age dimension; `Time` is kept.
pub fn age_from_birth_cohort(table: &Table) -> Result<Table> {
    let time = require_dim(table, TIME_DIM)?;
    Ok(table.with_dim(AGE_DIM, |row| {
        let t = row.key[time].as_f64()?;
        Some(BinValue::Number(t / DAYS_PER_YEAR))
    }))
}

/// Calendar-month to season assignment.
///
/// Months without a season are absent; rows falling in them are dropped by
/// [`season_from_time`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct SeasonMap {
    by_month: [Option<String>; 12],
}

impl SeasonMap {
    /// Build from `{"January": "DC2", "May": "DH2", ...}`.
    pub fn from_month_map<'a, I>(months: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut map = SeasonMap::default();
        for (month, season) in months {
            map.assign(month, season)?;
        }
        Ok(map)
    }

    /// Build from `{"wet": ["June", "July", ...], ...}`.
    pub fn from_season_map<'a, I, M>(seasons: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, M)>,
        M: IntoIterator<Item = &'a str>,
    {
        let mut map = SeasonMap::default();
        for (season, months) in seasons {
            for month in months {
                map.assign(month, season)?;
            }
        }
        Ok(map)
    }

    fn assign(&mut self, month: &str, season: &str) -> Result<()> {
        let parsed: Month = month
            .trim()
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("unknown month name '{}'", month)))?;
        let slot = &mut self.by_month[parsed.number_from_month() as usize - 1];
        if let Some(existing) = slot.as_deref() {
            if existing != season {
                return Err(Error::InvalidConfig(format!(
                    "month '{}' assigned to both '{}' and '{}'",
                    month, existing, season
                )));
            }
        }
        *slot = Some(season.to_string());
        Ok(())
    }

    /// Season of a 1-based calendar month.
    pub fn season_for_month(&self, month: u32) -> Option<&str> {
        let idx = usize::try_from(month).ok()?.checked_sub(1)?;
        self.by_month.get(idx)?.as_deref()
    }

    /// Distinct season names.
    pub fn seasons(&self) -> BTreeSet<&str> {
        self.by_month.iter().flatten().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_month.iter().all(Option::is_none)
    }
}

impl TryFrom<BTreeMap<String, String>> for SeasonMap {
    type Error = Error;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        SeasonMap::from_month_map(map.iter().map(|(m, s)| (m.as_str(), s.as_str())))
    }
}

impl From<SeasonMap> for BTreeMap<String, String> {
    fn from(map: SeasonMap) -> Self {
        map.by_month
            .into_iter()
            .enumerate()
            .filter_map(|(i, season)| {
                let month = Month::try_from(u8::try_from(i + 1).ok()?).ok()?;
                Some((month.name().to_string(), season?))
            })
            .collect()
    }
}

/// Calendar month (1-12) of elapsed simulation day `time`.
///
/// Day-of-year is `(time mod 365) + 1` in a non-leap year.
pub fn month_of_day(time: f64) -> Option<u32> {
    if !time.is_finite() {
        return None;
    }
    let doy = time.floor().rem_euclid(DAYS_PER_YEAR) as u32 + 1;
    NaiveDate::from_yo_opt(2019, doy).map(|d| d.month())
}

/// Add a `Season` dimension from `Time`; rows in unmapped months are dropped.
pub fn season_from_time(table: &Table, seasons: &SeasonMap) -> Result<Table> {
    let time = require_dim(table, TIME_DIM)?;
    Ok(table.with_dim(SEASON_DIM, |row| {
        let month = month_of_day(row.key[time].as_f64()?)?;
        seasons
            .season_for_month(month)
            .map(|s| BinValue::Label(s.to_string()))
    }))
}

/// Convert average-population channels into person-years.
///
/// For the sorted distinct `Time` levels `t_i`, each value reported at `t_i`
/// is multiplied by `Δ_i / 365`, where `Δ_i = t_i − t_{i−1}` with
/// `t_{−1} = start_day`, or `Δ_i = reporting_interval` when one is given.
pub fn convert_annualized(
    table: &Table,
    start_day: f64,
    reporting_interval: Option<f64>,
) -> Result<Table> {
    let time = require_dim(table, TIME_DIM)?;

    let mut intervals: BTreeMap<BinValue, f64> = BTreeMap::new();
    let mut previous = start_day;
    for level in table.levels(TIME_DIM) {
        let Some(t) = level.as_f64() else {
            return Err(Error::Decode(format!("non-numeric Time level '{}'", level)));
        };
        let delta = reporting_interval.unwrap_or(t - previous);
        intervals.insert(level, delta / DAYS_PER_YEAR);
        previous = t;
    }

    let mut out = table.clone();
    for column in table.columns() {
        out.map_column(column, |key, v| {
            v * intervals.get(&key[time]).copied().unwrap_or(f64::NAN)
        })?;
    }
    Ok(out)
}

/// Multiply rate (or prevalence) columns by a matching trials column.
///
/// `trials` must have exactly one column and its dimensions must all be
/// dimensions of `rates`; each rates row is matched on those levels. The
/// trials column is appended to the result. Rows without a trials value
/// are dropped.
pub fn convert_to_counts(rates: &Table, trials: &Table) -> Result<Table> {
    if trials.columns().len() != 1 {
        return Err(Error::Decode(format!(
            "trials table must have one column, got {:?}",
            trials.columns()
        )));
    }
    let projection: Vec<usize> = trials
        .dims()
        .iter()
        .map(|d| require_dim(rates, d))
        .collect::<Result<_>>()?;

    let mut lookup: BTreeMap<&BinKey, f64> = BTreeMap::new();
    for row in trials.rows() {
        if lookup.insert(&row.key, row.values[0]).is_some() {
            return Err(Error::Decode(format!(
                "duplicate trials key {:?}",
                row.key.iter().map(ToString::to_string).collect::<Vec<_>>()
            )));
        }
    }

    let mut columns: Vec<String> = rates.columns().to_vec();
    columns.push(trials.columns()[0].clone());
    let mut out = Table::new(rates.dims().iter().cloned(), columns);

    for row in rates.rows() {
        let key: BinKey = projection.iter().map(|&i| row.key[i].clone()).collect();
        let Some(&n) = lookup.get(&key) else {
            continue;
        };
        let mut values: Vec<f64> = row.values.iter().map(|v| v * n).collect();
        values.push(n);
        out.push_row(row.key.clone(), values)?;
    }
    Ok(out)
}

/// Binning rule for one target dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum DimBinning {
    /// Sorted upper edges of right-closed bins; bin 0 is `(−∞, edges[0]]`.
    Edges(Vec<f64>),
    /// Accepted labels.
    Labels(BTreeSet<BinValue>),
}

impl DimBinning {
    /// Map a simulation level to its target level, or `None` if it falls outside.
    pub fn assign(&self, value: &BinValue) -> Option<BinValue> {
        match self {
            DimBinning::Edges(edges) => {
                let v = value.as_f64()?;
                if v.is_nan() {
                    return None;
                }
                let i = edges.partition_point(|&edge| edge < v);
                edges.get(i).map(|&edge| BinValue::Number(edge))
            }
            DimBinning::Labels(labels) => labels.contains(value).then(|| value.clone()),
        }
    }
}

/// A reference-defined multi-index to re-aggregate onto.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetIndex {
    dims: Vec<String>,
    binning: Vec<DimBinning>,
    keys: BTreeSet<BinKey>,
}

impl TargetIndex {
    /// Build from a reference table's dimensions and keys.
    ///
    /// A dimension whose levels are all numeric is binned by edges; any
    /// other dimension is matched by label.
    pub fn from_table(reference: &Table) -> Self {
        let binning = reference
            .dims()
            .iter()
            .map(|dim| {
                let levels = reference.levels(dim);
                let edges: Option<Vec<f64>> = levels.iter().map(BinValue::as_f64).collect();
                match edges {
                    Some(edges) if !edges.is_empty() => DimBinning::Edges(edges),
                    _ => DimBinning::Labels(levels.into_iter().collect()),
                }
            })
            .collect();
        TargetIndex {
            dims: reference.dims().to_vec(),
            binning,
            keys: reference.keys().cloned().collect(),
        }
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn binning(&self, dim: &str) -> Option<&DimBinning> {
        let idx = self.dims.iter().position(|d| d == dim)?;
        self.binning.get(idx)
    }

    pub fn contains(&self, key: &BinKey) -> bool {
        self.keys.contains(key)
    }
}

/// Re-bin `table` onto `target`, summing the `keep` columns per target key.
///
/// Rows outside every target bin are dropped. Only target keys that received
/// at least one row appear in the output (no zero fill), in key order.
pub fn aggregate_on_index(table: &Table, target: &TargetIndex, keep: &[&str]) -> Result<Table> {
    let dim_idx: Vec<usize> = target
        .dims
        .iter()
        .map(|d| require_dim(table, d))
        .collect::<Result<_>>()?;
    let col_idx: Vec<usize> = keep
        .iter()
        .map(|c| {
            table.column_index(c).ok_or_else(|| {
                Error::Decode(format!(
                    "cannot keep column '{}' (columns {:?})",
                    c,
                    table.columns()
                ))
            })
        })
        .collect::<Result<_>>()?;

    let mut sums: BTreeMap<BinKey, Vec<f64>> = BTreeMap::new();
    'rows: for row in table.rows() {
        let mut key = Vec::with_capacity(dim_idx.len());
        for (&i, rule) in dim_idx.iter().zip(&target.binning) {
            match rule.assign(&row.key[i]) {
                Some(level) => key.push(level),
                None => continue 'rows,
            }
        }
        if !target.contains(&key) {
            continue;
        }
        let acc = sums.entry(key).or_insert_with(|| vec![0.0; col_idx.len()]);
        for (a, &c) in acc.iter_mut().zip(&col_idx) {
            *a += row.values[c];
        }
    }

    let mut out = Table::new(target.dims.iter().cloned(), keep.iter().copied());
    for (key, values) in sums {
        out.push_row(key, values)?;
    }
    Ok(out)
}

fn require_dim(table: &Table, name: &str) -> Result<usize> {
    table.dim_index(name).ok_or_else(|| {
        Error::Decode(format!(
            "table has no '{}' dimension (dims {:?})",
            name,
            table.dims()
        ))
    })
}
