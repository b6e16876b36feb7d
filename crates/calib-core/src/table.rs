//! Labeled long-form tables.
//!
//! A [`Table`] is an ordered list of rows, each a multi-level key (one
//! [`BinValue`] per dimension) and one `f64` per column. Keys need not be
//! unique; grouping operations sum or average rows that share a key.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use calib_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// One level of a bin key: a numeric edge or a label.
///
/// Numbers order before labels; numbers compare with `f64::total_cmp`
/// so keys have a total order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinValue {
    Number(f64),
    Label(String),
}

impl BinValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BinValue::Number(n) => Some(*n),
            BinValue::Label(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BinValue::Number(_) => None,
            BinValue::Label(s) => Some(s),
        }
    }
}

impl Ord for BinValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BinValue::Number(a), BinValue::Number(b)) => a.total_cmp(b),
            (BinValue::Number(_), BinValue::Label(_)) => Ordering::Less,
            (BinValue::Label(_), BinValue::Number(_)) => Ordering::Greater,
            (BinValue::Label(a), BinValue::Label(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for BinValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for BinValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BinValue {}

impl fmt::Display for BinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinValue::Number(n) => write!(f, "{}", n),
            BinValue::Label(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for BinValue {
    fn from(n: f64) -> Self {
        BinValue::Number(n)
    }
}

impl From<u32> for BinValue {
    fn from(n: u32) -> Self {
        BinValue::Number(f64::from(n))
    }
}

impl From<&str> for BinValue {
    fn from(s: &str) -> Self {
        BinValue::Label(s.to_string())
    }
}

impl From<String> for BinValue {
    fn from(s: String) -> Self {
        BinValue::Label(s)
    }
}

/// A multi-level row key, one value per table dimension.
pub type BinKey = Vec<BinValue>;

/// One table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub key: BinKey,
    pub values: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawTable {
    dims: Vec<String>,
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Row>,
}

/// Long-form table with named index dimensions and named value columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable", into = "RawTable")]
pub struct Table {
    dims: Vec<String>,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TryFrom<RawTable> for Table {
    type Error = Error;

    fn try_from(raw: RawTable) -> Result<Self> {
        let mut table = Table::new(raw.dims, raw.columns);
        for row in raw.rows {
            table.push_row(row.key, row.values)?;
        }
        Ok(table)
    }
}

impl From<Table> for RawTable {
    fn from(table: Table) -> Self {
        RawTable {
            dims: table.dims,
            columns: table.columns,
            rows: table.rows,
        }
    }
}

impl Table {
    /// Create an empty table.
    pub fn new<D, C>(dims: D, columns: C) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Table {
            dims: dims.into_iter().map(Into::into).collect(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; the key and values must match the table's shape.
    pub fn push_row(&mut self, key: BinKey, values: Vec<f64>) -> Result<()> {
        if key.len() != self.dims.len() {
            return Err(Error::Decode(format!(
                "row key has {} levels, table has dims {:?}",
                key.len(),
                self.dims
            )));
        }
        if values.len() != self.columns.len() {
            return Err(Error::Decode(format!(
                "row has {} values, table has columns {:?}",
                values.len(),
                self.columns
            )));
        }
        self.rows.push(Row { key, values });
        Ok(())
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dim_index(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require_dim(&self, name: &str) -> Result<usize> {
        self.dim_index(name).ok_or_else(|| {
            Error::Decode(format!("table has no dimension '{}' (dims {:?})", name, self.dims))
        })
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            Error::Decode(format!(
                "table has no column '{}' (columns {:?})",
                name, self.columns
            ))
        })
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Distinct values of one dimension, sorted.
    pub fn levels(&self, dim: &str) -> Vec<BinValue> {
        let Some(idx) = self.dim_index(dim) else {
            return Vec::new();
        };
        let mut levels: Vec<BinValue> = self.rows.iter().map(|r| r.key[idx].clone()).collect();
        levels.sort();
        levels.dedup();
        levels
    }

    pub fn keys(&self) -> impl Iterator<Item = &BinKey> {
        self.rows.iter().map(|r| &r.key)
    }

    /// Rewrite one column in place.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&BinKey, f64) -> f64,
    {
        let idx = self.require_column(name)?;
        for row in &mut self.rows {
            row.values[idx] = f(&row.key, row.values[idx]);
        }
        Ok(())
    }

    /// Add a column computed from each row.
    pub fn add_column<F>(&mut self, name: impl Into<String>, mut f: F)
    where
        F: FnMut(&Row) -> f64,
    {
        for row in &mut self.rows {
            let v = f(row);
            row.values.push(v);
        }
        self.columns.push(name.into());
    }

    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let idx = self.require_column(from)?;
        self.columns[idx] = to.into();
        Ok(())
    }

    /// Keep only the named columns, in the given order.
    pub fn select_columns(&self, names: &[&str]) -> Result<Table> {
        let idx: Vec<usize> = names
            .iter()
            .map(|n| self.require_column(n))
            .collect::<Result<_>>()?;
        Ok(Table {
            dims: self.dims.clone(),
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| Row {
                    key: r.key.clone(),
                    values: idx.iter().map(|&i| r.values[i]).collect(),
                })
                .collect(),
        })
    }

    /// Set (or add, as the last dimension) a derived dimension.
    ///
    /// Rows for which `f` returns `None` are dropped.
    pub fn with_dim<F>(&self, name: &str, mut f: F) -> Table
    where
        F: FnMut(&Row) -> Option<BinValue>,
    {
        let existing = self.dim_index(name);
        let mut dims = self.dims.clone();
        if existing.is_none() {
            dims.push(name.to_string());
        }
        let rows = self
            .rows
            .iter()
            .filter_map(|row| {
                let value = f(row)?;
                let mut key = row.key.clone();
                match existing {
                    Some(i) => key[i] = value,
                    None => key.push(value),
                }
                Some(Row {
                    key,
                    values: row.values.clone(),
                })
            })
            .collect();
        Table {
            dims,
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn filter_rows<F>(&self, mut pred: F) -> Table
    where
        F: FnMut(&Row) -> bool,
    {
        Table {
            dims: self.dims.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| pred(r)).cloned().collect(),
        }
    }

    /// Project onto `dims`, summing every column within each group.
    ///
    /// Output rows are sorted by key.
    pub fn group_sum(&self, dims: &[&str]) -> Result<Table> {
        self.group_by(dims, |acc, x, _| acc + x)
    }

    /// Project onto `dims`, averaging every column within each group.
    ///
    /// The mean is kept as a running mean, so a group of identical values
    /// averages to exactly that value.
    pub fn group_mean(&self, dims: &[&str]) -> Result<Table> {
        self.group_by(dims, |mean, x, k| mean + (x - mean) / k as f64)
    }

    /// `fold(acc, x, k)` folds the `k`-th value of a group (1-based) into `acc`.
    fn group_by<F>(&self, dims: &[&str], fold: F) -> Result<Table>
    where
        F: Fn(f64, f64, usize) -> f64,
    {
        let idx: Vec<usize> = dims
            .iter()
            .map(|d| self.require_dim(d))
            .collect::<Result<_>>()?;

        let mut groups: BTreeMap<BinKey, (Vec<f64>, usize)> = BTreeMap::new();
        for row in &self.rows {
            let key: BinKey = idx.iter().map(|&i| row.key[i].clone()).collect();
            let entry = groups
                .entry(key)
                .or_insert_with(|| (vec![0.0; self.columns.len()], 0));
            entry.1 += 1;
            let k = entry.1;
            for (acc, &v) in entry.0.iter_mut().zip(&row.values) {
                *acc = fold(*acc, v, k);
            }
        }

        Ok(Table {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            columns: self.columns.clone(),
            rows: groups
                .into_iter()
                .map(|(key, (values, _))| Row { key, values })
                .collect(),
        })
    }

    /// Rows where `dim == value`, with that dimension removed.
    pub fn slice(&self, dim: &str, value: &BinValue) -> Result<Table> {
        let idx = self.require_dim(dim)?;
        let mut dims = self.dims.clone();
        dims.remove(idx);
        let rows = self
            .rows
            .iter()
            .filter(|r| &r.key[idx] == value)
            .map(|r| {
                let mut key = r.key.clone();
                key.remove(idx);
                Row {
                    key,
                    values: r.values.clone(),
                }
            })
            .collect();
        Ok(Table {
            dims,
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Add a constant outermost dimension.
    pub fn prepend_dim(&self, name: &str, value: BinValue) -> Table {
        let mut dims = Vec::with_capacity(self.dims.len() + 1);
        dims.push(name.to_string());
        dims.extend(self.dims.iter().cloned());
        Table {
            dims,
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| {
                    let mut key = Vec::with_capacity(r.key.len() + 1);
                    key.push(value.clone());
                    key.extend(r.key.iter().cloned());
                    Row {
                        key,
                        values: r.values.clone(),
                    }
                })
                .collect(),
        }
    }

    /// Stack tables with identical dims and columns.
    pub fn concat<'a, I>(tables: I) -> Result<Option<Table>>
    where
        I: IntoIterator<Item = &'a Table>,
    {
        let mut iter = tables.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut out = first.clone();
        for t in iter {
            if t.dims != out.dims || t.columns != out.columns {
                return Err(Error::Decode(format!(
                    "cannot stack table {:?}/{:?} onto {:?}/{:?}",
                    t.dims, t.columns, out.dims, out.columns
                )));
            }
            out.rows.extend(t.rows.iter().cloned());
        }
        Ok(Some(out))
    }

    /// Reorder key levels to match `dims`, which must be a permutation of ours.
    pub fn reorder_dims(&self, dims: &[String]) -> Result<Table> {
        if dims.len() != self.dims.len() {
            return Err(Error::Decode(format!(
                "cannot reorder dims {:?} as {:?}",
                self.dims, dims
            )));
        }
        let idx: Vec<usize> = dims
            .iter()
            .map(|d| self.require_dim(d))
            .collect::<Result<_>>()?;
        Ok(Table {
            dims: dims.to_vec(),
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| Row {
                    key: idx.iter().map(|&i| r.key[i].clone()).collect(),
                    values: r.values.clone(),
                })
                .collect(),
        })
    }

    /// Pair our rows with `other`'s on the full key.
    ///
    /// Both tables must have the same set of dimensions (any order). Rows
    /// without a counterpart, or with a NaN on either side, are dropped.
    /// Output follows our row order.
    pub fn inner_join(&self, other: &Table) -> Result<JoinedTable> {
        let other = other.reorder_dims(&self.dims)?;
        let mut lookup: BTreeMap<&BinKey, Vec<&Row>> = BTreeMap::new();
        for row in &other.rows {
            lookup.entry(&row.key).or_default().push(row);
        }

        let mut rows = Vec::new();
        for left in &self.rows {
            let Some(matches) = lookup.get(&left.key) else {
                continue;
            };
            for right in matches {
                if left.values.iter().chain(&right.values).any(|v| v.is_nan()) {
                    continue;
                }
                rows.push(JoinedRow {
                    key: left.key.clone(),
                    left: left.values.clone(),
                    right: right.values.clone(),
                });
            }
        }

        Ok(JoinedTable {
            dims: self.dims.clone(),
            left_columns: self.columns.clone(),
            right_columns: other.columns.clone(),
            rows,
        })
    }

    /// Sort rows by key (stable).
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| a.key.cmp(&b.key));
    }
}

/// One matched row of an inner join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub key: BinKey,
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

/// Result of [`Table::inner_join`]; left is the receiver, right the argument.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTable {
    pub dims: Vec<String>,
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
    pub rows: Vec<JoinedRow>,
}

impl JoinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A left-hand column, in joined row order.
    pub fn left(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self
            .left_columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::Decode(format!("no simulation column '{}'", name)))?;
        Ok(self.rows.iter().map(|r| r.left[idx]).collect())
    }

    /// A right-hand column, in joined row order.
    pub fn right(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self
            .right_columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::Decode(format!("no reference column '{}'", name)))?;
        Ok(self.rows.iter().map(|r| r.right[idx]).collect())
    }

    /// Values of one key level, in joined row order.
    pub fn dim(&self, name: &str) -> Result<Vec<BinValue>> {
        let idx = self
            .dims
            .iter()
            .position(|d| d == name)
            .ok_or_else(|| Error::Decode(format!("no dimension '{}'", name)))?;
        Ok(self.rows.iter().map(|r| r.key[idx].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age_table() -> Table {
        let mut t = Table::new(["Age Bin"], ["Incidents", "Person Years"]);
        t.push_row(vec![5.0.into()], vec![2.0, 10.0]).unwrap();
        t.push_row(vec![15.0.into()], vec![1.0, 20.0]).unwrap();
        t.push_row(vec![5.0.into()], vec![3.0, 10.0]).unwrap();
        t
    }

    #[test]
    fn bin_values_order_numbers_before_labels() {
        let mut values = vec![
            BinValue::from("DJF"),
            BinValue::from(10.0),
            BinValue::from(-1.0),
        ];
        values.sort();
        assert_eq!(values[0], BinValue::Number(-1.0));
        assert_eq!(values[2], BinValue::Label("DJF".to_string()));
    }

    #[test]
    fn push_row_rejects_wrong_shape() {
        let mut t = Table::new(["Age Bin"], ["Counts"]);
        assert!(t.push_row(vec![], vec![1.0]).is_err());
        assert!(t.push_row(vec![1.0.into()], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn group_sum_and_mean() {
        let t = age_table();
        let summed = t.group_sum(&["Age Bin"]).unwrap();
        assert_eq!(summed.len(), 2);
        assert_eq!(summed.rows()[0].values, vec![5.0, 20.0]);

        let mean = t.group_mean(&["Age Bin"]).unwrap();
        assert_eq!(mean.rows()[0].values, vec![2.5, 10.0]);
        assert_eq!(mean.rows()[1].values, vec![1.0, 20.0]);
    }

    #[test]
    fn mean_of_identical_values_is_exact() {
        let mut t = Table::new(["Age Bin"], ["v"]);
        for _ in 0..7 {
            t.push_row(vec![5.0.into()], vec![0.1]).unwrap();
        }
        let mean = t.group_mean(&["Age Bin"]).unwrap();
        assert_eq!(mean.rows()[0].values, vec![0.1]);
    }

    #[test]
    fn levels_are_sorted_and_distinct() {
        let levels = age_table().levels("Age Bin");
        assert_eq!(levels, vec![BinValue::from(5.0), BinValue::from(15.0)]);
        assert!(age_table().levels("Season").is_empty());
    }

    #[test]
    fn with_dim_replaces_or_appends_and_drops() {
        let t = age_table();
        let doubled = t.with_dim("Age Bin", |r| Some(BinValue::Number(r.key[0].as_f64()? * 2.0)));
        assert_eq!(doubled.dims(), ["Age Bin"]);
        assert_eq!(doubled.rows()[1].key[0], BinValue::from(30.0));

        let tagged = t.with_dim("Season", |r| {
            (r.key[0] == BinValue::from(5.0)).then(|| BinValue::from("wet"))
        });
        assert_eq!(tagged.dims(), ["Age Bin", "Season"]);
        assert_eq!(tagged.len(), 2);
    }

    #[test]
    fn slice_and_prepend_are_inverse() {
        let t = age_table().prepend_dim("Channel", "PfPR".into());
        assert_eq!(t.dims(), ["Channel", "Age Bin"]);
        let back = t.slice("Channel", &"PfPR".into()).unwrap();
        assert_eq!(back, age_table());
        assert!(t.slice("Channel", &"Gametocytes".into()).unwrap().is_empty());
    }

    #[test]
    fn inner_join_drops_unmatched_and_nan() {
        let mut sim = Table::new(["Age Bin"], ["Counts"]);
        sim.push_row(vec![1.0.into()], vec![4.0]).unwrap();
        sim.push_row(vec![2.0.into()], vec![f64::NAN]).unwrap();
        sim.push_row(vec![3.0.into()], vec![6.0]).unwrap();

        let mut reference = Table::new(["Age Bin"], ["Counts"]);
        reference.push_row(vec![3.0.into()], vec![7.0]).unwrap();
        reference.push_row(vec![2.0.into()], vec![1.0]).unwrap();
        reference.push_row(vec![1.0.into()], vec![5.0]).unwrap();

        let joined = sim.inner_join(&reference).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.left("Counts").unwrap(), vec![4.0, 6.0]);
        assert_eq!(joined.right("Counts").unwrap(), vec![5.0, 7.0]);
    }

    #[test]
    fn inner_join_reorders_dims() {
        let mut a = Table::new(["Season", "Age Bin"], ["Counts"]);
        a.push_row(vec!["wet".into(), 5.0.into()], vec![1.0]).unwrap();
        let mut b = Table::new(["Age Bin", "Season"], ["Counts"]);
        b.push_row(vec![5.0.into(), "wet".into()], vec![2.0]).unwrap();

        let joined = a.inner_join(&b).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.right("Counts").unwrap(), vec![2.0]);
    }

    #[test]
    fn inner_join_rejects_different_dims() {
        let a = Table::new(["Age Bin"], ["Counts"]);
        let b = Table::new(["Season"], ["Counts"]);
        assert!(a.inner_join(&b).is_err());
    }

    #[test]
    fn concat_requires_same_shape() {
        let t = age_table();
        let stacked = Table::concat([&t, &t]).unwrap().unwrap();
        assert_eq!(stacked.len(), 6);
        let other = Table::new(["Season"], ["Counts"]);
        assert!(Table::concat([&t, &other]).is_err());
        assert!(Table::concat(std::iter::empty::<&Table>()).unwrap().is_none());
    }

    #[test]
    fn json_round_trip_validates_shape() {
        let json = serde_json::to_string(&age_table()).unwrap();
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, age_table());

        let bad = r#"{"dims":["Age Bin"],"columns":["Counts"],"rows":[{"key":[1,2],"values":[1]}]}"#;
        assert!(serde_json::from_str::<Table>(bad).is_err());
    }

    #[test]
    fn select_and_rename_columns() {
        let mut t = age_table().select_columns(&["Person Years"]).unwrap();
        t.rename_column("Person Years", "Trials").unwrap();
        assert_eq!(t.columns(), ["Trials"]);
        assert_eq!(t.column("Trials").unwrap(), vec![10.0, 20.0, 10.0]);
        assert!(t.select_columns(&["Missing"]).is_err());
    }
}
