//! Binary spatial-report reader.
//!
//! Layout (little-endian, no header magic, no checksum):
//!
//! | bytes | content |
//! |---|---|
//! | 4 | `n_nodes` (i32) |
//! | 4 | `n_tstep` (i32) |
//! | 4 × n_nodes | node ids (u32, file order) |
//! | 4 × n_tstep × n_nodes | values (f32, `[timestep][node]`) |
//!
//! The two leading counts are trusted; any other trailing length is a decode
//! error rather than a silent truncation.

use std::path::Path;

use calib_common::{Error, Result};
use serde::{Deserialize, Serialize};

const HEADER_LEN: usize = 8;
const WORD: usize = 4;

/// One decoded spatial report: a per-node time series of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialReport {
    node_ids: Vec<u32>,
    n_tstep: usize,
    /// Row-major `[timestep][node]`.
    values: Vec<f32>,
}

impl SpatialReport {
    /// Build from node ids and one row of values per timestep.
    pub fn new(node_ids: Vec<u32>, data: Vec<Vec<f32>>) -> Result<Self> {
        let n_nodes = node_ids.len();
        if let Some((t, row)) = data.iter().enumerate().find(|(_, r)| r.len() != n_nodes) {
            return Err(Error::Decode(format!(
                "timestep {} has {} values for {} nodes",
                t,
                row.len(),
                n_nodes
            )));
        }
        Ok(SpatialReport {
            node_ids,
            n_tstep: data.len(),
            values: data.into_iter().flatten().collect(),
        })
    }

    /// Decode the binary layout.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Decode(format!(
                "spatial report is {} bytes, shorter than its {}-byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let n_nodes = read_count(bytes, 0, "n_nodes")?;
        let n_tstep = read_count(bytes, WORD, "n_tstep")?;

        let expected = n_tstep
            .checked_mul(n_nodes)
            .and_then(|cells| cells.checked_add(n_nodes))
            .and_then(|words| words.checked_mul(WORD))
            .ok_or_else(|| {
                Error::Decode(format!(
                    "spatial report header overflows: {} nodes x {} timesteps",
                    n_nodes, n_tstep
                ))
            })?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != expected {
            return Err(Error::Decode(format!(
                "spatial report with {} nodes and {} timesteps needs {} bytes after the header, found {}",
                n_nodes,
                n_tstep,
                expected,
                body.len()
            )));
        }

        let (ids, values) = body.split_at(n_nodes * WORD);
        let node_ids = ids
            .chunks_exact(WORD)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        let values = values
            .chunks_exact(WORD)
            .map(|w| f32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();

        Ok(SpatialReport {
            node_ids,
            n_tstep,
            values,
        })
    }

    /// Read and decode a report file.
    pub fn read_from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    /// Encode to the binary layout.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let n_nodes = i32::try_from(self.node_ids.len())
            .map_err(|_| Error::Decode(format!("{} nodes do not fit the header", self.node_ids.len())))?;
        let n_tstep = i32::try_from(self.n_tstep)
            .map_err(|_| Error::Decode(format!("{} timesteps do not fit the header", self.n_tstep)))?;

        let mut out = Vec::with_capacity(HEADER_LEN + WORD * (self.node_ids.len() + self.values.len()));
        out.extend_from_slice(&n_nodes.to_le_bytes());
        out.extend_from_slice(&n_tstep.to_le_bytes());
        for id in &self.node_ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(out)
    }

    pub fn node_ids(&self) -> &[u32] {
        &self.node_ids
    }

    pub fn n_nodes(&self) -> usize {
        self.node_ids.len()
    }

    pub fn n_tstep(&self) -> usize {
        self.n_tstep
    }

    /// Values of every node at one timestep.
    pub fn timestep(&self, t: usize) -> Option<&[f32]> {
        if t >= self.n_tstep {
            return None;
        }
        let n = self.n_nodes();
        Some(&self.values[t * n..(t + 1) * n])
    }

    /// The full `[timestep][node]` grid.
    pub fn data(&self) -> Vec<Vec<f32>> {
        (0..self.n_tstep)
            .filter_map(|t| self.timestep(t).map(<[f32]>::to_vec))
            .collect()
    }

    /// Per-timestep sum over the selected nodes (all nodes when `nodes` is empty).
    ///
    /// Unknown node ids are an error.
    pub fn sum_nodes(&self, nodes: &[u32]) -> Result<Vec<f64>> {
        let columns: Vec<usize> = if nodes.is_empty() {
            (0..self.n_nodes()).collect()
        } else {
            nodes
                .iter()
                .map(|id| {
                    self.node_ids.iter().position(|n| n == id).ok_or_else(|| {
                        Error::Decode(format!("node {} is not in the spatial report", id))
                    })
                })
                .collect::<Result<_>>()?
        };
        Ok((0..self.n_tstep)
            .filter_map(|t| self.timestep(t))
            .map(|row| columns.iter().map(|&c| f64::from(row[c])).sum())
            .collect())
    }
}

fn read_count(bytes: &[u8], offset: usize, name: &str) -> Result<usize> {
    let raw = i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]);
    usize::try_from(raw).map_err(|_| Error::Decode(format!("negative {} ({})", name, raw)))
}
