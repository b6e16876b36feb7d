//! Core math modules.

pub mod binomial;
pub mod dirichlet;
pub mod distance;
pub mod gamma;
pub mod model;
pub mod stable;
