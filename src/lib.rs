//! Spatial nitrogen mass balance for agricultural and natural land.
//!
//! The crate derives ~80 intermediate and output raster quantities
//! (inputs, emissions, uptake, leaching, runoff, denitrification, loads to
//! surface water) from ~40 raw input rasters. It is organized as:
//!
//! - [`grid`]: the masked-raster data model, its elementwise algebra and
//!   the ASCII raster reader/writer;
//! - [`graph`]: a DAG of named derivation steps with explicit declared
//!   dependencies;
//! - [`engine`]: the single-pass evaluator that loads, combines and
//!   persists grids in dependency order;
//! - [`model`]: the fixed seven-stage nitrogen budget graph itself;
//! - [`config`]: the `Params` surface describing one run.

pub mod config;
pub mod engine;
pub mod graph;
pub mod grid;
pub mod model;
