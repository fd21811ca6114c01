//! A synchronous, single-pass evaluation engine for the derivation graph.
//!
//! The engine walks the graph in topological order: sources are loaded
//! from the configured raster paths (masked on load), derived nodes are
//! computed through the grid algebra, and nodes flagged for persistence
//! are written to the output directory immediately after computation.
//! Grids are held in a ledger and dropped once their last consumer has
//! run; nothing is ever re-read from disk within a run.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, Params};
use crate::graph::{Derivation, DerivationGraph, DerivationNode, GraphError, NodeId, Op, Stage};
use crate::grid::{algebra, io, Grid, GridError, GridHeader, Mask};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("cannot load mask raster")]
    Mask(#[source] GridError),
    #[error("{stage}, '{name}'")]
    Grid {
        name: String,
        stage: Stage,
        #[source]
        source: GridError,
    },
    #[error("{stage}, '{name}': operand grids have {left} and {right} cells")]
    LengthMismatch {
        name: String,
        stage: Stage,
        left: usize,
        right: usize,
    },
}

/// What a completed run produced, for the driver's closing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Cells per grid in this run.
    pub cells: usize,
    pub nodes_evaluated: usize,
    pub artifacts_written: usize,
}

/// Holds each computed grid until its last consumer has run.
#[derive(Debug, Default)]
struct Ledger {
    slots: Vec<Option<Grid>>,
    remaining_uses: Vec<usize>,
}

impl Ledger {
    fn new(graph: &DerivationGraph) -> Ledger {
        let mut remaining_uses = vec![0; graph.node_count()];
        for id in graph.node_ids() {
            for &parent in &graph.node(id).parents {
                remaining_uses[parent.index()] += 1;
            }
        }
        Ledger { slots: vec![None; graph.node_count()], remaining_uses }
    }

    fn get(&self, id: NodeId) -> Option<&Grid> {
        self.slots[id.index()].as_ref()
    }

    /// Stores a grid unless nothing will ever read it back.
    fn insert(&mut self, id: NodeId, grid: Grid) {
        if self.remaining_uses[id.index()] > 0 {
            self.slots[id.index()] = Some(grid);
        }
    }

    /// Records one consumer of `id` as done, freeing the grid after the
    /// last one.
    fn consume(&mut self, id: NodeId) {
        let uses = &mut self.remaining_uses[id.index()];
        *uses -= 1;
        if *uses == 0 {
            self.slots[id.index()] = None;
        }
    }
}

pub struct Engine<'a> {
    graph: &'a DerivationGraph,
    params: &'a Params,
}

impl<'a> Engine<'a> {
    pub fn new(graph: &'a DerivationGraph, params: &'a Params) -> Self {
        Self { graph, params }
    }

    pub fn run(&self) -> Result<RunSummary, EngineError> {
        let mask = match &self.params.mask {
            Some(path) => {
                let grid = io::read(path, None).map_err(EngineError::Mask)?;
                let mask = Mask::from_grid(&grid);
                info!(
                    path = %path.display(),
                    in_domain = mask.domain_size(),
                    "loaded mask"
                );
                Some(mask)
            }
            None => None,
        };

        let order = self.graph.topological_order()?;
        let mut ledger = Ledger::new(self.graph);
        // All grids in a run must share one extent; the mask fixes it up
        // front, otherwise the first loaded raster does.
        let mut extent: Option<GridHeader> = mask.as_ref().map(|m| m.header().clone());
        let mut artifacts_written = 0;

        for id in order {
            let node = self.graph.node(id);
            let grid = match &node.derivation {
                Derivation::Source { input } => {
                    let path = self.params.input(input)?;
                    let grid = io::read(path, mask.as_ref()).map_err(|source| {
                        EngineError::Grid { name: node.name.clone(), stage: node.stage, source }
                    })?;
                    match &extent {
                        Some(h) if !h.same_shape(grid.header()) => {
                            return Err(EngineError::LengthMismatch {
                                name: node.name.clone(),
                                stage: node.stage,
                                left: h.length(),
                                right: grid.len(),
                            })
                        }
                        None => extent = Some(grid.header().clone()),
                        _ => {}
                    }
                    debug!(name = %node.name, stage = %node.stage, "loaded input raster");
                    grid
                }
                Derivation::Derived { .. } => {
                    let grid = self.evaluate(node, &ledger)?;
                    debug!(name = %node.name, stage = %node.stage, "derived grid");
                    grid
                }
            };

            if node.persist {
                let path = self.artifact_path(&node.name);
                io::write(&grid, &path, io::DEFAULT_NODATA, self.params.compress).map_err(
                    |source| EngineError::Grid {
                        name: node.name.clone(),
                        stage: node.stage,
                        source,
                    },
                )?;
                info!(name = %node.name, path = %path.display(), "wrote artifact");
                artifacts_written += 1;
            }

            for &parent in &node.parents {
                ledger.consume(parent);
            }
            ledger.insert(id, grid);
        }

        Ok(RunSummary {
            cells: extent.map(|h| h.length()).unwrap_or(0),
            nodes_evaluated: self.graph.node_count(),
            artifacts_written,
        })
    }

    fn evaluate(&self, node: &DerivationNode, ledger: &Ledger) -> Result<Grid, EngineError> {
        let parents: Vec<&Grid> = node
            .parents
            .iter()
            .map(|&p| {
                ledger
                    .get(p)
                    .expect("BUG: parent grid must be retained until its last consumer runs")
            })
            .collect();

        for parent in &parents[1..] {
            if parent.len() != parents[0].len() {
                return Err(EngineError::LengthMismatch {
                    name: node.name.clone(),
                    stage: node.stage,
                    left: parents[0].len(),
                    right: parent.len(),
                });
            }
        }

        let op = match &node.derivation {
            Derivation::Derived { op } => op,
            Derivation::Source { .. } => unreachable!("evaluate() is only called for derived nodes"),
        };

        let grid = match op {
            Op::Sum => {
                let mut out = parents[0].clone();
                for parent in &parents[1..] {
                    algebra::add_assign(&mut out, parent);
                }
                out
            }
            Op::Diff => {
                let mut out = parents[0].clone();
                for parent in &parents[1..] {
                    algebra::sub_assign(&mut out, parent);
                }
                out
            }
            Op::Mul => {
                let mut out = parents[0].clone();
                algebra::mul_assign(&mut out, parents[1]);
                out
            }
            Op::Div { default } => algebra::safe_divide(parents[0], parents[1], *default),
            Op::ClampFraction => {
                let mut out = parents[0].clone();
                algebra::clamp_unit_fractions(&mut out);
                out
            }
            Op::DepositionFloor => {
                let mut out = parents[0].clone();
                algebra::apply_floor(&mut out, parents[1]);
                out
            }
            Op::OneMinus => {
                let mut out = parents[0].clone();
                algebra::fill(&mut out, 1.0);
                algebra::sub_assign(&mut out, parents[0]);
                out
            }
        };
        Ok(grid)
    }

    fn artifact_path(&self, name: &str) -> PathBuf {
        let file = if self.params.compress {
            format!("{name}.asc.gz")
        } else {
            format!("{name}.asc")
        };
        self.params.output_dir.join(file)
    }
}
