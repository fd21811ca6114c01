//! Defines the derivation node: one named grid in the budget pipeline,
//! either a raw input raster or an elementwise combination of upstream
//! grids.

use petgraph::graph::NodeIndex;

/// A unique, stable identifier for a node within the graph.
///
/// This is a type alias for `petgraph::graph::NodeIndex` to abstract the
/// underlying graph implementation.
pub type NodeId = NodeIndex;

/// The seven logical stages of the budget pipeline. A node's stage is
/// carried for logging and error context; evaluation order itself comes
/// from the dependency topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    LandUseFractions,
    NutrientInputs,
    AmmoniaEmissions,
    DepositionCorrection,
    TotalInputs,
    UptakeEfficiency,
    BudgetLeaching,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::LandUseFractions => "stage 1 (land-use fractions)",
            Stage::NutrientInputs => "stage 2 (nutrient inputs)",
            Stage::AmmoniaEmissions => "stage 3 (ammonia emissions)",
            Stage::DepositionCorrection => "stage 4 (deposition correction)",
            Stage::TotalInputs => "stage 5 (total inputs)",
            Stage::UptakeEfficiency => "stage 6 (uptake and efficiency)",
            Stage::BudgetLeaching => "stage 7 (budget and leaching)",
        };
        f.write_str(label)
    }
}

/// The elementwise combination a derived node performs on its parents.
/// Parent order is significant for the non-commutative operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// N-ary sum of all parents.
    Sum,
    /// First parent minus every following parent.
    Diff,
    /// Binary product.
    Mul,
    /// Binary safe-divide: a degenerate denominator cell yields `default`.
    Div { default: f64 },
    /// Unary clamp pass rewriting exact 0/1 ratio cells to epsilon bounds.
    ClampFraction,
    /// Binary floor correction: parents are (deposition, re-emission).
    DepositionFloor,
    /// Unary complement `1 - x`, built via scalar fill and subtraction.
    OneMinus,
}

impl Op {
    /// Number of parents the operation accepts; `None` means n-ary (two or
    /// more).
    pub fn arity(&self) -> Option<usize> {
        match self {
            Op::Sum | Op::Diff => None,
            Op::Mul | Op::Div { .. } | Op::DepositionFloor => Some(2),
            Op::ClampFraction | Op::OneMinus => Some(1),
        }
    }
}

/// What a node is: a raw raster read from the configured input path of
/// that name, or a grid derived from upstream nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    Source { input: &'static str },
    Derived { op: Op },
}

/// One named grid of the pipeline.
#[derive(Debug, Clone)]
pub struct DerivationNode {
    /// Stable identifier; also the file stem of the persisted artifact.
    pub name: String,
    pub stage: Stage,
    pub derivation: Derivation,
    /// Upstream grids, in operand order. Empty for sources.
    pub parents: Vec<NodeId>,
    /// Whether the engine writes this grid to the output directory
    /// immediately after computing it.
    pub persist: bool,
}
