//! Elementwise grid combinators.
//!
//! Every operation here is a pure per-cell function with no cross-cell
//! state, so the binary combinators run their cell loops data-parallel.
//! Nodata propagation is the invariant throughout: a cell of the result is
//! nodata whenever either operand cell is nodata. The single documented
//! exception is division, where a degenerate denominator yields the
//! caller-supplied default *value* instead of nodata.
//!
//! The `_assign` variants mutate their receiver in place; callers duplicate
//! the receiver first when the source grid must survive (the pipeline does
//! this wherever a grid feeds more than one derivation).

use rayon::prelude::*;

use super::Grid;

/// Replacement for a ratio of exactly zero, see [`clamp_unit_fractions`].
pub const FRACTION_EPS_LO: f64 = 0.0001;
/// Replacement for a ratio of exactly one, see [`clamp_unit_fractions`].
pub const FRACTION_EPS_HI: f64 = 0.9999;

/// Applies `f` cell-by-cell, writing into `a`. Operands must have equal
/// length; the engine validates this before any combinator runs.
fn zip_assign(a: &mut Grid, b: &Grid, f: impl Fn(f64, f64) -> f64 + Sync) {
    debug_assert_eq!(a.len(), b.len());
    a.cells_mut()
        .par_iter_mut()
        .zip(b.cells().par_iter())
        .for_each(|(av, bv)| {
            *av = match (*av, *bv) {
                (Some(x), Some(y)) => Some(f(x, y)),
                _ => None,
            };
        });
}

pub fn add_assign(a: &mut Grid, b: &Grid) {
    zip_assign(a, b, |x, y| x + y);
}

pub fn sub_assign(a: &mut Grid, b: &Grid) {
    zip_assign(a, b, |x, y| x - y);
}

pub fn mul_assign(a: &mut Grid, b: &Grid) {
    zip_assign(a, b, |x, y| x * y);
}

/// In-place division with default substitution: where the denominator is
/// numerically exact zero, or the quotient comes out non-finite, the cell
/// becomes `default`, a value rather than nodata. Downstream consumers of
/// ratio grids require a numeric placeholder there.
pub fn div_assign(a: &mut Grid, b: &Grid, default: f64) {
    zip_assign(a, b, move |x, y| {
        if y == 0.0 {
            return default;
        }
        let q = x / y;
        if q.is_finite() {
            q
        } else {
            default
        }
    });
}

/// Division as a value combinator: returns a new grid and leaves both
/// operands untouched. Same arithmetic contract as [`div_assign`].
pub fn safe_divide(a: &Grid, b: &Grid, default: f64) -> Grid {
    let mut out = a.clone();
    div_assign(&mut out, b, default);
    out
}

/// Sets every cell to `value`, nodata cells included. The budget model
/// uses this to build the `1 - x` complement of a fraction grid: fill with
/// one, then subtract; the subtraction restores nodata where the fraction
/// grid has none.
pub fn fill(a: &mut Grid, value: f64) {
    for cell in a.cells_mut() {
        *cell = Some(value);
    }
}

/// Rewrites degenerate ratio values in a grid destined to be reused as a
/// multiplicative weight: exactly 0.0 becomes [`FRACTION_EPS_LO`], exactly
/// 1.0 becomes [`FRACTION_EPS_HI`]. Nodata and every other value pass
/// through unchanged.
///
/// This runs as a dedicated pass after the ratio is derived, never inlined
/// into the division itself: final ratio outputs keep their exact values.
pub fn clamp_unit_fractions(a: &mut Grid) {
    for cell in a.cells_mut() {
        match *cell {
            Some(v) if v == 0.0 => *cell = Some(FRACTION_EPS_LO),
            Some(v) if v == 1.0 => *cell = Some(FRACTION_EPS_HI),
            _ => {}
        }
    }
}

/// Tolerant variant of [`clamp_unit_fractions`]: values within `tol` of 0
/// or 1 are clamped. The exact comparison above is fragile under
/// accumulated floating-point error, but it is what the pipeline has
/// always done; this mode exists as a tested alternative and is not wired
/// into the budget model.
pub fn clamp_unit_fractions_within(a: &mut Grid, tol: f64) {
    for cell in a.cells_mut() {
        match *cell {
            Some(v) if v.abs() <= tol => *cell = Some(FRACTION_EPS_LO),
            Some(v) if (v - 1.0).abs() <= tol => *cell = Some(FRACTION_EPS_HI),
            _ => {}
        }
    }
}

/// Deposition-floor correction: deposition observed at a cell cannot be
/// less than what the same cell re-emits. Where both cells hold data and
/// `dep < floor`, the deposition cell is raised to the floor value. In
/// every other case, nodata on either side included, the original
/// deposition cell is kept as-is, *not* marked nodata.
pub fn apply_floor(dep: &mut Grid, floor: &Grid) {
    debug_assert_eq!(dep.len(), floor.len());
    dep.cells_mut()
        .par_iter_mut()
        .zip(floor.cells().par_iter())
        .for_each(|(d, f)| {
            if let (Some(dv), Some(fv)) = (*d, *f) {
                if dv < fv {
                    *d = Some(fv);
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{test_header, Grid};
    use rstest::rstest;

    fn grid(cells: Vec<Option<f64>>) -> Grid {
        Grid::from_cells(test_header(cells.len(), 1), cells)
    }

    #[test]
    fn test_nodata_propagates_through_add_sub_mul() {
        let a = grid(vec![Some(4.0), None, Some(2.0), None]);
        let b = grid(vec![Some(1.0), Some(1.0), None, None]);

        for op in [add_assign, sub_assign, mul_assign] {
            let mut out = a.clone();
            op(&mut out, &b);
            assert!(out.get(0).is_some());
            assert_eq!(out.get(1), None);
            assert_eq!(out.get(2), None);
            assert_eq!(out.get(3), None);
        }
    }

    #[test]
    fn test_arithmetic_values() {
        let a = grid(vec![Some(6.0)]);
        let b = grid(vec![Some(4.0)]);

        let mut sum = a.clone();
        add_assign(&mut sum, &b);
        assert_eq!(sum.get(0), Some(10.0));

        let mut diff = a.clone();
        sub_assign(&mut diff, &b);
        assert_eq!(diff.get(0), Some(2.0));

        let mut prod = a.clone();
        mul_assign(&mut prod, &b);
        assert_eq!(prod.get(0), Some(24.0));
    }

    #[test]
    fn test_safe_divide_substitutes_default_on_zero_denominator() {
        let a = grid(vec![Some(8.0), Some(8.0), None, Some(8.0)]);
        let b = grid(vec![Some(2.0), Some(0.0), Some(2.0), None]);

        let out = safe_divide(&a, &b, -9999.0);
        assert_eq!(out.get(0), Some(4.0));
        // Zero denominator: default value, not nodata.
        assert_eq!(out.get(1), Some(-9999.0));
        // A non-finite quotient also takes the default.
        let huge = grid(vec![Some(f64::MAX)]);
        let tiny = grid(vec![Some(f64::MIN_POSITIVE)]);
        assert_eq!(safe_divide(&huge, &tiny, -9999.0).get(0), Some(-9999.0));
        // Nodata on either side still propagates.
        assert_eq!(out.get(2), None);
        assert_eq!(out.get(3), None);
        // Operands untouched.
        assert_eq!(a.get(1), Some(8.0));
        assert_eq!(b.get(1), Some(0.0));
    }

    #[rstest]
    #[case(Some(0.0), Some(FRACTION_EPS_LO))]
    #[case(Some(1.0), Some(FRACTION_EPS_HI))]
    #[case(Some(0.5), Some(0.5))]
    #[case(Some(-0.2), Some(-0.2))]
    #[case(Some(1.3), Some(1.3))]
    // Near-degenerate values are NOT clamped by the exact-comparison pass.
    #[case(Some(1e-12), Some(1e-12))]
    #[case(Some(0.9999999), Some(0.9999999))]
    #[case(None, None)]
    fn test_clamp_unit_fractions(#[case] input: Option<f64>, #[case] expected: Option<f64>) {
        let mut g = grid(vec![input]);
        clamp_unit_fractions(&mut g);
        assert_eq!(g.get(0), expected);
    }

    #[rstest]
    #[case(Some(1e-12), Some(FRACTION_EPS_LO))]
    #[case(Some(0.9999999999), Some(FRACTION_EPS_HI))]
    #[case(Some(0.5), Some(0.5))]
    #[case(None, None)]
    fn test_clamp_tolerant_mode(#[case] input: Option<f64>, #[case] expected: Option<f64>) {
        let mut g = grid(vec![input]);
        clamp_unit_fractions_within(&mut g, 1e-9);
        assert_eq!(g.get(0), expected);
    }

    #[rstest]
    #[case(Some(3.0), Some(5.0), Some(5.0))] // raised to the floor
    #[case(Some(7.0), Some(5.0), Some(7.0))] // already above
    #[case(Some(5.0), Some(5.0), Some(5.0))] // equal: untouched
    #[case(None, Some(5.0), None)] // nodata deposition stays nodata
    #[case(Some(3.0), None, Some(3.0))] // nodata floor keeps the original
    #[case(None, None, None)]
    fn test_deposition_floor(
        #[case] dep: Option<f64>,
        #[case] floor: Option<f64>,
        #[case] expected: Option<f64>,
    ) {
        let mut d = grid(vec![dep]);
        let f = grid(vec![floor]);
        apply_floor(&mut d, &f);
        assert_eq!(d.get(0), expected);
    }

    #[test]
    fn test_fill_writes_through_nodata_and_complement_restores_it() {
        let fraction = grid(vec![Some(0.25), None]);

        // The model's complement pattern: duplicate, fill with one, subtract.
        let mut complement = fraction.clone();
        fill(&mut complement, 1.0);
        assert_eq!(complement.get(1), Some(1.0));
        sub_assign(&mut complement, &fraction);
        assert_eq!(complement.get(0), Some(0.75));
        assert_eq!(complement.get(1), None);
    }
}
