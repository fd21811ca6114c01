//! The nitrogen budget model: a fixed seven-stage DAG of grid derivations.
//!
//! Names follow the nutrient-modelling shorthand used in the input data
//! sets: `ag` is all agriculture, `ara` cropland (arable), `igl`/`egl`
//! intensive/extensive grassland, `agri` the ara+igl aggregate, `nat`
//! natural land. `f*` grids are dimensionless fractions, `n_*` grids
//! nitrogen masses per cell.
//!
//! Whether a derived grid is written to the output directory is an
//! explicit per-node flag here, so the artifact set of a run is fixed and
//! testable.

use crate::graph::{DerivationGraph, GraphError, Stage};

/// Division default for land-use fractions and nutrient-use efficiencies.
const NODATA_DEFAULT: f64 = -9999.0;

/// Builds the complete budget pipeline graph.
pub fn nitrogen_budget() -> Result<DerivationGraph, GraphError> {
    let mut g = DerivationGraph::new();

    // --- 1. land-use fractions ---
    let s = Stage::LandUseFractions;
    let a_tot = g.source("a_tot", s, "gridcell_area")?;
    let a_ag = g.source("a_ag", s, "agri_area")?;
    let a_ara = g.source("a_ara", s, "cropland_area")?;
    let a_igl = g.source("a_igl", s, "intgl_area")?;
    let a_egl = g.source("a_egl", s, "extgl_area")?;
    let a_nat = g.source("a_nat", s, "natural_area")?;

    let fag = g.div("fag", s, a_ag, a_tot, NODATA_DEFAULT, false)?;
    let fara = g.div("fara", s, a_ara, a_tot, NODATA_DEFAULT, false)?;
    let figl = g.div("figl", s, a_igl, a_tot, NODATA_DEFAULT, false)?;
    let a_agri = g.sum("a_agri", s, &[a_ara, a_igl], false)?;
    let fagri = g.div("fagri", s, a_agri, a_tot, NODATA_DEFAULT, true)?;
    let fegl = g.div("fegl", s, a_egl, a_tot, NODATA_DEFAULT, true)?;
    let fnat = g.div("fnat", s, a_nat, a_tot, NODATA_DEFAULT, true)?;
    let a_land = g.sum("a_land", s, &[a_ag, a_nat], false)?;
    g.div("fland", s, a_land, a_tot, NODATA_DEFAULT, false)?;

    // --- 2. inputs: fertilizer, manure, fixation ---
    let s = Stage::NutrientInputs;
    let n_fert_ag = g.source("n_fert_ag", s, "fert_inp")?;
    let n_fert_ara = g.source("n_fert_ara", s, "fert_inp_cropland")?;
    let n_fert_igl = g.source("n_fert_igl", s, "fert_inp_grassland")?;
    let n_man_ag = g.source("n_man_ag", s, "manure_inp")?;
    let n_man_ara = g.source("n_man_ara", s, "manure_inp_cropland")?;
    let n_man_igl = g.source("n_man_igl", s, "manure_inp_intgl")?;
    let n_man_egl = g.source("n_man_egl", s, "manure_inp_extgl")?;
    let n_fix_ag = g.source("n_fix_ag", s, "nfixation_agri")?;
    let n_fix_ara = g.source("n_fix_ara", s, "nfixation_cropland")?;
    let n_fix_igl = g.source("n_fix_igl", s, "nfixation_intgl")?;
    let n_fix_egl = g.source("n_fix_egl", s, "nfixation_extgl")?;

    let n_fert_agri = g.sum("n_fert_agri", s, &[n_fert_ara, n_fert_igl], false)?;
    let n_man_agri = g.sum("n_man_agri", s, &[n_man_ara, n_man_igl], false)?;
    g.sum("n_fix_agri", s, &[n_fix_ara, n_fix_igl], true)?;

    // Share of mineral fertilizer in fertilizer+manure, clamped away from
    // the degenerate 0/1 endpoints because it is reused as a weight.
    let fert_man_ag = g.sum("fert_man_ag", s, &[n_man_ag, n_fert_ag], false)?;
    let frnfe_ag_ratio = g.div("frnfe_ag_ratio", s, n_fert_ag, fert_man_ag, 0.0, false)?;
    g.clamp("frnfe_ag", s, frnfe_ag_ratio, false)?;
    let fert_man_agri = g.sum("fert_man_agri", s, &[n_fert_agri, n_man_agri], true)?;
    let frnfe_agri_ratio = g.div("frnfe_agri_ratio", s, n_fert_agri, fert_man_agri, 0.0, false)?;
    g.clamp("frnfe_agri", s, frnfe_agri_ratio, true)?;

    // --- 3. NH3 emissions and emission fractions ---
    let s = Stage::AmmoniaEmissions;
    let nh3_spread_man = g.source("nh3_spread_man", s, "nh3_em_spread_manure")?;
    let nh3_spread_man_ara = g.source("nh3_spread_man_ara", s, "nh3_em_spread_manure_cropland")?;
    let nh3_spread_man_igl = g.source("nh3_spread_man_igl", s, "nh3_em_spread_manure_intgl")?;
    let nh3_spread_man_egl = g.source("nh3_spread_man_egl", s, "nh3_em_spread_manure_extgl")?;
    let nh3_stor = g.source("nh3_stor", s, "nh3_em_storage")?;
    let nh3_graz = g.source("nh3_graz", s, "nh3_em_grazing")?;
    let nh3_graz_igl = g.source("nh3_graz_igl", s, "nh3_em_grazing_int")?;
    let nh3_graz_egl = g.source("nh3_graz_egl", s, "nh3_em_grazing_ext")?;
    let nh3_spread_fert = g.source("nh3_spread_fert", s, "nh3_em_spread_fert")?;
    let nh3_spread_fert_ara = g.source("nh3_spread_fert_ara", s, "nh3_em_spread_fert_cropland")?;
    let nh3_spread_fert_igl = g.source("nh3_spread_fert_igl", s, "nh3_em_spread_fert_intgl")?;
    let nh3_spread_fert_egl = g.source("nh3_spread_fert_egl", s, "nh3_em_spread_fert_extgl")?;

    let nh3_tot = g.sum(
        "nh3_tot",
        s,
        &[nh3_spread_man, nh3_stor, nh3_graz, nh3_spread_fert],
        false,
    )?;
    let nh3_spread_fert_agri = g.sum(
        "nh3_spread_fert_agri",
        s,
        &[nh3_spread_fert_ara, nh3_spread_fert_igl],
        false,
    )?;
    let nh3_tot_agri = g.sum(
        "nh3_tot_agri",
        s,
        &[nh3_spread_fert_agri, nh3_spread_man_ara, nh3_spread_man_igl, nh3_stor, nh3_graz_igl],
        false,
    )?;
    g.sum(
        "nh3_tot_egl",
        s,
        &[nh3_spread_man_egl, nh3_graz_egl, nh3_spread_fert_egl],
        true,
    )?;

    // Emission factors: manure-borne and fertilizer-borne NH3 per unit of
    // the corresponding nutrient input.
    let nh3_man_tot = g.diff("nh3_man_tot", s, &[nh3_tot, nh3_spread_fert], false)?;
    g.div("nh3_ef_man", s, nh3_man_tot, n_man_ag, 0.0, false)?;
    let nh3_man_tot_agri = g.diff("nh3_man_tot_agri", s, &[nh3_tot_agri, nh3_spread_fert_agri], false)?;
    g.div("nh3_ef_man_agri", s, nh3_man_tot_agri, n_man_agri, 0.0, true)?;
    g.div("nh3_ef_fert", s, nh3_spread_fert, n_fert_ag, 0.0, false)?;
    g.div("nh3_ef_fert_agri", s, nh3_spread_fert_agri, n_fert_agri, 0.0, true)?;

    // --- 4. N deposition and NOx emission ---
    let s = Stage::DepositionCorrection;
    let ndep_tot = g.source("ndep_tot", s, "n_deposition")?;
    let ndep_tot_corr = g.deposition_floor("ndep_tot_corr", s, ndep_tot, nh3_tot, false)?;
    g.diff("nox_em", s, &[ndep_tot_corr, nh3_tot], true)?;

    let ndep_ag = g.mul("ndep_ag", s, ndep_tot_corr, fag, false)?;
    let ndep_ara = g.mul("ndep_ara", s, ndep_tot_corr, fara, false)?;
    let ndep_igl = g.mul("ndep_igl", s, ndep_tot_corr, figl, false)?;
    g.mul("ndep_agri", s, ndep_tot_corr, fagri, false)?;
    let ndep_egl = g.mul("ndep_egl", s, ndep_tot_corr, fegl, false)?;
    let ndep_nat = g.mul("ndep_nat", s, ndep_tot_corr, fnat, false)?;

    // --- 5. total N inputs per land-use category ---
    let s = Stage::TotalInputs;
    let n_in_ag = g.sum("n_in_ag", s, &[n_fert_ag, n_man_ag, n_fix_ag, ndep_ag], false)?;
    let n_in_ara = g.sum("n_in_ara", s, &[n_fert_ara, n_man_ara, n_fix_ara, ndep_ara], false)?;
    let n_in_igl = g.sum("n_in_igl", s, &[n_fert_igl, n_man_igl, n_fix_igl, ndep_igl], false)?;
    let n_in_agri = g.sum("n_in_agri", s, &[n_in_ara, n_in_igl], false)?;
    let n_in_egl = g.sum("n_in_egl", s, &[n_man_egl, n_fix_egl, ndep_egl], false)?;

    // --- 6. surface runoff, uptake, frnup, NUE ---
    let s = Stage::UptakeEfficiency;
    let nsro_ag = g.source("nsro_ag", s, "nsro_ag")?;
    let n_up_ara = g.source("n_up_ara", s, "uptake_cropland")?;
    let n_up_igl = g.source("n_up_igl", s, "uptake_intgl")?;
    let n_up_egl = g.source("n_up_egl", s, "uptake_extgl")?;

    let n_up_agri = g.sum("n_up_agri", s, &[n_up_ara, n_up_igl], false)?;
    let n_up_ag = g.sum("n_up_ag", s, &[n_up_agri, n_up_egl], false)?;

    let fsro_ag = g.div("fsro_ag", s, nsro_ag, n_in_ag, 0.0, true)?;
    let nsro_agri = g.mul("nsro_agri", s, fsro_ag, n_in_agri, false)?;
    let n_in_min_nsro_agri = g.diff("n_in_min_nsro_agri", s, &[n_in_agri, nsro_agri], false)?;
    g.div("frnup_agri", s, n_up_agri, n_in_min_nsro_agri, 0.0, true)?;

    g.div("nue_ara", s, n_up_ara, n_in_ara, NODATA_DEFAULT, false)?;
    g.div("nue_igl", s, n_up_igl, n_in_igl, NODATA_DEFAULT, false)?;
    g.div("nue_agri", s, n_up_agri, n_in_agri, NODATA_DEFAULT, false)?;
    g.div("nue_egl", s, n_up_egl, n_in_egl, NODATA_DEFAULT, false)?;

    // --- 7. budget, leaching, denitrification, load to surface water ---
    let s = Stage::BudgetLeaching;
    let ngw_ag = g.source("ngw_ag", s, "groundwaterload_ag")?;
    let fgw_rec_ag = g.source("fgw_rec_ag", s, "fraction_recent_groundwaterload_ag")?;
    let nle_ag = g.source("nle_ag", s, "leaching_ag")?;

    // Agriculture: budget, denitrification and the leaching fractions.
    let nbud_ag = g.diff("nbud_ag", s, &[n_in_ag, n_up_ag], true)?;
    let ngw_ag_rec = g.mul("ngw_ag_rec", s, ngw_ag, fgw_rec_ag, true)?;
    g.diff("nde_ag", s, &[nbud_ag, nsro_ag, nle_ag], true)?;
    let nbud_min_nsro_ag = g.diff("nbud_min_nsro_ag", s, &[nbud_ag, nsro_ag], false)?;
    g.div("fle_ag", s, nle_ag, nbud_min_nsro_ag, 0.0, true)?;
    g.div("fgw_rec_le_ag", s, ngw_ag_rec, nle_ag, 0.0, true)?;

    // Nature: the budget is deposition plus fixation.
    let n_fix_nat = g.source("n_fix_nat", s, "nfixation_nat")?;
    let ngw_nat = g.source("ngw_nat", s, "groundwaterload_nat")?;
    let fgw_rec_nat = g.source("fgw_rec_nat", s, "fraction_recent_groundwaterload_nat")?;
    let nsro_nat = g.source("nsro_nat", s, "nsro_nat")?;
    let nle_nat = g.source("nle_nat", s, "leaching_nat")?;

    let nbud_nat = g.sum("nbud_nat", s, &[ndep_nat, n_fix_nat], true)?;
    let ngw_nat_rec = g.mul("ngw_nat_rec", s, ngw_nat, fgw_rec_nat, true)?;
    g.diff("nde_nat", s, &[nbud_nat, nsro_nat, nle_nat], true)?;
    let nbud_min_nsro_nat = g.diff("nbud_min_nsro_nat", s, &[nbud_nat, nsro_nat], false)?;
    g.div("fle_nat", s, nle_nat, nbud_min_nsro_nat, 0.0, true)?;
    g.div("fsro_nat", s, nsro_nat, nbud_nat, 0.0, true)?;
    g.div("fgw_rec_le_nat", s, ngw_nat_rec, nle_nat, 0.0, true)?;

    // Loads to surface water. "Variable" load responds to recent inputs;
    // "fixed" load is the groundwater load delivered with a long delay,
    // weighted by the complement of the recent-delivery fraction.
    let nload_var_ag = g.sum("nload_var_ag", s, &[ngw_ag_rec, nsro_ag], false)?;
    let nload_var_nat = g.sum("nload_var_nat", s, &[ngw_nat_rec, nsro_nat], false)?;
    let fgw_old_ag = g.one_minus("fgw_old_ag", s, fgw_rec_ag, false)?;
    let nload_fixed_ag = g.mul("nload_fixed_ag", s, ngw_ag, fgw_old_ag, true)?;
    let fgw_old_nat = g.one_minus("fgw_old_nat", s, fgw_rec_nat, false)?;
    let nload_fixed_nat = g.mul("nload_fixed_nat", s, ngw_nat, fgw_old_nat, true)?;

    let nallo = g.source("nallo", s, "n_point_alloch_matter")?;
    let nww = g.source("nww", s, "n_point_wastewater")?;
    let naqua = g.source("naqua", s, "n_point_aquaculture")?;
    let ndep_sw = g.source("ndep_sw", s, "n_point_dep_surfacewater")?;
    let npoint_tot = g.sum("npoint_tot", s, &[nallo, nww, naqua, ndep_sw], true)?;

    let nero_ag = g.source("nero_ag", s, "n_in_erosion_ag")?;
    let nero_nat = g.source("nero_nat", s, "n_in_erosion_nat")?;
    let nero_tot = g.sum("nero_tot", s, &[nero_ag, nero_nat], true)?;

    g.sum(
        "nload_tot",
        s,
        &[nload_var_ag, nload_var_nat, nload_fixed_ag, nload_fixed_nat, npoint_tot, nero_tot],
        true,
    )?;

    Ok(g)
}
