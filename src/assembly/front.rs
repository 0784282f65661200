//! Calving-front stress boundary condition.
//!
//! At a vertical ice front facing the ocean, the depth-integrated difference between the
//! cryostatic pressure of the ice and the hydrostatic pressure of the water,
//! `P = rho_i g H^2 / 2 - rho_w g d^2 / 2` with `d` the submerged depth, acts on the ice along
//! the outward normal. Its weak form `int P n psi ds` does not depend on the velocity, so it is
//! computed once per element when the coefficients are cached.
use crate::element::Quad4Element;
use crate::fields::{CellType, ValidatedFields};
use crate::grid::Grid;
use crate::nalgebra::SVector;
use crate::quadrature::SideQuadrature;

/// Material constants entering the front pressure.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrontParameters {
    pub ice_rho: f64,
    pub ocean_rho: f64,
    pub standard_gravity: f64,
}

impl FrontParameters {
    /// Depth of the ice column below sea level, between 0 and `thickness`.
    pub fn submerged_depth(&self, thickness: f64, bed: f64, sea_level: f64) -> f64 {
        let floating_base = sea_level - self.ice_rho / self.ocean_rho * thickness;
        let base = bed.max(floating_base);
        (sea_level - base).clamp(0.0, thickness.max(0.0))
    }

    /// Net depth-integrated pressure on a front of the given thickness.
    pub fn front_pressure(&self, thickness: f64, bed: f64, sea_level: f64) -> f64 {
        let d = self.submerged_depth(thickness, bed, sea_level);
        let g = self.standard_gravity;
        0.5 * self.ice_rho * g * thickness * thickness - 0.5 * self.ocean_rho * g * d * d
    }
}

fn is_icy_element(mask: &[CellType], nodes: &[usize; 4]) -> bool {
    nodes.iter().all(|&node| mask[node].is_icy())
}

/// Whether side `side` of icy element `(i, j)` is a calving front: the element across it is not
/// fully icy and touches ice-free ocean.
pub fn is_front_side(grid: &Grid, mask: &[CellType], i: usize, j: usize, side: usize) -> bool {
    match grid.element_neighbor(i, j, side) {
        Some((ni, nj)) => {
            let neighbor = grid.element_nodes(ni, nj);
            !is_icy_element(mask, &neighbor) && neighbor.iter().any(|&node| mask[node] == CellType::IceFreeOcean)
        }
        None => false,
    }
}

/// The element load `int_front P n psi ds` of element `(i, j)`, interleaved like the element
/// velocity, or `None` if the element has no front side.
pub fn element_front_load(
    grid: &Grid,
    fields: &ValidatedFields,
    params: &FrontParameters,
    element: &Quad4Element<f64>,
    i: usize,
    j: usize,
) -> Option<SVector<f64, 8>> {
    let nodes = grid.element_nodes(i, j);
    if !is_icy_element(fields.mask, &nodes) {
        return None;
    }

    let thickness = ValidatedFields::gather(fields.thickness, &nodes);
    let bed = ValidatedFields::gather(fields.bed, &nodes);

    let mut load = SVector::<f64, 8>::zeros();
    let mut has_front = false;
    for side in (0..4).filter(|&side| is_front_side(grid, fields.mask, i, j, side)) {
        has_front = true;
        let rule = SideQuadrature::new(element, side);
        for k in 0..2 {
            let psi = &rule.psi[k];
            let h: f64 = (0..4).map(|a| psi[a] * thickness[a]).sum();
            let b: f64 = (0..4).map(|a| psi[a] * bed[a]).sum();
            let pressure = params.front_pressure(h, b, fields.sea_level);
            for a in SideQuadrature::vertices(side) {
                let scale = rule.weights[k] * pressure * psi[a];
                load[2 * a] += scale * rule.normal.x;
                load[2 * a + 1] += scale * rule.normal.y;
            }
        }
    }

    has_front.then_some(load)
}
