//! Physical coefficients cached at quadrature points.
//!
//! Interpolating node-centered fields to quadrature points only has to happen when the physical
//! inputs change, not on every Newton iteration. The cache owns one entry per local element and
//! tracks explicitly whether its contents match the current inputs.
use crate::assembly::front::{element_front_load, FrontParameters};
use crate::element::Quad4Element;
use crate::error::InputError;
use crate::fields::{CellType, ValidatedFields};
use crate::grid::{Grid, Patch};
use crate::nalgebra::{Matrix1x4, Matrix2x4, SVector, Vector2};
use crate::quadrature::{ElementQuadrature, NUM_QUADRATURE_POINTS};
use log::debug;
use rayon::prelude::*;

/// Coefficients of the SSA at one quadrature point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Coefficients {
    pub thickness: f64,
    pub yield_stress: f64,
    pub bed: f64,
    pub hardness: f64,
    pub driving_stress: Vector2<f64>,
    pub mask: CellType,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            thickness: 0.0,
            yield_stress: 0.0,
            bed: 0.0,
            hardness: 0.0,
            driving_stress: Vector2::zeros(),
            mask: CellType::IceFreeOcean,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// The cached values do not correspond to the current inputs.
    Dirty,
    Valid,
}

/// Everything the assemblers need to know about one element besides the velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementCoefficients {
    /// Lower-left node of the element.
    pub i: usize,
    pub j: usize,
    pub quadrature: ElementQuadrature,
    pub points: [Coefficients; NUM_QUADRATURE_POINTS],
    /// Velocity-independent calving-front load, if the element has a front side.
    pub front_load: Option<SVector<f64, 8>>,
}

impl Default for ElementCoefficients {
    fn default() -> Self {
        Self {
            i: 0,
            j: 0,
            quadrature: ElementQuadrature {
                psi: [Matrix1x4::zeros(); NUM_QUADRATURE_POINTS],
                grad: [Matrix2x4::zeros(); NUM_QUADRATURE_POINTS],
                jxw: [0.0; NUM_QUADRATURE_POINTS],
            },
            points: [Coefficients::default(); NUM_QUADRATURE_POINTS],
            front_load: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoefficientCache {
    state: CacheState,
    element_range: Patch,
    elements: Vec<ElementCoefficients>,
}

impl Default for CoefficientCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CoefficientCache {
    pub fn new() -> Self {
        Self {
            state: CacheState::Dirty,
            element_range: Patch { xs: 0..0, ys: 0..0 },
            elements: Vec::new(),
        }
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == CacheState::Valid
    }

    /// Marks the cache as out of date, e.g. after the physical inputs changed.
    pub fn invalidate(&mut self) {
        self.state = CacheState::Dirty;
    }

    /// Recomputes the coefficients of every local (ghost-inclusive) element of `grid`.
    ///
    /// Existing storage is overwritten in place. On error the cache is left `Dirty`.
    pub fn rebuild(
        &mut self,
        grid: &Grid,
        fields: &ValidatedFields,
        front: Option<&FrontParameters>,
    ) -> Result<(), InputError> {
        self.state = CacheState::Dirty;
        let range = grid.local_elements();
        let nx = range.xs.len();
        self.elements.resize(range.len(), ElementCoefficients::default());

        self.elements
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(e, entry)| {
                let (i, j) = (range.xs.start + e % nx, range.ys.start + e / nx);
                compute_element_coefficients(grid, fields, front, i, j, entry)
            })?;

        let num_front_elements = self.elements.iter().filter(|e| e.front_load.is_some()).count();
        debug!(
            "Cached coefficients for {} elements ({} with calving-front loads)",
            self.elements.len(),
            num_front_elements
        );

        self.element_range = range;
        self.state = CacheState::Valid;
        Ok(())
    }

    /// The element patch the cache was built for.
    pub fn element_range(&self) -> &Patch {
        &self.element_range
    }

    pub fn elements(&self) -> &[ElementCoefficients] {
        &self.elements
    }
}

fn compute_element_coefficients(
    grid: &Grid,
    fields: &ValidatedFields,
    front: Option<&FrontParameters>,
    i: usize,
    j: usize,
    entry: &mut ElementCoefficients,
) -> Result<(), InputError> {
    let nodes = grid.element_nodes(i, j);
    let element = Quad4Element::from_vertices(grid.element_vertices(i, j));
    let quadrature = ElementQuadrature::new(&element).ok_or(InputError::DegenerateElement { i, j })?;

    let thickness = ValidatedFields::gather(fields.thickness, &nodes);
    let yield_stress = ValidatedFields::gather(fields.yield_stress, &nodes);
    let bed = ValidatedFields::gather(fields.bed, &nodes);
    let hardness = ValidatedFields::gather(fields.hardness, &nodes);
    let driving_stress = ValidatedFields::gather(fields.driving_stress, &nodes);
    let mask = ValidatedFields::gather(fields.mask, &nodes);

    for q in 0..NUM_QUADRATURE_POINTS {
        entry.points[q] = Coefficients {
            thickness: quadrature.scalar(q, &thickness),
            yield_stress: quadrature.scalar(q, &yield_stress),
            bed: quadrature.scalar(q, &bed),
            hardness: quadrature.scalar(q, &hardness),
            driving_stress: quadrature.vector2(q, &driving_stress),
            mask: mask[quadrature.dominant_node(q)],
        };
    }

    entry.i = i;
    entry.j = j;
    entry.front_load = front.and_then(|params| element_front_load(grid, fields, params, &element, i, j));
    entry.quadrature = quadrature;
    Ok(())
}
