//! Node-centered physical input fields.
use crate::error::InputError;
use crate::grid::Grid;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Terrain classification of a node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    IceFreeBedrock,
    Grounded,
    Floating,
    IceFreeOcean,
}

impl CellType {
    pub fn is_icy(&self) -> bool {
        matches!(self, CellType::Grounded | CellType::Floating)
    }

    pub fn is_ice_free(&self) -> bool {
        !self.is_icy()
    }

    pub fn is_ocean(&self) -> bool {
        matches!(self, CellType::Floating | CellType::IceFreeOcean)
    }

    /// Integer codes used by mask files: 0 ice-free bedrock, 2 grounded, 3 floating,
    /// 4 ice-free ocean.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CellType::IceFreeBedrock),
            2 => Some(CellType::Grounded),
            3 => Some(CellType::Floating),
            4 => Some(CellType::IceFreeOcean),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            CellType::IceFreeBedrock => 0,
            CellType::Grounded => 2,
            CellType::Floating => 3,
            CellType::IceFreeOcean => 4,
        }
    }

    /// Classifies a column from the flotation criterion.
    ///
    /// Ice is present where `thickness > 0`. It floats where its base would lie above the bed,
    /// i.e. where `bed < sea_level - ice_rho / ocean_rho * thickness`.
    pub fn from_geometry(thickness: f64, bed: f64, sea_level: f64, ice_rho: f64, ocean_rho: f64) -> Self {
        let floats = bed < sea_level - ice_rho / ocean_rho * thickness;
        match (thickness > 0.0, floats) {
            (true, false) => CellType::Grounded,
            (true, true) => CellType::Floating,
            (false, false) => CellType::IceFreeBedrock,
            (false, true) => CellType::IceFreeOcean,
        }
    }
}

/// Physical inputs supplied by the geometry and thermodynamics collaborators.
///
/// Every field is node-centered and holds one value per grid node. Fields are optional so that
/// a missing one is reported by [`validate`](Self::validate) instead of by a panic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFields {
    pub thickness: Option<Vec<f64>>,
    pub bed: Option<Vec<f64>>,
    pub hardness: Option<Vec<f64>>,
    pub yield_stress: Option<Vec<f64>>,
    pub driving_stress: Option<Vec<Vector2<f64>>>,
    pub mask: Option<Vec<CellType>>,
    /// Only used by the calving-front stress boundary condition.
    pub sea_level: f64,
}

impl InputFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thickness(self, thickness: Vec<f64>) -> Self {
        Self {
            thickness: Some(thickness),
            ..self
        }
    }

    pub fn with_bed(self, bed: Vec<f64>) -> Self {
        Self { bed: Some(bed), ..self }
    }

    pub fn with_hardness(self, hardness: Vec<f64>) -> Self {
        Self {
            hardness: Some(hardness),
            ..self
        }
    }

    pub fn with_yield_stress(self, yield_stress: Vec<f64>) -> Self {
        Self {
            yield_stress: Some(yield_stress),
            ..self
        }
    }

    pub fn with_driving_stress(self, driving_stress: Vec<Vector2<f64>>) -> Self {
        Self {
            driving_stress: Some(driving_stress),
            ..self
        }
    }

    pub fn with_mask(self, mask: Vec<CellType>) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }

    pub fn with_sea_level(self, sea_level: f64) -> Self {
        Self { sea_level, ..self }
    }

    /// Derives the mask from thickness, bed and sea level with [`CellType::from_geometry`].
    pub fn with_mask_from_geometry(self, ice_rho: f64, ocean_rho: f64) -> eyre::Result<Self> {
        let thickness = self.thickness.as_ref().ok_or(InputError::MissingField("thickness"))?;
        let bed = self.bed.as_ref().ok_or(InputError::MissingField("bed"))?;
        if thickness.len() != bed.len() {
            return Err(InputError::SizeMismatch {
                field: "bed",
                expected: thickness.len(),
                actual: bed.len(),
            }
            .into());
        }
        let mask = thickness
            .iter()
            .zip(bed)
            .map(|(&h, &b)| CellType::from_geometry(h, b, self.sea_level, ice_rho, ocean_rho))
            .collect();
        Ok(self.with_mask(mask))
    }

    /// Checks that every field is present and sized to the grid.
    pub fn validate(&self, grid: &Grid) -> Result<ValidatedFields<'_>, InputError> {
        fn check<'a, T>(field: &'static str, values: &'a Option<Vec<T>>, n: usize) -> Result<&'a [T], InputError> {
            let values = values.as_deref().ok_or(InputError::MissingField(field))?;
            if values.len() != n {
                return Err(InputError::SizeMismatch {
                    field,
                    expected: n,
                    actual: values.len(),
                });
            }
            Ok(values)
        }

        let n = grid.num_nodes();
        Ok(ValidatedFields {
            thickness: check("thickness", &self.thickness, n)?,
            bed: check("bed", &self.bed, n)?,
            hardness: check("hardness", &self.hardness, n)?,
            yield_stress: check("yield_stress", &self.yield_stress, n)?,
            driving_stress: check("driving_stress", &self.driving_stress, n)?,
            mask: check("mask", &self.mask, n)?,
            sea_level: self.sea_level,
        })
    }
}

/// Borrowed view of [`InputFields`] whose fields are known to be present and correctly sized.
#[derive(Debug, Copy, Clone)]
pub struct ValidatedFields<'a> {
    pub thickness: &'a [f64],
    pub bed: &'a [f64],
    pub hardness: &'a [f64],
    pub yield_stress: &'a [f64],
    pub driving_stress: &'a [Vector2<f64>],
    pub mask: &'a [CellType],
    pub sea_level: f64,
}

impl<'a> ValidatedFields<'a> {
    /// Gathers `field` at the four corner nodes of an element.
    pub fn gather<T: Copy>(field: &[T], nodes: &[usize; 4]) -> [T; 4] {
        nodes.map(|node| field[node])
    }
}
