//! Ice rheology and basal sliding laws.
//!
//! At every quadrature point the assemblers need the depth-integrated viscosity `nuH`, the basal
//! drag coefficient `beta`, and their exact derivatives. All laws are closed sets of variants
//! evaluated by `match`, so each point costs a handful of flops and a `powf` or two.
use crate::coefficients::Coefficients;
use crate::fields::CellType;
use crate::quadrature::StrainRate;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Viscosity as a function of the second invariant `gamma` of the strain rate.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowLaw {
    /// `nu = B / 2 * (eps + gamma)^((1 - n) / (2n))`.
    Glen {
        exponent: f64,
        /// Strain rate regularization `eps`, in units of `gamma` (squared strain rate).
        strain_rate_regularization: f64,
    },
    /// `nu = B / 2`.
    Newtonian,
}

impl FlowLaw {
    /// `(nu, dnu/dgamma)` for hardness `hardness`.
    pub fn viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64) {
        match *self {
            FlowLaw::Glen {
                exponent,
                strain_rate_regularization,
            } => {
                let p = (1.0 - exponent) / (2.0 * exponent);
                let base = strain_rate_regularization + gamma;
                let nu = 0.5 * hardness * base.powf(p);
                (nu, p * nu / base)
            }
            FlowLaw::Newtonian => (0.5 * hardness, 0.0),
        }
    }
}

/// Basal sliding laws, written in terms of the regularized sliding speed
/// `s = sqrt(delta^2 + |u|^2)`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlidingLaw {
    /// `beta = tauc / s`.
    Plastic { regularization: f64 },
    /// `beta = tauc * s^(q - 1) / u_threshold^q`.
    PseudoPlastic {
        q: f64,
        u_threshold: f64,
        regularization: f64,
    },
    /// `beta = tauc * s^(q - 1) / (s + u_threshold)^q`.
    RegularizedCoulomb {
        q: f64,
        u_threshold: f64,
        regularization: f64,
    },
}

impl SlidingLaw {
    pub fn regularization(&self) -> f64 {
        match *self {
            SlidingLaw::Plastic { regularization }
            | SlidingLaw::PseudoPlastic { regularization, .. }
            | SlidingLaw::RegularizedCoulomb { regularization, .. } => regularization,
        }
    }

    pub fn regularized_speed(&self, velocity: &Vector2<f64>) -> f64 {
        let delta = self.regularization();
        (delta * delta + velocity.norm_squared()).sqrt()
    }

    /// `(beta, dbeta/ds)` at regularized speed `s`.
    pub fn drag(&self, yield_stress: f64, s: f64) -> (f64, f64) {
        match *self {
            SlidingLaw::Plastic { .. } => {
                let beta = yield_stress / s;
                (beta, -beta / s)
            }
            SlidingLaw::PseudoPlastic { q, u_threshold, .. } => {
                let beta = yield_stress * s.powf(q - 1.0) / u_threshold.powf(q);
                (beta, (q - 1.0) * beta / s)
            }
            SlidingLaw::RegularizedCoulomb { q, u_threshold, .. } => {
                let beta = yield_stress * s.powf(q - 1.0) / (s + u_threshold).powf(q);
                (beta, beta * ((q - 1.0) / s - q / (s + u_threshold)))
            }
        }
    }
}

/// Replaces the flow law by a constant viscosity where the ice is thin.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthExtension {
    pub min_thickness: f64,
    pub constant_nu: f64,
}

impl StrengthExtension {
    /// The notional `nuH` used below `min_thickness`.
    pub fn notional_strength(&self) -> f64 {
        self.constant_nu * self.min_thickness
    }
}

/// `nuH` and its derivative with respect to the second invariant of the strain rate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viscosity {
    pub nu_h: f64,
    pub dnu_h: f64,
}

/// Basal drag coefficient, its derivative with respect to the regularized speed, and that speed.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BasalDrag {
    pub beta: f64,
    pub dbeta: f64,
    pub speed: f64,
}

/// Pointwise evaluator combining the flow law, sliding law and mask-dependent basal conditions.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ConstitutiveLaw {
    pub flow_law: FlowLaw,
    pub sliding_law: SlidingLaw,
    pub strength_extension: Option<StrengthExtension>,
    /// Added to every `nuH`; the only guard against vanishing viscosity.
    pub epsilon_ssa: f64,
    pub beta_ice_free_bedrock: f64,
}

impl ConstitutiveLaw {
    pub fn viscosity(&self, coefficients: &Coefficients, du: &StrainRate) -> Viscosity {
        let thickness = coefficients.thickness;
        let (nu_h, dnu_h) = match self.strength_extension {
            Some(extension) if thickness < extension.min_thickness => (extension.notional_strength(), 0.0),
            _ => {
                let (nu, dnu) = self
                    .flow_law
                    .viscosity(coefficients.hardness, du.second_invariant());
                (nu * thickness, dnu * thickness)
            }
        };
        Viscosity {
            nu_h: self.epsilon_ssa + nu_h,
            dnu_h,
        }
    }

    pub fn basal_drag(&self, coefficients: &Coefficients, velocity: &Vector2<f64>) -> BasalDrag {
        let speed = self.sliding_law.regularized_speed(velocity);
        let (beta, dbeta) = match coefficients.mask {
            CellType::Grounded => self.sliding_law.drag(coefficients.yield_stress, speed),
            CellType::IceFreeBedrock => (self.beta_ice_free_bedrock, 0.0),
            CellType::Floating | CellType::IceFreeOcean => (0.0, 0.0),
        };
        BasalDrag { beta, dbeta, speed }
    }

    pub fn evaluate(
        &self,
        coefficients: &Coefficients,
        velocity: &Vector2<f64>,
        du: &StrainRate,
    ) -> (Viscosity, BasalDrag) {
        (self.viscosity(coefficients, du), self.basal_drag(coefficients, velocity))
    }
}
