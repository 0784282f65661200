//! Solver configuration.
//!
//! Defaults are SI values (m, s, Pa, kg) typical of continental-scale ice-sheet models. Every
//! struct is `serde`-deserializable with `#[serde(default)]`, so a configuration file only needs
//! to list the values it changes.
use crate::assembly::front::FrontParameters;
use crate::constitutive::{ConstitutiveLaw, FlowLaw, SlidingLaw, StrengthExtension};
use crate::error::InputError;
use serde::{Deserialize, Serialize};
use ssafem_optimize::krylov::{LinearSolverSettings, NewtonKrylovSettings};
use ssafem_optimize::newton::{BacktrackingLineSearch, NewtonSettings};

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaConfig {
    /// Added to the depth-integrated viscosity `nuH` everywhere (Pa m s). Must be positive.
    pub epsilon_ssa: f64,
    /// Scale of the Dirichlet rows of the residual and Jacobian.
    pub dirichlet_scale: f64,
    pub ice_rho: f64,
    pub ocean_rho: f64,
    pub standard_gravity: f64,
    /// Basal drag coefficient on ice-free bedrock (Pa s / m).
    pub beta_ice_free_bedrock: f64,
    pub flow_law: FlowLaw,
    pub sliding_law: SlidingLaw,
    pub strength_extension: Option<StrengthExtension>,
    /// Apply the ocean pressure imbalance at calving fronts.
    pub calving_front_stress_bc: bool,
    pub newton: NewtonConfig,
    pub linear: LinearConfig,
    /// Log residual and Jacobian norms at every evaluation (at `trace` level).
    pub monitor: bool,
}

impl Default for SsaConfig {
    fn default() -> Self {
        Self {
            epsilon_ssa: 1.0e13,
            dirichlet_scale: 1.0,
            ice_rho: 910.0,
            ocean_rho: 1028.0,
            standard_gravity: 9.81,
            beta_ice_free_bedrock: 1.8e9,
            flow_law: FlowLaw::Glen {
                exponent: 3.0,
                // (1 m/year / 1000 km)^2
                strain_rate_regularization: (1.0 / SECONDS_PER_YEAR / 1.0e6).powi(2),
            },
            sliding_law: SlidingLaw::PseudoPlastic {
                q: 0.25,
                u_threshold: 100.0 / SECONDS_PER_YEAR,
                regularization: 0.01 / SECONDS_PER_YEAR,
            },
            strength_extension: Some(StrengthExtension {
                min_thickness: 50.0,
                constant_nu: 9.48680e14,
            }),
            calving_front_stress_bc: false,
            newton: NewtonConfig::default(),
            linear: LinearConfig::default(),
            monitor: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    /// Stop when the residual norm exceeds this multiple of the initial one.
    pub divergence_tolerance: Option<f64>,
    /// Backtracking line search on the residual norm; `None` takes full Newton steps.
    pub line_search: Option<LineSearchConfig>,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            absolute_tolerance: 1e-50,
            relative_tolerance: 1e-8,
            divergence_tolerance: Some(1e4),
            line_search: Some(LineSearchConfig::default()),
        }
    }
}

/// Armijo backtracking: a step length `a` along the Newton direction is accepted once
/// `|F(x + a dx)|^2 <= (1 - 2 c a) |F(x)|^2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchConfig {
    /// The constant `c`.
    pub sufficient_decrease: f64,
    /// Factor applied to `a` after every rejected trial.
    pub contraction: f64,
    /// The search fails once `a` drops below this.
    pub min_step: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            contraction: 0.5,
            min_step: 1e-8,
        }
    }
}

impl From<LineSearchConfig> for BacktrackingLineSearch<f64> {
    fn from(config: LineSearchConfig) -> Self {
        Self {
            sufficient_decrease: config.sufficient_decrease,
            contraction: config.contraction,
            min_step: config.min_step,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub max_iterations: Option<usize>,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-5,
            absolute_tolerance: 1e-50,
            max_iterations: Some(10_000),
        }
    }
}

impl SsaConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        let fail = |msg: String| Err(InputError::InvalidConfig(msg));
        let positive = [
            ("dirichlet_scale", self.dirichlet_scale),
            ("ice_rho", self.ice_rho),
            ("ocean_rho", self.ocean_rho),
            ("standard_gravity", self.standard_gravity),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return fail(format!("{} must be positive and finite, got {}", name, value));
            }
        }
        // nuH must stay positive where the ice thickness vanishes
        if !(self.epsilon_ssa > 0.0 && self.epsilon_ssa.is_finite()) {
            return fail(format!("epsilon_ssa must be positive and finite, got {}", self.epsilon_ssa));
        }
        if !(self.beta_ice_free_bedrock >= 0.0 && self.beta_ice_free_bedrock.is_finite()) {
            return fail(format!(
                "beta_ice_free_bedrock must be non-negative, got {}",
                self.beta_ice_free_bedrock
            ));
        }

        if let FlowLaw::Glen {
            exponent,
            strain_rate_regularization,
        } = self.flow_law
        {
            if !(exponent >= 1.0) {
                return fail(format!("Glen exponent must be at least 1, got {}", exponent));
            }
            if exponent > 1.0 && !(strain_rate_regularization > 0.0) {
                return fail("Glen flow law with n > 1 needs a positive strain rate regularization".to_string());
            }
        }

        if !(self.sliding_law.regularization() > 0.0) {
            return fail("sliding law regularization must be positive".to_string());
        }
        match self.sliding_law {
            SlidingLaw::Plastic { .. } => {}
            SlidingLaw::PseudoPlastic { q, u_threshold, .. } | SlidingLaw::RegularizedCoulomb { q, u_threshold, .. } => {
                if !(0.0..=1.0).contains(&q) {
                    return fail(format!("sliding exponent q must lie in [0, 1], got {}", q));
                }
                if !(u_threshold > 0.0) {
                    return fail(format!("u_threshold must be positive, got {}", u_threshold));
                }
            }
        }

        if let Some(extension) = self.strength_extension {
            if !(extension.min_thickness >= 0.0 && extension.constant_nu > 0.0) {
                return fail("strength extension needs min_thickness >= 0 and constant_nu > 0".to_string());
            }
        }

        if !(self.newton.relative_tolerance >= 0.0 && self.newton.absolute_tolerance >= 0.0) {
            return fail("Newton tolerances must be non-negative".to_string());
        }
        if let Some(line_search) = self.newton.line_search {
            let LineSearchConfig {
                sufficient_decrease,
                contraction,
                min_step,
            } = line_search;
            if !(sufficient_decrease > 0.0 && sufficient_decrease < 1.0) {
                return fail(format!("sufficient_decrease must lie in (0, 1), got {}", sufficient_decrease));
            }
            if !(contraction > 0.0 && contraction < 1.0) {
                return fail(format!("line search contraction must lie in (0, 1), got {}", contraction));
            }
            if !(min_step > 0.0 && min_step <= 1.0) {
                return fail(format!("min_step must lie in (0, 1], got {}", min_step));
            }
        }
        if !(self.linear.relative_tolerance > 0.0 || self.linear.absolute_tolerance > 0.0) {
            return fail("at least one linear solver tolerance must be positive".to_string());
        }
        Ok(())
    }

    pub fn constitutive_law(&self) -> ConstitutiveLaw {
        ConstitutiveLaw {
            flow_law: self.flow_law,
            sliding_law: self.sliding_law,
            strength_extension: self.strength_extension,
            epsilon_ssa: self.epsilon_ssa,
            beta_ice_free_bedrock: self.beta_ice_free_bedrock,
        }
    }

    /// Parameters of the calving-front term, if it is enabled.
    pub fn front_parameters(&self) -> Option<FrontParameters> {
        self.calving_front_stress_bc.then_some(FrontParameters {
            ice_rho: self.ice_rho,
            ocean_rho: self.ocean_rho,
            standard_gravity: self.standard_gravity,
        })
    }
}

impl NewtonConfig {
    pub fn solver_settings(&self, linear: &LinearConfig) -> NewtonKrylovSettings<f64> {
        NewtonKrylovSettings {
            newton: NewtonSettings {
                max_iterations: Some(self.max_iterations),
                absolute_tolerance: self.absolute_tolerance,
                relative_tolerance: self.relative_tolerance,
                divergence_tolerance: self.divergence_tolerance,
            },
            linear: LinearSolverSettings {
                relative_tolerance: linear.relative_tolerance,
                absolute_tolerance: linear.absolute_tolerance,
                max_iterations: linear.max_iterations,
            },
            line_search: self.line_search.map(BacktrackingLineSearch::from),
        }
    }
}
