use ssafem::coefficients::Coefficients;
use ssafem::config::{LineSearchConfig, LinearConfig, NewtonConfig, SsaConfig};
use ssafem::constitutive::{FlowLaw, SlidingLaw, StrengthExtension};
use ssafem::error::InputError;
use ssafem::fields::CellType;
use ssafem::quadrature::StrainRate;
use ssafem_optimize::newton::BacktrackingLineSearch;

use crate::nondimensional_config;

#[test]
fn default_config_is_valid() {
    let config = SsaConfig::default();
    config.validate().unwrap();
    assert_eq!(config.epsilon_ssa, 1e13);
    assert_eq!(config.ice_rho, 910.0);
    assert_eq!(config.ocean_rho, 1028.0);
    assert!(!config.calving_front_stress_bc);
    assert!(config.front_parameters().is_none());
    assert!(matches!(config.flow_law, FlowLaw::Glen { exponent, .. } if exponent == 3.0));

    nondimensional_config().validate().unwrap();
}

#[test]
fn config_round_trips_through_json() {
    let config = nondimensional_config();
    let json = serde_json::to_string_pretty(&config).unwrap();
    let deserialized: SsaConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, config);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let json = r#"{
        "epsilon_ssa": 0.0,
        "flow_law": { "kind": "newtonian" },
        "calving_front_stress_bc": true,
        "newton": { "max_iterations": 7 }
    }"#;
    let config: SsaConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.epsilon_ssa, 0.0);
    assert_eq!(config.flow_law, FlowLaw::Newtonian);
    assert_eq!(config.newton.max_iterations, 7);
    assert_eq!(config.newton.relative_tolerance, NewtonConfig::default().relative_tolerance);
    assert_eq!(config.linear, LinearConfig::default());
    assert_eq!(config.sliding_law, SsaConfig::default().sliding_law);

    let front = config.front_parameters().unwrap();
    assert_eq!(front.ice_rho, 910.0);
    assert_eq!(front.standard_gravity, 9.81);
}

#[test]
fn invalid_configs_are_rejected() {
    let invalid = [
        SsaConfig {
            dirichlet_scale: 0.0,
            ..SsaConfig::default()
        },
        SsaConfig {
            epsilon_ssa: -1.0,
            ..SsaConfig::default()
        },
        SsaConfig {
            epsilon_ssa: 0.0,
            strength_extension: None,
            ..SsaConfig::default()
        },
        SsaConfig {
            flow_law: FlowLaw::Glen {
                exponent: 3.0,
                strain_rate_regularization: 0.0,
            },
            ..SsaConfig::default()
        },
        SsaConfig {
            sliding_law: SlidingLaw::Plastic { regularization: 0.0 },
            ..SsaConfig::default()
        },
        SsaConfig {
            sliding_law: SlidingLaw::PseudoPlastic {
                q: 1.5,
                u_threshold: 1.0,
                regularization: 0.1,
            },
            ..SsaConfig::default()
        },
        SsaConfig {
            sliding_law: SlidingLaw::RegularizedCoulomb {
                q: 0.5,
                u_threshold: 0.0,
                regularization: 0.1,
            },
            ..SsaConfig::default()
        },
        SsaConfig {
            ocean_rho: f64::NAN,
            ..SsaConfig::default()
        },
    ];
    for config in invalid {
        assert!(matches!(config.validate(), Err(InputError::InvalidConfig(_))), "{:?}", config);
    }

    let invalid_line_searches = [
        LineSearchConfig {
            sufficient_decrease: 0.0,
            ..LineSearchConfig::default()
        },
        LineSearchConfig {
            contraction: 1.0,
            ..LineSearchConfig::default()
        },
        LineSearchConfig {
            min_step: 0.0,
            ..LineSearchConfig::default()
        },
    ];
    for line_search in invalid_line_searches {
        let mut config = SsaConfig::default();
        config.newton.line_search = Some(line_search);
        assert!(matches!(config.validate(), Err(InputError::InvalidConfig(_))), "{:?}", line_search);
    }
}

#[test]
fn accepted_configs_keep_viscosity_positive_on_ice_free_points() {
    let candidates = [
        SsaConfig::default(),
        nondimensional_config(),
        SsaConfig {
            flow_law: FlowLaw::Newtonian,
            strength_extension: None,
            ..nondimensional_config()
        },
        SsaConfig {
            epsilon_ssa: 0.0,
            strength_extension: None,
            ..nondimensional_config()
        },
        SsaConfig {
            epsilon_ssa: 0.0,
            strength_extension: Some(StrengthExtension {
                min_thickness: 0.5,
                constant_nu: 1e-3,
            }),
            ..nondimensional_config()
        },
    ];

    let ice_free = Coefficients {
        thickness: 0.0,
        hardness: 1.0,
        mask: CellType::IceFreeOcean,
        ..Default::default()
    };
    let mut accepted = 0;
    for config in candidates.iter().filter(|config| config.validate().is_ok()) {
        accepted += 1;
        let law = config.constitutive_law();
        for rate in [0.0, 1e-3, 10.0] {
            let strain_rate = StrainRate {
                u_x: rate,
                v_y: -rate,
                u_y: 0.0,
                v_x: 0.0,
            };
            let viscosity = law.viscosity(&ice_free, &strain_rate);
            assert!(viscosity.nu_h > 0.0, "{:?} gives nuH = {} at rate {}", config, viscosity.nu_h, rate);
        }
    }
    assert_eq!(accepted, 3);
}

#[test]
fn solver_settings_follow_config() {
    let newton = NewtonConfig {
        max_iterations: 3,
        line_search: None,
        divergence_tolerance: None,
        ..NewtonConfig::default()
    };
    let linear = LinearConfig {
        relative_tolerance: 1e-3,
        ..LinearConfig::default()
    };
    let settings = newton.solver_settings(&linear);
    assert_eq!(settings.newton.max_iterations, Some(3));
    assert_eq!(settings.newton.divergence_tolerance, None);
    assert_eq!(settings.newton.relative_tolerance, newton.relative_tolerance);
    assert_eq!(settings.linear.relative_tolerance, 1e-3);
    assert_eq!(settings.linear.max_iterations, Some(10_000));
    assert!(settings.line_search.is_none());

    let newton = NewtonConfig {
        line_search: Some(LineSearchConfig {
            sufficient_decrease: 0.25,
            contraction: 0.1,
            min_step: 1e-3,
        }),
        ..NewtonConfig::default()
    };
    let line_search = newton.solver_settings(&linear).line_search.unwrap();
    assert_eq!(line_search.sufficient_decrease, 0.25);
    assert_eq!(line_search.contraction, 0.1);
    assert_eq!(line_search.min_step, 1e-3);

    let settings = NewtonConfig::default().solver_settings(&linear);
    assert_eq!(settings.line_search, Some(BacktrackingLineSearch::default()));
}
