use matrixcompare::assert_scalar_eq;
use nalgebra::Vector2;
use ssafem::coefficients::Coefficients;
use ssafem::constitutive::{ConstitutiveLaw, FlowLaw, SlidingLaw, StrengthExtension};
use ssafem::fields::CellType;
use ssafem::optimize::calculus::approximate_derivative;
use ssafem::quadrature::StrainRate;

fn sliding_laws() -> [SlidingLaw; 3] {
    [
        SlidingLaw::Plastic { regularization: 0.1 },
        SlidingLaw::PseudoPlastic {
            q: 0.25,
            u_threshold: 2.0,
            regularization: 0.1,
        },
        SlidingLaw::RegularizedCoulomb {
            q: 0.5,
            u_threshold: 0.7,
            regularization: 0.1,
        },
    ]
}

fn law(sliding_law: SlidingLaw) -> ConstitutiveLaw {
    ConstitutiveLaw {
        flow_law: FlowLaw::Glen {
            exponent: 3.0,
            strain_rate_regularization: 1e-2,
        },
        sliding_law,
        strength_extension: Some(StrengthExtension {
            min_thickness: 0.5,
            constant_nu: 4.0,
        }),
        epsilon_ssa: 0.125,
        beta_ice_free_bedrock: 3.0,
    }
}

fn grounded(thickness: f64) -> Coefficients {
    Coefficients {
        thickness,
        yield_stress: 1.5,
        bed: 0.0,
        hardness: 2.0,
        driving_stress: Vector2::zeros(),
        mask: CellType::Grounded,
    }
}

#[test]
fn newtonian_viscosity_is_constant() {
    let (nu, dnu) = FlowLaw::Newtonian.viscosity(3.0, 17.0);
    assert_eq!(nu, 1.5);
    assert_eq!(dnu, 0.0);
}

#[test]
fn glen_viscosity_and_derivative() {
    let glen = FlowLaw::Glen {
        exponent: 3.0,
        strain_rate_regularization: 1e-3,
    };
    for gamma in [0.0, 1e-2, 0.3, 5.0] {
        let (nu, dnu) = glen.viscosity(2.0, gamma);
        assert_scalar_eq!(nu, (1e-3 + gamma).powf(-1.0 / 3.0), comp = float);
        let approx = approximate_derivative(|g| glen.viscosity(2.0, g).0, gamma + 1e-3, 1e-7);
        let exact = glen.viscosity(2.0, gamma + 1e-3).1;
        assert_scalar_eq!(approx, exact, comp = abs, tol = 1e-5 * exact.abs());
        assert!(dnu < 0.0);
    }

    // n = 1 reduces to the Newtonian law
    let linear = FlowLaw::Glen {
        exponent: 1.0,
        strain_rate_regularization: 0.0,
    };
    assert_eq!(linear.viscosity(3.0, 0.7), (1.5, 0.0));
}

#[test]
fn regularized_viscosity_is_positive_and_decreasing() {
    let rest = StrainRate::default();
    let stretched = |rate: f64| StrainRate {
        u_x: rate,
        v_y: -0.5 * rate,
        ..StrainRate::default()
    };
    for epsilon_ssa in [1e-2, 1e-6, 1e-12] {
        let law = ConstitutiveLaw {
            epsilon_ssa,
            strength_extension: None,
            ..law(sliding_laws()[0])
        };
        let at_rest = law.viscosity(&grounded(1.0), &rest).nu_h;
        assert!(at_rest.is_finite() && at_rest > 0.0);

        let mut previous = at_rest;
        for rate in [1e-3, 1e-1, 1.0, 10.0] {
            let nu_h = law.viscosity(&grounded(1.0), &stretched(rate)).nu_h;
            assert!(nu_h > 0.0 && nu_h < previous, "rate {}: {} >= {}", rate, nu_h, previous);
            previous = nu_h;
        }
    }
}

#[test]
fn sliding_law_derivatives_match_finite_differences() {
    for sliding_law in sliding_laws() {
        for s in [0.1, 0.5, 1.0, 3.0] {
            let (beta, dbeta) = sliding_law.drag(1.5, s);
            assert!(beta > 0.0);
            let approx = approximate_derivative(|s| sliding_law.drag(1.5, s).0, s, 1e-7);
            assert_scalar_eq!(approx, dbeta, comp = abs, tol = 1e-6 * (1.0 + dbeta.abs()));
        }
    }
}

#[test]
fn plastic_drag_balances_yield_stress() {
    let plastic = SlidingLaw::Plastic { regularization: 0.01 };
    for speed in [0.5, 2.0, 10.0] {
        let u = Vector2::new(speed, 0.0);
        let s = plastic.regularized_speed(&u);
        let (beta, _) = plastic.drag(1.5, s);
        assert_scalar_eq!(beta * s, 1.5, comp = float);
    }
}

#[test]
fn pseudo_plastic_drag_at_threshold_speed() {
    let law = SlidingLaw::PseudoPlastic {
        q: 0.25,
        u_threshold: 2.0,
        regularization: 0.0,
    };
    // tau_b = tauc (|u| / u_threshold)^q = tauc at |u| = u_threshold
    let (beta, _) = law.drag(1.5, 2.0);
    assert_scalar_eq!(beta * 2.0, 1.5, comp = float);
}

#[test]
fn regularized_speed_is_positive() {
    let law = SlidingLaw::Plastic { regularization: 0.1 };
    assert_scalar_eq!(law.regularized_speed(&Vector2::zeros()), 0.1, comp = float);
    assert_scalar_eq!(law.regularized_speed(&Vector2::new(3.0, 4.0)), (25.01f64).sqrt(), comp = float);
}

#[test]
fn strength_extension_replaces_thin_ice_viscosity() {
    let law = law(sliding_laws()[0]);
    let du = StrainRate {
        u_x: 0.3,
        u_y: -1.0,
        v_x: 0.2,
        v_y: 0.1,
    };

    let thin = law.viscosity(&grounded(0.25), &du);
    assert_eq!(thin.nu_h, 0.125 + 4.0 * 0.5);
    assert_eq!(thin.dnu_h, 0.0);

    let thick = law.viscosity(&grounded(2.0), &du);
    let (nu, dnu) = law.flow_law.viscosity(2.0, du.second_invariant());
    assert_scalar_eq!(thick.nu_h, 0.125 + 2.0 * nu, comp = float);
    assert_scalar_eq!(thick.dnu_h, 2.0 * dnu, comp = float);

    let unextended = ConstitutiveLaw {
        strength_extension: None,
        ..law
    };
    let thin = unextended.viscosity(&grounded(0.25), &du);
    assert_scalar_eq!(thin.nu_h, 0.125 + 0.25 * nu, comp = float);
}

#[test]
fn basal_drag_depends_on_mask() {
    let u = Vector2::new(0.6, -0.8);
    for sliding_law in sliding_laws() {
        let law = law(sliding_law);
        let s = sliding_law.regularized_speed(&u);

        let drag = law.basal_drag(&grounded(1.0), &u);
        assert_eq!((drag.beta, drag.dbeta), sliding_law.drag(1.5, s));
        assert_eq!(drag.speed, s);

        let bedrock = Coefficients {
            mask: CellType::IceFreeBedrock,
            ..grounded(0.0)
        };
        let drag = law.basal_drag(&bedrock, &u);
        assert_eq!((drag.beta, drag.dbeta), (3.0, 0.0));

        for mask in [CellType::Floating, CellType::IceFreeOcean] {
            let coefficients = Coefficients { mask, ..grounded(1.0) };
            let drag = law.basal_drag(&coefficients, &u);
            assert_eq!((drag.beta, drag.dbeta), (0.0, 0.0));
        }
    }
}

#[test]
fn evaluate_combines_viscosity_and_drag() {
    let law = law(sliding_laws()[1]);
    let coefficients = grounded(1.0);
    let u = Vector2::new(1.0, 2.0);
    let du = StrainRate::default();
    let (viscosity, drag) = law.evaluate(&coefficients, &u, &du);
    assert_eq!(viscosity, law.viscosity(&coefficients, &du));
    assert_eq!(drag, law.basal_drag(&coefficients, &u));
}

#[test]
fn laws_deserialize_from_tagged_json() {
    let flow_law: FlowLaw =
        serde_json::from_str(r#"{ "kind": "glen", "exponent": 3.0, "strain_rate_regularization": 1e-10 }"#).unwrap();
    assert_eq!(
        flow_law,
        FlowLaw::Glen {
            exponent: 3.0,
            strain_rate_regularization: 1e-10
        }
    );
    let flow_law: FlowLaw = serde_json::from_str(r#"{ "kind": "newtonian" }"#).unwrap();
    assert_eq!(flow_law, FlowLaw::Newtonian);

    let sliding_law: SlidingLaw =
        serde_json::from_str(r#"{ "kind": "regularized_coulomb", "q": 0.5, "u_threshold": 1.0, "regularization": 0.01 }"#)
            .unwrap();
    assert_eq!(
        sliding_law,
        SlidingLaw::RegularizedCoulomb {
            q: 0.5,
            u_threshold: 1.0,
            regularization: 0.01
        }
    );
}
