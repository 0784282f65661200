use matrixcompare::{assert_matrix_eq, assert_scalar_eq, prop_assert_matrix_eq};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Vector2};
use proptest::prelude::*;
use ssafem::assembly::front::FrontParameters;
use ssafem::assembly::jacobian::sparsity_pattern;
use ssafem::assembly::{ElementBuffers, SsaAssembler};
use ssafem::coefficients::CoefficientCache;
use ssafem::config::SsaConfig;
use ssafem::constitutive::StrengthExtension;
use ssafem::dofmap::{DirichletData, DofMap};
use ssafem::fields::{CellType, InputFields};
use ssafem::grid::Grid;
use ssafem::optimize::calculus::{approximate_jacobian, VectorFunctionBuilder};
use ssafem::proptest::{dirichlet_data, input_fields, uniform_grid};
use util::pseudo_random_vector;

use crate::{constant_fields, nondimensional_config};

fn build_cache(grid: &Grid, inputs: &InputFields, config: &SsaConfig) -> CoefficientCache {
    let fields = inputs.validate(grid).unwrap();
    let mut cache = CoefficientCache::new();
    cache
        .rebuild(grid, &fields, config.front_parameters().as_ref())
        .unwrap();
    cache
}

fn mixed_mask(grid: &Grid) -> Vec<CellType> {
    let cells = [
        CellType::Grounded,
        CellType::Floating,
        CellType::Grounded,
        CellType::IceFreeBedrock,
        CellType::Grounded,
        CellType::IceFreeOcean,
    ];
    (0..grid.num_nodes()).map(|node| cells[node % cells.len()]).collect()
}

#[test]
fn residual_vanishes_at_rest_without_forcing() {
    let grid = Grid::uniform(5, 4, [0.0, 2.0], [0.0, 1.5]).unwrap();
    let config = nondimensional_config();
    let inputs = constant_fields(&grid, 1.0, 0.7, Vector2::zeros(), CellType::Grounded).with_mask(mixed_mask(&grid));
    let cache = build_cache(&grid, &inputs, &config);
    let dofs = DofMap::new(&grid, &DirichletData::none(grid.num_nodes())).unwrap();
    let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);

    let residual = assembler.assemble_residual(&DVector::zeros(grid.num_dofs()));
    assert_eq!(residual.amax(), 0.0);
}

#[test]
fn residual_at_rest_is_minus_driving_stress_load() {
    let grid = Grid::uniform(5, 4, [0.0, 2.0], [0.0, 1.5]).unwrap();
    let config = nondimensional_config();
    let tau = Vector2::new(0.3, -1.2);
    let inputs = constant_fields(&grid, 1.0, 0.0, tau, CellType::Floating);
    let cache = build_cache(&grid, &inputs, &config);
    let dofs = DofMap::new(&grid, &DirichletData::none(grid.num_nodes())).unwrap();
    let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);

    let residual = assembler.assemble_residual(&DVector::zeros(grid.num_dofs()));
    let area = 2.0 * 1.5;
    let sum_x: f64 = residual.iter().step_by(2).sum();
    let sum_y: f64 = residual.iter().skip(1).step_by(2).sum();
    assert_scalar_eq!(sum_x, -tau.x * area, comp = abs, tol = 1e-12);
    assert_scalar_eq!(sum_y, -tau.y * area, comp = abs, tol = 1e-12);
}

#[test]
fn dirichlet_rows_are_scaled_identity() {
    let grid = Grid::uniform(4, 4, [0.0, 1.0], [0.0, 1.0]).unwrap();
    let config = SsaConfig {
        dirichlet_scale: 2.5,
        ..nondimensional_config()
    };
    let inputs = constant_fields(&grid, 1.0, 0.7, Vector2::new(1.0, 0.5), CellType::Grounded);
    let cache = build_cache(&grid, &inputs, &config);
    let dirichlet = DirichletData::from_fn(&grid, |i, _, _| (i == 0).then(|| Vector2::new(0.5, -0.25)));
    let dofs = DofMap::new(&grid, &dirichlet).unwrap();
    let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);

    let x = pseudo_random_vector(grid.num_dofs(), 3, 1.0);
    let residual = assembler.assemble_residual(&x);
    let jacobian = DMatrix::from(&assembler.assemble_jacobian(&x));

    for (dof, prescribed) in dofs.dirichlet_dofs() {
        assert_eq!(residual[dof], 2.5 * (x[dof] - prescribed));
        for other in (0..grid.num_dofs()).filter(|&other| other != dof) {
            assert_eq!(jacobian[(dof, other)], 0.0);
            assert_eq!(jacobian[(other, dof)], 0.0);
        }
        assert_eq!(jacobian[(dof, dof)], 2.5);
    }
}

#[test]
fn residual_ignores_iterate_at_dirichlet_dofs() {
    let grid = Grid::uniform(4, 3, [0.0, 1.0], [0.0, 1.0]).unwrap();
    let config = nondimensional_config();
    let inputs = constant_fields(&grid, 1.0, 0.7, Vector2::new(1.0, 0.5), CellType::Grounded);
    let cache = build_cache(&grid, &inputs, &config);
    let dirichlet = DirichletData::on_domain_boundary(&grid, |x| Vector2::new(x.y, x.x));
    let dofs = DofMap::new(&grid, &dirichlet).unwrap();
    let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);

    let x = pseudo_random_vector(grid.num_dofs(), 11, 1.0);
    let mut perturbed = x.clone();
    for (dof, _) in dofs.dirichlet_dofs() {
        perturbed[dof] += 10.0;
    }
    let r = assembler.assemble_residual(&x);
    let r_perturbed = assembler.assemble_residual(&perturbed);
    for dof in (0..grid.num_dofs()).filter(|&dof| !dofs.is_dirichlet(dof)) {
        assert_eq!(r[dof], r_perturbed[dof]);
    }
}

#[test]
fn jacobian_is_symmetric() {
    let grid = Grid::from_coordinates(vec![0.0, 0.5, 1.5, 2.0, 3.5], vec![0.0, 1.0, 1.25, 2.0]).unwrap();
    let config = nondimensional_config();
    let inputs = constant_fields(&grid, 1.0, 0.7, Vector2::new(1.0, 0.5), CellType::Grounded).with_mask(mixed_mask(&grid));
    let cache = build_cache(&grid, &inputs, &config);
    let mut dirichlet = DirichletData::none(grid.num_nodes());
    dirichlet.set(0, Vector2::new(1.0, 1.0));
    dirichlet.set(7, Vector2::zeros());
    let dofs = DofMap::new(&grid, &dirichlet).unwrap();
    let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);

    let x = pseudo_random_vector(grid.num_dofs(), 5, 2.0);
    let jacobian = DMatrix::from(&assembler.assemble_jacobian(&x));
    let scale = jacobian.amax();
    assert_matrix_eq!(jacobian, jacobian.transpose(), comp = abs, tol = 1e-12 * scale);

    // The velocity-dependent viscosity makes the Jacobian positive definite away from rest
    assert!(jacobian.clone().cholesky().is_some());
}

#[test]
fn sparsity_pattern_couples_neighboring_nodes() {
    let grid = Grid::uniform(4, 3, [0.0, 1.0], [0.0, 1.0]).unwrap();
    let pattern = sparsity_pattern(&grid);
    assert_eq!(pattern.major_dim(), grid.num_dofs());

    let interior = 2 * grid.node_index(1, 1);
    assert_eq!(pattern.lane(interior).len(), 18);
    assert_eq!(pattern.lane(interior + 1).len(), 18);
    let corner = 2 * grid.node_index(3, 2);
    assert_eq!(pattern.lane(corner).len(), 8);
    let edge = 2 * grid.node_index(1, 0);
    assert_eq!(pattern.lane(edge).len(), 12);
}

#[test]
fn partitioned_assembly_matches_global_assembly() {
    let grid = Grid::uniform(7, 6, [0.0, 3.0], [-1.0, 1.0]).unwrap();
    let config = nondimensional_config();
    let inputs = constant_fields(&grid, 1.0, 0.7, Vector2::new(1.0, 0.5), CellType::Grounded).with_mask(mixed_mask(&grid));
    let dirichlet = DirichletData::from_fn(&grid, |i, j, _| (i == 0 || j == 5).then(|| Vector2::new(0.1, 0.2)));
    let dofs = DofMap::new(&grid, &dirichlet).unwrap();
    let x = pseudo_random_vector(grid.num_dofs(), 17, 1.0);

    let cache = build_cache(&grid, &inputs, &config);
    let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);
    let residual = assembler.assemble_residual(&x);
    let jacobian = DMatrix::from(&assembler.assemble_jacobian(&x));

    let mut residual_sum = DVector::zeros(grid.num_dofs());
    let mut jacobian_sum = DMatrix::zeros(grid.num_dofs(), grid.num_dofs());
    let mut buffers = ElementBuffers::default();
    for patch in grid.partition(3, 2).unwrap() {
        let cache = build_cache(&patch, &inputs, &config);
        let assembler = SsaAssembler::new(&patch, &dofs, &cache, &config);

        let mut patch_residual = DVector::repeat(grid.num_dofs(), f64::NAN);
        assembler.assemble_residual_into(
            DVectorViewMut::from(&mut patch_residual),
            DVectorView::from(&x),
            &mut buffers,
        );
        // Rows of nodes owned by other ranks are left zero
        for node in (0..grid.num_nodes()).filter(|&node| !patch.is_owned(node)) {
            assert_eq!([patch_residual[2 * node], patch_residual[2 * node + 1]], [0.0, 0.0]);
        }
        residual_sum += patch_residual;

        let mut patch_jacobian = assembler.create_jacobian();
        assembler.assemble_jacobian_into(&mut patch_jacobian, DVectorView::from(&x), &mut buffers);
        jacobian_sum += DMatrix::from(&patch_jacobian);
    }

    assert_matrix_eq!(residual_sum, residual, comp = abs, tol = 1e-12);
    assert_matrix_eq!(jacobian_sum, jacobian, comp = abs, tol = 1e-12 * jacobian.amax());
}

#[test]
fn front_pressure_of_floating_and_grounded_columns() {
    let params = FrontParameters {
        ice_rho: 900.0,
        ocean_rho: 1000.0,
        standard_gravity: 10.0,
    };
    // Floating: 90% submerged
    assert_scalar_eq!(params.submerged_depth(100.0, -500.0, 0.0), 90.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(
        params.front_pressure(100.0, -500.0, 0.0),
        0.5 * 10.0 * (900.0 * 1e4 - 1000.0 * 8100.0),
        comp = abs,
        tol = 1e-6
    );
    // Grounded in shallow water
    assert_scalar_eq!(params.submerged_depth(100.0, -20.0, 0.0), 20.0, comp = abs, tol = 1e-12);
    // Grounded above sea level: no water pressure
    assert_scalar_eq!(params.submerged_depth(100.0, 5.0, 0.0), 0.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(params.front_pressure(100.0, 5.0, 0.0), 0.5 * 900.0 * 10.0 * 1e4, comp = abs, tol = 1e-6);
}

#[test]
fn calving_front_load_on_floating_slab() {
    // Ice shelf on x <= 2, open ocean beyond
    let grid = Grid::uniform(6, 3, [0.0, 5.0], [0.0, 2.0]).unwrap();
    let config = SsaConfig {
        calving_front_stress_bc: true,
        ..nondimensional_config()
    };
    let mask: Vec<_> = (0..grid.num_nodes())
        .map(|node| {
            if grid.node_coordinates(node).0 <= 2 {
                CellType::Floating
            } else {
                CellType::IceFreeOcean
            }
        })
        .collect();
    let thickness = mask.iter().map(|cell| if cell.is_icy() { 1.0 } else { 0.0 }).collect();
    let inputs = constant_fields(&grid, 1.0, 0.0, Vector2::zeros(), CellType::Floating)
        .with_thickness(thickness)
        .with_bed(vec![-10.0; grid.num_nodes()])
        .with_mask(mask);
    let cache = build_cache(&grid, &inputs, &config);
    let dofs = DofMap::new(&grid, &DirichletData::none(grid.num_nodes())).unwrap();
    let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);

    let residual = assembler.assemble_residual(&DVector::zeros(grid.num_dofs()));
    let (rho_i, rho_w, g) = (config.ice_rho, config.ocean_rho, config.standard_gravity);
    let pressure = 0.5 * g * rho_i * (1.0 - rho_i / rho_w);

    let sum_x: f64 = residual.iter().step_by(2).sum();
    let sum_y: f64 = residual.iter().skip(1).step_by(2).sum();
    assert_scalar_eq!(sum_x, -pressure * 2.0, comp = abs, tol = 1e-10);
    assert_scalar_eq!(sum_y, 0.0, comp = abs, tol = 1e-10);

    // The load acts on the front nodes only
    for node in 0..grid.num_nodes() {
        let (i, _) = grid.node_coordinates(node);
        if i != 2 {
            assert_scalar_eq!(residual[2 * node], 0.0, comp = abs, tol = 1e-12);
        } else {
            assert!(residual[2 * node] < 0.0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn jacobian_matches_finite_differences(
        (grid, inputs, dirichlet, seed) in uniform_grid(4).prop_flat_map(|grid| {
            let n = grid.num_nodes();
            (Just(grid.clone()), input_fields(n), dirichlet_data(&grid), any::<u64>())
        })
    ) {
        let config = SsaConfig {
            strength_extension: Some(StrengthExtension { min_thickness: 0.5, constant_nu: 1.0 }),
            ..nondimensional_config()
        };
        let cache = build_cache(&grid, &inputs, &config);
        let dofs = DofMap::new(&grid, &dirichlet).unwrap();
        let assembler = SsaAssembler::new(&grid, &dofs, &cache, &config);
        let x = pseudo_random_vector(grid.num_dofs(), seed, 1.0);

        let residual_function = VectorFunctionBuilder::with_dimension(grid.num_dofs())
            .with_function(|f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
                f.copy_from(&assembler.assemble_residual(&x.clone_owned()));
            });
        let approx = approximate_jacobian(residual_function, &x, &1e-6);
        let jacobian = DMatrix::from(&assembler.assemble_jacobian(&x));

        let tol = 1e-6 * (1.0 + jacobian.amax());
        prop_assert_matrix_eq!(jacobian, approx, comp = abs, tol = tol);
    }
}
