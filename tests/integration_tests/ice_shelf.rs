//! A floating ice shelf attached to a grounding line at `x = 0` and ending in a calving front,
//! driven only by the ocean pressure imbalance at the front.
use nalgebra::Vector2;
use ssafem::config::SsaConfig;
use ssafem::constitutive::{FlowLaw, StrengthExtension};
use ssafem::dofmap::DirichletData;
use ssafem::fields::CellType;
use ssafem::grid::Grid;
use ssafem::solver::SsaSolver;

use crate::{constant_fields, test_config};

const FRONT: usize = 7;

fn shelf_solver(calving_front_stress_bc: bool) -> SsaSolver {
    let grid = Grid::uniform(11, 5, [0.0, 10.0], [-2.0, 2.0]).unwrap();
    let n = grid.num_nodes();
    let mask: Vec<_> = (0..n)
        .map(|node| {
            if grid.node_coordinates(node).0 <= FRONT {
                CellType::Floating
            } else {
                CellType::IceFreeOcean
            }
        })
        .collect();
    let thickness = mask.iter().map(|cell| if cell.is_icy() { 1.0 } else { 0.0 }).collect();
    let inputs = constant_fields(&grid, 1.0, 0.0, Vector2::zeros(), CellType::Floating)
        .with_thickness(thickness)
        .with_bed(vec![-100.0; n])
        .with_mask(mask);
    let dirichlet = DirichletData::from_fn(&grid, |i, _, _| (i == 0).then(Vector2::zeros));

    let config = SsaConfig {
        flow_law: FlowLaw::Newtonian,
        strength_extension: Some(StrengthExtension {
            min_thickness: 0.5,
            constant_nu: 1e-3,
        }),
        calving_front_stress_bc,
        ..test_config(FlowLaw::Newtonian)
    };
    let mut solver = SsaSolver::new(grid, config).unwrap();
    solver.set_dirichlet(&dirichlet).unwrap();
    solver.prepare(&inputs).unwrap();
    solver
}

#[test]
fn shelf_without_front_stress_stays_at_rest() {
    let mut solver = shelf_solver(false);
    let reason = solver.solve().unwrap();
    assert!(reason.succeeded(), "{}", reason);
    assert_eq!(solver.result().unwrap().velocity.amax(), 0.0);
}

#[test]
fn front_stress_pushes_shelf_seaward() {
    let mut solver = shelf_solver(true);
    let reason = solver.solve().unwrap();
    assert!(reason.succeeded(), "{}", reason);

    let grid = solver.grid();
    let velocity = &solver.result().unwrap().velocity;
    let u = |i: usize, j: usize| velocity[2 * grid.node_index(i, j)];
    let v = |i: usize, j: usize| velocity[2 * grid.node_index(i, j) + 1];

    // Spreading accelerates towards the front along the centerline
    for i in 0..FRONT {
        assert!(u(i + 1, 2) > u(i, 2), "u({}, 2) = {}, u({}, 2) = {}", i + 1, u(i + 1, 2), i, u(i, 2));
    }
    assert!(u(FRONT, 2) > 0.0);

    // Symmetric about the centerline
    let scale = u(FRONT, 2);
    for i in 0..grid.mx() {
        for j in 0..2 {
            assert!((u(i, j) - u(i, 4 - j)).abs() <= 1e-8 * scale);
            assert!((v(i, j) + v(i, 4 - j)).abs() <= 1e-8 * scale);
        }
        assert!(v(i, 2).abs() <= 1e-8 * scale);
    }
}
