//! `proptest` strategies for grids and physical inputs.
use crate::dofmap::DirichletData;
use crate::fields::{CellType, InputFields};
use crate::grid::Grid;
use ::proptest::prelude::*;
use nalgebra::Vector2;

impl Arbitrary for CellType {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            Just(CellType::IceFreeBedrock),
            Just(CellType::Grounded),
            Just(CellType::Floating),
            Just(CellType::IceFreeOcean),
        ]
        .boxed()
    }
}

/// Uniform grids with `2..=max_nodes` nodes in each direction on a box of moderate size.
pub fn uniform_grid(max_nodes: usize) -> impl Strategy<Value = Grid> {
    assert!(max_nodes >= 2);
    let nodes = 2..=max_nodes;
    let extent = 0.5f64..4.0;
    (nodes.clone(), nodes, extent.clone(), extent).prop_map(|(mx, my, lx, ly)| {
        Grid::uniform(mx, my, [0.0, lx], [-ly, ly]).expect("at least two nodes and a positive extent")
    })
}

/// Non-dimensional inputs of order one on `num_nodes` nodes.
///
/// Thickness is zero exactly where the mask is ice free, so the strength extension and the
/// masked drag are both exercised.
pub fn input_fields(num_nodes: usize) -> impl Strategy<Value = InputFields> {
    let mask = prop::collection::vec(any::<CellType>(), num_nodes);
    let thickness = prop::collection::vec(0.1f64..2.0, num_nodes);
    let bed = prop::collection::vec(-1.0f64..1.0, num_nodes);
    let hardness = prop::collection::vec(0.5f64..2.0, num_nodes);
    let yield_stress = prop::collection::vec(0.0f64..1.0, num_nodes);
    let driving_stress = prop::collection::vec([-1.0f64..1.0, -1.0..1.0], num_nodes);
    (mask, thickness, bed, hardness, yield_stress, driving_stress).prop_map(
        |(mask, thickness, bed, hardness, yield_stress, driving_stress)| {
            let thickness = thickness
                .iter()
                .zip(&mask)
                .map(|(&h, cell)| if cell.is_icy() { h } else { 0.0 })
                .collect();
            InputFields::new()
                .with_thickness(thickness)
                .with_bed(bed)
                .with_hardness(hardness)
                .with_yield_stress(yield_stress)
                .with_driving_stress(
                    driving_stress
                        .into_iter()
                        .map(|[x, y]| Vector2::new(x, y))
                        .collect(),
                )
                .with_mask(mask)
        },
    )
}

/// Dirichlet data prescribing arbitrary velocities on a random subset of the nodes of `grid`.
pub fn dirichlet_data(grid: &Grid) -> impl Strategy<Value = DirichletData> {
    let num_nodes = grid.num_nodes();
    prop::collection::vec(prop::option::weighted(0.2, [-1.0f64..1.0, -1.0..1.0]), num_nodes).prop_map(
        move |values| {
            let mut data = DirichletData::none(num_nodes);
            for (node, value) in values.into_iter().enumerate() {
                if let Some([u, v]) = value {
                    data.set(node, Vector2::new(u, v));
                }
            }
            data
        },
    )
}
