//! Degrees of freedom and Dirichlet constraints.
//!
//! Each node owns two DOFs, `2 * node` (x-velocity) and `2 * node + 1` (y-velocity).
//! Constraints are node based: a Dirichlet node prescribes both components, so every element
//! sharing the node sees the same constraint.
use crate::error::InputError;
use crate::grid::Grid;
use nalgebra::{DVector, Point2, SVector, Vector2};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DofConstraint {
    Free,
    /// The DOF is fixed to the given value.
    Dirichlet(f64),
}

impl DofConstraint {
    pub fn is_dirichlet(&self) -> bool {
        matches!(self, DofConstraint::Dirichlet(_))
    }
}

/// Node-level Dirichlet boundary data: which nodes are constrained and to which velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletData {
    values: Vec<Option<Vector2<f64>>>,
}

impl DirichletData {
    /// No constrained nodes.
    pub fn none(num_nodes: usize) -> Self {
        Self {
            values: vec![None; num_nodes],
        }
    }

    /// Constrains node `(i, j)` to `f(i, j, position)` wherever it returns `Some`.
    pub fn from_fn(grid: &Grid, mut f: impl FnMut(usize, usize, &Point2<f64>) -> Option<Vector2<f64>>) -> Self {
        let mut data = Self::none(grid.num_nodes());
        for j in 0..grid.my() {
            for i in 0..grid.mx() {
                data.values[grid.node_index(i, j)] = f(i, j, &grid.node_position(i, j));
            }
        }
        data
    }

    /// Prescribes `value` on every node of the outer domain boundary.
    pub fn on_domain_boundary(grid: &Grid, mut value: impl FnMut(&Point2<f64>) -> Vector2<f64>) -> Self {
        Self::from_fn(grid, |i, j, x| grid.is_boundary_node(i, j).then(|| value(x)))
    }

    pub fn set(&mut self, node: usize, value: Vector2<f64>) {
        self.values[node] = Some(value);
    }

    pub fn clear(&mut self, node: usize) {
        self.values[node] = None;
    }

    pub fn get(&self, node: usize) -> Option<Vector2<f64>> {
        self.values[node]
    }

    pub fn num_nodes(&self) -> usize {
        self.values.len()
    }

    pub fn num_constrained_nodes(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Global DOF indices and constraints of the corners of one element.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ElementDofs {
    pub nodes: [usize; 4],
    /// Interleaved: local DOF `2 * a + c` is component `c` of corner `a`.
    pub dofs: [usize; 8],
    pub constraints: [DofConstraint; 8],
}

#[derive(Debug, Clone, PartialEq)]
pub struct DofMap {
    constraints: Vec<DofConstraint>,
}

impl DofMap {
    pub fn new(grid: &Grid, dirichlet: &DirichletData) -> eyre::Result<Self> {
        if dirichlet.num_nodes() != grid.num_nodes() {
            return Err(InputError::SizeMismatch {
                field: "dirichlet",
                expected: grid.num_nodes(),
                actual: dirichlet.num_nodes(),
            }
            .into());
        }
        let mut constraints = vec![DofConstraint::Free; grid.num_dofs()];
        for (node, value) in dirichlet.values.iter().enumerate() {
            if let Some(value) = value {
                if !(value.x.is_finite() && value.y.is_finite()) {
                    return Err(InputError::InvalidConfig(format!(
                        "non-finite Dirichlet value prescribed at node {}",
                        node
                    ))
                    .into());
                }
                constraints[2 * node] = DofConstraint::Dirichlet(value.x);
                constraints[2 * node + 1] = DofConstraint::Dirichlet(value.y);
            }
        }
        Ok(Self { constraints })
    }

    pub fn num_dofs(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraint(&self, dof: usize) -> DofConstraint {
        self.constraints[dof]
    }

    pub fn is_dirichlet(&self, dof: usize) -> bool {
        self.constraints[dof].is_dirichlet()
    }

    pub fn element_dofs(&self, grid: &Grid, i: usize, j: usize) -> ElementDofs {
        let nodes = grid.element_nodes(i, j);
        let dofs = [
            2 * nodes[0],
            2 * nodes[0] + 1,
            2 * nodes[1],
            2 * nodes[1] + 1,
            2 * nodes[2],
            2 * nodes[2] + 1,
            2 * nodes[3],
            2 * nodes[3] + 1,
        ];
        ElementDofs {
            nodes,
            dofs,
            constraints: dofs.map(|dof| self.constraints[dof]),
        }
    }

    /// Gathers the element velocity from a global vector, reading prescribed values for
    /// Dirichlet DOFs instead of the vector entries.
    pub fn gather(&self, element: &ElementDofs, x: &[f64]) -> SVector<f64, 8> {
        SVector::from_fn(|k, _| match element.constraints[k] {
            DofConstraint::Free => x[element.dofs[k]],
            DofConstraint::Dirichlet(value) => value,
        })
    }

    /// `(dof, prescribed value)` for every Dirichlet DOF.
    pub fn dirichlet_dofs(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.constraints
            .iter()
            .enumerate()
            .filter_map(|(dof, constraint)| match constraint {
                DofConstraint::Dirichlet(value) => Some((dof, *value)),
                DofConstraint::Free => None,
            })
    }

    /// Overwrites the Dirichlet entries of `x` with their prescribed values.
    pub fn enforce(&self, x: &mut DVector<f64>) {
        for (dof, value) in self.dirichlet_dofs() {
            x[dof] = value;
        }
    }
}
