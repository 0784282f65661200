//! Structured 2D grid with a rectangular owned patch and a ghost halo.
//!
//! Nodes are laid out row by row: node `(i, j)` has global index `j * mx + i`. Element `(i, j)`
//! is the cell whose lower-left node is `(i, j)`. A [`Grid`] describes the whole domain together
//! with the patch of nodes owned by one rank. Vectors are always indexed by global node/DOF
//! index; a rank reads entries of its ghost-inclusive node range and writes only owned rows.
use crate::error::InputError;
use nalgebra::Point2;
use std::ops::Range;

/// A rectangular range of nodes or elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub xs: Range<usize>,
    pub ys: Range<usize>,
}

impl Patch {
    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.xs.contains(&i) && self.ys.contains(&j)
    }

    pub fn len(&self) -> usize {
        self.xs.len() * self.ys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over `(i, j)` with `i` running fastest.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.ys.clone().flat_map(move |j| self.xs.clone().map(move |i| (i, j)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    x: Vec<f64>,
    y: Vec<f64>,
    owned: Patch,
    ghost_width: usize,
}

impl Grid {
    /// A tensor-product grid through the given, strictly increasing, node coordinates.
    ///
    /// The returned grid owns every node (single-rank layout).
    pub fn from_coordinates(x: Vec<f64>, y: Vec<f64>) -> eyre::Result<Self> {
        for (name, coords) in [("x", &x), ("y", &y)] {
            if coords.len() < 2 {
                return Err(InputError::InvalidGrid(format!("need at least two {} coordinates", name)).into());
            }
            let increasing = coords
                .windows(2)
                .all(|w| w[0].is_finite() && w[1].is_finite() && w[1] > w[0]);
            if !increasing {
                return Err(
                    InputError::InvalidGrid(format!("{} coordinates must be finite and strictly increasing", name))
                        .into(),
                );
            }
        }
        let owned = Patch {
            xs: 0..x.len(),
            ys: 0..y.len(),
        };
        Ok(Self {
            x,
            y,
            owned,
            ghost_width: 1,
        })
    }

    /// Uniform grid with `mx * my` nodes covering `[x_min, x_max] x [y_min, y_max]`.
    pub fn uniform(mx: usize, my: usize, x_range: [f64; 2], y_range: [f64; 2]) -> eyre::Result<Self> {
        if mx < 2 || my < 2 {
            return Err(InputError::InvalidGrid(format!("need at least 2x2 nodes, got {}x{}", mx, my)).into());
        }
        let linspace = |n: usize, [a, b]: [f64; 2]| -> Vec<f64> {
            (0..n)
                .map(|k| a + (b - a) * (k as f64) / ((n - 1) as f64))
                .collect()
        };
        Self::from_coordinates(linspace(mx, x_range), linspace(my, y_range))
    }

    /// Splits the owned nodes into `px * py` patches of (nearly) equal size, one per rank.
    ///
    /// Patches are returned in rank order, `x` running fastest.
    pub fn partition(&self, px: usize, py: usize) -> eyre::Result<Vec<Grid>> {
        if px == 0 || py == 0 || px > self.owned.xs.len() || py > self.owned.ys.len() {
            return Err(InputError::InvalidGrid(format!(
                "cannot split {}x{} owned nodes into {}x{} patches",
                self.owned.xs.len(),
                self.owned.ys.len(),
                px,
                py
            ))
            .into());
        }
        let split = |range: &Range<usize>, parts: usize| -> Vec<Range<usize>> {
            let n = range.len();
            (0..parts)
                .map(|p| (range.start + p * n / parts)..(range.start + (p + 1) * n / parts))
                .collect()
        };
        let xs = split(&self.owned.xs, px);
        let ys = split(&self.owned.ys, py);

        Ok(ys
            .iter()
            .flat_map(|ys| {
                xs.iter().map(move |xs| Grid {
                    x: self.x.clone(),
                    y: self.y.clone(),
                    owned: Patch {
                        xs: xs.clone(),
                        ys: ys.clone(),
                    },
                    ghost_width: self.ghost_width,
                })
            })
            .collect())
    }

    pub fn mx(&self) -> usize {
        self.x.len()
    }

    pub fn my(&self) -> usize {
        self.y.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.mx() * self.my()
    }

    pub fn num_dofs(&self) -> usize {
        2 * self.num_nodes()
    }

    pub fn node_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.mx() && j < self.my());
        j * self.mx() + i
    }

    /// Inverse of [`node_index`](Self::node_index).
    pub fn node_coordinates(&self, node: usize) -> (usize, usize) {
        (node % self.mx(), node / self.mx())
    }

    pub fn node_position(&self, i: usize, j: usize) -> Point2<f64> {
        Point2::new(self.x[i], self.y[j])
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn owned_nodes(&self) -> &Patch {
        &self.owned
    }

    pub fn is_owned(&self, node: usize) -> bool {
        let (i, j) = self.node_coordinates(node);
        self.owned.contains(i, j)
    }

    pub fn ghost_width(&self) -> usize {
        self.ghost_width
    }

    /// Owned nodes extended by the ghost halo, clipped to the domain.
    pub fn ghosted_nodes(&self) -> Patch {
        let w = self.ghost_width;
        Patch {
            xs: self.owned.xs.start.saturating_sub(w)..usize::min(self.owned.xs.end + w, self.mx()),
            ys: self.owned.ys.start.saturating_sub(w)..usize::min(self.owned.ys.end + w, self.my()),
        }
    }

    /// The elements that touch at least one owned node.
    ///
    /// All of their nodes lie in the ghost-inclusive node range, so assembling over these
    /// elements yields complete rows for every owned node.
    pub fn local_elements(&self) -> Patch {
        if self.owned.is_empty() {
            return Patch { xs: 0..0, ys: 0..0 };
        }
        Patch {
            xs: self.owned.xs.start.saturating_sub(1)..usize::min(self.owned.xs.end, self.mx() - 1),
            ys: self.owned.ys.start.saturating_sub(1)..usize::min(self.owned.ys.end, self.my() - 1),
        }
    }

    /// Corner nodes of element `(i, j)`, counter-clockwise from the lower-left corner.
    pub fn element_nodes(&self, i: usize, j: usize) -> [usize; 4] {
        [
            self.node_index(i, j),
            self.node_index(i + 1, j),
            self.node_index(i + 1, j + 1),
            self.node_index(i, j + 1),
        ]
    }

    pub fn element_vertices(&self, i: usize, j: usize) -> [Point2<f64>; 4] {
        [
            self.node_position(i, j),
            self.node_position(i + 1, j),
            self.node_position(i + 1, j + 1),
            self.node_position(i, j + 1),
        ]
    }

    /// The element across side `side` of element `(i, j)`, if it exists.
    ///
    /// Sides are numbered counter-clockwise: 0 bottom, 1 right, 2 top, 3 left.
    pub fn element_neighbor(&self, i: usize, j: usize, side: usize) -> Option<(usize, usize)> {
        let (ne_x, ne_y) = (self.mx() - 1, self.my() - 1);
        match side {
            0 if j > 0 => Some((i, j - 1)),
            1 if i + 1 < ne_x => Some((i + 1, j)),
            2 if j + 1 < ne_y => Some((i, j + 1)),
            3 if i > 0 => Some((i - 1, j)),
            _ => None,
        }
    }

    /// Whether node `(i, j)` lies on the outer boundary of the domain.
    pub fn is_boundary_node(&self, i: usize, j: usize) -> bool {
        i == 0 || j == 0 || i + 1 == self.mx() || j + 1 == self.my()
    }
}
