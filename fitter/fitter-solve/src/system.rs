//! Sparse normal-equation assembly and the conjugate-gradient solve.
//!
//! Unknowns are per-(node, slot) scalar displacements, one system shared by
//! the three coordinate components. The data term accumulates basis-weight
//! outer products at each accepted projection; the smoothing term adds the
//! squared graph Laplacian over position DOFs (a discrete bending penalty)
//! and a Tikhonov penalty over derivative DOFs.

use crate::adjacency::node_neighbors;
use crate::{SolveError, SolveResult};
use fitter_project::ProjectionPass;
use fitter_types::{DerivativeSlot, ScaffoldMesh};
use hashbrown::{HashMap, HashSet};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Map from (node storage index, parameter slot) to system column.
///
/// Only pairs actually referenced by some element become unknowns; the
/// ordering (nodes ascending, slots in storage order) is deterministic.
#[derive(Debug)]
pub(crate) struct DofMap {
    columns: HashMap<(usize, DerivativeSlot), usize>,
    entries: Vec<(usize, DerivativeSlot)>,
}

impl DofMap {
    pub(crate) fn build(mesh: &ScaffoldMesh) -> Self {
        let mut used: HashSet<(usize, DerivativeSlot)> = HashSet::new();
        for element_index in 0..mesh.element_count() {
            let Some(element) = mesh.element(element_index) else {
                continue;
            };
            let Some(node_indices) = mesh.element_node_indices(element_index) else {
                continue;
            };
            for &node_index in node_indices {
                for &slot in element.dof_slots() {
                    used.insert((node_index, slot));
                }
            }
        }

        let mut columns = HashMap::with_capacity(used.len());
        let mut entries = Vec::with_capacity(used.len());
        for node_index in 0..mesh.node_count() {
            for slot in DerivativeSlot::ALL {
                if used.contains(&(node_index, slot)) {
                    columns.insert((node_index, slot), entries.len());
                    entries.push((node_index, slot));
                }
            }
        }

        Self { columns, entries }
    }

    pub(crate) fn column(&self, node_index: usize, slot: DerivativeSlot) -> Option<usize> {
        self.columns.get(&(node_index, slot)).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> &[(usize, DerivativeSlot)] {
        &self.entries
    }
}

/// The assembled normal equations: one symmetric matrix, three right-hand
/// sides (x, y, z components).
pub(crate) struct FitSystem {
    pub matrix: CsrMatrix<f64>,
    pub rhs: [DVector<f64>; 3],
    pub dofs: DofMap,
}

/// Assemble the regularized normal equations from a projection pass.
pub(crate) fn assemble(
    mesh: &ScaffoldMesh,
    pass: &ProjectionPass,
    smoothing_weight: f64,
) -> SolveResult<FitSystem> {
    let dofs = DofMap::build(mesh);
    let n = dofs.len();

    let mut coo = CooMatrix::new(n, n);
    let mut rhs = [
        DVector::zeros(n),
        DVector::zeros(n),
        DVector::zeros(n),
    ];

    // Data term: basis-weight row per accepted projection.
    for result in pass.accepted_results() {
        let eval = mesh.element_basis(result.element_index, &result.xi)?;
        let Some(element) = mesh.element(result.element_index) else {
            continue;
        };
        let Some(node_indices) = mesh.element_node_indices(result.element_index) else {
            continue;
        };
        let slots = element.dof_slots();

        let mut row: Vec<(usize, f64)> = Vec::with_capacity(eval.len());
        for (local, &node_index) in node_indices.iter().enumerate() {
            for (s, &slot) in slots.iter().enumerate() {
                let weight = eval.weights[local * slots.len() + s];
                if weight == 0.0 {
                    continue;
                }
                if let Some(column) = dofs.column(node_index, slot) {
                    row.push((column, weight));
                }
            }
        }

        accumulate_outer_product(&mut coo, &row, 1.0);
        for &(column, weight) in &row {
            for component in 0..3 {
                rhs[component][column] += weight * result.residual[component];
            }
        }
    }

    // Smoothing term: squared graph Laplacian over position DOFs plus
    // Tikhonov over derivative DOFs. Displacements start at zero, so the
    // penalty contributes nothing to the right-hand side.
    if smoothing_weight > 0.0 {
        let neighbors = node_neighbors(mesh);
        for (node_index, node_neighbors) in neighbors.iter().enumerate() {
            if node_neighbors.is_empty() {
                continue;
            }
            let Some(centre_column) = dofs.column(node_index, DerivativeSlot::Value) else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let inverse_degree = 1.0 / node_neighbors.len() as f64;

            let mut row: Vec<(usize, f64)> = Vec::with_capacity(node_neighbors.len() + 1);
            row.push((centre_column, 1.0));
            for &neighbor in node_neighbors {
                if let Some(column) = dofs.column(neighbor, DerivativeSlot::Value) {
                    row.push((column, -inverse_degree));
                }
            }
            accumulate_outer_product(&mut coo, &row, smoothing_weight);
        }

        for (column, &(_, slot)) in dofs.entries().iter().enumerate() {
            if slot != DerivativeSlot::Value {
                coo.push(column, column, smoothing_weight);
            }
        }
    }

    // Duplicate triplets are summed on conversion.
    let matrix = CsrMatrix::from(&coo);
    Ok(FitSystem { matrix, rhs, dofs })
}

/// Push `scale * row * row^T` into the accumulator.
fn accumulate_outer_product(coo: &mut CooMatrix<f64>, row: &[(usize, f64)], scale: f64) {
    for &(i, wi) in row {
        for &(j, wj) in row {
            let value = scale * wi * wj;
            if value.abs() > 1e-300 {
                coo.push(i, j, value);
            }
        }
    }
}

/// Solve the symmetric positive-definite system with Jacobi-preconditioned
/// conjugate gradients.
///
/// # Errors
///
/// [`SolveError::SingularSystem`] for a zero diagonal entry (an unknown
/// nothing constrains), an indefinite direction, or failure to converge.
pub(crate) fn solve_cg(matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> SolveResult<DVector<f64>> {
    let n = rhs.len();
    if n == 0 {
        return Ok(DVector::zeros(0));
    }

    let mut diagonal = DVector::<f64>::zeros(n);
    for (row_index, row) in matrix.row_iter().enumerate() {
        for (&column, &value) in row.col_indices().iter().zip(row.values().iter()) {
            if column == row_index {
                diagonal[row_index] += value;
            }
        }
    }
    for i in 0..n {
        if diagonal[i].abs() < 1e-14 {
            return Err(SolveError::SingularSystem {
                reason: format!("unconstrained degree of freedom at column {i}"),
            });
        }
    }

    let rhs_norm = rhs.norm();
    if rhs_norm == 0.0 {
        return Ok(DVector::zeros(n));
    }
    let tolerance = 1e-10 * rhs_norm;

    let mut x = DVector::zeros(n);
    let mut residual = rhs.clone();
    let mut z = residual.component_div(&diagonal);
    let mut direction = z.clone();
    let mut rz = residual.dot(&z);

    let max_iterations = 1000.max(20 * n);
    for _ in 0..max_iterations {
        let a_direction = spmv(matrix, &direction);
        let curvature = direction.dot(&a_direction);
        if curvature <= 0.0 {
            return Err(SolveError::SingularSystem {
                reason: "non-positive curvature direction".to_string(),
            });
        }

        let alpha = rz / curvature;
        x.axpy(alpha, &direction, 1.0);
        residual.axpy(-alpha, &a_direction, 1.0);

        if residual.norm() <= tolerance {
            return Ok(x);
        }

        z = residual.component_div(&diagonal);
        let rz_next = residual.dot(&z);
        let beta = rz_next / rz;
        rz = rz_next;
        direction = &z + beta * direction;
    }

    Err(SolveError::SingularSystem {
        reason: "conjugate gradients failed to converge".to_string(),
    })
}

/// Sparse matrix-vector product via row iteration.
fn spmv(matrix: &CsrMatrix<f64>, v: &DVector<f64>) -> DVector<f64> {
    let mut result = DVector::zeros(matrix.nrows());
    for (row_index, row) in matrix.row_iter().enumerate() {
        let mut sum = 0.0;
        for (&column, &value) in row.col_indices().iter().zip(row.values().iter()) {
            sum += value * v[column];
        }
        result[row_index] = sum;
    }
    result
}
