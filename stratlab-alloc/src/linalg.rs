//! Dense linear algebra for the small systems the allocator solves.
//!
//! Products and transposes come from `ndarray`; this module adds the
//! singular-aware inverse and a few norms the solvers share.

use ndarray::{s, Array1, Array2};

pub type Matrix = Array2<f64>;
pub type Vector = Array1<f64>;

/// Pivots below this magnitude make a matrix numerically singular.
pub const SINGULAR_EPS: f64 = 1e-12;

pub fn is_square(m: &Matrix, n: usize) -> bool {
    m.dim() == (n, n)
}

/// Quadratic form vᵀ M v.
pub fn quad_form(m: &Matrix, v: &Vector) -> f64 {
    v.dot(&m.dot(v))
}

/// Maximum absolute row sum (∞-norm), an upper bound on the spectral radius.
pub fn inf_norm(m: &Matrix) -> f64 {
    m.rows()
        .into_iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Gauss-Jordan inverse on the augmented `[A | I]` with partial pivoting.
/// `None` if the matrix is not square or a pivot falls below [`SINGULAR_EPS`].
pub fn invert(m: &Matrix) -> Option<Matrix> {
    let n = m.nrows();
    if m.ncols() != n {
        return None;
    }
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    aug.slice_mut(s![.., ..n]).assign(m);
    aug.slice_mut(s![.., n..]).assign(&Array2::<f64>::eye(n));

    for col in 0..n {
        let pivot_row =
            (col..n).max_by(|&i, &j| aug[[i, col]].abs().total_cmp(&aug[[j, col]].abs()))?;
        let pivot = aug[[pivot_row, col]];
        if !pivot.is_finite() || pivot.abs() < SINGULAR_EPS {
            return None;
        }
        if pivot_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot_row_values = aug.row(col).to_owned() / pivot;
        aug.row_mut(col).assign(&pivot_row_values);
        for row in 0..n {
            let factor = aug[[row, col]];
            if row == col || factor == 0.0 {
                continue;
            }
            aug.row_mut(row).scaled_add(-factor, &pivot_row_values);
        }
    }
    Some(aug.slice(s![.., n..]).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn approx_eq(a: &Matrix, b: &Matrix, tol: f64) -> bool {
        a.dim() == b.dim() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        let m = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let inv = invert(&m).unwrap();
        assert!(approx_eq(&m.dot(&inv), &Array2::eye(3), 1e-12));
    }

    #[test]
    fn pivoting_handles_zero_diagonal() {
        let m = array![[0.0, 1.0], [1.0, 0.0]];
        let inv = invert(&m).unwrap();
        assert!(approx_eq(&inv, &m, 1e-15));
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        assert!(invert(&array![[1.0, 2.0], [2.0, 4.0]]).is_none());
        assert!(invert(&array![[1.0, 2.0]]).is_none());
        assert!(invert(&array![[f64::NAN, 0.0], [0.0, 1.0]]).is_none());
    }

    #[test]
    fn norms_and_quadratic_form() {
        assert_eq!(quad_form(&Array2::eye(3), &array![1.0, 2.0, 2.0]), 9.0);
        assert_eq!(inf_norm(&array![[1.0, -2.0], [0.5, 0.5]]), 3.0);
        assert!(is_square(&Array2::zeros((2, 2)), 2));
        assert!(!is_square(&Array2::zeros((2, 3)), 2));
    }
}
