//! Random test systems.

use gauss_types::{Matrix, MatrixError};
use rand::Rng;

/// A random strictly diagonally dominant `size × size` system, which is
/// always non-singular.
pub fn diagonally_dominant<R: Rng>(size: usize, rng: &mut R) -> Result<Matrix, MatrixError> {
    let mut m = Matrix::new(size)?;
    for i in 0..size {
        let mut off_diagonal = 0.0;
        for j in (0..size).filter(|&j| j != i) {
            let value = rng.gen_range(-1.0..1.0);
            off_diagonal += f64::abs(value);
            m.set(i, j, value)?;
        }
        m.set(i, i, off_diagonal + rng.gen_range(1.0..2.0))?;
        m.set_rhs(i, rng.gen_range(-10.0..10.0))?;
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_dominant() {
        let mut rng = rand::thread_rng();
        let m = diagonally_dominant(8, &mut rng).unwrap();
        for i in 0..8 {
            let row = m.row(i).unwrap();
            let off: f64 = row.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, v)| v.abs()).sum();
            assert!(row[i] > off);
        }
    }
}
