//! Addressing for the square cell grid.
//!
//! The cell buffers are flat, row-major arrays; everything that needs to
//! reason about 2D structure (seeding, the shaders' uniform data) goes through
//! the conversions here so the traversal order stays consistent end to end.

use crate::sim::SimError;

/// The grid is square and two-dimensional; the cell count is
/// `side_length^DIMENSION_COUNT`.
pub const DIMENSION_COUNT: u32 = 2;

/// Largest supported side length.
///
/// Keeps the cell count representable as a `u32`, which is what the linear
/// cell indices are everywhere: the seeding paths, the shaders' invocation
/// ids, and [`GridDims::coordinates_of`].
pub const MAX_SIDE_LENGTH: u32 = u16::MAX as u32;

/// Validated dimensions of the simulation grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDims {
    side: u32,
}

impl GridDims {
    /// Create grid dimensions with the given side length.
    ///
    /// A zero side length is invalid configuration, not an empty simulation,
    /// and a side beyond [`MAX_SIDE_LENGTH`] would push linear cell indices
    /// past `u32::MAX`.
    pub fn new(side: u32) -> Result<Self, SimError> {
        if side == 0 {
            return Err(SimError::ZeroSideLength);
        }
        if side > MAX_SIDE_LENGTH {
            return Err(SimError::SideLengthTooLarge {
                side,
                max: MAX_SIDE_LENGTH,
            });
        }
        Ok(Self { side })
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Total number of cells in the grid.
    pub fn cell_count(&self) -> u64 {
        u64::from(self.side).pow(DIMENSION_COUNT)
    }

    /// Convert a linear cell index to `(row, column)` coordinates.
    ///
    /// The caller is responsible for keeping `index` in range.
    pub fn coordinates_of(&self, index: u32) -> (u32, u32) {
        debug_assert!(u64::from(index) < self.cell_count());
        (index / self.side, index % self.side)
    }

    /// Convert `(row, column)` coordinates to a linear, row-major cell index.
    pub fn index_of(&self, row: u32, column: u32) -> u32 {
        debug_assert!(row < self.side && column < self.side);
        row * self.side + column
    }

    /// Normalized `(x, y)` position of a cell, each component in `[0, 1)`.
    ///
    /// Only used to sample procedural noise during seeding.
    pub fn normalized(&self, row: u32, column: u32) -> (f64, f64) {
        let side = f64::from(self.side);
        (f64::from(column) / side, f64::from(row) / side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_side_is_rejected() {
        assert!(matches!(GridDims::new(0), Err(SimError::ZeroSideLength)));
    }

    #[test]
    fn oversized_side_is_rejected() {
        assert!(matches!(
            GridDims::new(MAX_SIDE_LENGTH + 1),
            Err(SimError::SideLengthTooLarge { side: 65536, max: 65535 })
        ));
        let dims = GridDims::new(MAX_SIDE_LENGTH).unwrap();
        assert!(dims.cell_count() <= u64::from(u32::MAX));
    }

    #[test]
    fn cell_count_is_side_squared() {
        let dims = GridDims::new(4).unwrap();
        assert_eq!(dims.cell_count(), 16);
        let dims = GridDims::new(1028).unwrap();
        assert_eq!(dims.cell_count(), 1028 * 1028);
    }

    #[test]
    fn index_coordinate_round_trip() {
        for side in [1u32, 2, 3, 7, 16] {
            let dims = GridDims::new(side).unwrap();
            for index in 0..(side * side) {
                let (row, column) = dims.coordinates_of(index);
                assert!(row < side && column < side);
                assert_eq!(dims.index_of(row, column), index);
            }
        }
    }

    #[test]
    fn row_major_order() {
        let dims = GridDims::new(8).unwrap();
        assert_eq!(dims.coordinates_of(0), (0, 0));
        assert_eq!(dims.coordinates_of(7), (0, 7));
        assert_eq!(dims.coordinates_of(8), (1, 0));
        assert_eq!(dims.coordinates_of(63), (7, 7));
    }

    #[test]
    fn normalized_is_half_open() {
        let dims = GridDims::new(4).unwrap();
        assert_eq!(dims.normalized(0, 0), (0.0, 0.0));
        let (x, y) = dims.normalized(3, 3);
        assert_eq!((x, y), (0.75, 0.75));
        assert!(x < 1.0 && y < 1.0);
    }
}
