//! Grid dimensions, seed data and texel addressing.
//!
//! Every state buffer in a graph shares one `GridDims`. Storage is always
//! rectangular, so particle scenarios round the element count up to the next
//! square and leave the excess cells as padding.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// Channels per cell (RGBA).
pub const CHANNELS: usize = 4;

/// Immutable 2D grid size shared by every variable in a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridDims {
    width: u32,
    height: u32,
}

impl GridDims {
    pub fn new(width: u32, height: u32) -> GraphResult<Self> {
        if width == 0 || height == 0 {
            return Err(GraphError::EmptyGrid { width, height });
        }
        Ok(Self { width, height })
    }

    /// Smallest square grid holding `count` elements.
    pub fn for_elements(count: usize) -> GraphResult<Self> {
        let mut side = (count as f64).sqrt().ceil() as u32;
        while (side as usize) * (side as usize) < count {
            side += 1;
        }
        Self::new(side, side)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of floats in a full RGBA seed for this grid.
    pub fn seed_len(&self) -> usize {
        self.cell_count() * CHANNELS
    }

    /// Row-major cell index.
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Inverse of [`GridDims::index`]: `(index % width, index / width)`.
    pub fn coord_of(&self, index: usize) -> (u32, u32) {
        let w = self.width as usize;
        ((index % w) as u32, (index / w) as u32)
    }

    /// Texel-centre uv of a linear element index.
    pub fn texel_uv(&self, index: usize) -> [f32; 2] {
        let (x, y) = self.coord_of(index);
        [
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        ]
    }

    /// Fails when `count` logical elements exceed the cell count.
    pub fn ensure_fits(&self, count: usize) -> GraphResult<()> {
        if count > self.cell_count() {
            return Err(GraphError::GridTooSmall {
                count,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// A zero-filled seed.
    pub fn zeroed(&self) -> Seed {
        Seed {
            dims: *self,
            data: vec![0.0; self.seed_len()],
        }
    }

    /// Validates `data` against this grid and wraps it as a seed.
    pub fn seed(&self, data: Vec<f32>) -> GraphResult<Seed> {
        if data.len() != self.seed_len() {
            return Err(GraphError::SeedLength {
                actual: data.len(),
                expected: self.seed_len(),
                width: self.width,
                height: self.height,
            });
        }
        Ok(Seed { dims: *self, data })
    }

    /// Builds a flat per-element attribute table of `count * size` floats.
    ///
    /// `builder` receives `(x, y, index)` for each of the first `count`
    /// cells in row-major order and must return exactly `size` values.
    pub fn build_attribute<F>(&self, count: usize, size: usize, mut builder: F) -> GraphResult<Vec<f32>>
    where
        F: FnMut(u32, u32, usize) -> Vec<f32>,
    {
        self.ensure_fits(count)?;
        let mut table = Vec::with_capacity(count * size);
        for index in 0..count {
            let (x, y) = self.coord_of(index);
            let values = builder(x, y, index);
            if values.len() != size {
                return Err(GraphError::AttributeLength {
                    expected: size,
                    actual: values.len(),
                    index,
                });
            }
            table.extend_from_slice(&values);
        }
        Ok(table)
    }
}

/// Edge policy for out-of-range texel loads.
///
/// Sampling is always nearest-neighbour; only the addressing mode varies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

impl WrapMode {
    /// Maps a possibly out-of-range coordinate onto `0..size`.
    pub fn resolve(self, coord: i32, size: u32) -> u32 {
        let n = size as i32;
        match self {
            WrapMode::ClampToEdge => coord.clamp(0, n - 1) as u32,
            WrapMode::Repeat => coord.rem_euclid(n) as u32,
            WrapMode::MirroredRepeat => {
                let period = 2 * n;
                let m = coord.rem_euclid(period);
                if m < n {
                    m as u32
                } else {
                    (period - 1 - m) as u32
                }
            }
        }
    }
}

/// Validated initial contents for one variable: `width * height * 4` floats,
/// row-major, four channels per cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Seed {
    dims: GridDims,
    data: Vec<f32>,
}

impl Seed {
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn texels_mut(&mut self) -> &mut [[f32; 4]] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    pub fn texel(&self, index: usize) -> [f32; 4] {
        self.texels()[index]
    }

    pub fn set_texel(&mut self, index: usize, value: [f32; 4]) {
        self.texels_mut()[index] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_elements_rounds_up() {
        assert_eq!(GridDims::for_elements(1000).unwrap().width(), 32);
        assert_eq!(GridDims::for_elements(1024).unwrap().width(), 32);
        assert_eq!(GridDims::for_elements(1025).unwrap().width(), 33);
        assert_eq!(GridDims::for_elements(2).unwrap().cell_count(), 4);
        assert!(GridDims::for_elements(0).is_err());
    }

    #[test]
    fn test_index_round_trip_on_rectangular_grid() {
        let dims = GridDims::new(5, 3).unwrap();
        assert_eq!(dims.index(4, 2), 14);
        assert_eq!(dims.coord_of(14), (4, 2));
        assert_eq!(dims.texel_uv(0), [0.1, 1.0 / 6.0]);
    }

    #[test]
    fn test_wrap_modes() {
        assert_eq!(WrapMode::ClampToEdge.resolve(-1, 4), 0);
        assert_eq!(WrapMode::ClampToEdge.resolve(7, 4), 3);
        assert_eq!(WrapMode::Repeat.resolve(-1, 4), 3);
        assert_eq!(WrapMode::Repeat.resolve(4, 4), 0);
        assert_eq!(WrapMode::MirroredRepeat.resolve(-1, 4), 0);
        assert_eq!(WrapMode::MirroredRepeat.resolve(4, 4), 3);
        assert_eq!(WrapMode::MirroredRepeat.resolve(5, 4), 2);
    }

    #[test]
    fn test_seed_rejects_wrong_length() {
        let dims = GridDims::new(4, 4).unwrap();
        let err = dims.seed(vec![0.0; 63]).unwrap_err();
        assert!(matches!(err, GraphError::SeedLength { expected: 64, .. }));
    }

    #[test]
    fn test_build_attribute_checks_length() {
        let dims = GridDims::new(2, 2).unwrap();
        let table = dims
            .build_attribute(3, 2, |x, y, _| vec![x as f32, y as f32])
            .unwrap();
        assert_eq!(table, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);

        let err = dims
            .build_attribute(3, 2, |_, _, i| vec![0.0; i + 1])
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::AttributeLength {
                expected: 2,
                actual: 1,
                index: 0
            }
        );
        assert!(dims.build_attribute(5, 1, |_, _, _| vec![0.0]).is_err());
    }
}
