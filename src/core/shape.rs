/// Dimension sizes and row-major strides of a factor table.

use ndarray::IxDyn;

/// The shape of a multi-dimensional probability table.
///
/// Axis 0 is the most significant (slowest varying) index and the last axis
/// the least significant, so a freshly appended axis varies fastest. Every
/// reshaping operation on a factor goes through one of the transforms here
/// instead of recomputing offsets by hand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Shape {
    dims: Vec<usize>,
    strides: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        let strides = row_major_strides(&dims);
        Self { dims, strides }
    }

    /// The zero-dimensional shape holding a single value.
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Distance in the flat array between neighbouring indices of each axis.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Number of entries a table of this shape holds.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Flat offset of a full multi-index.
    pub fn flat_index(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(&self.strides)
            .map(|(i, stride)| i * stride)
            .sum()
    }

    /// Shape with a new fastest-varying axis appended.
    pub fn push_dim(&self, size: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims.push(size);
        Shape::new(dims)
    }

    /// Shape with `axis` dropped.
    pub fn remove_dim(&self, axis: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims.remove(axis);
        Shape::new(dims)
    }

    /// Shape with the size of `axis` replaced.
    pub fn resize_dim(&self, axis: usize, size: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims[axis] = size;
        Shape::new(dims)
    }

    /// The ndarray dimension matching this shape.
    pub fn ix(&self) -> IxDyn {
        IxDyn(&self.dims)
    }

    /// Iterate every multi-index in flat (row-major) order.
    pub fn indices(&self) -> ShapeIndices<'_> {
        ShapeIndices {
            shape: self,
            next: Some(vec![0; self.dims.len()]),
        }
    }
}

fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// Odometer over the multi-indices of a [`Shape`].
pub struct ShapeIndices<'a> {
    shape: &'a Shape,
    next: Option<Vec<usize>>,
}

impl Iterator for ShapeIndices<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        if self.shape.is_empty() {
            return None;
        }

        let mut following = current.clone();
        let mut axis = following.len();
        let mut carried = true;
        while axis > 0 && carried {
            axis -= 1;
            following[axis] += 1;
            if following[axis] < self.shape.dims[axis] {
                carried = false;
            } else {
                following[axis] = 0;
            }
        }
        if !carried {
            self.next = Some(following);
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major() {
        let shape = Shape::new(vec![2, 3, 4]);
        assert_eq!(shape.strides(), &[12, 4, 1]);
        assert_eq!(shape.len(), 24);
    }

    #[test]
    fn scalar_shape_holds_one_value() {
        let shape = Shape::scalar();
        assert_eq!(shape.len(), 1);
        assert_eq!(shape.ndim(), 0);
        assert_eq!(shape.indices().count(), 1);
    }

    #[test]
    fn flat_index_follows_iteration_order() {
        let shape = Shape::new(vec![3, 2, 2]);
        for (flat, index) in shape.indices().enumerate() {
            assert_eq!(shape.flat_index(&index), flat);
        }
    }

    #[test]
    fn indices_iterate_in_flat_order() {
        let shape = Shape::new(vec![2, 3]);
        let all: Vec<Vec<usize>> = shape.indices().collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[3], vec![1, 0]);
        assert_eq!(all[5], vec![1, 2]);
    }

    #[test]
    fn transforms_recompute_strides() {
        let shape = Shape::new(vec![2, 3]);
        assert_eq!(shape.push_dim(4).strides(), &[12, 4, 1]);
        assert_eq!(shape.remove_dim(0).dims(), &[3]);
        assert_eq!(shape.resize_dim(1, 5).strides(), &[5, 1]);
    }
}
