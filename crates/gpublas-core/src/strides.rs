use crate::{rvec, RVec, Shape};

/// Storage order of a freshly allocated or canonical buffer.
///
/// `C` is row-major (unit stride on the last axis), `F` is column-major
/// (unit stride on the first axis). BLAS natively consumes `F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    C,
    #[default]
    F,
}

/// Per-axis strides, measured in elements. Negative strides are legal and
/// describe reversed views.
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct Strides(RVec<isize>);

impl Strides {
    pub fn new(strides: RVec<isize>) -> Self {
        Self(strides)
    }

    pub fn to_vec(&self) -> Vec<isize> {
        self.0.to_vec()
    }

    pub fn inner(&self) -> &RVec<isize> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn transpose(&mut self) {
        let rank = self.0.len();
        if rank >= 2 {
            self.0.swap(rank - 2, rank - 1);
        }
    }

    /// Canonical column-major strides for `shape`.
    pub fn col_major(shape: &Shape) -> Self {
        let mut strides = rvec![];
        let mut stride = 1;
        for size in shape.iter() {
            strides.push(stride);
            stride *= *size as isize;
        }
        Self(strides)
    }

    pub fn with_order(shape: &Shape, order: Order) -> Self {
        match order {
            Order::C => Self::from(shape),
            Order::F => Self::col_major(shape),
        }
    }
}

impl std::fmt::Debug for Strides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut shape = format!("[{}", self.0.first().unwrap_or(&0));
        for dim in self.0.iter().skip(1) {
            shape.push_str(&format!("x{}", dim));
        }
        write!(f, "{}]", shape)
    }
}

impl std::ops::Index<usize> for Strides {
    type Output = isize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for Strides {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl From<Vec<isize>> for Strides {
    fn from(strides: Vec<isize>) -> Self {
        Self(strides.into())
    }
}

impl From<&Shape> for Strides {
    fn from(shape: &Shape) -> Self {
        let mut strides = rvec![];
        let mut stride = 1;
        for size in shape.inner().iter().rev() {
            strides.push(stride);
            stride *= *size as isize;
        }
        strides.reverse();
        Self(strides)
    }
}
