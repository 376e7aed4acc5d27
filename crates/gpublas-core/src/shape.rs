use crate::RVec;

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(RVec<usize>);

impl Shape {
    pub fn new(shape: RVec<usize>) -> Self {
        Self(shape)
    }

    pub fn inner(&self) -> &RVec<usize> {
        &self.0
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.0.to_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rank(&self) -> usize {
        self.len()
    }

    /// True if any axis has extent zero.
    pub fn has_zero_dim(&self) -> bool {
        self.0.iter().any(|&d| d == 0)
    }

    pub fn transpose(&mut self) {
        let rank = self.rank();
        if rank >= 2 {
            self.0.swap(rank - 2, rank - 1);
        }
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut shape = format!("[{}", self.0.first().unwrap_or(&0));
        for dim in self.0.iter().skip(1) {
            shape.push_str(&format!("x{}", dim));
        }
        write!(f, "{}]", shape)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::ops::Index<usize> for Shape {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for Shape {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(shape: Vec<usize>) -> Self {
        Self(shape.into())
    }
}

impl From<&[usize]> for Shape {
    fn from(slice: &[usize]) -> Self {
        Shape(slice.into())
    }
}

#[cfg(test)]
mod tests {
    use crate::{shape, Shape};
    use proptest::prelude::*;
    use proptest::strategy::{BoxedStrategy, Strategy};
    use std::ops::Range;

    impl Arbitrary for Shape {
        type Parameters = Vec<Range<usize>>;
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
            args.prop_map(Into::<Shape>::into).boxed()
        }
    }

    #[test]
    fn zero_dims_are_detected() {
        assert!(shape![0, 10].has_zero_dim());
        assert!(shape![15, 0].has_zero_dim());
        assert!(!shape![4, 3].has_zero_dim());
        assert_eq!(shape![0, 10].numel(), 0);
    }

    #[test]
    fn transpose_swaps_trailing_axes() {
        let mut s = shape![100, 128];
        s.transpose();
        assert_eq!(s, shape![128, 100]);
    }

    #[test]
    fn axes_can_be_resized_in_place() {
        let mut s = shape![12, 7];
        s[0] = 6;
        assert_eq!(s, shape![6, 7]);
        assert_eq!(s.numel(), 42);
    }

    proptest! {
        #[test]
        fn numel_is_product(shape in Shape::arbitrary_with(vec![0..8, 0..8])) {
            prop_assert_eq!(shape.numel(), shape[0] * shape[1]);
            prop_assert_eq!(shape.has_zero_dim(), shape.numel() == 0);
        }
    }
}
