use half::f16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub enum DType {
    F16,
    #[default]
    F32,
    F64,
}

impl DType {
    /// Returns the size of the type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// Whether native BLAS has a routine for this precision.
    pub fn is_blas_supported(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

pub trait TensorDType:
    Clone
    + Copy
    + std::fmt::Debug
    + PartialEq
    + 'static
    + num_traits::Zero
    + Send
    + Sync
    + bytemuck::Pod
{
    fn dt() -> DType;

    fn to_f64(self) -> f64;
}

macro_rules! map_type {
    ($t:ty, $v:ident) => {
        impl TensorDType for $t {
            fn dt() -> DType {
                DType::$v
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

map_type!(f32, F32);
map_type!(f64, F64);

impl TensorDType for f16 {
    fn dt() -> DType {
        DType::F16
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}
