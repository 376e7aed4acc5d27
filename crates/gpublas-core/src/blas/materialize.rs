use crate::{DispatchError, Device, Order, StridedArg, View};

/// Copies the logical elements of `view` into a fresh column-major buffer on
/// `device`. The result always has byte offset 0 and canonical strides, so
/// the layout classifier accepts it. Empty views allocate an empty buffer and
/// issue no device copy.
pub fn materialize(device: &Device, view: &View) -> Result<View, DispatchError> {
    device.check_owns(view.buffer())?;
    let dst = View::zeros(view.shape().clone(), view.dt(), Order::F, device)?;
    if dst.numel() == 0 {
        return Ok(dst);
    }
    log::debug!("materialize {:?} -> {:?}", view, dst);

    let src_arg = StridedArg::new(
        view.buffer(),
        view.element_offset(),
        view.shape().inner(),
        view.strides().inner(),
    );
    let dst_arg = StridedArg::new(
        dst.buffer(),
        dst.element_offset(),
        dst.shape().inner(),
        dst.strides().inner(),
    );
    device
        .backend()
        .copy(src_arg, dst_arg, view.dt().size_of())?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify_matrix, classify_vector, shape, DeviceRequest, Layout, VectorLayout};

    fn device() -> Device {
        Device::request_device(DeviceRequest::Host).unwrap()
    }

    #[test]
    fn preserves_logical_values() {
        let device = device();
        let data = (0..20).map(|v| v as f64).collect::<Vec<_>>();
        let a = View::from_data(data, shape![4, 5], &device).unwrap();
        let awkward = a
            .slice(0, 0..4, -2)
            .unwrap()
            .slice(1, 1..5, 2)
            .unwrap();
        assert_eq!(classify_matrix(&awkward, Order::F), Layout::NeedsCopy);

        let copy = materialize(&device, &awkward).unwrap();
        assert!(!copy.shares_storage(&awkward));
        assert_eq!(copy.offset(), 0);
        assert_eq!(copy.strides().to_vec(), vec![1, 2]);
        assert_eq!(
            copy.to_vec::<f64>().unwrap(),
            awkward.to_vec::<f64>().unwrap()
        );
        assert_eq!(copy.to_vec::<f64>().unwrap(), vec![16., 18., 6., 8.]);
        assert_eq!(
            classify_matrix(&copy, Order::F),
            Layout::Expressible {
                trans: false,
                ld: 2,
                offset: 0
            }
        );
    }

    #[test]
    fn reversed_vectors() {
        let device = device();
        let v = View::from_data(vec![1f32, 2., 3.], shape![3], &device).unwrap();
        let reversed = v.slice(0, 0..3, -1).unwrap();
        let copy = materialize(&device, &reversed).unwrap();
        assert_eq!(copy.to_vec::<f32>().unwrap(), vec![3., 2., 1.]);
        assert_eq!(
            classify_vector(&copy),
            VectorLayout::Expressible { inc: 1, offset: 0 }
        );
    }

    #[test]
    fn empty_views_round_trip() {
        let device = device();
        let empty = View::zeros(shape![0, 7], crate::DType::F32, Order::C, &device).unwrap();
        let copy = materialize(&device, &empty).unwrap();
        assert_eq!(copy.shape(), &shape![0, 7]);
        assert_eq!(copy.buffer().n_bytes(), 0);
    }

    #[test]
    fn rejects_foreign_views() {
        let device = device();
        let other = Device::request_device(DeviceRequest::Host).unwrap();
        let v = View::from_data(vec![1f32, 2.], shape![2], &other).unwrap();
        assert!(matches!(
            materialize(&device, &v),
            Err(DispatchError::Device(_))
        ));
    }
}
