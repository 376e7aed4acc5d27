use crate::{Order, View};

/// How a 2-D view reaches native BLAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// The view's buffer can be handed over as is. BLAS sees a column-major
    /// matrix at element `offset` with leading dimension `ld`; when `trans` is
    /// set that matrix is the transpose of the view, i.e. the view is
    /// row-major.
    Expressible {
        trans: bool,
        ld: usize,
        offset: usize,
    },
    NeedsCopy,
}

impl Layout {
    pub fn is_expressible(&self) -> bool {
        matches!(self, Layout::Expressible { .. })
    }
}

/// How a 1-D view reaches native BLAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorLayout {
    Expressible { inc: usize, offset: usize },
    NeedsCopy,
}

impl VectorLayout {
    pub fn is_expressible(&self) -> bool {
        matches!(self, VectorLayout::Expressible { .. })
    }
}

/// Leading dimension of a layout whose unit axis has extent `unit_dim` and
/// whose other axis has extent `other_dim` and stride `other_stride`.
///
/// An axis of extent 1 is never stepped, so its stride is irrelevant and the
/// smallest legal leading dimension is reported instead.
fn leading_dim(unit_dim: usize, other_dim: usize, other_stride: isize) -> Option<usize> {
    let min_ld = unit_dim.max(1);
    if other_dim <= 1 {
        return Some(min_ld);
    }
    usize::try_from(other_stride)
        .ok()
        .filter(|&ld| ld >= min_ld)
}

/// Classifies a 2-D view. `hint` picks the reading when both orders fit, as
/// they do for single rows, single columns and empty views.
pub fn classify_matrix(view: &View, hint: Order) -> Layout {
    if view.rank() != 2 {
        return Layout::NeedsCopy;
    }
    let (rows, cols) = (view.shape()[0], view.shape()[1]);
    let (rs, cs) = (view.strides()[0], view.strides()[1]);
    let offset = view.element_offset();
    if rows == 0 || cols == 0 {
        return Layout::Expressible {
            trans: false,
            ld: rows.max(1),
            offset,
        };
    }

    let col_major = (rows <= 1 || rs == 1)
        .then(|| leading_dim(rows, cols, cs))
        .flatten();
    let row_major = (cols <= 1 || cs == 1)
        .then(|| leading_dim(cols, rows, rs))
        .flatten();

    let layout = match (col_major, row_major, hint) {
        (Some(ld), None, _) | (Some(ld), Some(_), Order::F) => Layout::Expressible {
            trans: false,
            ld,
            offset,
        },
        (_, Some(ld), _) => Layout::Expressible {
            trans: true,
            ld,
            offset,
        },
        (None, None, _) => Layout::NeedsCopy,
    };
    log::trace!("classify {:?} -> {:?}", view, layout);
    layout
}

/// Classifies a 1-D view. Increments must be positive.
pub fn classify_vector(view: &View) -> VectorLayout {
    if view.rank() != 1 {
        return VectorLayout::NeedsCopy;
    }
    let offset = view.element_offset();
    if view.shape()[0] <= 1 {
        return VectorLayout::Expressible { inc: 1, offset };
    }
    match usize::try_from(view.strides()[0]) {
        Ok(inc) if inc > 0 => VectorLayout::Expressible { inc, offset },
        _ => VectorLayout::NeedsCopy,
    }
}
