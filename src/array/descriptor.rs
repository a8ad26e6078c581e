//! Strided array descriptor
//!
//! Dimensions are laid out row-major. Working from the innermost dimension
//! outwards, each dimension's block is the element distance between
//! consecutive indices along it:
//!
//! ```text
//! block[rank-1] = 1
//! block[d]      = block[d+1] * extent[d+1]
//! count         = block[0] * extent[0]
//! offset(i)     = Σ ((i[d] - lo[d]) / stride[d]) * block[d]
//! ```

use std::ptr::NonNull;
use std::rc::Rc;

use tracing::error;

use super::domain::Domain;
use crate::context::{RawAllocator, SharedContext, SystemAllocator};
use crate::error::LayoutError;

/// Per-dimension placement: the index origin, stride, and block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimLayout {
    /// Index that maps to position 0 along this dimension (the domain's low
    /// bound).
    pub offset: i64,
    /// Elements between consecutive indices along this dimension.
    pub block: i64,
    /// Domain stride, divided out of the index distance.
    pub stride: i64,
}

/// Index arithmetic for a domain, independent of any storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayLayout {
    element_size: usize,
    element_count: usize,
    dims: Vec<DimLayout>,
}

impl ArrayLayout {
    /// Derive offsets and blocks from `domain`.
    pub fn new(domain: &Domain, element_size: usize) -> Result<Self, LayoutError> {
        let ranges = domain.dims();
        if ranges.is_empty() {
            return Err(LayoutError::ZeroRank);
        }
        if let Some((dim, range)) = ranges.iter().enumerate().find(|(_, r)| r.stride <= 0) {
            return Err(LayoutError::NonPositiveStride {
                dim,
                stride: range.stride,
            });
        }

        let too_large = |count: usize| LayoutError::TooLarge {
            count,
            size: element_size,
        };

        let mut dims = vec![
            DimLayout {
                offset: 0,
                block: 0,
                stride: 1,
            };
            ranges.len()
        ];
        let mut block: i64 = 1;
        for d in (0..ranges.len()).rev() {
            if d + 1 < ranges.len() {
                let extent = ranges[d + 1]
                    .extent()
                    .and_then(|e| i64::try_from(e).ok())
                    .ok_or_else(|| too_large(usize::MAX))?;
                block = block
                    .checked_mul(extent)
                    .ok_or_else(|| too_large(usize::MAX))?;
            }
            dims[d] = DimLayout {
                offset: ranges[d].lo,
                block,
                stride: ranges[d].stride,
            };
        }

        let element_count = usize::try_from(dims[0].block)
            .ok()
            .zip(ranges[0].extent())
            .and_then(|(b, e)| b.checked_mul(e))
            .ok_or_else(|| too_large(usize::MAX))?;
        element_count
            .checked_mul(element_size)
            .ok_or_else(|| too_large(element_count))?;

        Ok(Self {
            element_size,
            element_count,
            dims,
        })
    }

    /// Linear element offset of `index`.
    ///
    /// `index` must have one component per dimension. Indices outside the
    /// domain are not checked and yield offsets outside `0..element_count`.
    pub fn offset_of(&self, index: &[i64]) -> i64 {
        debug_assert_eq!(index.len(), self.rank(), "index rank mismatch");
        self.dims
            .iter()
            .zip(index)
            .fold(0i64, |acc, (dim, &i)| {
                let step = i.wrapping_sub(dim.offset) / dim.stride;
                acc.wrapping_add(step.wrapping_mul(dim.block))
            })
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Per-dimension placement, outermost first.
    pub fn dims(&self) -> &[DimLayout] {
        &self.dims
    }

    /// Elements in the array.
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Bytes per element.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Bytes of backing storage.
    pub fn byte_len(&self) -> usize {
        self.element_count * self.element_size
    }
}

/// An array's layout plus its storage, allocated through the facade.
///
/// Borrows its domain, which must outlive it. Storage is released through the
/// same context when the descriptor is dropped.
pub struct ArrayDescriptor<'d, A: RawAllocator = SystemAllocator> {
    layout: ArrayLayout,
    domain: &'d Domain,
    base: NonNull<u8>,
    memory: SharedContext<A>,
}

impl<'d, A: RawAllocator> ArrayDescriptor<'d, A> {
    /// Lay out `domain` and allocate `element_count * element_size` bytes
    /// tagged `tag`.
    pub fn new(
        memory: &SharedContext<A>,
        domain: &'d Domain,
        element_size: usize,
        tag: &str,
    ) -> Result<Self, LayoutError> {
        let layout = ArrayLayout::new(domain, element_size)?;
        let base = memory
            .borrow_mut()
            .allocate(layout.element_count(), element_size, tag)?;
        Ok(Self {
            layout,
            domain,
            base,
            memory: Rc::clone(memory),
        })
    }

    /// Linear element offset of `index`; see [`ArrayLayout::offset_of`].
    pub fn offset_of(&self, index: &[i64]) -> i64 {
        self.layout.offset_of(index)
    }

    /// Address of the element at `index`. Not bounds checked: an index outside
    /// the domain gives a pointer outside the storage.
    pub fn element_ptr(&self, index: &[i64]) -> *mut u8 {
        let bytes = self.offset_of(index) as isize * self.layout.element_size() as isize;
        self.base.as_ptr().wrapping_offset(bytes)
    }

    /// Start of the storage.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Index arithmetic.
    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    /// The domain this array was built over.
    pub fn domain(&self) -> &'d Domain {
        self.domain
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    /// Elements in the array.
    pub fn element_count(&self) -> usize {
        self.layout.element_count()
    }

    /// Bytes per element.
    pub fn element_size(&self) -> usize {
        self.layout.element_size()
    }
}

impl<A: RawAllocator> std::fmt::Debug for ArrayDescriptor<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayDescriptor")
            .field("layout", &self.layout)
            .field("domain", self.domain)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl<A: RawAllocator> Drop for ArrayDescriptor<'_, A> {
    fn drop(&mut self) {
        let Ok(mut memory) = self.memory.try_borrow_mut() else {
            error!(base = ?self.base, "array storage leaked: memory context busy");
            return;
        };
        // SAFETY: `base` came from this context's `allocate` and is released
        // exactly once, here.
        if let Err(err) = unsafe { memory.release(self.base) } {
            error!(%err, "failed to release array storage");
        }
    }
}
