//! Rectangular index domains

/// One dimension of a domain: indices `lo, lo + stride, ..` up to `hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimRange {
    /// Low bound (inclusive).
    pub lo: i64,
    /// High bound (inclusive).
    pub hi: i64,
    /// Step between indices; positive.
    pub stride: i64,
}

impl DimRange {
    /// Range with an explicit stride.
    pub const fn new(lo: i64, hi: i64, stride: i64) -> Self {
        Self { lo, hi, stride }
    }

    /// Unit-stride range `lo..=hi`.
    pub const fn unit(lo: i64, hi: i64) -> Self {
        Self::new(lo, hi, 1)
    }

    /// Number of indices in the range, or `None` if it does not fit in
    /// `usize`. Empty when `hi < lo`; meaningless for non-positive strides,
    /// which report 0.
    pub fn extent(&self) -> Option<usize> {
        if self.hi < self.lo || self.stride <= 0 {
            return Some(0);
        }
        let span = (i128::from(self.hi) - i128::from(self.lo)) / i128::from(self.stride);
        usize::try_from(span + 1).ok()
    }

    /// Is `index` one of the range's indices?
    pub fn contains(&self, index: i64) -> bool {
        self.stride > 0
            && (self.lo..=self.hi).contains(&index)
            && (i128::from(index) - i128::from(self.lo)) % i128::from(self.stride) == 0
    }
}

/// Ordered sequence of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    dims: Vec<DimRange>,
}

impl Domain {
    /// Domain over `dims`, outermost first.
    pub fn new(dims: Vec<DimRange>) -> Self {
        Self { dims }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimensions, outermost first.
    pub fn dims(&self) -> &[DimRange] {
        &self.dims
    }

    /// Total number of indices, or `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |count, dim| count.checked_mul(dim.extent()?))
    }

    /// True when some dimension is empty (or there are none).
    pub fn is_empty(&self) -> bool {
        self.dims.is_empty() || self.dims.iter().any(|dim| dim.extent() == Some(0))
    }

    /// Is every component of `index` inside its dimension?
    pub fn contains(&self, index: &[i64]) -> bool {
        index.len() == self.rank()
            && self.dims.iter().zip(index).all(|(dim, &i)| dim.contains(i))
    }
}

impl From<Vec<DimRange>> for Domain {
    fn from(dims: Vec<DimRange>) -> Self {
        Self::new(dims)
    }
}
