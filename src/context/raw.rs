//! The underlying platform allocator

use std::ffi::c_void;

/// Raw allocation primitives the facade delegates to.
///
/// Every method reports failure by returning null, like the C primitives it
/// mirrors. Implementations must hand out addresses that stay unique while
/// live.
pub trait RawAllocator {
    /// Allocate `bytes` uninitialized bytes.
    fn allocate(&mut self, bytes: usize) -> *mut u8;

    /// Allocate `count * size` zeroed bytes.
    fn allocate_zeroed(&mut self, count: usize, size: usize) -> *mut u8;

    /// Resize the block at `ptr` to `bytes`, possibly moving it. A null `ptr`
    /// allocates.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this allocator. On success the
    /// old block must no longer be used.
    unsafe fn resize(&mut self, ptr: *mut u8, bytes: usize) -> *mut u8;

    /// Return the block at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live block from this allocator.
    unsafe fn release(&mut self, ptr: *mut u8);
}

/// `malloc`/`calloc`/`realloc`/`free` from the C library.
///
/// Zero-byte requests are rounded up to one byte so a successful call never
/// returns null.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl RawAllocator for SystemAllocator {
    fn allocate(&mut self, bytes: usize) -> *mut u8 {
        // SAFETY: malloc has no preconditions.
        unsafe { libc::malloc(bytes.max(1)) as *mut u8 }
    }

    fn allocate_zeroed(&mut self, count: usize, size: usize) -> *mut u8 {
        let (count, size) = if count == 0 || size == 0 {
            (1, 1)
        } else {
            (count, size)
        };
        // SAFETY: calloc checks the product for overflow itself.
        unsafe { libc::calloc(count, size) as *mut u8 }
    }

    unsafe fn resize(&mut self, ptr: *mut u8, bytes: usize) -> *mut u8 {
        // SAFETY: caller guarantees `ptr` is null or from malloc/calloc/realloc.
        unsafe { libc::realloc(ptr as *mut c_void, bytes.max(1)) as *mut u8 }
    }

    unsafe fn release(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: caller guarantees `ptr` is a live block from this allocator.
        unsafe { libc::free(ptr as *mut c_void) }
    }
}
