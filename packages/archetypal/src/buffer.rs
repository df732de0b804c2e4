//! An owned, aligned block of raw memory.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// A heap allocation which backs a component store.
///
/// Zero-sized layouts never touch the allocator: they are represented by a
/// dangling pointer which is still correctly aligned.
pub(crate) struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Create a new `AlignedBuffer` which will fit a given layout.
    ///
    /// Allocation failure aborts the process.
    pub fn with_layout(layout: Layout) -> AlignedBuffer {
        if layout.size() == 0 {
            return AlignedBuffer::dangling(layout);
        }

        let raw = unsafe { alloc(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };

        AlignedBuffer {
            ptr,
            layout,
        }
    }

    fn dangling(layout: Layout) -> AlignedBuffer {
        // An address equal to the alignment is non-null and aligned.
        let ptr = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
        AlignedBuffer {
            ptr,
            layout,
        }
    }

    /// Get the layout of this allocation.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get a pointer to the byte at `offset`.
    ///
    /// # Safety
    /// `offset` must be no greater than the size of the allocation.
    pub unsafe fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.layout.size());
        NonNull::new_unchecked(self.ptr.as_ptr().add(offset))
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.layout.size() > 0 {
            unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }
}
