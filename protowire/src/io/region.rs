//! Bounds checked spans over externally managed memory.
//!
//! A [`Region`](struct.Region.html) is the read side and a [`RegionMut`](struct.RegionMut.html)
//! the write side. Both hold a raw pointer and a length; every access is checked against the
//! length before the pointer is touched, and loads and stores are unaligned.

use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::slice;
use crate::io::write;

/// A read-only span of memory that outlives `'a`.
#[derive(Clone, Copy)]
pub struct Region<'a> {
    ptr: NonNull<u8>,
    len: usize,
    a: PhantomData<&'a [u8]>,
}

unsafe impl Send for Region<'_> { }
unsafe impl Sync for Region<'_> { }

impl<'a> Region<'a> {
    /// Creates a region covering a borrowed slice
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            ptr: NonNull::from(bytes).cast(),
            len: bytes.len(),
            a: PhantomData,
        }
    }

    /// Creates a region from a pointer and a length.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and valid for reads of `len` bytes for the lifetime `'a`,
    /// and the memory must not be written to while the region or anything read from it is alive.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const u8, len: usize) -> Self {
        Self {
            ptr: NonNull::new_unchecked(ptr as *mut u8),
            len,
            a: PhantomData,
        }
    }

    /// Returns the number of bytes in the region
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the region is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn contains(&self, offset: usize, len: usize) -> bool {
        offset <= self.len && len <= self.len - offset
    }

    /// Loads 4 little endian bytes at `offset`
    #[inline]
    pub(crate) fn load_u32_le(&self, offset: usize) -> Option<u32> {
        if !self.contains(offset, 4) {
            return None;
        }
        let value = unsafe { ptr::read_unaligned(self.ptr.as_ptr().add(offset) as *const u32) };
        Some(u32::from_le(value))
    }

    /// Loads 8 little endian bytes at `offset`
    #[inline]
    pub(crate) fn load_u64_le(&self, offset: usize) -> Option<u64> {
        if !self.contains(offset, 8) {
            return None;
        }
        let value = unsafe { ptr::read_unaligned(self.ptr.as_ptr().add(offset) as *const u64) };
        Some(u64::from_le(value))
    }

    /// Borrows `len` bytes at `offset` for the region's lifetime
    #[inline]
    pub(crate) fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        if !self.contains(offset, len) {
            return None;
        }
        Some(unsafe { slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) })
    }

    /// Returns the bytes of the region as a slice
    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<'a> From<&'a [u8]> for Region<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Region::new(bytes)
    }
}

/// A writable span of memory that outlives `'a`.
///
/// Writers address regions with `i32` lengths, so a region can't be larger than `i32::MAX` bytes.
#[derive(Debug)]
pub struct RegionMut<'a> {
    ptr: NonNull<u8>,
    len: usize,
    a: PhantomData<&'a mut [u8]>,
}

unsafe impl Send for RegionMut<'_> { }
unsafe impl Sync for RegionMut<'_> { }

impl<'a> RegionMut<'a> {
    /// Creates a region covering a mutably borrowed slice, failing with
    /// [`SizeMismatch`](../write/enum.Error.html#variant.SizeMismatch) if the slice is larger than `i32::MAX` bytes
    #[inline]
    pub fn new(bytes: &'a mut [u8]) -> write::Result<Self> {
        let len = bytes.len();
        check_region_len(len)?;
        Ok(Self {
            ptr: NonNull::from(bytes).cast(),
            len,
            a: PhantomData,
        })
    }

    /// Creates a region from a pointer and a length, failing with
    /// [`SizeMismatch`](../write/enum.Error.html#variant.SizeMismatch) if `len` is larger than `i32::MAX`
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and valid for writes of `len` bytes for the lifetime `'a`,
    /// and nothing else may access the memory while the region is alive.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> write::Result<Self> {
        check_region_len(len)?;
        Ok(Self {
            ptr: NonNull::new_unchecked(ptr),
            len,
            a: PhantomData,
        })
    }

    /// Returns the number of bytes in the region
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the region is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn contains(&self, offset: usize, len: usize) -> bool {
        offset <= self.len && len <= self.len - offset
    }

    /// Copies `bytes` into the region at `offset`, returning false if they don't fit
    #[inline]
    pub(crate) fn store(&mut self, offset: usize, bytes: &[u8]) -> bool {
        if !self.contains(offset, bytes.len()) {
            return false;
        }
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len()); }
        true
    }

    /// Stores 4 little endian bytes at `offset`
    #[inline]
    pub(crate) fn store_u32_le(&mut self, offset: usize, value: u32) -> bool {
        if !self.contains(offset, 4) {
            return false;
        }
        unsafe { ptr::write_unaligned(self.ptr.as_ptr().add(offset) as *mut u32, value.to_le()); }
        true
    }

    /// Stores 8 little endian bytes at `offset`
    #[inline]
    pub(crate) fn store_u64_le(&mut self, offset: usize, value: u64) -> bool {
        if !self.contains(offset, 8) {
            return false;
        }
        unsafe { ptr::write_unaligned(self.ptr.as_ptr().add(offset) as *mut u64, value.to_le()); }
        true
    }
}

fn check_region_len(len: usize) -> write::Result {
    if len > i32::MAX as usize {
        Err(write::Error::SizeMismatch { expected: i32::MAX as usize, actual: len })
    } else {
        Ok(())
    }
}
