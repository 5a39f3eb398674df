use core::num::NonZeroUsize;
use core::ptr::NonNull;
use core::slice::{from_raw_parts, from_raw_parts_mut};
use nix::errno::Errno;
use nix::sys::mman;

/// Owned anonymous memory mapping. Page aligned by construction, unmapped
/// on drop.
#[derive(Debug)]
pub struct MMappedMemory {
    pointer: NonNull<u8>,
    size: usize,
}

impl MMappedMemory {
    pub fn new(size: usize) -> Result<MMappedMemory, Errno> {
        let length = NonZeroUsize::new(size).ok_or(Errno::EINVAL)?;
        let pointer = unsafe {
            mman::mmap_anonymous(
                None,
                length,
                mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE,
                mman::MapFlags::MAP_PRIVATE | mman::MapFlags::MAP_ANONYMOUS,
            )?
        };
        Ok(MMappedMemory {
            pointer: pointer.cast(),
            size,
        })
    }

    pub fn ptr(&self) -> *const u8 {
        self.pointer.as_ptr()
    }

    pub fn ptr_mut(&mut self) -> *mut u8 {
        self.pointer.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.pointer.as_ptr(), self.size) }
    }

    pub fn slice_mut(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.pointer.as_ptr(), self.size) }
    }
}

impl Drop for MMappedMemory {
    fn drop(&mut self) {
        let _ = unsafe { mman::munmap(self.pointer.cast(), self.size) };
    }
}
