use std::ops::{Deref, DerefMut};

use gpu_backend_traits::traits::MappedRegion;
use gpu_types::resources::TransferBufferId;

use crate::device::Gpu;

/// A mapped transfer buffer. Derefs to the host-visible byte region and
/// unmaps when dropped; the device refuses a second mapping while one guard
/// is alive.
#[derive(Debug)]
pub struct MappedTransferBuffer<'a> {
    device: &'a Gpu,
    id: TransferBufferId,
    region: MappedRegion,
}

impl<'a> MappedTransferBuffer<'a> {
    pub(crate) fn new(device: &'a Gpu, id: TransferBufferId, region: MappedRegion) -> Self {
        Self { device, id, region }
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }
}

impl Deref for MappedTransferBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // the device guarantees exclusive mapping while the guard lives
        unsafe { std::slice::from_raw_parts(self.region.ptr, self.region.len) }
    }
}

impl DerefMut for MappedTransferBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.region.ptr, self.region.len) }
    }
}

impl Drop for MappedTransferBuffer<'_> {
    fn drop(&mut self) {
        self.device.unmap_transfer_buffer(self.id);
    }
}
