pub mod checker;
pub mod command_buffer;
pub mod device;
pub mod error;
pub mod transfer;

pub use command_buffer::{CommandBuffer, SwapchainTextureHandle};
pub use device::{Fence, Gpu};
pub use error::GpuError;
pub use transfer::MappedTransferBuffer;
