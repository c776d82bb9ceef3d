pub mod commands;
pub mod renderer;
pub mod shaders;
pub mod textures;
pub mod vertex;

pub use renderer::{Blend2d, FrameStats, Renderer2d, ScaleMode2d, TextureAddressMode2d};
pub use shaders::{ShaderBlob, ShaderBundle2d};
pub use textures::Texture2d;
pub use vertex::{Vertex2d, MAX_STREAM_VERTICES, VERTEX_BUFFER_SIZE};
