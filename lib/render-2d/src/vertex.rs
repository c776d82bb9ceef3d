/// One streamed vertex: position, texture coordinate, straight-alpha color.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Vertex2d {
    pub pos: [f32; 2],
    pub tex: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex2d {
    pub fn with_pos_color(x: f32, y: f32, color: [f32; 4]) -> Self {
        Self {
            pos: [x, y],
            tex: [0.0, 0.0],
            color,
        }
    }
}

/// Capacity of the per-frame vertex stream.
pub const MAX_STREAM_VERTICES: usize = 16 * 1024;
pub const VERTEX_STRIDE: usize = std::mem::size_of::<Vertex2d>();
pub const VERTEX_BUFFER_SIZE: usize = MAX_STREAM_VERTICES * VERTEX_STRIDE;

pub fn vertices_as_bytes(vertices: &[Vertex2d]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(vertices.as_ptr() as *const u8, std::mem::size_of_val(vertices))
    }
}
