use gpu_types::passes::Color;
use gpu_types::resources::TextureId;

use crate::renderer::{Blend2d, ScaleMode2d, TextureAddressMode2d};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Rect2d {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One queued render command. The queue is consumed in order at present
/// time; adjacent compatible draw commands coalesce into a single native
/// draw.
#[derive(Debug, Clone)]
pub enum RenderCommand2d {
    SetDrawColor {
        color: Color,
    },
    SetViewport {
        rect: Option<Rect2d>,
    },
    SetClipRect {
        rect: Option<Rect2d>,
    },
    Clear {
        color: Color,
    },
    DrawPoints {
        first_vertex: usize,
        vertex_count: usize,
        blend: Blend2d,
    },
    /// Line-list segments, or one joined strip when `joined` is set. Joined
    /// runs never coalesce with their neighbors.
    DrawLines {
        first_vertex: usize,
        vertex_count: usize,
        blend: Blend2d,
        joined: bool,
    },
    Geometry {
        first_vertex: usize,
        vertex_count: usize,
        blend: Blend2d,
        texture: Option<TextureId>,
        scale_mode: ScaleMode2d,
        address_mode: TextureAddressMode2d,
    },
    NoOp,
}
