//! The 2D renderer over the portable GPU API.
//!
//! Every frame accumulates a linear command queue plus a vertex batch; at
//! present time the whole batch is staged through the transfer buffer in one
//! copy pass, the queue is replayed with adjacent compatible draws merged
//! into single native draws, and the frame is submitted with a fence that
//! rotates against the previous frame's fence.

use anyhow::anyhow;
use hashlink::LinkedHashMap;
use gpu::{CommandBuffer, Fence, Gpu, SwapchainTextureHandle};
use gpu_backend_traits::window::NativeWindow;
use gpu_types::formats::TextureFormat;
use gpu_types::passes::{
    BufferBinding, BufferRegion, Color, ColorTargetInfo, LoadOp, PresentMode, ScissorRect,
    StoreOp, SwapchainComposition, TextureRegion, TextureSamplerBinding, TextureTransferInfo,
    TransferBufferLocation, Viewport,
};
use gpu_types::resources::{
    BufferCreateInfo, BufferId, BufferUsage, GraphicsPipelineCreateInfo, GraphicsPipelineId,
    SamplerCreateInfo, SamplerId, ShaderId, TextureCreateInfo, TextureId, TextureUsage,
    TransferBufferCreateInfo, TransferBufferId, TransferBufferUsage, WindowId,
};
use gpu_types::state::{
    BlendFactor, BlendOp, ColorComponentFlags, ColorTargetBlendState, ColorTargetDescription,
    Filter, GraphicsPipelineTargetInfo, PrimitiveType, SamplerAddressMode, SamplerMipmapMode,
    VertexAttribute, VertexBufferDescription, VertexElementFormat, VertexInputState,
};

use crate::commands::{Rect2d, RenderCommand2d};
use crate::shaders::{create_shader_set, ShaderBundle2d, ShaderSet2d};
use crate::textures::{copy_rows_tight, Texture2d};
use crate::vertex::{vertices_as_bytes, Vertex2d, MAX_STREAM_VERTICES, VERTEX_STRIDE};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Blend2d {
    None,
    #[default]
    Alpha,
    Additive,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ScaleMode2d {
    #[default]
    Nearest,
    Linear,
    PixelArt,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureAddressMode2d {
    #[default]
    Clamp,
    Wrap,
}

#[derive(Debug, Default, Copy, Clone)]
pub struct FrameStats {
    pub draw_calls: u64,
    pub drawn_vertices: u64,
    pub uploaded_vertex_bytes: u64,
    pub coalesced_commands: u64,
}

/// Pipeline-cache key: everything PSO construction depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    blend: Blend2d,
    vertex_shader: ShaderId,
    fragment_shader: ShaderId,
    primitive: PrimitiveType,
    format: TextureFormat,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RunKind {
    Points,
    Lines,
    JoinedLines,
    Geometry,
}

#[derive(Debug, Copy, Clone)]
struct DrawRun {
    kind: RunKind,
    blend: Blend2d,
    texture: Option<TextureId>,
    scale_mode: ScaleMode2d,
    address_mode: TextureAddressMode2d,
    first_vertex: usize,
    vertex_count: usize,
}

/// Per-draw uniform block pushed to the vertex stage: a pixel-space to NDC
/// transform plus the color scale.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
struct StreamUniforms {
    scale: [f32; 2],
    offset: [f32; 2],
    color_scale: f32,
    padding: [f32; 3],
}

fn srgb_to_linear(channel: f32) -> f32 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

fn blend_state(blend: Blend2d) -> ColorTargetBlendState {
    let mut state = ColorTargetBlendState {
        write_mask: ColorComponentFlags::rgba(),
        ..Default::default()
    };
    match blend {
        Blend2d::None => {
            state.blend_enable = false;
        }
        Blend2d::Alpha => {
            state.blend_enable = true;
            state.src_color_factor = BlendFactor::SrcAlpha;
            state.dst_color_factor = BlendFactor::OneMinusSrcAlpha;
            state.color_op = BlendOp::Add;
            state.src_alpha_factor = BlendFactor::SrcAlpha;
            state.dst_alpha_factor = BlendFactor::OneMinusSrcAlpha;
            state.alpha_op = BlendOp::Add;
        }
        Blend2d::Additive => {
            state.blend_enable = true;
            state.src_color_factor = BlendFactor::SrcAlpha;
            state.dst_color_factor = BlendFactor::One;
            state.color_op = BlendOp::Add;
            state.src_alpha_factor = BlendFactor::One;
            state.dst_alpha_factor = BlendFactor::Zero;
            state.alpha_op = BlendOp::Add;
        }
    }
    state
}

pub struct Renderer2d {
    device: Gpu,
    window: WindowId,
    target_format: TextureFormat,

    cmd: Option<CommandBuffer>,
    swapchain: Option<SwapchainTextureHandle>,
    prev_fence: Option<Fence>,

    vertex_buffer: BufferId,
    vertex_transfer: TransferBufferId,
    pending_transfer_releases: Vec<TransferBufferId>,

    shaders: ShaderSet2d,
    samplers: [[SamplerId; 2]; 3],
    pipelines: LinkedHashMap<PipelineKey, GraphicsPipelineId>,

    queue: Vec<RenderCommand2d>,
    vertices: Vec<Vertex2d>,
    draw_color: Color,
    color_scale: f32,
    viewport: Option<Rect2d>,
    clip: Option<Rect2d>,

    stats: FrameStats,
    last_frame_stats: FrameStats,
}

impl Renderer2d {
    pub fn new(
        device: Gpu,
        window: &NativeWindow,
        composition: SwapchainComposition,
        present_mode: PresentMode,
        bundle: &ShaderBundle2d,
    ) -> anyhow::Result<Self> {
        let window_id = device.claim_window(window, composition, present_mode)?;
        let target_format = device.swapchain_texture_format(window_id)?;

        let shaders = create_shader_set(&device, bundle)?;

        let vertex_buffer = device.create_buffer(&BufferCreateInfo {
            usage: BufferUsage::VERTEX,
            size: crate::vertex::VERTEX_BUFFER_SIZE as u64,
        })?;
        let vertex_transfer = device.create_transfer_buffer(&TransferBufferCreateInfo {
            usage: TransferBufferUsage::Upload,
            size: crate::vertex::VERTEX_BUFFER_SIZE as u64,
        })?;

        // the 3x2 sampler table is fixed for the renderer's lifetime
        let mut samplers = [[SamplerId::default(); 2]; 3];
        for (scale_index, scale) in [
            ScaleMode2d::Nearest,
            ScaleMode2d::Linear,
            ScaleMode2d::PixelArt,
        ]
        .into_iter()
        .enumerate()
        {
            for (address_index, address) in
                [TextureAddressMode2d::Clamp, TextureAddressMode2d::Wrap]
                    .into_iter()
                    .enumerate()
            {
                let (filter, mipmap) = match scale {
                    ScaleMode2d::Nearest => (Filter::Nearest, SamplerMipmapMode::Nearest),
                    ScaleMode2d::Linear => (Filter::Linear, SamplerMipmapMode::Linear),
                    ScaleMode2d::PixelArt => (Filter::Nearest, SamplerMipmapMode::Linear),
                };
                let address_mode = match address {
                    TextureAddressMode2d::Clamp => SamplerAddressMode::ClampToEdge,
                    TextureAddressMode2d::Wrap => SamplerAddressMode::Repeat,
                };
                samplers[scale_index][address_index] =
                    device.create_sampler(&SamplerCreateInfo {
                        min_filter: filter,
                        mag_filter: filter,
                        mipmap_mode: mipmap,
                        address_mode_u: address_mode,
                        address_mode_v: address_mode,
                        address_mode_w: address_mode,
                        ..Default::default()
                    })?;
            }
        }

        let mut renderer = Self {
            device,
            window: window_id,
            target_format,
            cmd: None,
            swapchain: None,
            prev_fence: None,
            vertex_buffer,
            vertex_transfer,
            pending_transfer_releases: Vec::new(),
            shaders,
            samplers,
            pipelines: LinkedHashMap::new(),
            queue: Vec::new(),
            vertices: Vec::new(),
            draw_color: Color::new(1.0, 1.0, 1.0, 1.0),
            color_scale: 1.0,
            viewport: None,
            clip: None,
            stats: FrameStats::default(),
            last_frame_stats: FrameStats::default(),
        };
        renderer.begin_frame()?;
        Ok(renderer)
    }

    fn begin_frame(&mut self) -> anyhow::Result<()> {
        let mut cmd = self.device.acquire_command_buffer()?;
        self.swapchain = Some(cmd.acquire_swapchain_texture(self.window)?);
        self.cmd = Some(cmd);
        Ok(())
    }

    pub fn device(&self) -> &Gpu {
        &self.device
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn target_format(&self) -> TextureFormat {
        self.target_format
    }

    pub fn pipeline_cache_len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_frame_stats
    }

    pub fn outstanding_fence(&self) -> Option<Fence> {
        self.prev_fence
    }

    /// The back buffer the current frame renders into.
    pub fn current_swapchain_texture(&self) -> Option<TextureId> {
        self.swapchain.map(|s| s.texture)
    }

    /// Stable for the renderer's lifetime; the same mode pair always
    /// returns the same sampler.
    pub fn sampler(&self, scale: ScaleMode2d, address: TextureAddressMode2d) -> SamplerId {
        let scale_index = match scale {
            ScaleMode2d::Nearest => 0,
            ScaleMode2d::Linear => 1,
            ScaleMode2d::PixelArt => 2,
        };
        let address_index = match address {
            TextureAddressMode2d::Clamp => 0,
            TextureAddressMode2d::Wrap => 1,
        };
        self.samplers[scale_index][address_index]
    }

    // command queue

    pub fn set_draw_color(&mut self, color: Color) {
        self.queue.push(RenderCommand2d::SetDrawColor { color });
        self.draw_color = color;
    }

    pub fn set_color_scale(&mut self, scale: f32) {
        self.color_scale = scale;
    }

    pub fn set_viewport(&mut self, rect: Option<Rect2d>) {
        self.queue.push(RenderCommand2d::SetViewport { rect });
    }

    pub fn set_clip_rect(&mut self, rect: Option<Rect2d>) {
        self.queue.push(RenderCommand2d::SetClipRect { rect });
    }

    pub fn clear(&mut self, color: Color) {
        self.queue.push(RenderCommand2d::Clear {
            color: self.scaled_color(color),
        });
    }

    fn scaled_color(&self, color: Color) -> Color {
        // linear targets want linearized colors; scaling happens after
        let (r, g, b) = if self.target_format.is_linear() {
            (
                srgb_to_linear(color.r),
                srgb_to_linear(color.g),
                srgb_to_linear(color.b),
            )
        } else {
            (color.r, color.g, color.b)
        };
        Color::new(
            r * self.color_scale,
            g * self.color_scale,
            b * self.color_scale,
            color.a,
        )
    }

    fn push_vertices(&mut self, points: &[(f32, f32)]) -> anyhow::Result<usize> {
        if self.vertices.len() + points.len() > MAX_STREAM_VERTICES {
            return Err(anyhow!("vertex stream is full for this frame"));
        }
        let first = self.vertices.len();
        let color = self.scaled_color(self.draw_color).as_array();
        self.vertices.extend(
            points
                .iter()
                .map(|&(x, y)| Vertex2d::with_pos_color(x, y, color)),
        );
        Ok(first)
    }

    pub fn draw_points(&mut self, points: &[(f32, f32)], blend: Blend2d) -> anyhow::Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let first_vertex = self.push_vertices(points)?;
        self.queue.push(RenderCommand2d::DrawPoints {
            first_vertex,
            vertex_count: points.len(),
            blend,
        });
        Ok(())
    }

    /// `points` are consumed pairwise as independent segments; exactly two
    /// points form a segment eligible for coalescing with its neighbors.
    pub fn draw_lines(&mut self, points: &[(f32, f32)], blend: Blend2d) -> anyhow::Result<()> {
        if points.len() < 2 {
            return Ok(());
        }
        let joined = points.len() > 2;
        let first_vertex;
        let vertex_count;
        if joined {
            // a joined run is expanded into a line list up front so one draw
            // covers it, but it never merges with neighbors
            let mut expanded = Vec::with_capacity((points.len() - 1) * 2);
            for pair in points.windows(2) {
                expanded.push(pair[0]);
                expanded.push(pair[1]);
            }
            first_vertex = self.push_vertices(&expanded)?;
            vertex_count = expanded.len();
        } else {
            first_vertex = self.push_vertices(points)?;
            vertex_count = points.len();
        }
        self.queue.push(RenderCommand2d::DrawLines {
            first_vertex,
            vertex_count,
            blend,
            joined,
        });
        Ok(())
    }

    pub fn geometry(
        &mut self,
        texture: Option<&Texture2d>,
        vertices: &[Vertex2d],
        blend: Blend2d,
        scale_mode: ScaleMode2d,
        address_mode: TextureAddressMode2d,
    ) -> anyhow::Result<()> {
        if vertices.len() % 3 != 0 {
            return Err(anyhow!("geometry wants whole triangles"));
        }
        if self.vertices.len() + vertices.len() > MAX_STREAM_VERTICES {
            return Err(anyhow!("vertex stream is full for this frame"));
        }
        let first_vertex = self.vertices.len();
        let linear = self.target_format.is_linear();
        let color_scale = self.color_scale;
        if linear || color_scale != 1.0 {
            self.vertices.extend(vertices.iter().map(|vertex| {
                let mut color = vertex.color;
                if linear {
                    for channel in &mut color[..3] {
                        *channel = srgb_to_linear(*channel);
                    }
                }
                for channel in &mut color[..3] {
                    *channel *= color_scale;
                }
                Vertex2d { color, ..*vertex }
            }));
        } else {
            self.vertices.extend_from_slice(vertices);
        }
        self.queue.push(RenderCommand2d::Geometry {
            first_vertex,
            vertex_count: vertices.len(),
            blend,
            texture: texture.map(|t| t.id),
            scale_mode,
            address_mode,
        });
        Ok(())
    }

    // textures

    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        streaming: bool,
    ) -> anyhow::Result<Texture2d> {
        let id = self.device.create_texture(&TextureCreateInfo {
            format,
            width,
            height,
            usage: TextureUsage::SAMPLER,
            ..Default::default()
        })?;
        let shadow = streaming
            .then(|| vec![0u8; (width * height) as usize * format.texel_block_size()]);
        Ok(Texture2d {
            id,
            width,
            height,
            format,
            shadow,
        })
    }

    pub fn destroy_texture(&mut self, texture: Texture2d) {
        self.device.release_texture(texture.id);
    }

    /// Uploads a region through a single-use transfer buffer sized exactly
    /// for the payload; the caller's pitch is respected.
    pub fn update_texture(
        &mut self,
        texture: &Texture2d,
        rect: Rect2d,
        pixels: &[u8],
        pitch: usize,
    ) -> anyhow::Result<()> {
        let block = texture.format.texel_block_size();
        let row_bytes = rect.width as usize * block;
        let payload = row_bytes * rect.height as usize;
        let transfer = self.device.create_transfer_buffer(&TransferBufferCreateInfo {
            usage: TransferBufferUsage::Upload,
            size: payload as u64,
        })?;
        {
            let mut map = self.device.map_transfer_buffer(transfer, false)?;
            copy_rows_tight(pixels, pitch, row_bytes, rect.height as usize, &mut map);
        }
        let cmd = self
            .cmd
            .as_mut()
            .ok_or_else(|| anyhow!("no frame in progress"))?;
        cmd.begin_copy_pass()?;
        cmd.upload_to_texture(
            &TextureTransferInfo {
                transfer_buffer: transfer,
                offset: 0,
                pixels_per_row: rect.width,
                rows_per_layer: rect.height,
            },
            &TextureRegion {
                texture: texture.id,
                x: rect.x as u32,
                y: rect.y as u32,
                width: rect.width,
                height: rect.height,
                depth: 1,
                ..Default::default()
            },
            false,
        )?;
        cmd.end_copy_pass()?;
        // single-use: recycled once the frame's submission is through
        self.pending_transfer_releases.push(transfer);
        Ok(())
    }

    pub fn lock_texture<'a>(
        &mut self,
        texture: &'a mut Texture2d,
    ) -> anyhow::Result<&'a mut [u8]> {
        texture
            .shadow
            .as_deref_mut()
            .ok_or_else(|| anyhow!("texture is not streaming"))
    }

    pub fn unlock_texture(&mut self, texture: &mut Texture2d) -> anyhow::Result<()> {
        let shadow = texture
            .shadow
            .take()
            .ok_or_else(|| anyhow!("texture is not streaming"))?;
        let rect = Rect2d {
            x: 0,
            y: 0,
            width: texture.width,
            height: texture.height,
        };
        let pitch = texture.width as usize * texture.format.texel_block_size();
        let result = self.update_texture(texture, rect, &shadow, pitch);
        texture.shadow = Some(shadow);
        result
    }

    // frame consumption

    fn pipeline_for(
        device: &Gpu,
        pipelines: &mut LinkedHashMap<PipelineKey, GraphicsPipelineId>,
        shaders: &ShaderSet2d,
        run: &DrawRun,
        format: TextureFormat,
    ) -> anyhow::Result<GraphicsPipelineId> {
        let (vertex_shader, fragment_shader, primitive) = match run.kind {
            RunKind::Points => (
                shaders.line_point_vertex,
                shaders.color_fragment,
                PrimitiveType::PointList,
            ),
            RunKind::Lines | RunKind::JoinedLines => (
                shaders.line_point_vertex,
                shaders.color_fragment,
                PrimitiveType::LineList,
            ),
            RunKind::Geometry => {
                if run.texture.is_some() {
                    (
                        shaders.triangle_texture_vertex,
                        shaders.texture_fragment,
                        PrimitiveType::TriangleList,
                    )
                } else {
                    (
                        shaders.triangle_color_vertex,
                        shaders.color_fragment,
                        PrimitiveType::TriangleList,
                    )
                }
            }
        };
        let key = PipelineKey {
            blend: run.blend,
            vertex_shader,
            fragment_shader,
            primitive,
            format,
        };
        if let Some(&pipeline) = pipelines.get(&key) {
            return Ok(pipeline);
        }
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineCreateInfo {
            vertex_shader,
            fragment_shader,
            vertex_input: VertexInputState {
                buffers: vec![VertexBufferDescription {
                    slot: 0,
                    pitch: VERTEX_STRIDE as u32,
                    ..Default::default()
                }],
                attributes: vec![
                    VertexAttribute {
                        location: 0,
                        buffer_slot: 0,
                        format: VertexElementFormat::Float2,
                        offset: 0,
                    },
                    VertexAttribute {
                        location: 1,
                        buffer_slot: 0,
                        format: VertexElementFormat::Float2,
                        offset: 8,
                    },
                    VertexAttribute {
                        location: 2,
                        buffer_slot: 0,
                        format: VertexElementFormat::Float4,
                        offset: 16,
                    },
                ],
            },
            primitive_type: primitive,
            target_info: GraphicsPipelineTargetInfo {
                color_targets: vec![ColorTargetDescription {
                    format,
                    blend_state: blend_state(run.blend),
                }],
                ..Default::default()
            },
            ..Default::default()
        })?;
        pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    fn run_merges(previous: &DrawRun, next: &DrawRun) -> bool {
        if previous.first_vertex + previous.vertex_count != next.first_vertex {
            return false;
        }
        match (previous.kind, next.kind) {
            (RunKind::Points, RunKind::Points) => previous.blend == next.blend,
            (RunKind::Lines, RunKind::Lines) => previous.blend == next.blend,
            (RunKind::Geometry, RunKind::Geometry) => {
                previous.blend == next.blend
                    && previous.texture == next.texture
                    && previous.scale_mode == next.scale_mode
                    && previous.address_mode == next.address_mode
            }
            _ => false,
        }
    }

    fn stream_uniforms(&self, extent: (u32, u32)) -> StreamUniforms {
        let (width, height) = match self.viewport {
            Some(rect) => (rect.width.max(1), rect.height.max(1)),
            None => (extent.0.max(1), extent.1.max(1)),
        };
        StreamUniforms {
            scale: [2.0 / width as f32, -2.0 / height as f32],
            offset: [-1.0, 1.0],
            color_scale: self.color_scale,
            padding: [0.0; 3],
        }
    }

    /// Replays one frame's queue. Returns the stats of the consumed frame.
    pub fn present(&mut self) -> anyhow::Result<FrameStats> {
        let swapchain = self
            .swapchain
            .ok_or_else(|| anyhow!("no swapchain texture acquired"))?;
        self.stats = FrameStats::default();

        // stage the whole vertex batch before any pass
        if !self.vertices.is_empty() {
            let bytes = vertices_as_bytes(&self.vertices);
            {
                let mut map = self.device.map_transfer_buffer(self.vertex_transfer, true)?;
                map[..bytes.len()].copy_from_slice(bytes);
            }
            let cmd = self.cmd.as_mut().unwrap();
            cmd.begin_copy_pass()?;
            cmd.upload_to_buffer(
                &TransferBufferLocation {
                    transfer_buffer: self.vertex_transfer,
                    offset: 0,
                },
                &BufferRegion {
                    buffer: self.vertex_buffer,
                    offset: 0,
                    size: bytes.len() as u64,
                },
                true,
            )?;
            cmd.end_copy_pass()?;
            self.stats.uploaded_vertex_bytes = bytes.len() as u64;
        }

        self.replay_queue(swapchain)?;

        let mut cmd = self.cmd.take().unwrap();
        let fence = cmd.submit_and_acquire_fence()?;
        drop(cmd);

        // pair-of-fences rotation: the fence acquired two presents ago is
        // waited on and released now
        if let Some(old) = self.prev_fence.replace(fence) {
            self.device.wait_for_fences(&[old], true)?;
            self.device.release_fence(old);
        }

        for transfer in self.pending_transfer_releases.drain(..) {
            self.device.release_transfer_buffer(transfer);
        }

        self.queue.clear();
        self.vertices.clear();
        self.viewport = None;
        self.clip = None;
        self.last_frame_stats = self.stats;
        self.begin_frame()?;
        Ok(self.last_frame_stats)
    }

    fn replay_queue(&mut self, swapchain: SwapchainTextureHandle) -> anyhow::Result<()> {
        let extent = (swapchain.width, swapchain.height);
        let queue = std::mem::take(&mut self.queue);

        let mut pass_active = false;
        let mut load_op = LoadOp::Load;
        let mut clear_color = Color::default();
        let mut pending: Option<DrawRun> = None;

        let mut flush_run = |this: &mut Self,
                             run: DrawRun,
                             pass_active: &mut bool,
                             load_op: &mut LoadOp,
                             clear_color: &Color|
         -> anyhow::Result<()> {
            let mut cmd = this.cmd.take().unwrap();
            let result = (|| -> anyhow::Result<()> {
                if !*pass_active {
                    cmd.begin_render_pass(
                        &[ColorTargetInfo {
                            texture: swapchain.texture,
                            load_op: *load_op,
                            store_op: StoreOp::Store,
                            clear_color: *clear_color,
                            ..Default::default()
                        }],
                        None,
                    )?;
                    *pass_active = true;
                    *load_op = LoadOp::Load;
                    if let Some(rect) = this.viewport {
                        cmd.set_viewport(&Viewport {
                            x: rect.x as f32,
                            y: rect.y as f32,
                            width: rect.width as f32,
                            height: rect.height as f32,
                            ..Default::default()
                        })?;
                    }
                    if let Some(rect) = this.clip {
                        cmd.set_scissor(&ScissorRect {
                            x: rect.x,
                            y: rect.y,
                            width: rect.width,
                            height: rect.height,
                        })?;
                    }
                }
                let pipeline = Self::pipeline_for(
                    &this.device,
                    &mut this.pipelines,
                    &this.shaders,
                    &run,
                    this.target_format,
                )?;
                cmd.bind_graphics_pipeline(pipeline)?;
                cmd.bind_vertex_buffer(
                    0,
                    &BufferBinding {
                        buffer: this.vertex_buffer,
                        offset: 0,
                    },
                )?;
                if let Some(texture) = run.texture {
                    cmd.bind_fragment_samplers(
                        0,
                        &[TextureSamplerBinding {
                            texture,
                            sampler: this.sampler(run.scale_mode, run.address_mode),
                        }],
                    )?;
                }
                let uniforms = this.stream_uniforms(extent);
                let bytes = unsafe {
                    std::slice::from_raw_parts(
                        &uniforms as *const StreamUniforms as *const u8,
                        std::mem::size_of::<StreamUniforms>(),
                    )
                };
                cmd.push_vertex_uniform_data(0, bytes)?;
                cmd.draw_primitives(run.vertex_count as u32, 1, run.first_vertex as u32, 0)?;
                this.stats.draw_calls += 1;
                this.stats.drawn_vertices += run.vertex_count as u64;
                Ok(())
            })();
            this.cmd = Some(cmd);
            result
        };

        for command in queue {
            match command {
                RenderCommand2d::NoOp | RenderCommand2d::SetDrawColor { .. } => {}
                RenderCommand2d::Clear { color } => {
                    if let Some(run) = pending.take() {
                        flush_run(self, run, &mut pass_active, &mut load_op, &clear_color)?;
                    }
                    // the load op belongs to pass begin; a running pass is
                    // ended so the clear takes effect on the restart
                    if pass_active {
                        self.cmd.as_mut().unwrap().end_render_pass()?;
                        pass_active = false;
                    }
                    load_op = LoadOp::Clear;
                    clear_color = color;
                }
                RenderCommand2d::SetViewport { rect } => {
                    if let Some(run) = pending.take() {
                        flush_run(self, run, &mut pass_active, &mut load_op, &clear_color)?;
                    }
                    self.viewport = rect;
                    if pass_active {
                        let mut cmd = self.cmd.take().unwrap();
                        let viewport = match rect {
                            Some(rect) => Viewport {
                                x: rect.x as f32,
                                y: rect.y as f32,
                                width: rect.width as f32,
                                height: rect.height as f32,
                                ..Default::default()
                            },
                            None => Viewport {
                                width: extent.0 as f32,
                                height: extent.1 as f32,
                                ..Default::default()
                            },
                        };
                        let result = cmd.set_viewport(&viewport);
                        self.cmd = Some(cmd);
                        result?;
                    }
                }
                RenderCommand2d::SetClipRect { rect } => {
                    if let Some(run) = pending.take() {
                        flush_run(self, run, &mut pass_active, &mut load_op, &clear_color)?;
                    }
                    self.clip = rect;
                    if pass_active {
                        let mut cmd = self.cmd.take().unwrap();
                        let scissor = match rect {
                            Some(rect) => ScissorRect {
                                x: rect.x,
                                y: rect.y,
                                width: rect.width,
                                height: rect.height,
                            },
                            None => ScissorRect {
                                x: 0,
                                y: 0,
                                width: extent.0,
                                height: extent.1,
                            },
                        };
                        let result = cmd.set_scissor(&scissor);
                        self.cmd = Some(cmd);
                        result?;
                    }
                }
                RenderCommand2d::DrawPoints {
                    first_vertex,
                    vertex_count,
                    blend,
                } => {
                    let run = DrawRun {
                        kind: RunKind::Points,
                        blend,
                        texture: None,
                        scale_mode: ScaleMode2d::Nearest,
                        address_mode: TextureAddressMode2d::Clamp,
                        first_vertex,
                        vertex_count,
                    };
                    self.queue_run(run, &mut pending, &mut flush_run, &mut pass_active, &mut load_op, &clear_color)?;
                }
                RenderCommand2d::DrawLines {
                    first_vertex,
                    vertex_count,
                    blend,
                    joined,
                } => {
                    let run = DrawRun {
                        kind: if joined {
                            RunKind::JoinedLines
                        } else {
                            RunKind::Lines
                        },
                        blend,
                        texture: None,
                        scale_mode: ScaleMode2d::Nearest,
                        address_mode: TextureAddressMode2d::Clamp,
                        first_vertex,
                        vertex_count,
                    };
                    self.queue_run(run, &mut pending, &mut flush_run, &mut pass_active, &mut load_op, &clear_color)?;
                }
                RenderCommand2d::Geometry {
                    first_vertex,
                    vertex_count,
                    blend,
                    texture,
                    scale_mode,
                    address_mode,
                } => {
                    let run = DrawRun {
                        kind: RunKind::Geometry,
                        blend,
                        texture,
                        scale_mode,
                        address_mode,
                        first_vertex,
                        vertex_count,
                    };
                    self.queue_run(run, &mut pending, &mut flush_run, &mut pass_active, &mut load_op, &clear_color)?;
                }
            }
        }

        if let Some(run) = pending.take() {
            flush_run(self, run, &mut pass_active, &mut load_op, &clear_color)?;
        }
        // a trailing clear with no draws still has to take effect
        if !pass_active && load_op == LoadOp::Clear {
            let cmd = self.cmd.as_mut().unwrap();
            cmd.begin_render_pass(
                &[ColorTargetInfo {
                    texture: swapchain.texture,
                    load_op,
                    store_op: StoreOp::Store,
                    clear_color,
                    ..Default::default()
                }],
                None,
            )?;
            pass_active = true;
        }
        if pass_active {
            self.cmd.as_mut().unwrap().end_render_pass()?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn queue_run(
        &mut self,
        run: DrawRun,
        pending: &mut Option<DrawRun>,
        flush_run: &mut impl FnMut(
            &mut Self,
            DrawRun,
            &mut bool,
            &mut LoadOp,
            &Color,
        ) -> anyhow::Result<()>,
        pass_active: &mut bool,
        load_op: &mut LoadOp,
        clear_color: &Color,
    ) -> anyhow::Result<()> {
        match pending {
            Some(previous) if Self::run_merges(previous, &run) => {
                previous.vertex_count += run.vertex_count;
                self.stats.coalesced_commands += 1;
            }
            Some(_) => {
                let previous = pending.take().unwrap();
                flush_run(self, previous, pass_active, load_op, clear_color)?;
                *pending = Some(run);
            }
            None => *pending = Some(run),
        }
        Ok(())
    }
}

impl Drop for Renderer2d {
    fn drop(&mut self) {
        if let Some(fence) = self.prev_fence.take() {
            let _ = self.device.wait_for_fences(&[fence], true);
            self.device.release_fence(fence);
        }
    }
}
