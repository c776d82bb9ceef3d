use gpu_types::config::{
    MAX_COLOR_TARGET_BINDINGS, MAX_COMPUTE_UNIFORM_BUFFERS, MAX_COMPUTE_WRITE_BUFFERS,
    MAX_COMPUTE_WRITE_TEXTURES, MAX_FRAGMENT_SAMPLERS, MAX_FRAGMENT_UNIFORM_BUFFERS,
    MAX_VERTEX_BUFFER_BINDINGS, MAX_VERTEX_SAMPLERS, MAX_VERTEX_UNIFORM_BUFFERS,
    UNIFORM_BUFFER_SIZE,
};
use gpu_types::formats::{IndexElementSize, SampleCount, TextureFormat};
use gpu_types::passes::{
    BlitInfo, BufferBinding, BufferRegion, ColorTargetInfo, DepthStencilTargetInfo, ScissorRect,
    TextureRegion, TextureSamplerBinding, TextureTransferInfo, TransferBufferLocation, Viewport,
};
use gpu_types::resources::{
    BufferId, BufferUsage, ComputePipelineId, GraphicsPipelineId, ShaderStage, TextureCreateInfo,
    TextureId, TextureType, TextureUsage, TransferBufferUsage, WindowId,
};

use crate::device::{Fence, Gpu, TextureRecord};
use crate::error::GpuError;

/// A borrowed view of a window's current back buffer, valid until the window
/// is unclaimed.
#[derive(Debug, Copy, Clone)]
pub struct SwapchainTextureHandle {
    pub texture: TextureId,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

/// The framebuffer extent of a render pass: the minimum over all attachments
/// of their mip-adjusted dimensions.
pub fn render_pass_extent(attachments: &[(u32, u32, u32)]) -> (u32, u32) {
    let mut extent = (u32::MAX, u32::MAX);
    for &(width, height, mip_level) in attachments {
        extent.0 = extent.0.min(width >> mip_level);
        extent.1 = extent.1.min(height >> mip_level);
    }
    if extent == (u32::MAX, u32::MAX) {
        (0, 0)
    } else {
        extent
    }
}

/// Short-lived recorder. Acquired in `Recording`, moves through mutually
/// exclusive render/compute/copy passes and ends `Submitted`; a submitted
/// buffer is inert and every further call fails under debug mode.
#[derive(Debug)]
pub struct CommandBuffer {
    device: Gpu,
    render_pass: bool,
    compute_pass: bool,
    copy_pass: bool,
    graphics_pipeline: Option<GraphicsPipelineId>,
    compute_pipeline: Option<ComputePipelineId>,
    submitted: bool,
}

impl CommandBuffer {
    pub(crate) fn new(device: Gpu) -> Self {
        Self {
            device,
            render_pass: false,
            compute_pass: false,
            copy_pass: false,
            graphics_pipeline: None,
            compute_pipeline: None,
            submitted: false,
        }
    }

    pub fn render_pass_active(&self) -> bool {
        self.render_pass
    }

    pub fn compute_pass_active(&self) -> bool {
        self.compute_pass
    }

    pub fn copy_pass_active(&self) -> bool {
        self.copy_pass
    }

    pub fn submitted(&self) -> bool {
        self.submitted
    }

    fn debug(&self) -> bool {
        self.device.debug_mode()
    }

    fn fail(msg: impl Into<String>) -> anyhow::Error {
        GpuError::Validation(msg.into()).report()
    }

    fn check_recording(&self) -> anyhow::Result<()> {
        if self.debug() && self.submitted {
            return Err(Self::fail("command buffer was already submitted"));
        }
        Ok(())
    }

    fn check_no_pass(&self) -> anyhow::Result<()> {
        self.check_recording()?;
        if self.debug() && (self.render_pass || self.compute_pass || self.copy_pass) {
            return Err(Self::fail("another pass is still in progress"));
        }
        Ok(())
    }

    fn check_render_pass(&self) -> anyhow::Result<()> {
        self.check_recording()?;
        if self.debug() && !self.render_pass {
            return Err(Self::fail("no render pass in progress"));
        }
        Ok(())
    }

    fn check_compute_pass(&self) -> anyhow::Result<()> {
        self.check_recording()?;
        if self.debug() && !self.compute_pass {
            return Err(Self::fail("no compute pass in progress"));
        }
        Ok(())
    }

    fn check_copy_pass(&self) -> anyhow::Result<()> {
        self.check_recording()?;
        if self.debug() && !self.copy_pass {
            return Err(Self::fail("no copy pass in progress"));
        }
        Ok(())
    }

    fn check_graphics_pipeline(&self) -> anyhow::Result<()> {
        if self.debug() && self.graphics_pipeline.is_none() {
            return Err(Self::fail("no graphics pipeline bound"));
        }
        Ok(())
    }

    fn check_compute_pipeline(&self) -> anyhow::Result<()> {
        if self.debug() && self.compute_pipeline.is_none() {
            return Err(Self::fail("no compute pipeline bound"));
        }
        Ok(())
    }

    fn check_buffer_usage(&self, id: BufferId, usage: BufferUsage, what: &str) -> anyhow::Result<()> {
        if !self.debug() {
            return Ok(());
        }
        let inner = self.device.inner.borrow();
        let info = inner
            .buffers
            .get(&id)
            .ok_or_else(|| Self::fail(format!("unknown {what} buffer")))?;
        if !info.usage.intersects(usage) {
            return Err(Self::fail(format!("buffer was not created for {what} use")));
        }
        Ok(())
    }

    fn check_texture_usage(
        &self,
        id: TextureId,
        usage: TextureUsage,
        what: &str,
    ) -> anyhow::Result<()> {
        if !self.debug() {
            return Ok(());
        }
        let inner = self.device.inner.borrow();
        let record = inner
            .textures
            .get(&id)
            .ok_or_else(|| Self::fail(format!("unknown {what} texture")))?;
        if !record.info.usage.intersects(usage) {
            return Err(Self::fail(format!("texture was not created for {what} use")));
        }
        Ok(())
    }

    fn check_sampler_bindings(&self, bindings: &[TextureSamplerBinding]) -> anyhow::Result<()> {
        if !self.debug() {
            return Ok(());
        }
        let inner = self.device.inner.borrow();
        for binding in bindings {
            let record = inner
                .textures
                .get(&binding.texture)
                .ok_or_else(|| Self::fail("unknown sampled texture"))?;
            if !record.info.usage.contains(TextureUsage::SAMPLER) {
                return Err(Self::fail("texture was not created for sampling"));
            }
            if !inner.samplers.contains_key(&binding.sampler) {
                return Err(Self::fail("unknown sampler"));
            }
        }
        Ok(())
    }

    // render passes

    pub fn begin_render_pass(
        &mut self,
        color_targets: &[ColorTargetInfo],
        depth_stencil_target: Option<&DepthStencilTargetInfo>,
    ) -> anyhow::Result<()> {
        self.check_no_pass()?;
        if self.debug() {
            if color_targets.is_empty() && depth_stencil_target.is_none() {
                return Err(Self::fail("render pass needs at least one attachment"));
            }
            if color_targets.len() > MAX_COLOR_TARGET_BINDINGS {
                return Err(Self::fail("too many color attachments"));
            }
        }
        // the framebuffer extent is needed in release mode too, so the
        // attachment lookups are unconditional
        let mut dims: Vec<(u32, u32, u32)> = Vec::with_capacity(color_targets.len() + 1);
        {
            let inner = self.device.inner.borrow();
            for target in color_targets {
                let record = inner
                    .textures
                    .get(&target.texture)
                    .ok_or_else(|| Self::fail("unknown color attachment texture"))?;
                if self.debug() {
                    Self::check_color_attachment(record, target)?;
                }
                dims.push((record.info.width, record.info.height, target.mip_level));
            }
            if let Some(target) = depth_stencil_target {
                let record = inner
                    .textures
                    .get(&target.texture)
                    .ok_or_else(|| Self::fail("unknown depth-stencil attachment texture"))?;
                if self.debug() {
                    if !record.info.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
                        return Err(Self::fail(
                            "texture was not created as a depth-stencil target",
                        ));
                    }
                    if !record.info.format.is_depth_stencil() {
                        return Err(Self::fail("attachment format has no depth aspect"));
                    }
                }
                dims.push((record.info.width, record.info.height, 0));
            }
        }
        let extent = render_pass_extent(&dims);
        self.device.inner.borrow_mut().driver.begin_render_pass(
            color_targets,
            depth_stencil_target,
            extent,
        )?;
        self.render_pass = true;
        Ok(())
    }

    fn check_color_attachment(
        record: &TextureRecord,
        target: &ColorTargetInfo,
    ) -> anyhow::Result<()> {
        if !record.info.usage.contains(TextureUsage::COLOR_TARGET) {
            return Err(Self::fail("texture was not created as a color target"));
        }
        if target.mip_level >= record.info.level_count {
            return Err(Self::fail("attachment mip level out of range"));
        }
        if target.layer >= record.info.layer_count.max(record.info.depth) {
            return Err(Self::fail("attachment layer out of range"));
        }
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.device.inner.borrow_mut().driver.end_render_pass();
        self.render_pass = false;
        self.graphics_pipeline = None;
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.device.inner.borrow_mut().driver.set_viewport(viewport);
        Ok(())
    }

    pub fn set_scissor(&mut self, scissor: &ScissorRect) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.device.inner.borrow_mut().driver.set_scissor(scissor);
        Ok(())
    }

    pub fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipelineId) -> anyhow::Result<()> {
        self.check_render_pass()?;
        if self.debug()
            && !self
                .device
                .inner
                .borrow()
                .graphics_pipelines
                .contains_key(&pipeline)
        {
            return Err(Self::fail("unknown graphics pipeline"));
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_graphics_pipeline(pipeline);
        self.graphics_pipeline = Some(pipeline);
        Ok(())
    }

    pub fn bind_vertex_buffers(
        &mut self,
        first_slot: u32,
        bindings: &[BufferBinding],
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        if self.debug() && first_slot as usize + bindings.len() > MAX_VERTEX_BUFFER_BINDINGS {
            return Err(Self::fail("vertex buffer slots out of range"));
        }
        for binding in bindings {
            self.check_buffer_usage(binding.buffer, BufferUsage::VERTEX, "vertex")?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_vertex_buffers(first_slot, bindings);
        Ok(())
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, binding: &BufferBinding) -> anyhow::Result<()> {
        self.bind_vertex_buffers(slot, std::slice::from_ref(binding))
    }

    pub fn bind_index_buffer(
        &mut self,
        binding: &BufferBinding,
        index_element_size: IndexElementSize,
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_buffer_usage(binding.buffer, BufferUsage::INDEX, "index")?;
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_index_buffer(binding, index_element_size);
        Ok(())
    }

    pub fn bind_vertex_samplers(
        &mut self,
        first_slot: u32,
        bindings: &[TextureSamplerBinding],
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        if self.debug() && first_slot as usize + bindings.len() > MAX_VERTEX_SAMPLERS {
            return Err(Self::fail("vertex sampler slots out of range"));
        }
        self.check_sampler_bindings(bindings)?;
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_vertex_samplers(first_slot, bindings);
        Ok(())
    }

    pub fn bind_fragment_samplers(
        &mut self,
        first_slot: u32,
        bindings: &[TextureSamplerBinding],
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        if self.debug() && first_slot as usize + bindings.len() > MAX_FRAGMENT_SAMPLERS {
            return Err(Self::fail("fragment sampler slots out of range"));
        }
        self.check_sampler_bindings(bindings)?;
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_fragment_samplers(first_slot, bindings);
        Ok(())
    }

    pub fn bind_vertex_storage_textures(
        &mut self,
        first_slot: u32,
        textures: &[TextureId],
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        for &texture in textures {
            self.check_texture_usage(texture, TextureUsage::GRAPHICS_STORAGE_READ, "storage")?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_vertex_storage_textures(first_slot, textures);
        Ok(())
    }

    pub fn bind_fragment_storage_textures(
        &mut self,
        first_slot: u32,
        textures: &[TextureId],
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        for &texture in textures {
            self.check_texture_usage(texture, TextureUsage::GRAPHICS_STORAGE_READ, "storage")?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_fragment_storage_textures(first_slot, textures);
        Ok(())
    }

    pub fn bind_vertex_storage_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        for &buffer in buffers {
            self.check_buffer_usage(buffer, BufferUsage::GRAPHICS_STORAGE_READ, "storage")?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_vertex_storage_buffers(first_slot, buffers);
        Ok(())
    }

    pub fn bind_fragment_storage_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        for &buffer in buffers {
            self.check_buffer_usage(buffer, BufferUsage::GRAPHICS_STORAGE_READ, "storage")?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_fragment_storage_buffers(first_slot, buffers);
        Ok(())
    }

    // uniform pushes

    fn push_uniform_data(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        data: &[u8],
        slot_limit: usize,
    ) -> anyhow::Result<()> {
        if self.debug() {
            if slot as usize >= slot_limit {
                return Err(Self::fail("uniform slot out of range"));
            }
            if data.is_empty() {
                return Err(Self::fail("uniform data is empty"));
            }
            if data.len() > UNIFORM_BUFFER_SIZE {
                return Err(Self::fail("uniform data exceeds the lease size"));
            }
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .push_uniform_data(stage, slot, data);
        Ok(())
    }

    pub fn push_vertex_uniform_data(&mut self, slot: u32, data: &[u8]) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        self.push_uniform_data(ShaderStage::Vertex, slot, data, MAX_VERTEX_UNIFORM_BUFFERS)
    }

    pub fn push_fragment_uniform_data(&mut self, slot: u32, data: &[u8]) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        self.push_uniform_data(
            ShaderStage::Fragment,
            slot,
            data,
            MAX_FRAGMENT_UNIFORM_BUFFERS,
        )
    }

    pub fn push_compute_uniform_data(&mut self, slot: u32, data: &[u8]) -> anyhow::Result<()> {
        self.check_compute_pass()?;
        self.check_compute_pipeline()?;
        self.push_uniform_data(ShaderStage::Compute, slot, data, MAX_COMPUTE_UNIFORM_BUFFERS)
    }

    // draws

    pub fn draw_primitives(
        &mut self,
        num_vertices: u32,
        num_instances: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        self.device.inner.borrow_mut().driver.draw_primitives(
            num_vertices,
            num_instances,
            first_vertex,
            first_instance,
        );
        Ok(())
    }

    pub fn draw_indexed_primitives(
        &mut self,
        num_indices: u32,
        num_instances: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        self.device.inner.borrow_mut().driver.draw_indexed_primitives(
            num_indices,
            num_instances,
            first_index,
            vertex_offset,
            first_instance,
        );
        Ok(())
    }

    pub fn draw_primitives_indirect(
        &mut self,
        buffer: BufferId,
        offset: u64,
        draw_count: u32,
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        self.check_buffer_usage(buffer, BufferUsage::INDIRECT, "indirect")?;
        self.device
            .inner
            .borrow_mut()
            .driver
            .draw_primitives_indirect(buffer, offset, draw_count);
        Ok(())
    }

    pub fn draw_indexed_primitives_indirect(
        &mut self,
        buffer: BufferId,
        offset: u64,
        draw_count: u32,
    ) -> anyhow::Result<()> {
        self.check_render_pass()?;
        self.check_graphics_pipeline()?;
        self.check_buffer_usage(buffer, BufferUsage::INDIRECT, "indirect")?;
        self.device
            .inner
            .borrow_mut()
            .driver
            .draw_indexed_primitives_indirect(buffer, offset, draw_count);
        Ok(())
    }

    // compute passes

    pub fn begin_compute_pass(&mut self) -> anyhow::Result<()> {
        self.check_no_pass()?;
        self.device.inner.borrow_mut().driver.begin_compute_pass()?;
        self.compute_pass = true;
        Ok(())
    }

    pub fn end_compute_pass(&mut self) -> anyhow::Result<()> {
        self.check_compute_pass()?;
        self.device.inner.borrow_mut().driver.end_compute_pass();
        self.compute_pass = false;
        self.compute_pipeline = None;
        Ok(())
    }

    pub fn bind_compute_pipeline(&mut self, pipeline: ComputePipelineId) -> anyhow::Result<()> {
        self.check_compute_pass()?;
        if self.debug()
            && !self
                .device
                .inner
                .borrow()
                .compute_pipelines
                .contains_key(&pipeline)
        {
            return Err(Self::fail("unknown compute pipeline"));
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_compute_pipeline(pipeline);
        self.compute_pipeline = Some(pipeline);
        Ok(())
    }

    pub fn bind_compute_storage_textures(
        &mut self,
        first_slot: u32,
        textures: &[TextureId],
    ) -> anyhow::Result<()> {
        self.check_compute_pass()?;
        self.check_compute_pipeline()?;
        if self.debug() && first_slot as usize + textures.len() > MAX_COMPUTE_WRITE_TEXTURES {
            return Err(Self::fail("compute storage texture slots out of range"));
        }
        for &texture in textures {
            self.check_texture_usage(
                texture,
                TextureUsage::COMPUTE_STORAGE_READ | TextureUsage::COMPUTE_STORAGE_WRITE,
                "compute storage",
            )?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_compute_storage_textures(first_slot, textures);
        Ok(())
    }

    pub fn bind_compute_storage_buffers(
        &mut self,
        first_slot: u32,
        buffers: &[BufferId],
    ) -> anyhow::Result<()> {
        self.check_compute_pass()?;
        self.check_compute_pipeline()?;
        if self.debug() && first_slot as usize + buffers.len() > MAX_COMPUTE_WRITE_BUFFERS {
            return Err(Self::fail("compute storage buffer slots out of range"));
        }
        for &buffer in buffers {
            self.check_buffer_usage(
                buffer,
                BufferUsage::COMPUTE_STORAGE_READ | BufferUsage::COMPUTE_STORAGE_WRITE,
                "compute storage",
            )?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .bind_compute_storage_buffers(first_slot, buffers);
        Ok(())
    }

    pub fn dispatch_compute(
        &mut self,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    ) -> anyhow::Result<()> {
        self.check_compute_pass()?;
        self.check_compute_pipeline()?;
        self.device.inner.borrow_mut().driver.dispatch_compute(
            group_count_x,
            group_count_y,
            group_count_z,
        );
        Ok(())
    }

    pub fn dispatch_compute_indirect(
        &mut self,
        buffer: BufferId,
        offset: u64,
    ) -> anyhow::Result<()> {
        self.check_compute_pass()?;
        self.check_compute_pipeline()?;
        self.check_buffer_usage(buffer, BufferUsage::INDIRECT, "indirect")?;
        self.device
            .inner
            .borrow_mut()
            .driver
            .dispatch_compute_indirect(buffer, offset);
        Ok(())
    }

    // copy passes

    pub fn begin_copy_pass(&mut self) -> anyhow::Result<()> {
        self.check_no_pass()?;
        self.device.inner.borrow_mut().driver.begin_copy_pass()?;
        self.copy_pass = true;
        Ok(())
    }

    pub fn end_copy_pass(&mut self) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        self.device.inner.borrow_mut().driver.end_copy_pass();
        self.copy_pass = false;
        Ok(())
    }

    fn check_transfer_direction(
        &self,
        id: gpu_types::resources::TransferBufferId,
        usage: TransferBufferUsage,
    ) -> anyhow::Result<()> {
        if !self.debug() {
            return Ok(());
        }
        let inner = self.device.inner.borrow();
        let info = inner
            .transfer_buffers
            .get(&id)
            .ok_or_else(|| Self::fail("unknown transfer buffer"))?;
        if info.usage != usage {
            return Err(Self::fail("transfer buffer direction mismatch"));
        }
        Ok(())
    }

    pub fn upload_to_buffer(
        &mut self,
        source: &TransferBufferLocation,
        destination: &BufferRegion,
        cycle: bool,
    ) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        self.check_transfer_direction(source.transfer_buffer, TransferBufferUsage::Upload)?;
        if self.debug() {
            let inner = self.device.inner.borrow();
            let transfer = &inner.transfer_buffers[&source.transfer_buffer];
            if source.offset + destination.size > transfer.size {
                return Err(Self::fail("upload source range out of bounds"));
            }
            let buffer = inner
                .buffers
                .get(&destination.buffer)
                .ok_or_else(|| Self::fail("unknown destination buffer"))?;
            if destination.offset + destination.size > buffer.size {
                return Err(Self::fail("upload destination range out of bounds"));
            }
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .upload_to_buffer(source, destination, cycle)
    }

    pub fn upload_to_texture(
        &mut self,
        source: &TextureTransferInfo,
        destination: &TextureRegion,
        cycle: bool,
    ) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        self.check_transfer_direction(source.transfer_buffer, TransferBufferUsage::Upload)?;
        if self.debug() {
            self.check_texture_region(destination)?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .upload_to_texture(source, destination, cycle)
    }

    fn check_texture_region(&self, region: &TextureRegion) -> anyhow::Result<()> {
        let inner = self.device.inner.borrow();
        let record = inner
            .textures
            .get(&region.texture)
            .ok_or_else(|| Self::fail("unknown texture"))?;
        let info = &record.info;
        if region.mip_level >= info.level_count {
            return Err(Self::fail("texture region mip level out of range"));
        }
        let (w, h) = (
            (info.width >> region.mip_level).max(1),
            (info.height >> region.mip_level).max(1),
        );
        if region.x + region.width > w || region.y + region.height > h {
            return Err(Self::fail("texture region out of bounds"));
        }
        if region.z + region.depth > info.depth {
            return Err(Self::fail("texture region depth out of bounds"));
        }
        if region.layer >= info.layer_count {
            return Err(Self::fail("texture region layer out of range"));
        }
        Ok(())
    }

    pub fn download_from_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &TransferBufferLocation,
    ) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        self.check_transfer_direction(destination.transfer_buffer, TransferBufferUsage::Download)?;
        self.device
            .inner
            .borrow_mut()
            .driver
            .download_from_buffer(source, destination)
    }

    pub fn download_from_texture(
        &mut self,
        source: &TextureRegion,
        destination: &TextureTransferInfo,
    ) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        self.check_transfer_direction(destination.transfer_buffer, TransferBufferUsage::Download)?;
        if self.debug() {
            self.check_texture_region(source)?;
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .download_from_texture(source, destination)
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &BufferRegion,
        destination: &BufferRegion,
    ) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        if self.debug() {
            let inner = self.device.inner.borrow();
            for region in [source, destination] {
                let buffer = inner
                    .buffers
                    .get(&region.buffer)
                    .ok_or_else(|| Self::fail("unknown buffer in copy"))?;
                if region.offset + region.size > buffer.size {
                    return Err(Self::fail("buffer copy range out of bounds"));
                }
            }
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .copy_buffer_to_buffer(source, destination)
    }

    pub fn copy_texture_to_texture(
        &mut self,
        source: &TextureRegion,
        destination: &TextureRegion,
    ) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        if self.debug() {
            self.check_texture_region(source)?;
            self.check_texture_region(destination)?;
            let inner = self.device.inner.borrow();
            let src = &inner.textures[&source.texture].info;
            let dst = &inner.textures[&destination.texture].info;
            if src.format != dst.format {
                return Err(Self::fail("texture copy formats differ"));
            }
        }
        self.device
            .inner
            .borrow_mut()
            .driver
            .copy_texture_to_texture(source, destination)
    }

    pub fn generate_mipmaps(&mut self, texture: TextureId) -> anyhow::Result<()> {
        self.check_copy_pass()?;
        if self.debug() {
            let inner = self.device.inner.borrow();
            let record = inner
                .textures
                .get(&texture)
                .ok_or_else(|| Self::fail("unknown texture"))?;
            if record.info.level_count < 2 {
                return Err(Self::fail("texture has a single mip level"));
            }
        }
        self.device.inner.borrow_mut().driver.generate_mipmaps(texture)
    }

    /// A whole-subresource copy between two compatible textures, usable
    /// outside any pass. Scaling blits are unsupported.
    pub fn blit(&mut self, info: &BlitInfo) -> anyhow::Result<()> {
        self.check_no_pass()?;
        if self.debug() {
            let inner = self.device.inner.borrow();
            let src = inner
                .textures
                .get(&info.source.texture)
                .ok_or_else(|| Self::fail("unknown blit source"))?;
            let dst = inner
                .textures
                .get(&info.destination.texture)
                .ok_or_else(|| Self::fail("unknown blit destination"))?;
            if src.info.format != dst.info.format {
                return Err(Self::fail("blit formats differ"));
            }
            if (info.source.width, info.source.height)
                != (info.destination.width, info.destination.height)
            {
                return Err(GpuError::Unsupported("scaling blits".into()).report());
            }
        }
        self.device.inner.borrow_mut().driver.blit(info)
    }

    // swapchain

    pub fn acquire_swapchain_texture(
        &mut self,
        window: WindowId,
    ) -> anyhow::Result<SwapchainTextureHandle> {
        self.check_no_pass()?;
        if !self.device.window_claimed(window) {
            return Err(GpuError::InvalidArgument("window is not claimed".into()).report());
        }
        let swapchain = self
            .device
            .inner
            .borrow_mut()
            .driver
            .acquire_swapchain_texture(window)?;
        {
            let mut inner = self.device.inner.borrow_mut();
            inner
                .textures
                .entry(swapchain.texture)
                .or_insert_with(|| TextureRecord {
                    info: TextureCreateInfo {
                        format: swapchain.format,
                        ty: TextureType::D2,
                        width: swapchain.width,
                        height: swapchain.height,
                        depth: 1,
                        layer_count: 1,
                        level_count: 1,
                        sample_count: SampleCount::S1,
                        usage: TextureUsage::COLOR_TARGET,
                    },
                    swapchain_of: Some(window),
                });
            let record = inner.windows.get_mut(&window).unwrap();
            if !record.swapchain_textures.contains(&swapchain.texture) {
                record.swapchain_textures.push(swapchain.texture);
            }
        }
        Ok(SwapchainTextureHandle {
            texture: swapchain.texture,
            format: swapchain.format,
            width: swapchain.width,
            height: swapchain.height,
        })
    }

    // debug markers

    pub fn insert_debug_label(&mut self, text: &str) -> anyhow::Result<()> {
        self.check_recording()?;
        self.device.inner.borrow_mut().driver.insert_debug_label(text);
        Ok(())
    }

    pub fn push_debug_group(&mut self, name: &str) -> anyhow::Result<()> {
        self.check_recording()?;
        self.device.inner.borrow_mut().driver.push_debug_group(name);
        Ok(())
    }

    pub fn pop_debug_group(&mut self) -> anyhow::Result<()> {
        self.check_recording()?;
        self.device.inner.borrow_mut().driver.pop_debug_group();
        Ok(())
    }

    // submission

    pub fn submit(&mut self) -> anyhow::Result<()> {
        self.check_no_pass()?;
        let mut inner = self.device.inner.borrow_mut();
        let res = inner.driver.submit();
        inner.recording = false;
        self.submitted = true;
        res
    }

    pub fn submit_and_acquire_fence(&mut self) -> anyhow::Result<Fence> {
        self.check_no_pass()?;
        let mut inner = self.device.inner.borrow_mut();
        let res = inner.driver.submit_and_acquire_fence();
        inner.recording = false;
        self.submitted = true;
        res.map(Fence)
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        // a discarded, never-submitted recorder frees the device slot; the
        // next acquire resets the native recorder
        if !self.submitted {
            self.device.inner.borrow_mut().recording = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::render_pass_extent;

    #[test]
    fn extent_is_min_over_attachments() {
        assert_eq!(render_pass_extent(&[(640, 480, 0)]), (640, 480));
        assert_eq!(render_pass_extent(&[(640, 480, 1)]), (320, 240));
        assert_eq!(
            render_pass_extent(&[(1024, 1024, 2), (640, 480, 0)]),
            (256, 256)
        );
        assert_eq!(render_pass_extent(&[]), (0, 0));
    }
}
