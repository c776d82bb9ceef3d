use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use gpu_backend_traits::traits::GpuDriverInterface;
use gpu_backend_traits::window::NativeWindow;
use gpu_types::config::GpuDriverKind;
use gpu_types::formats::{SampleCount, TextureFormat};
use gpu_types::passes::{PresentMode, SwapchainComposition};
use gpu_types::resources::{
    BufferCreateInfo, BufferId, ComputePipelineCreateInfo, ComputePipelineId, FenceId,
    GraphicsPipelineCreateInfo, GraphicsPipelineId, SamplerCreateInfo, SamplerId,
    ShaderCreateInfo, ShaderFormat, ShaderId, ShaderResourceCounts, ShaderStage,
    TextureCreateInfo, TextureId, TextureType, TextureUsage, TransferBufferCreateInfo,
    TransferBufferId, WindowId,
};

use crate::checker;
use crate::command_buffer::CommandBuffer;
use crate::error::GpuError;
use crate::transfer::MappedTransferBuffer;

/// Metadata the front-end keeps per shader; pipeline creation and the
/// back-end binding layouts consume the counts.
#[derive(Debug, Copy, Clone)]
pub struct ShaderMeta {
    pub stage: ShaderStage,
    pub counts: ShaderResourceCounts,
}

#[derive(Debug, Clone)]
pub(crate) struct TextureRecord {
    pub info: TextureCreateInfo,
    /// Set for swapchain back buffers; they are owned by their window and
    /// vanish when the window is unclaimed.
    pub swapchain_of: Option<WindowId>,
}

#[derive(Debug, Clone)]
pub(crate) struct GraphicsPipelineRecord {
    pub vertex_counts: ShaderResourceCounts,
    pub fragment_counts: ShaderResourceCounts,
}

#[derive(Debug, Clone)]
pub(crate) struct ComputePipelineRecord {
    pub counts: ShaderResourceCounts,
}

#[derive(Debug, Clone)]
pub(crate) struct WindowRecord {
    pub composition: SwapchainComposition,
    pub present_mode: PresentMode,
    /// Back-buffer texture ids handed out by acquire; dropped from the
    /// texture registry on unclaim.
    pub swapchain_textures: Vec<TextureId>,
}

#[derive(Debug)]
pub(crate) struct DeviceInner {
    pub driver: Box<dyn GpuDriverInterface>,
    pub kind: GpuDriverKind,
    pub shader_formats: ShaderFormat,
    pub debug_mode: bool,
    next_id: u128,

    pub textures: HashMap<TextureId, TextureRecord>,
    pub buffers: HashMap<BufferId, BufferCreateInfo>,
    pub transfer_buffers: HashMap<TransferBufferId, TransferBufferCreateInfo>,
    pub samplers: HashMap<SamplerId, SamplerCreateInfo>,
    pub shaders: HashMap<ShaderId, ShaderMeta>,
    pub graphics_pipelines: HashMap<GraphicsPipelineId, GraphicsPipelineRecord>,
    pub compute_pipelines: HashMap<ComputePipelineId, ComputePipelineRecord>,
    pub windows: HashMap<WindowId, WindowRecord>,
    pub mapped: HashSet<TransferBufferId>,

    /// Only one command buffer may be recording at a time; the back-end has
    /// a single native recorder.
    pub recording: bool,
}

impl DeviceInner {
    pub fn alloc_id(&mut self) -> u128 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-wide handle to a configured back-end. Cheap to clone; all clones
/// refer to the same device. Single-threaded by design: the device, its
/// command buffers and its claimed windows live on one thread.
#[derive(Debug, Clone)]
pub struct Gpu {
    pub(crate) inner: Rc<RefCell<DeviceInner>>,
}

/// A submitted command buffer's completion handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Fence(pub(crate) FenceId);

impl Gpu {
    /// Wraps a driver the registry constructed. `shader_formats` is the
    /// intersection of the requested and the driver-supported formats.
    pub fn new(
        driver: Box<dyn GpuDriverInterface>,
        kind: GpuDriverKind,
        shader_formats: ShaderFormat,
        debug_mode: bool,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeviceInner {
                driver,
                kind,
                shader_formats,
                debug_mode,
                next_id: 0,
                textures: Default::default(),
                buffers: Default::default(),
                transfer_buffers: Default::default(),
                samplers: Default::default(),
                shaders: Default::default(),
                graphics_pipelines: Default::default(),
                compute_pipelines: Default::default(),
                windows: Default::default(),
                mapped: Default::default(),
                recording: false,
            })),
        }
    }

    pub fn driver(&self) -> GpuDriverKind {
        self.inner.borrow().kind
    }

    pub fn driver_name(&self) -> &'static str {
        self.inner.borrow().kind.as_str()
    }

    pub fn debug_mode(&self) -> bool {
        self.inner.borrow().debug_mode
    }

    pub fn shader_formats(&self) -> ShaderFormat {
        self.inner.borrow().shader_formats
    }

    /// Explicit teardown. All child objects must already be released; under
    /// debug mode leftovers are an error.
    pub fn destroy(self) -> anyhow::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.debug_mode {
            let leftovers = inner.textures.len()
                + inner.buffers.len()
                + inner.transfer_buffers.len()
                + inner.samplers.len()
                + inner.shaders.len()
                + inner.graphics_pipelines.len()
                + inner.compute_pipelines.len()
                + inner.windows.len();
            if leftovers != 0 {
                return Err(GpuError::Validation(format!(
                    "device destroyed with {leftovers} objects still alive"
                ))
                .report());
            }
        }
        inner.driver.destroy();
        Ok(())
    }

    // capability queries

    pub fn supports_texture_format(
        &self,
        format: TextureFormat,
        ty: TextureType,
        usage: TextureUsage,
    ) -> bool {
        self.inner.borrow().driver.supports_texture_format(format, ty, usage)
    }

    pub fn best_sample_count(&self, format: TextureFormat, desired: SampleCount) -> SampleCount {
        self.inner.borrow().driver.best_sample_count(format, desired)
    }

    pub fn texel_block_size(format: TextureFormat) -> usize {
        format.texel_block_size()
    }

    // resource creation

    pub fn create_texture(&self, info: &TextureCreateInfo) -> anyhow::Result<TextureId> {
        let mut inner = self.inner.borrow_mut();
        if inner.debug_mode {
            checker::check_texture_create(info).map_err(GpuError::report)?;
        }
        let id = TextureId(inner.alloc_id());
        inner.driver.create_texture(id, info)?;
        inner.textures.insert(
            id,
            TextureRecord {
                info: *info,
                swapchain_of: None,
            },
        );
        Ok(id)
    }

    pub fn release_texture(&self, id: TextureId) {
        let mut inner = self.inner.borrow_mut();
        if inner.textures.remove(&id).is_some() {
            inner.driver.release_texture(id);
        } else if inner.debug_mode {
            log::error!("release of unknown texture {id:?}");
        }
    }

    pub fn set_texture_name(&self, id: TextureId, name: &str) {
        let mut inner = self.inner.borrow_mut();
        if inner.textures.contains_key(&id) {
            inner.driver.set_texture_name(id, name);
        }
    }

    pub fn create_buffer(&self, info: &BufferCreateInfo) -> anyhow::Result<BufferId> {
        let mut inner = self.inner.borrow_mut();
        if inner.debug_mode {
            checker::check_buffer_create(info).map_err(GpuError::report)?;
        }
        let id = BufferId(inner.alloc_id());
        inner.driver.create_buffer(id, info)?;
        inner.buffers.insert(id, *info);
        Ok(id)
    }

    pub fn release_buffer(&self, id: BufferId) {
        let mut inner = self.inner.borrow_mut();
        if inner.buffers.remove(&id).is_some() {
            inner.driver.release_buffer(id);
        } else if inner.debug_mode {
            log::error!("release of unknown buffer {id:?}");
        }
    }

    pub fn set_buffer_name(&self, id: BufferId, name: &str) {
        let mut inner = self.inner.borrow_mut();
        if inner.buffers.contains_key(&id) {
            inner.driver.set_buffer_name(id, name);
        }
    }

    pub fn create_transfer_buffer(
        &self,
        info: &TransferBufferCreateInfo,
    ) -> anyhow::Result<TransferBufferId> {
        let mut inner = self.inner.borrow_mut();
        if inner.debug_mode {
            checker::check_transfer_buffer_create(info).map_err(GpuError::report)?;
        }
        let id = TransferBufferId(inner.alloc_id());
        inner.driver.create_transfer_buffer(id, info)?;
        inner.transfer_buffers.insert(id, *info);
        Ok(id)
    }

    pub fn release_transfer_buffer(&self, id: TransferBufferId) {
        let mut inner = self.inner.borrow_mut();
        if inner.transfer_buffers.remove(&id).is_some() {
            inner.mapped.remove(&id);
            inner.driver.release_transfer_buffer(id);
        } else if inner.debug_mode {
            log::error!("release of unknown transfer buffer {id:?}");
        }
    }

    /// Maps the transfer buffer into host memory; may block until the region
    /// is safe to write. The returned guard unmaps on drop.
    pub fn map_transfer_buffer(
        &self,
        id: TransferBufferId,
        cycle: bool,
    ) -> anyhow::Result<MappedTransferBuffer<'_>> {
        let region = {
            let mut inner = self.inner.borrow_mut();
            if !inner.transfer_buffers.contains_key(&id) {
                return Err(GpuError::InvalidArgument("unknown transfer buffer".into()).report());
            }
            if inner.mapped.contains(&id) {
                return Err(
                    GpuError::Validation("transfer buffer is already mapped".into()).report()
                );
            }
            let region = inner.driver.map_transfer_buffer(id, cycle)?;
            inner.mapped.insert(id);
            region
        };
        Ok(MappedTransferBuffer::new(self, id, region))
    }

    pub(crate) fn unmap_transfer_buffer(&self, id: TransferBufferId) {
        let mut inner = self.inner.borrow_mut();
        if inner.mapped.remove(&id) {
            inner.driver.unmap_transfer_buffer(id);
        }
    }

    pub fn create_sampler(&self, info: &SamplerCreateInfo) -> anyhow::Result<SamplerId> {
        let mut inner = self.inner.borrow_mut();
        if inner.debug_mode {
            checker::check_sampler_create(info).map_err(GpuError::report)?;
        }
        let id = SamplerId(inner.alloc_id());
        inner.driver.create_sampler(id, info)?;
        inner.samplers.insert(id, *info);
        Ok(id)
    }

    pub fn release_sampler(&self, id: SamplerId) {
        let mut inner = self.inner.borrow_mut();
        if inner.samplers.remove(&id).is_some() {
            inner.driver.release_sampler(id);
        }
    }

    pub fn create_shader(&self, info: &ShaderCreateInfo) -> anyhow::Result<ShaderId> {
        let mut inner = self.inner.borrow_mut();
        // shader-format compatibility is checked unconditionally; the device
        // stored the accepted set exactly so incompatible blobs fail early
        checker::check_shader_create(info, inner.shader_formats).map_err(GpuError::report)?;
        let id = ShaderId(inner.alloc_id());
        inner.driver.create_shader(id, info)?;
        inner.shaders.insert(
            id,
            ShaderMeta {
                stage: info.stage,
                counts: info.counts,
            },
        );
        Ok(id)
    }

    pub fn release_shader(&self, id: ShaderId) {
        let mut inner = self.inner.borrow_mut();
        if inner.shaders.remove(&id).is_some() {
            inner.driver.release_shader(id);
        }
    }

    pub fn create_graphics_pipeline(
        &self,
        info: &GraphicsPipelineCreateInfo,
    ) -> anyhow::Result<GraphicsPipelineId> {
        let mut inner = self.inner.borrow_mut();
        if inner.debug_mode {
            checker::check_graphics_pipeline_create(info, &inner.shaders)
                .map_err(GpuError::report)?;
        }
        let vertex_counts = inner
            .shaders
            .get(&info.vertex_shader)
            .map(|m| m.counts)
            .ok_or_else(|| GpuError::InvalidArgument("unknown vertex shader".into()).report())?;
        let fragment_counts = inner
            .shaders
            .get(&info.fragment_shader)
            .map(|m| m.counts)
            .ok_or_else(|| GpuError::InvalidArgument("unknown fragment shader".into()).report())?;
        let id = GraphicsPipelineId(inner.alloc_id());
        inner.driver.create_graphics_pipeline(id, info)?;
        inner.graphics_pipelines.insert(
            id,
            GraphicsPipelineRecord {
                vertex_counts,
                fragment_counts,
            },
        );
        Ok(id)
    }

    pub fn release_graphics_pipeline(&self, id: GraphicsPipelineId) {
        let mut inner = self.inner.borrow_mut();
        if inner.graphics_pipelines.remove(&id).is_some() {
            inner.driver.release_graphics_pipeline(id);
        }
    }

    /// The per-stage resource counts a pipeline was built with (vertex,
    /// fragment). They always equal the counts of the shaders it was created
    /// from.
    pub fn graphics_pipeline_resource_counts(
        &self,
        id: GraphicsPipelineId,
    ) -> Option<(ShaderResourceCounts, ShaderResourceCounts)> {
        self.inner
            .borrow()
            .graphics_pipelines
            .get(&id)
            .map(|r| (r.vertex_counts, r.fragment_counts))
    }

    pub fn create_compute_pipeline(
        &self,
        info: &ComputePipelineCreateInfo,
    ) -> anyhow::Result<ComputePipelineId> {
        let mut inner = self.inner.borrow_mut();
        if inner.debug_mode {
            checker::check_compute_pipeline_create(info, &inner.shaders)
                .map_err(GpuError::report)?;
        }
        let counts = inner
            .shaders
            .get(&info.shader)
            .map(|m| m.counts)
            .ok_or_else(|| GpuError::InvalidArgument("unknown compute shader".into()).report())?;
        let id = ComputePipelineId(inner.alloc_id());
        inner.driver.create_compute_pipeline(id, info)?;
        inner
            .compute_pipelines
            .insert(id, ComputePipelineRecord { counts });
        Ok(id)
    }

    pub fn release_compute_pipeline(&self, id: ComputePipelineId) {
        let mut inner = self.inner.borrow_mut();
        if inner.compute_pipelines.remove(&id).is_some() {
            inner.driver.release_compute_pipeline(id);
        }
    }

    pub fn compute_pipeline_resource_counts(
        &self,
        id: ComputePipelineId,
    ) -> Option<ShaderResourceCounts> {
        self.inner
            .borrow()
            .compute_pipelines
            .get(&id)
            .map(|r| r.counts)
    }

    // swapchain

    pub fn claim_window(
        &self,
        window: &NativeWindow,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> anyhow::Result<WindowId> {
        let mut inner = self.inner.borrow_mut();
        if window.width == 0 || window.height == 0 {
            return Err(GpuError::InvalidArgument("window extent is empty".into()).report());
        }
        let id = WindowId(inner.alloc_id());
        inner
            .driver
            .claim_window(id, window, composition, present_mode)?;
        inner.windows.insert(
            id,
            WindowRecord {
                composition,
                present_mode,
                swapchain_textures: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Returns the window to its pre-claim state; the back-buffer texture
    /// wrappers it handed out become invalid.
    pub fn unclaim_window(&self, id: WindowId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.windows.remove(&id) {
            for texture in record.swapchain_textures {
                inner.textures.remove(&texture);
            }
            inner.driver.unclaim_window(id);
        } else if inner.debug_mode {
            log::error!("unclaim of unknown window {id:?}");
        }
    }

    pub fn window_claimed(&self, id: WindowId) -> bool {
        self.inner.borrow().windows.contains_key(&id)
    }

    pub fn set_swapchain_parameters(
        &self,
        id: WindowId,
        composition: SwapchainComposition,
        present_mode: PresentMode,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.windows.contains_key(&id) {
            return Err(GpuError::InvalidArgument("window is not claimed".into()).report());
        }
        inner
            .driver
            .set_swapchain_parameters(id, composition, present_mode)?;
        let record = inner.windows.get_mut(&id).unwrap();
        record.composition = composition;
        record.present_mode = present_mode;
        Ok(())
    }

    pub fn swapchain_texture_format(&self, id: WindowId) -> anyhow::Result<TextureFormat> {
        let inner = self.inner.borrow();
        if !inner.windows.contains_key(&id) {
            return Err(GpuError::InvalidArgument("window is not claimed".into()).report());
        }
        Ok(inner.driver.swapchain_texture_format(id))
    }

    pub fn supports_present_mode(&self, id: WindowId, mode: PresentMode) -> bool {
        self.inner.borrow().driver.supports_present_mode(id, mode)
    }

    pub fn supports_swapchain_composition(
        &self,
        id: WindowId,
        composition: SwapchainComposition,
    ) -> bool {
        self.inner
            .borrow()
            .driver
            .supports_swapchain_composition(id, composition)
    }

    // command buffers & synchronization

    pub fn acquire_command_buffer(&self) -> anyhow::Result<CommandBuffer> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.recording {
                return Err(GpuError::Validation(
                    "a command buffer is already recording".into(),
                )
                .report());
            }
            inner.driver.acquire_command_buffer()?;
            inner.recording = true;
        }
        Ok(CommandBuffer::new(self.clone()))
    }

    pub fn wait(&self) -> anyhow::Result<()> {
        self.inner.borrow_mut().driver.wait_idle()
    }

    pub fn wait_for_fences(&self, fences: &[Fence], wait_all: bool) -> anyhow::Result<()> {
        let ids: Vec<FenceId> = fences.iter().map(|f| f.0).collect();
        self.inner.borrow_mut().driver.wait_for_fences(&ids, wait_all)
    }

    pub fn query_fence(&self, fence: Fence) -> bool {
        self.inner.borrow_mut().driver.query_fence(fence.0)
    }

    pub fn release_fence(&self, fence: Fence) {
        self.inner.borrow_mut().driver.release_fence(fence.0)
    }
}
