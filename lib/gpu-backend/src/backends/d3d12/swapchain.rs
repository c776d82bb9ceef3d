//! Per-window swapchain management: a two-buffer flip-discard swapchain, an
//! RTV heap over its back buffers, tearing and color-space selection, and
//! the present chain a command buffer walks at submission.

use anyhow::anyhow;
use gpu_types::passes::{PresentMode, SwapchainComposition};
use gpu_types::resources::TextureId;
use raw_window_handle::RawWindowHandle;
use windows::core::Interface;
use windows::Win32::Foundation::{FALSE, HWND};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;
use windows::Win32::Graphics::Dxgi::*;

use super::conv;

pub const SWAPCHAIN_BUFFER_COUNT: u32 = 2;

#[derive(Debug)]
pub struct BackBuffer {
    pub resource: ID3D12Resource,
    pub texture: TextureId,
    pub rtv: D3D12_CPU_DESCRIPTOR_HANDLE,
}

#[derive(Debug)]
pub struct D3d12Window {
    pub hwnd: HWND,
    pub swapchain: IDXGISwapChain3,
    pub rtv_heap: ID3D12DescriptorHeap,
    pub back_buffers: Vec<BackBuffer>,
    pub frame_counter: u32,
    pub composition: SwapchainComposition,
    pub present_mode: PresentMode,
    pub width: u32,
    pub height: u32,
}

pub fn window_hwnd(raw: RawWindowHandle) -> anyhow::Result<HWND> {
    match raw {
        RawWindowHandle::Win32(handle) => Ok(HWND(handle.hwnd.get() as *mut _)),
        other => Err(anyhow!("window handle kind {other:?} is not usable here")),
    }
}

pub fn supports_tearing(factory: &IDXGIFactory4) -> bool {
    let Ok(factory5) = factory.cast::<IDXGIFactory5>() else {
        return false;
    };
    let mut allow: i32 = 0;
    let ok = unsafe {
        factory5.CheckFeatureSupport(
            DXGI_FEATURE_PRESENT_ALLOW_TEARING,
            &mut allow as *mut _ as *mut _,
            std::mem::size_of::<i32>() as u32,
        )
    };
    ok.is_ok() && allow != 0
}

#[allow(clippy::too_many_arguments)]
pub fn create_window(
    factory: &IDXGIFactory4,
    device: &ID3D12Device,
    queue: &ID3D12CommandQueue,
    hwnd: HWND,
    width: u32,
    height: u32,
    composition: SwapchainComposition,
    present_mode: PresentMode,
    allow_tearing: bool,
    back_buffer_ids: [TextureId; SWAPCHAIN_BUFFER_COUNT as usize],
) -> anyhow::Result<D3d12Window> {
    let mut flags = 0u32;
    if allow_tearing {
        flags |= DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32;
    }
    let desc = DXGI_SWAP_CHAIN_DESC1 {
        Width: width,
        Height: height,
        Format: conv::swapchain_format(composition),
        Stereo: FALSE,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: SWAPCHAIN_BUFFER_COUNT,
        Scaling: DXGI_SCALING_STRETCH,
        SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
        AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
        Flags: flags,
    };

    let swapchain1 = unsafe { factory.CreateSwapChainForHwnd(queue, hwnd, &desc, None, None) }
        .map_err(|err| anyhow!("swapchain creation failed: {err}"))?;
    let swapchain: IDXGISwapChain3 = swapchain1
        .cast()
        .map_err(|err| anyhow!("swapchain interface query failed: {err}"))?;

    // reject compositions whose color space the swapchain cannot present
    let color_space = conv::swapchain_color_space(composition);
    let support = unsafe { swapchain.CheckColorSpaceSupport(color_space) }
        .map_err(|err| anyhow!("color space query failed: {err}"))?;
    if support & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32 == 0 {
        return Err(anyhow!("requested composition is not presentable here"));
    }
    unsafe { swapchain.SetColorSpace1(color_space) }
        .map_err(|err| anyhow!("color space selection failed: {err}"))?;

    // the host window subsystem owns Alt+Enter handling
    unsafe { factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) }
        .map_err(|err| anyhow!("window association failed: {err}"))?;

    let rtv_heap: ID3D12DescriptorHeap = unsafe {
        device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
            Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
            NumDescriptors: SWAPCHAIN_BUFFER_COUNT,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        })
    }
    .map_err(|err| anyhow!("render target heap creation failed: {err}"))?;

    let rtv_size =
        unsafe { device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) };
    let rtv_base = unsafe { rtv_heap.GetCPUDescriptorHandleForHeapStart() };
    let rtv_format = conv::swapchain_rtv_format(composition);

    let mut back_buffers = Vec::with_capacity(SWAPCHAIN_BUFFER_COUNT as usize);
    for index in 0..SWAPCHAIN_BUFFER_COUNT {
        let resource: ID3D12Resource = unsafe { swapchain.GetBuffer(index) }
            .map_err(|err| anyhow!("back buffer query failed: {err}"))?;
        let rtv = D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: rtv_base.ptr + (index * rtv_size) as usize,
        };
        let view_desc = D3D12_RENDER_TARGET_VIEW_DESC {
            Format: rtv_format,
            ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
            ..Default::default()
        };
        unsafe { device.CreateRenderTargetView(&resource, Some(&view_desc), rtv) };
        back_buffers.push(BackBuffer {
            resource,
            texture: back_buffer_ids[index as usize],
            rtv,
        });
    }

    let frame_counter = unsafe { swapchain.GetCurrentBackBufferIndex() };

    Ok(D3d12Window {
        hwnd,
        swapchain,
        rtv_heap,
        back_buffers,
        frame_counter,
        composition,
        present_mode,
        width,
        height,
    })
}

impl D3d12Window {
    /// Presents and rolls the frame counter to the swapchain's new current
    /// back buffer. A failed present is a warning; the back buffer is simply
    /// not re-acquired until the next frame.
    pub fn present(&mut self, allow_tearing: bool) {
        let (interval, flags) = conv::present_flags(self.present_mode, allow_tearing);
        let result = unsafe { self.swapchain.Present(interval, DXGI_PRESENT(flags)) };
        if result.is_err() {
            log::warn!("present failed: 0x{:08x}", result.0);
        }
        self.frame_counter = unsafe { self.swapchain.GetCurrentBackBufferIndex() };
    }

    pub fn current_back_buffer(&self) -> &BackBuffer {
        &self.back_buffers[self.frame_counter as usize]
    }
}
