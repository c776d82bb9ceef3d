//! Command-buffer state-machine coverage against the null driver.

use gpu_backend::create_device;
use gpu_backend_traits::window::NativeWindow;
use gpu_types::config::GpuConfig;
use gpu_types::formats::TextureFormat;
use gpu_types::passes::{Color, ColorTargetInfo, LoadOp, PresentMode, SwapchainComposition};
use gpu_types::resources::{
    ShaderFormat, TextureCreateInfo, TextureType, TextureUsage, TransferBufferCreateInfo,
};

fn debug_device() -> gpu::Gpu {
    create_device(
        &GpuConfig {
            shader_formats: ShaderFormat::SPIRV | ShaderFormat::DXBC,
            debug_mode: true,
            ..Default::default()
        },
        &Default::default(),
    )
    .unwrap()
}

fn color_target(device: &gpu::Gpu) -> gpu_types::resources::TextureId {
    device
        .create_texture(&TextureCreateInfo {
            format: TextureFormat::B8G8R8A8Unorm,
            width: 64,
            height: 64,
            usage: TextureUsage::COLOR_TARGET,
            ..Default::default()
        })
        .unwrap()
}

#[test]
fn pass_nesting_is_rejected() {
    let device = debug_device();
    let target = color_target(&device);
    let mut cmd = device.acquire_command_buffer().unwrap();
    cmd.begin_render_pass(
        &[ColorTargetInfo {
            texture: target,
            load_op: LoadOp::Clear,
            clear_color: Color::new(0.25, 0.5, 0.75, 1.0),
            ..Default::default()
        }],
        None,
    )
    .unwrap();

    // a second pass of any kind must fail and must not flip its flag
    assert!(cmd.begin_compute_pass().is_err());
    assert!(!cmd.compute_pass_active());
    assert!(cmd.begin_copy_pass().is_err());
    assert!(!cmd.copy_pass_active());
    assert!(cmd.render_pass_active());

    cmd.end_render_pass().unwrap();
    assert!(!cmd.render_pass_active());
    cmd.submit().unwrap();
}

#[test]
fn at_most_one_pass_flag_over_a_full_recording() {
    let device = debug_device();
    let target = color_target(&device);
    let mut cmd = device.acquire_command_buffer().unwrap();

    let one_pass_at_most = |cmd: &gpu::CommandBuffer| {
        let active = [
            cmd.render_pass_active(),
            cmd.compute_pass_active(),
            cmd.copy_pass_active(),
        ];
        active.iter().filter(|&&flag| flag).count() <= 1
    };

    assert!(one_pass_at_most(&cmd));
    cmd.begin_copy_pass().unwrap();
    assert!(one_pass_at_most(&cmd));
    cmd.end_copy_pass().unwrap();
    cmd.begin_render_pass(
        &[ColorTargetInfo {
            texture: target,
            ..Default::default()
        }],
        None,
    )
    .unwrap();
    assert!(one_pass_at_most(&cmd));
    cmd.end_render_pass().unwrap();
    cmd.begin_compute_pass().unwrap();
    assert!(one_pass_at_most(&cmd));
    cmd.end_compute_pass().unwrap();
    cmd.submit().unwrap();
}

#[test]
fn submitted_buffer_is_inert() {
    let device = debug_device();
    let target = color_target(&device);
    let mut cmd = device.acquire_command_buffer().unwrap();
    cmd.submit().unwrap();
    assert!(cmd.submitted());

    assert!(cmd
        .begin_render_pass(
            &[ColorTargetInfo {
                texture: target,
                ..Default::default()
            }],
            None,
        )
        .is_err());
    assert!(!cmd.render_pass_active());
    assert!(cmd.begin_compute_pass().is_err());
    assert!(cmd.begin_copy_pass().is_err());
    assert!(cmd.draw_primitives(3, 1, 0, 0).is_err());
    assert!(cmd.insert_debug_label("late").is_err());
}

#[test]
fn passes_must_match_on_end() {
    let device = debug_device();
    let mut cmd = device.acquire_command_buffer().unwrap();
    assert!(cmd.end_render_pass().is_err());
    cmd.begin_copy_pass().unwrap();
    assert!(cmd.end_render_pass().is_err());
    assert!(cmd.end_compute_pass().is_err());
    cmd.end_copy_pass().unwrap();
    cmd.submit().unwrap();
}

#[test]
fn draws_require_a_bound_pipeline() {
    let device = debug_device();
    let target = color_target(&device);
    let mut cmd = device.acquire_command_buffer().unwrap();
    cmd.begin_render_pass(
        &[ColorTargetInfo {
            texture: target,
            ..Default::default()
        }],
        None,
    )
    .unwrap();
    assert!(cmd.draw_primitives(3, 1, 0, 0).is_err());
    assert!(cmd.push_vertex_uniform_data(0, &[0u8; 16]).is_err());
    cmd.end_render_pass().unwrap();
    cmd.submit().unwrap();
}

#[test]
fn submit_inside_a_pass_is_rejected() {
    let device = debug_device();
    let mut cmd = device.acquire_command_buffer().unwrap();
    cmd.begin_copy_pass().unwrap();
    assert!(cmd.submit().is_err());
    cmd.end_copy_pass().unwrap();
    cmd.submit().unwrap();
}

#[test]
fn cube_textures_must_be_square() {
    let device = debug_device();
    let err = device
        .create_texture(&TextureCreateInfo {
            ty: TextureType::Cube,
            width: 256,
            height: 128,
            layer_count: 6,
            usage: TextureUsage::SAMPLER,
            ..Default::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("width and height must be identical"));
}

#[test]
fn claim_then_unclaim_restores_window_state() {
    let device = debug_device();
    let window = device
        .claim_window(
            &NativeWindow::headless(640, 480),
            SwapchainComposition::Sdr,
            PresentMode::Vsync,
        )
        .unwrap();
    assert!(device.window_claimed(window));
    assert_eq!(
        device.swapchain_texture_format(window).unwrap(),
        TextureFormat::B8G8R8A8Unorm
    );
    device.unclaim_window(window);
    assert!(!device.window_claimed(window));
    assert!(device.swapchain_texture_format(window).is_err());
}

#[test]
fn frame_counter_toggles_between_two_back_buffers() {
    let device = debug_device();
    let window = device
        .claim_window(
            &NativeWindow::headless(640, 480),
            SwapchainComposition::Sdr,
            PresentMode::Vsync,
        )
        .unwrap();

    let mut cmd = device.acquire_command_buffer().unwrap();
    let first = cmd.acquire_swapchain_texture(window).unwrap();
    cmd.submit().unwrap();

    let mut cmd = device.acquire_command_buffer().unwrap();
    let second = cmd.acquire_swapchain_texture(window).unwrap();
    cmd.submit().unwrap();

    let mut cmd = device.acquire_command_buffer().unwrap();
    let third = cmd.acquire_swapchain_texture(window).unwrap();
    cmd.submit().unwrap();

    assert_ne!(first.texture, second.texture);
    assert_eq!(first.texture, third.texture);
    assert_eq!((first.width, first.height), (640, 480));
    device.unclaim_window(window);
}

#[test]
fn only_one_recorder_at_a_time() {
    let device = debug_device();
    let cmd = device.acquire_command_buffer().unwrap();
    assert!(device.acquire_command_buffer().is_err());
    drop(cmd);
    // a discarded recorder frees the slot
    let mut cmd = device.acquire_command_buffer().unwrap();
    cmd.submit().unwrap();
}

#[test]
fn pipelines_carry_their_shaders_resource_counts() {
    use gpu_types::resources::{
        GraphicsPipelineCreateInfo, ShaderCreateInfo, ShaderResourceCounts, ShaderStage,
    };
    use gpu_types::state::{ColorTargetDescription, GraphicsPipelineTargetInfo};

    let device = debug_device();
    let vertex_counts = ShaderResourceCounts {
        uniform_buffer_count: 2,
        ..Default::default()
    };
    let fragment_counts = ShaderResourceCounts {
        sampler_count: 1,
        uniform_buffer_count: 1,
        ..Default::default()
    };
    let vertex = device
        .create_shader(&ShaderCreateInfo {
            source: vec![0x42],
            entry_point: "main".into(),
            format: ShaderFormat::SPIRV,
            stage: ShaderStage::Vertex,
            counts: vertex_counts,
        })
        .unwrap();
    let fragment = device
        .create_shader(&ShaderCreateInfo {
            source: vec![0x42],
            entry_point: "main".into(),
            format: ShaderFormat::SPIRV,
            stage: ShaderStage::Fragment,
            counts: fragment_counts,
        })
        .unwrap();
    let pipeline = device
        .create_graphics_pipeline(&GraphicsPipelineCreateInfo {
            vertex_shader: vertex,
            fragment_shader: fragment,
            target_info: GraphicsPipelineTargetInfo {
                color_targets: vec![ColorTargetDescription {
                    format: TextureFormat::B8G8R8A8Unorm,
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

    let (vertex_out, fragment_out) = device.graphics_pipeline_resource_counts(pipeline).unwrap();
    assert_eq!(vertex_out, vertex_counts);
    assert_eq!(fragment_out, fragment_counts);
}

#[test]
fn mapping_is_exclusive() {
    let device = debug_device();
    let transfer = device
        .create_transfer_buffer(&TransferBufferCreateInfo {
            size: 128,
            ..Default::default()
        })
        .unwrap();
    let map = device.map_transfer_buffer(transfer, false).unwrap();
    assert_eq!(map.len(), 128);
    assert!(device.map_transfer_buffer(transfer, false).is_err());
    drop(map);
    assert!(device.map_transfer_buffer(transfer, false).is_ok());
}
