//! End-to-end renderer scenarios over the headless driver.

use gpu_backend::create_device;
use gpu_backend_traits::window::NativeWindow;
use gpu_types::config::GpuConfig;
use gpu_types::passes::{Color, PresentMode, SwapchainComposition};
use gpu_types::resources::ShaderFormat;
use render_2d::{
    Blend2d, Renderer2d, ScaleMode2d, ShaderBlob, ShaderBundle2d, TextureAddressMode2d, Vertex2d,
};

fn test_bundle() -> ShaderBundle2d {
    let blob = |name: &str| render_2d::shaders::ShaderVariants {
        blobs: vec![ShaderBlob {
            format: ShaderFormat::SPIRV,
            bytes: name.as_bytes().to_vec(),
            entry_point: "main".into(),
        }],
    };
    ShaderBundle2d {
        line_point_vertex: blob("line_point.vert"),
        triangle_color_vertex: blob("triangle_color.vert"),
        triangle_texture_vertex: blob("triangle_texture.vert"),
        color_fragment: blob("color.frag"),
        texture_fragment: blob("texture.frag"),
    }
}

fn renderer() -> Renderer2d {
    let device = create_device(
        &GpuConfig {
            shader_formats: ShaderFormat::SPIRV,
            debug_mode: true,
            ..Default::default()
        },
        &Default::default(),
    )
    .unwrap();
    Renderer2d::new(
        device,
        &NativeWindow::headless(640, 480),
        SwapchainComposition::Sdr,
        PresentMode::Vsync,
        &test_bundle(),
    )
    .unwrap()
}

#[test]
fn clear_only_frames_toggle_back_buffers() {
    let mut renderer = renderer();
    let first = renderer.current_swapchain_texture().unwrap();

    renderer.clear(Color::new(0.25, 0.5, 0.75, 1.0));
    let stats = renderer.present().unwrap();
    assert_eq!(stats.draw_calls, 0);

    let second = renderer.current_swapchain_texture().unwrap();
    assert_ne!(first, second);

    renderer.clear(Color::new(0.25, 0.5, 0.75, 1.0));
    renderer.present().unwrap();
    let third = renderer.current_swapchain_texture().unwrap();
    assert_eq!(first, third);

    // steady state keeps exactly one fence outstanding
    assert!(renderer.outstanding_fence().is_some());
}

#[test]
fn triangle_draw_creates_one_pipeline() {
    let mut renderer = renderer();
    assert_eq!(renderer.pipeline_cache_len(), 0);

    let red = [1.0, 0.0, 0.0, 1.0];
    let triangle = [
        Vertex2d::with_pos_color(0.0, 0.0, red),
        Vertex2d::with_pos_color(10.0, 0.0, red),
        Vertex2d::with_pos_color(0.0, 10.0, red),
    ];
    renderer
        .geometry(
            None,
            &triangle,
            Blend2d::None,
            ScaleMode2d::Nearest,
            TextureAddressMode2d::Clamp,
        )
        .unwrap();
    let stats = renderer.present().unwrap();

    assert_eq!(renderer.pipeline_cache_len(), 1);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.drawn_vertices, 3);
    assert_eq!(
        stats.uploaded_vertex_bytes,
        (3 * std::mem::size_of::<Vertex2d>()) as u64
    );
}

#[test]
fn adjacent_point_draws_coalesce_into_one() {
    let mut renderer = renderer();
    for i in 0..50 {
        renderer
            .draw_points(&[(i as f32, i as f32)], Blend2d::None)
            .unwrap();
    }
    let stats = renderer.present().unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.drawn_vertices, 50);
    assert_eq!(stats.coalesced_commands, 49);
}

#[test]
fn joined_line_runs_do_not_coalesce() {
    let mut renderer = renderer();
    // two 2-point segments merge; a joined 3-point run stays alone
    renderer
        .draw_lines(&[(0.0, 0.0), (1.0, 1.0)], Blend2d::None)
        .unwrap();
    renderer
        .draw_lines(&[(2.0, 2.0), (3.0, 3.0)], Blend2d::None)
        .unwrap();
    renderer
        .draw_lines(&[(4.0, 4.0), (5.0, 5.0), (6.0, 6.0)], Blend2d::None)
        .unwrap();
    let stats = renderer.present().unwrap();
    assert_eq!(stats.draw_calls, 2);
    // the joined run expands to a 4-vertex line list
    assert_eq!(stats.drawn_vertices, 4 + 4);
}

#[test]
fn blend_change_splits_the_batch() {
    let mut renderer = renderer();
    renderer.draw_points(&[(0.0, 0.0)], Blend2d::None).unwrap();
    renderer.draw_points(&[(1.0, 1.0)], Blend2d::Alpha).unwrap();
    let stats = renderer.present().unwrap();
    assert_eq!(stats.draw_calls, 2);
}

#[test]
fn pipeline_cache_returns_the_same_pipeline_per_key() {
    let mut renderer = renderer();
    let white = [1.0; 4];
    let triangle = [
        Vertex2d::with_pos_color(0.0, 0.0, white),
        Vertex2d::with_pos_color(1.0, 0.0, white),
        Vertex2d::with_pos_color(0.0, 1.0, white),
    ];
    for _ in 0..3 {
        renderer
            .geometry(
                None,
                &triangle,
                Blend2d::Alpha,
                ScaleMode2d::Nearest,
                TextureAddressMode2d::Clamp,
            )
            .unwrap();
        renderer.present().unwrap();
    }
    assert_eq!(renderer.pipeline_cache_len(), 1);
}

#[test]
fn sampler_table_is_stable_across_frames() {
    let mut renderer = renderer();
    let sampler = renderer.sampler(ScaleMode2d::Linear, TextureAddressMode2d::Wrap);
    renderer.clear(Color::default());
    renderer.present().unwrap();
    renderer.present().unwrap();
    assert_eq!(
        renderer.sampler(ScaleMode2d::Linear, TextureAddressMode2d::Wrap),
        sampler
    );
    assert_ne!(
        renderer.sampler(ScaleMode2d::Nearest, TextureAddressMode2d::Wrap),
        sampler
    );
}

#[test]
fn fence_rotation_keeps_one_outstanding() {
    let mut renderer = renderer();
    renderer.clear(Color::default());
    renderer.present().unwrap();
    let first = renderer.outstanding_fence().unwrap();

    renderer.clear(Color::default());
    renderer.present().unwrap();
    let second = renderer.outstanding_fence().unwrap();
    assert_ne!(first, second);
    // the first fence was waited on and released during the second present
    assert!(!renderer.device().query_fence(first));

    renderer.clear(Color::default());
    renderer.present().unwrap();
    let third = renderer.outstanding_fence().unwrap();
    assert_ne!(second, third);
    assert!(!renderer.device().query_fence(second));
}

#[test]
fn textured_and_untextured_geometry_use_distinct_pipelines() {
    let mut renderer = renderer();
    let texture = renderer
        .create_texture(4, 4, gpu_types::formats::TextureFormat::R8G8B8A8Unorm, false)
        .unwrap();
    let white = [1.0; 4];
    let triangle = [
        Vertex2d::with_pos_color(0.0, 0.0, white),
        Vertex2d::with_pos_color(1.0, 0.0, white),
        Vertex2d::with_pos_color(0.0, 1.0, white),
    ];
    renderer
        .geometry(
            None,
            &triangle,
            Blend2d::Alpha,
            ScaleMode2d::Nearest,
            TextureAddressMode2d::Clamp,
        )
        .unwrap();
    renderer
        .geometry(
            Some(&texture),
            &triangle,
            Blend2d::Alpha,
            ScaleMode2d::Nearest,
            TextureAddressMode2d::Clamp,
        )
        .unwrap();
    let stats = renderer.present().unwrap();
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(renderer.pipeline_cache_len(), 2);
}

#[test]
fn texture_update_respects_pitch() {
    let mut renderer = renderer();
    let texture = renderer
        .create_texture(2, 2, gpu_types::formats::TextureFormat::R8G8B8A8Unorm, false)
        .unwrap();
    // rows padded to 12 bytes, pixels are 4 bytes
    let pixels = [
        1u8, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, //
        9, 10, 11, 12, 13, 14, 15, 16, 0, 0, 0, 0,
    ];
    renderer
        .update_texture(
            &texture,
            render_2d::commands::Rect2d {
                x: 0,
                y: 0,
                width: 2,
                height: 2,
            },
            &pixels,
            12,
        )
        .unwrap();
    renderer.clear(Color::default());
    renderer.present().unwrap();
}
