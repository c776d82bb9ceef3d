//! Upload and download round-trips through the null driver's host storage.

use gpu_backend::create_device;
use gpu_types::config::GpuConfig;
use gpu_types::passes::{BufferRegion, TransferBufferLocation};
use gpu_types::resources::{
    BufferCreateInfo, BufferUsage, ShaderFormat, TransferBufferCreateInfo, TransferBufferUsage,
};

#[test]
fn buffer_upload_then_download_returns_the_bytes() {
    let device = create_device(
        &GpuConfig {
            shader_formats: ShaderFormat::SPIRV,
            debug_mode: true,
            ..Default::default()
        },
        &Default::default(),
    )
    .unwrap();

    let upload = device
        .create_transfer_buffer(&TransferBufferCreateInfo {
            usage: TransferBufferUsage::Upload,
            size: 256,
        })
        .unwrap();
    let download = device
        .create_transfer_buffer(&TransferBufferCreateInfo {
            usage: TransferBufferUsage::Download,
            size: 256,
        })
        .unwrap();
    let buffer = device
        .create_buffer(&BufferCreateInfo {
            usage: BufferUsage::VERTEX,
            size: 256,
        })
        .unwrap();

    let payload: Vec<u8> = (0..=255).collect();
    {
        let mut map = device.map_transfer_buffer(upload, false).unwrap();
        map.copy_from_slice(&payload);
    }

    let mut cmd = device.acquire_command_buffer().unwrap();
    cmd.begin_copy_pass().unwrap();
    cmd.upload_to_buffer(
        &TransferBufferLocation {
            transfer_buffer: upload,
            offset: 0,
        },
        &BufferRegion {
            buffer,
            offset: 0,
            size: 256,
        },
        false,
    )
    .unwrap();
    cmd.download_from_buffer(
        &BufferRegion {
            buffer,
            offset: 0,
            size: 256,
        },
        &TransferBufferLocation {
            transfer_buffer: download,
            offset: 0,
        },
    )
    .unwrap();
    cmd.end_copy_pass().unwrap();
    cmd.submit().unwrap();

    let map = device.map_transfer_buffer(download, false).unwrap();
    assert_eq!(&map[..], &payload[..]);
}

#[test]
fn upload_direction_is_enforced() {
    let device = create_device(
        &GpuConfig {
            shader_formats: ShaderFormat::SPIRV,
            debug_mode: true,
            ..Default::default()
        },
        &Default::default(),
    )
    .unwrap();

    let download_only = device
        .create_transfer_buffer(&TransferBufferCreateInfo {
            usage: TransferBufferUsage::Download,
            size: 64,
        })
        .unwrap();
    let buffer = device
        .create_buffer(&BufferCreateInfo {
            usage: BufferUsage::VERTEX,
            size: 64,
        })
        .unwrap();

    let mut cmd = device.acquire_command_buffer().unwrap();
    cmd.begin_copy_pass().unwrap();
    assert!(cmd
        .upload_to_buffer(
            &TransferBufferLocation {
                transfer_buffer: download_only,
                offset: 0,
            },
            &BufferRegion {
                buffer,
                offset: 0,
                size: 64,
            },
            false,
        )
        .is_err());
    cmd.end_copy_pass().unwrap();
    cmd.submit().unwrap();
}
