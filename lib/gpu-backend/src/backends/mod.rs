#[cfg(windows)]
pub mod d3d12;
pub mod null;

use anyhow::anyhow;
use gpu::Gpu;
use gpu_backend_traits::traits::DriverDescriptor;
use gpu_backend_traits::window::DisplayRequirements;
use gpu_types::config::GpuConfig;

/// All compiled-in drivers, in priority order.
pub fn available_drivers() -> Vec<DriverDescriptor> {
    let mut drivers = Vec::new();
    #[cfg(windows)]
    drivers.push(d3d12::driver_descriptor());
    drivers.push(null::driver_descriptor());
    drivers
}

/// Selects the first driver that matches the forced name (when given),
/// overlaps the requested shader formats, and probes successfully, then
/// wraps it in a front-end device.
pub fn create_device(config: &GpuConfig, display: &DisplayRequirements) -> anyhow::Result<Gpu> {
    for descriptor in available_drivers() {
        match &config.driver_name {
            Some(name) => {
                if !name.eq_ignore_ascii_case(descriptor.name) {
                    continue;
                }
            }
            None => {
                if !descriptor.selectable_by_default {
                    continue;
                }
            }
        }
        if !descriptor.shader_formats.intersects(config.shader_formats) {
            log::debug!(
                "driver {} supports none of the requested shader formats",
                descriptor.name
            );
            continue;
        }
        if !(descriptor.prepare)(display) {
            log::debug!("driver {} failed its environment probe", descriptor.name);
            continue;
        }
        match (descriptor.create)(config) {
            Ok(driver) => {
                return Ok(Gpu::new(
                    driver,
                    descriptor.kind,
                    descriptor.shader_formats & config.shader_formats,
                    config.debug_mode,
                ));
            }
            Err(err) => {
                log::warn!("driver {} failed to initialize: {err}", descriptor.name);
            }
        }
    }
    Err(anyhow!("no suitable gpu driver found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_types::config::GpuDriverKind;
    use gpu_types::resources::ShaderFormat;

    fn config(formats: ShaderFormat) -> GpuConfig {
        GpuConfig {
            shader_formats: formats,
            debug_mode: true,
            ..Default::default()
        }
    }

    #[test]
    fn no_requested_formats_selects_nothing() {
        let res = create_device(&config(ShaderFormat::empty()), &Default::default());
        assert!(res.is_err());
    }

    #[test]
    fn null_driver_is_the_default_fallback() {
        let device = create_device(&config(ShaderFormat::SPIRV), &Default::default()).unwrap();
        assert_eq!(device.driver(), GpuDriverKind::Null);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let mut cfg = config(ShaderFormat::SPIRV);
        cfg.driver_name = Some("direct3d9".into());
        assert!(create_device(&cfg, &Default::default()).is_err());
    }

    #[test]
    fn forced_name_is_case_insensitive() {
        let mut cfg = config(ShaderFormat::SPIRV);
        cfg.driver_name = Some("NULL".into());
        let device = create_device(&cfg, &Default::default()).unwrap();
        assert_eq!(device.driver(), GpuDriverKind::Null);
    }
}
