use raw_window_handle::RawWindowHandle;

/// The window-properties bag the host video subsystem hands over when a
/// window is claimed. The raw handle is absent for headless hosts; back-ends
/// that need one reject the claim instead of probing the host themselves.
#[derive(Debug, Clone)]
pub struct NativeWindow {
    pub raw: Option<RawWindowHandle>,
    pub width: u32,
    pub height: u32,
}

impl NativeWindow {
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            raw: None,
            width,
            height,
        }
    }
}

/// What the runtime environment offers to a driver probe.
#[derive(Debug, Default, Clone)]
pub struct DisplayRequirements {
    pub headless: bool,
}
