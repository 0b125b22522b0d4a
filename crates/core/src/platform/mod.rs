pub mod stub;

#[cfg(target_os = "macos")]
pub mod darwin;

use crate::geometry::Size;
use crate::logger;
use crate::types::*;

/// Handle to one OS window: the input and capture primitives the engine
/// drives.
pub trait WindowHandle: Send {
    fn id(&self) -> WindowId;
    fn title(&self) -> &str;
    /// Last known screen region, border included.
    fn region(&self) -> Option<Region>;
    /// Refresh the cached region.
    fn update(&mut self);
    fn activate(&mut self);
    /// Click at absolute desktop pixels.
    fn click_at(&mut self, x: f64, y: f64);
    /// Screenshot of the whole window.
    fn capture(&mut self) -> Option<Capture>;
}

/// Platform-level operations (window enumeration, factory).
pub trait Platform: Send {
    fn screen_size(&self) -> Size;
    fn get_instances(&self, pattern: &str) -> Vec<(WindowId, String)>;
    fn create_window(&self, pattern: &str, window_id: WindowId) -> Box<dyn WindowHandle>;
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Box<dyn Platform> {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform::default());
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        Box::new(darwin::DarwinPlatform::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        Box::new(stub::StubPlatform::default())
    }
}
