use super::{Platform, WindowHandle};
use crate::geometry::Size;
use crate::logger;
use crate::types::*;

const STUB_DESKTOP: Size = Size { w: 1920.0, h: 1080.0 };

/// Offline platform: a fixed set of fake windows that log every action.
pub struct StubPlatform {
    windows: Vec<(WindowId, String)>,
}

impl Default for StubPlatform {
    fn default() -> Self {
        StubPlatform {
            windows: vec![
                (10001, "Harbor Town".into()),
                (10002, "Harbor Town".into()),
                (20001, "Notepad".into()),
            ],
        }
    }
}

impl Platform for StubPlatform {
    fn screen_size(&self) -> Size {
        STUB_DESKTOP
    }

    fn get_instances(&self, pattern: &str) -> Vec<(WindowId, String)> {
        logger::info_p("stub", &format!("get_instances(\"{}\")", pattern));
        match regex::Regex::new(&format!("(?i){}", pattern)) {
            Ok(re) => self.windows.iter().filter(|(_, t)| re.is_match(t)).cloned().collect(),
            Err(e) => {
                logger::error_p("stub", &format!("invalid pattern '{}': {}", pattern, e));
                Vec::new()
            }
        }
    }

    fn create_window(&self, pattern: &str, window_id: WindowId) -> Box<dyn WindowHandle> {
        logger::info_p("stub", &format!("create_window(\"{}\", {})", pattern, window_id));
        let title = self
            .windows
            .iter()
            .find(|(id, _)| *id == window_id)
            .map(|(_, t)| t.clone())
            .unwrap_or_else(|| format!("Stub-{}", window_id));
        Box::new(StubWindow { window_id, title, region: Region::from_ltwh(100, 80, 960, 640) })
    }
}

struct StubWindow {
    window_id: WindowId,
    title: String,
    region: Region,
}

impl WindowHandle for StubWindow {
    fn id(&self) -> WindowId { self.window_id }
    fn title(&self) -> &str { &self.title }
    fn region(&self) -> Option<Region> { Some(self.region) }

    fn update(&mut self) {}

    fn activate(&mut self) {
        logger::info_p("stub", &format!("win({}).activate()", self.window_id));
    }

    fn click_at(&mut self, x: f64, y: f64) {
        logger::info_p("stub", &format!("win({}).click_at({:.1}, {:.1})", self.window_id, x, y));
    }

    /// A blank frame the size of the window.
    fn capture(&mut self) -> Option<Capture> {
        let (w, h) = (self.region.w as u32, self.region.h as u32);
        Some(Capture { data: vec![0; (w * h * 4) as usize], width: w, height: h, bytes_per_row: w * 4 })
    }
}
