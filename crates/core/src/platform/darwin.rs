use std::process::Command as ProcessCommand;
use std::thread;
use std::time::Duration;

use core_foundation::array::CFArray;
use core_foundation::base::TCFType;
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::display::CGDisplay;
use core_graphics::event::*;
use core_graphics::event_source::*;
use core_graphics::geometry::*;
use core_graphics::window::*;

use super::{Platform, WindowHandle};
use crate::geometry::Size;
use crate::logger;
use crate::types::*;

type WindowInfo = CFDictionary<CFString, *const std::ffi::c_void>;

pub struct DarwinPlatform;

impl DarwinPlatform {
    pub fn new() -> Self {
        DarwinPlatform
    }
}

impl Platform for DarwinPlatform {
    fn screen_size(&self) -> Size {
        let bounds = CGDisplay::main().bounds();
        Size::new(bounds.size.width, bounds.size.height)
    }

    fn get_instances(&self, pattern: &str) -> Vec<(WindowId, String)> {
        let re = match regex::Regex::new(&format!("(?i){}", pattern)) {
            Ok(r) => r,
            Err(e) => {
                logger::error_p("darwin", &format!("invalid pattern '{}': {}", pattern, e));
                return Vec::new();
            }
        };

        let mut windows = Vec::new();
        for_each_window(|info| unsafe {
            let name = get_cf_string(info, "kCGWindowName").unwrap_or_default();
            let owner = get_cf_string(info, "kCGWindowOwnerName").unwrap_or_default();
            let title = if name.is_empty() { &owner } else { &name };
            let matched = !title.is_empty() && (re.is_match(&name) || re.is_match(&owner));
            if !matched || get_cf_number(info, "kCGWindowLayer") != Some(0) {
                return false;
            }
            if let Some(wid) = get_cf_number(info, "kCGWindowNumber") {
                logger::info_p("darwin", &format!("found window: \"{}\" (id: {})", title, wid));
                windows.push((wid as WindowId, title.to_string()));
            }
            false
        });
        windows
    }

    fn create_window(&self, _pattern: &str, window_id: WindowId) -> Box<dyn WindowHandle> {
        let mut win = DarwinWindow {
            window_id: window_id as CGWindowID,
            title: String::new(),
            pid: None,
            region: None,
        };
        win.refresh();
        Box::new(win)
    }
}

/// Walk the on-screen window list until `visit` returns true.
fn for_each_window<F: FnMut(&WindowInfo) -> bool>(mut visit: F) {
    unsafe {
        let option = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;
        let list_ref = CGWindowListCopyWindowInfo(option, kCGNullWindowID);
        if list_ref.is_null() {
            logger::warn_p("darwin", "failed to get window list");
            return;
        }
        let list: CFArray = CFArray::wrap_under_create_rule(list_ref as _);
        for ptr in &list.get_all_values() {
            let info: WindowInfo = CFDictionary::wrap_under_get_rule(*ptr as _);
            if visit(&info) {
                return;
            }
        }
    }
}

struct DarwinWindow {
    window_id: CGWindowID,
    title: String,
    pid: Option<i32>,
    region: Option<Region>,
}

impl DarwinWindow {
    fn refresh(&mut self) {
        let mut found = None;
        for_each_window(|info| unsafe {
            if get_cf_number(info, "kCGWindowNumber") != Some(self.window_id as i64) {
                return false;
            }
            let name = get_cf_string(info, "kCGWindowName").unwrap_or_default();
            let owner = get_cf_string(info, "kCGWindowOwnerName").unwrap_or_default();
            let pid = get_cf_number(info, "kCGWindowOwnerPID").map(|v| v as i32);
            let region = get_cf_dict(info, "kCGWindowBounds").map(|b| {
                Region::from_ltwh(
                    get_cf_number(&b, "X").unwrap_or(0) as i32,
                    get_cf_number(&b, "Y").unwrap_or(0) as i32,
                    get_cf_number(&b, "Width").unwrap_or(0) as i32,
                    get_cf_number(&b, "Height").unwrap_or(0) as i32,
                )
            });
            found = Some((if name.is_empty() { owner } else { name }, pid, region));
            true
        });

        match found {
            Some((title, pid, region)) => {
                self.title = title;
                self.pid = pid;
                self.region = region;
            }
            None => self.region = None,
        }
    }

    fn post_mouse(&self, kind: CGEventType, point: CGPoint, pid: i32) {
        let Ok(source) = CGEventSource::new(CGEventSourceStateID::HIDSystemState) else { return };
        if let Ok(event) = CGEvent::new_mouse_event(source, kind, point, CGMouseButton::Left) {
            event.post_to_pid(pid);
        }
    }
}

impl WindowHandle for DarwinWindow {
    fn id(&self) -> WindowId {
        self.window_id as WindowId
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn region(&self) -> Option<Region> {
        self.region
    }

    fn update(&mut self) {
        self.refresh();
    }

    fn activate(&mut self) {
        if self.pid.is_none() {
            self.refresh();
        }
        let Some(pid) = self.pid else { return };
        let script = format!(
            "tell application \"System Events\" to set frontmost of first process whose unix id is {} to true",
            pid
        );
        ProcessCommand::new("osascript")
            .arg("-e")
            .arg(&script)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .ok();
    }

    fn click_at(&mut self, x: f64, y: f64) {
        if self.pid.is_none() {
            self.refresh();
        }
        let Some(pid) = self.pid else {
            logger::warn_p("darwin", &format!("click ({:.0}, {:.0}) dropped: no owner process", x, y));
            return;
        };
        let point = CGPoint::new(x, y);
        self.post_mouse(CGEventType::LeftMouseDown, point, pid);
        thread::sleep(Duration::from_millis(15));
        self.post_mouse(CGEventType::LeftMouseUp, point, pid);
        thread::sleep(Duration::from_millis(15));
    }

    fn capture(&mut self) -> Option<Capture> {
        self.refresh();
        self.region?;

        let bounds = CGRect::new(&CGPoint::new(0.0, 0.0), &CGSize::new(0.0, 0.0));
        let image_option = kCGWindowImageBoundsIgnoreFraming | kCGWindowImageNominalResolution;
        let image = create_image(bounds, kCGWindowListOptionIncludingWindow, self.window_id, image_option)?;

        let bpr = image.bytes_per_row() as u32;
        let data = image.data();
        Some(Capture {
            data: data.bytes().to_vec(),
            width: bpr / 4,
            height: image.height() as u32,
            bytes_per_row: bpr,
        })
    }
}

// --- CF Dictionary helpers ---

unsafe fn get_cf_string(dict: &WindowInfo, key: &str) -> Option<String> {
    let value = dict.find(&CFString::new(key))?;
    let cf_str: CFString = CFString::wrap_under_get_rule(*value as _);
    Some(cf_str.to_string())
}

unsafe fn get_cf_number(dict: &WindowInfo, key: &str) -> Option<i64> {
    let value = dict.find(&CFString::new(key))?;
    let cf_num: CFNumber = CFNumber::wrap_under_get_rule(*value as _);
    cf_num.to_i64()
}

unsafe fn get_cf_dict(dict: &WindowInfo, key: &str) -> Option<WindowInfo> {
    let value = dict.find(&CFString::new(key))?;
    Some(CFDictionary::wrap_under_get_rule(*value as _))
}
