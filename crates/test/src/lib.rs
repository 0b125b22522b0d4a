//! Synthetic application used by the end-to-end scenarios.
//!
//! [`Fixture`] writes a declaration file plus reference screenshots and
//! annotations into a directory. [`SimApp`] plays the application those
//! files describe: it renders the same screens into BGRA captures and
//! follows clicks that land on a declared button, so the whole
//! navigator stack (NCC matching, border calibration, coordinate
//! mapping) runs against real files.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use image::{imageops, GrayImage, Luma};

use waypoint_core::geometry::{Point, Rect};
use waypoint_core::platform::WindowHandle;
use waypoint_core::types::{Capture, Region, WindowId};

/// Reference screenshot size.
pub const WIDTH: u32 = 96;
pub const HEIGHT: u32 = 64;

/// Content area of the reference screenshot; everything else is border.
pub const CONTENT: Rect = Rect { p0: Point { x: 4.0, y: 6.0 }, p1: Point { x: 92.0, y: 60.0 } };

const BACKGROUND: u8 = 128;
const BADGE: (u32, u32, u32) = (8, 8, 16);
const DIALOG_AT: (u32, u32) = (60, 40);
const DIALOG_SIZE: (u32, u32) = (24, 16);
const DIALOG_SEED: u32 = 0x00d1_a106;

pub const DIALOG: &str = "dialog";

/// Deterministic noise patch. Distinct seeds give uncorrelated patches.
pub fn texture(seed: u32, w: u32, h: u32) -> GrayImage {
    let mut s = seed.wrapping_mul(2_654_435_761).max(1);
    GrayImage::from_fn(w, h, |_, _| {
        s ^= s << 13;
        s ^= s >> 17;
        s ^= s << 5;
        Luma([(s >> 24) as u8])
    })
}

fn seed_of(name: &str) -> u32 {
    name.bytes().fold(2_166_136_261u32, |h, b| (h ^ b as u32).wrapping_mul(16_777_619))
}

/// Screen of `page`, optionally covered by the dialog.
pub fn render(page: &str, dialog: bool) -> GrayImage {
    let mut img = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([BACKGROUND]));
    let (x, y, side) = BADGE;
    imageops::replace(&mut img, &texture(seed_of(page), side, side), x as i64, y as i64);
    if dialog {
        let (dw, dh) = DIALOG_SIZE;
        imageops::replace(&mut img, &texture(DIALOG_SEED, dw, dh), DIALOG_AT.0 as i64, DIALOG_AT.1 as i64);
    }
    img
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Button on the reference screenshot (pixels).
    pub button: Rect,
}

impl Edge {
    pub fn id(&self) -> String {
        format!("{}_{}_01", self.from, self.to)
    }
}

/// Pages, transitions and the dialog of one synthetic application.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub pages: Vec<String>,
    pub edges: Vec<Edge>,
    pub close: Rect,
}

impl Fixture {
    pub fn new(pages: &[&str], edges: &[(&str, &str)]) -> Self {
        let edges = edges
            .iter()
            .enumerate()
            .map(|(i, (from, to))| {
                let x = 6.0 + (i % 6) as f64 * 14.0;
                let y = 28.0 + (i / 6) as f64 * 10.0;
                Edge { from: from.to_string(), to: to.to_string(), button: Rect::new(x, y, x + 10.0, y + 8.0) }
            })
            .collect();
        Fixture {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            edges,
            close: Rect::new(62.0, 50.0, 80.0, 58.0),
        }
    }

    /// Write every file the declarations reference and return the path of
    /// the declaration file. The border calibration lands in `frame.json`.
    pub fn write(&self, dir: &Path) -> io::Result<PathBuf> {
        let screens = dir.join("screens");
        let changes = dir.join("changes");
        fs::create_dir_all(&screens)?;
        fs::create_dir_all(&changes)?;

        let (bx, by, side) = BADGE;
        let badge = Rect::new(bx as f64, by as f64, (bx + side) as f64, (by + side) as f64);
        for page in &self.pages {
            save_png(&render(page, false), &screens.join(format!("{}.png", page)))?;
            write_annotation(&screens.join(format!("{}.json", page)), "badge", badge)?;
        }

        let first = self.pages.first().map_or("blank", String::as_str);
        save_png(&render(first, true), &screens.join(format!("{}.png", DIALOG)))?;
        let (dw, dh) = DIALOG_SIZE;
        let (dx, dy) = (DIALOG_AT.0 as f64, DIALOG_AT.1 as f64);
        write_annotation(&screens.join(format!("{}.json", DIALOG)), "dialog", Rect::new(dx, dy, dx + dw as f64, dy + dh as f64))?;
        write_annotation(&changes.join(format!("{}_close.json", DIALOG)), "close", self.close)?;

        for edge in &self.edges {
            write_annotation(&changes.join(format!("{}.json", edge.id())), &edge.id(), edge.button)?;
        }
        write_annotation(&dir.join("frame.json"), "content", CONTENT)?;

        let mut text = String::from("# interrupt-states\n");
        text.push_str(&format!("{0} = \"screens/{0}\"\n", DIALOG));
        text.push_str("\n# interrupt-dismissals\n");
        text.push_str(&format!("{0}_close = \"changes/{0}_close\"\n", DIALOG));
        text.push_str("\n# page-states\n");
        for page in &self.pages {
            text.push_str(&format!("{0} = \"screens/{0}\"\n", page));
        }
        text.push_str("\n# page-transitions\n");
        for edge in &self.edges {
            text.push_str(&format!("{0} = \"changes/{0}\"\n", edge.id()));
        }

        let path = dir.join("states.txt");
        fs::write(&path, text)?;
        Ok(path)
    }
}

fn save_png(img: &GrayImage, path: &Path) -> io::Result<()> {
    img.save(path).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

fn write_annotation(path: &Path, label: &str, rect: Rect) -> io::Result<()> {
    let json = format!(
        r#"{{"imageWidth": {}, "imageHeight": {}, "shapes": [{{"label": "{}", "points": [[{}, {}], [{}, {}]]}}]}}"#,
        WIDTH, HEIGHT, label, rect.p0.x, rect.p0.y, rect.p1.x, rect.p1.y
    );
    fs::write(path, json)
}

/// Live state of the simulated application.
#[derive(Debug)]
pub struct SimApp {
    pub fixture: Fixture,
    pub page: String,
    pub dialog: bool,
    /// Window on the desktop, border included.
    pub region: Region,
    /// Clicks received, in screen pixels.
    pub clicks: Vec<Point>,
    /// Clicks that hit no active button.
    pub misses: u32,
    /// Raise the dialog right after this many clicks.
    pub dialog_after: Option<usize>,
    /// Transition ids whose buttons do nothing.
    pub dead: HashSet<String>,
    pub captures: u32,
}

impl SimApp {
    pub fn new(fixture: Fixture, page: &str, region: Region) -> Self {
        SimApp {
            fixture,
            page: page.to_string(),
            dialog: false,
            region,
            clicks: Vec::new(),
            misses: 0,
            dialog_after: None,
            dead: HashSet::new(),
            captures: 0,
        }
    }

    /// Screen point back onto the reference screenshot.
    fn to_reference(&self, p: Point) -> Point {
        let r = &self.region;
        let (left, top) = (CONTENT.p0.x, CONTENT.p0.y);
        let right = WIDTH as f64 - CONTENT.p1.x;
        let bottom = HEIGHT as f64 - CONTENT.p1.y;
        let fx = (p.x - r.l as f64 - left) / (r.w as f64 - left - right);
        let fy = (p.y - r.t as f64 - top) / (r.h as f64 - top - bottom);
        Point::new(left + fx * CONTENT.width(), top + fy * CONTENT.height())
    }

    fn click(&mut self, p: Point) {
        self.clicks.push(p);
        let at = self.to_reference(p);

        let hit = if self.dialog {
            let closed = inside(self.fixture.close, at);
            if closed {
                self.dialog = false;
            }
            closed
        } else {
            let next = self
                .fixture
                .edges
                .iter()
                .find(|e| e.from == self.page && inside(e.button, at))
                .map(|e| (e.id(), e.to.clone()));
            match next {
                Some((id, _)) if self.dead.contains(&id) => true,
                Some((_, to)) => {
                    self.page = to;
                    true
                }
                None => false,
            }
        };
        if !hit {
            self.misses += 1;
        }
        if self.dialog_after == Some(self.clicks.len()) {
            self.dialog = true;
        }
    }

    fn capture(&mut self) -> Capture {
        self.captures += 1;
        let gray = render(&self.page, self.dialog);
        let data = gray.pixels().flat_map(|p| [p[0], p[0], p[0], 255]).collect();
        Capture { data, width: WIDTH, height: HEIGHT, bytes_per_row: WIDTH * 4 }
    }
}

fn inside(rect: Rect, p: Point) -> bool {
    const EPS: f64 = 1e-6;
    let r = rect.normalized();
    p.x >= r.p0.x - EPS && p.x <= r.p1.x + EPS && p.y >= r.p0.y - EPS && p.y <= r.p1.y + EPS
}

pub type Shared = Arc<Mutex<SimApp>>;

pub fn lock(app: &Shared) -> MutexGuard<'_, SimApp> {
    app.lock().unwrap_or_else(|p| p.into_inner())
}

/// Window handle onto a shared [`SimApp`].
pub struct SimWindow {
    app: Shared,
    title: String,
}

impl SimWindow {
    pub fn new(app: Shared) -> Self {
        SimWindow { app, title: "Sim".to_string() }
    }
}

impl WindowHandle for SimWindow {
    fn id(&self) -> WindowId {
        1
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn region(&self) -> Option<Region> {
        Some(lock(&self.app).region)
    }

    fn update(&mut self) {}

    fn activate(&mut self) {}

    fn click_at(&mut self, x: f64, y: f64) {
        lock(&self.app).click(Point::new(x, y));
    }

    fn capture(&mut self) -> Option<Capture> {
        Some(lock(&self.app).capture())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textures_differ_by_seed() {
        assert_eq!(texture(7, 8, 8), texture(7, 8, 8));
        assert_ne!(texture(7, 8, 8), texture(8, 8, 8));
    }

    #[test]
    fn test_click_maps_back_through_border() {
        let fixture = Fixture::new(&["home", "map"], &[("home", "map")]);
        let mut app = SimApp::new(fixture, "home", Region::from_ltwh(200, 100, 192, 128));
        // Centre of the home->map button: reference (11, 32)
        let fx = (11.0 - 4.0) / 88.0;
        let fy = (32.0 - 6.0) / 54.0;
        app.click(Point::new(204.0 + fx * 184.0, 106.0 + fy * 118.0));
        assert_eq!(app.page, "map");
        assert_eq!(app.misses, 0);
    }
}
