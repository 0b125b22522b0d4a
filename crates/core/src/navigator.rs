//! Navigation controller.
//!
//! A [`Navigator`] owns one window and everything needed to move it between
//! declared pages: the declarations, the page graph, the detector and the
//! retry budgets. Every loop checks the shared stop flag at its head.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::GrayImage;

use crate::annotation::Annotation;
use crate::config::Declarations;
use crate::coords::{self, Converter, Frame, Reference, WindowGeometry};
use crate::detect::Detector;
use crate::error::{CoordError, NavError};
use crate::geometry::{sample_point, BorderInset, Point, Rect, Size};
use crate::graph::{split_transition_id, NavGraph, PathPlan};
use crate::logger;
use crate::platform::WindowHandle;
use crate::settings::EngineSettings;
use crate::sleep;
use crate::types::Detection;
use crate::vision::{capture_to_gray, ImageMatcher, NccMatcher, TextHit, TextRecognizer};

/// Successful navigation summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavReport {
    pub target: String,
    /// Planning rounds used, the first one included.
    pub attempts: u32,
    pub clicks: u32,
    /// Path walked in the final round.
    pub path: Vec<String>,
}

enum Phase {
    Planning,
    Walking(Vec<String>),
    Recovering,
    Succeeded(Vec<String>),
    Failed(NavError),
}

pub struct Navigator {
    decl: Declarations,
    graph: NavGraph,
    detector: Detector,
    window: Box<dyn WindowHandle>,
    recognizer: Option<Box<dyn TextRecognizer>>,
    settings: EngineSettings,
    desktop: Size,
    border: BorderInset,
    stop: Arc<AtomicBool>,
    clicks: u32,
}

impl Navigator {
    pub fn new(
        decl: Declarations,
        window: Box<dyn WindowHandle>,
        matcher: Box<dyn ImageMatcher>,
        desktop: Size,
        settings: EngineSettings,
    ) -> Result<Self, NavError> {
        logger::register_prefix("nav", logger::COLOR_GREEN);

        let border = match &settings.border_calibration {
            Some(path) => Annotation::load(&decl.base_dir.join(path))?.border()?,
            None => BorderInset::default(),
        };
        let graph = NavGraph::build(&decl.page_transitions);
        let detector = Detector::new(&decl, matcher);
        logger::info_p(
            "nav",
            &format!(
                "{} interrupts, {} pages, {} edges",
                decl.interrupt_states.len(),
                decl.page_states.len(),
                graph.edge_count()
            ),
        );

        Ok(Navigator {
            decl,
            graph,
            detector,
            window,
            recognizer: None,
            settings,
            desktop,
            border,
            stop: Arc::new(AtomicBool::new(false)),
            clicks: 0,
        })
    }

    /// Load a declaration file and match with the built-in NCC matcher.
    pub fn open(
        path: &Path,
        window: Box<dyn WindowHandle>,
        desktop: Size,
        settings: EngineSettings,
    ) -> Result<Self, NavError> {
        let decl = Declarations::load(path, settings.asset_root)?;
        let matcher = NccMatcher::new(settings.match_threshold);
        Navigator::new(decl, window, Box::new(matcher), desktop, settings)
    }

    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn declarations(&self) -> &Declarations {
        &self.decl
    }

    pub fn graph(&self) -> &NavGraph {
        &self.graph
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn border(&self) -> BorderInset {
        self.border
    }

    /// Clicks issued since construction.
    pub fn clicks(&self) -> u32 {
        self.clicks
    }

    pub fn window_mut(&mut self) -> &mut dyn WindowHandle {
        self.window.as_mut()
    }

    fn check_stop(&self) -> Result<(), NavError> {
        if self.stop.load(Ordering::Relaxed) {
            Err(NavError::Stopped)
        } else {
            Ok(())
        }
    }

    fn snapshot(&mut self) -> Result<GrayImage, NavError> {
        let capture = self.window.capture().ok_or(NavError::CaptureFailed)?;
        Ok(capture_to_gray(&capture))
    }

    // --- state ---

    /// One capture and one detection pass, no clearing.
    pub fn get_raw_state(&mut self) -> Result<Option<Detection>, NavError> {
        let shot = self.snapshot()?;
        Ok(self.detector.detect(&shot))
    }

    /// Clear interrupts, then report the page on screen.
    pub fn get_state(&mut self) -> Result<String, NavError> {
        self.clear_interrupts(self.settings.interrupt_attempts)?
            .ok_or(NavError::UnknownState)
    }

    /// Dismiss overlays until a page (or nothing recognizable) remains.
    /// Returns the page seen once clear.
    pub fn clear_interrupts(&mut self, max_attempts: u32) -> Result<Option<String>, NavError> {
        for _ in 0..max_attempts {
            self.check_stop()?;
            match self.get_raw_state()? {
                None => return Ok(None),
                Some(Detection::Page(page)) => return Ok(Some(page)),
                Some(Detection::Interrupt(id)) => self.dismiss(&id)?,
            }
        }
        logger::warn_p("nav", &format!("interrupts persist after {} attempts", max_attempts));
        Err(NavError::InterruptsPersist(max_attempts))
    }

    fn dismiss(&mut self, interrupt: &str) -> Result<(), NavError> {
        let (key, path) = self
            .decl
            .dismissal_for(interrupt)
            .map(|(k, v)| (k.to_string(), self.decl.transition_annotation(v)))
            .ok_or_else(|| NavError::NoDismissal(interrupt.to_string()))?;
        logger::info_p("nav", &format!("[{}] dismiss via {}", interrupt, key));
        self.click_annotation(&path)?;
        sleep::settle(self.settings.dismiss_settle_ms);
        Ok(())
    }

    // --- navigation ---

    pub fn navigate_to(&mut self, target: &str, max_retries: u32) -> Result<NavReport, NavError> {
        let clicks_before = self.clicks;
        let mut budget = max_retries;
        let mut attempts = 0;
        let mut phase = Phase::Planning;

        loop {
            phase = match phase {
                Phase::Planning => {
                    attempts += 1;
                    self.plan(target)
                }
                Phase::Walking(path) => self.walk(path, target)?,
                Phase::Recovering => {
                    if budget == 0 {
                        Phase::Failed(NavError::RetriesExhausted { target: target.to_string(), attempts })
                    } else {
                        budget -= 1;
                        logger::warn_p("nav", &format!("replanning to [{}], {} retries left", target, budget));
                        Phase::Planning
                    }
                }
                Phase::Succeeded(path) => {
                    let clicks = self.clicks - clicks_before;
                    logger::info_p("nav", &format!("at [{}] ({} clicks)", target, clicks));
                    return Ok(NavReport { target: target.to_string(), attempts, clicks, path });
                }
                Phase::Failed(e) => {
                    logger::error_p("nav", &format!("navigate to [{}]: {}", target, e));
                    return Err(e);
                }
            };
        }
    }

    fn plan(&mut self, target: &str) -> Phase {
        if let Err(e) = self.check_stop() {
            return Phase::Failed(e);
        }
        let current = match self.get_state() {
            Ok(s) => s,
            Err(e) => return Phase::Failed(e),
        };
        if current == target {
            return Phase::Succeeded(vec![current]);
        }
        match self.graph.find_path(&current, target) {
            PathPlan::Found(path) => {
                logger::info_p("nav", &format!("path {}", path.join(" -> ")));
                Phase::Walking(path)
            }
            PathPlan::Unreachable | PathPlan::InvalidOrigin => {
                Phase::Failed(NavError::GraphUnreachable { from: current, to: target.to_string() })
            }
        }
    }

    fn walk(&mut self, path: Vec<String>, target: &str) -> Result<Phase, NavError> {
        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            self.check_stop()?;

            match self.get_raw_state()? {
                Some(Detection::Page(seen)) if seen == *from => {}
                Some(Detection::Interrupt(id)) => {
                    logger::warn_p("nav", &format!("interrupt [{}] while at [{}]", id, from));
                    match self.clear_interrupts(self.settings.interrupt_attempts) {
                        Ok(_) => {}
                        Err(e) if e.is_transient() => logger::warn_p("nav", &e.to_string()),
                        Err(e) => return Err(e),
                    }
                    return Ok(Phase::Recovering);
                }
                other => {
                    let seen = other.as_ref().map_or("unknown", Detection::id);
                    logger::warn_p("nav", &format!("expected [{}], saw [{}]", from, seen));
                    return Ok(Phase::Recovering);
                }
            }

            let Some(id) = self.graph.edge(from, to).map(str::to_string) else {
                return Ok(Phase::Recovering);
            };
            let annotation = self.transition_annotation(&id)?;
            match self.attempt_transition(&id, to, &annotation, self.settings.transition_attempts) {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    logger::warn_p("nav", &e.to_string());
                    return Ok(Phase::Recovering);
                }
                Err(e) => return Err(e),
            }
        }

        match self.get_state() {
            Ok(s) if s == target => Ok(Phase::Succeeded(path)),
            Ok(_) | Err(NavError::UnknownState) => Ok(Phase::Recovering),
            Err(e) if e.is_transient() => Ok(Phase::Recovering),
            Err(e) => Err(e),
        }
    }

    // --- transitions ---

    pub fn execute_transition(&mut self, id: &str) -> Result<(), NavError> {
        self.execute(id, self.settings.transition_attempts)
    }

    /// Click a page transition until its target page shows.
    pub fn execute(&mut self, id: &str, attempts: u32) -> Result<(), NavError> {
        let target = split_transition_id(id)
            .map(|(_, to, _)| to.to_string())
            .ok_or_else(|| NavError::UnknownTransition(id.to_string()))?;
        let annotation = self.transition_annotation(id)?;

        match self.get_state() {
            Ok(current) if current == target => {
                logger::info_p("nav", &format!("{}: already at [{}]", id, target));
                return Ok(());
            }
            Ok(_) | Err(NavError::UnknownState) => {}
            Err(e) => return Err(e),
        }
        self.attempt_transition(id, &target, &annotation, attempts)
    }

    fn transition_annotation(&self, id: &str) -> Result<std::path::PathBuf, NavError> {
        self.decl
            .page_transitions
            .get(id)
            .map(|v| self.decl.transition_annotation(v))
            .ok_or_else(|| NavError::UnknownTransition(id.to_string()))
    }

    fn attempt_transition(&mut self, id: &str, target: &str, annotation: &Path, attempts: u32) -> Result<(), NavError> {
        for n in 1..=attempts {
            self.check_stop()?;
            self.click_annotation(annotation)?;
            sleep::settle(self.settings.settle_ms);
            match self.get_state() {
                Ok(now) if now == target => {
                    logger::info_p("nav", &format!("{} -> [{}] (try {})", id, target, n));
                    return Ok(());
                }
                Ok(_) | Err(NavError::UnknownState) => {}
                Err(e) => return Err(e),
            }
        }
        Err(NavError::TransitionTimeout(id.to_string()))
    }

    // --- clicks ---

    fn live_geometry(&mut self) -> Result<WindowGeometry, NavError> {
        self.window.update();
        let region = self.window.region().ok_or(NavError::NoWindowRegion)?;
        Ok(WindowGeometry::new(region, self.border))
    }

    fn click_screen_rect(&mut self, rect: Rect) -> Point {
        let p = sample_point(rect);
        self.window.click_at(p.x, p.y);
        self.clicks += 1;
        p
    }

    /// Click inside the rectangle of an annotation drawn on a reference
    /// screenshot. Returns the screen point clicked.
    pub fn click_annotation(&mut self, path: &Path) -> Result<Point, NavError> {
        let ann = Annotation::load(path)?;
        let rect = ann.rect()?;
        let window = self.live_geometry()?;
        let target = coords::annotation_to_screen(rect, ann.image_size(), self.border, window, self.desktop)?;
        Ok(self.click_screen_rect(target))
    }

    /// Click inside a window-pixel rectangle of the live window.
    pub fn click_window_rect(&mut self, rect: Rect) -> Result<Point, NavError> {
        let window = self.live_geometry()?;
        let conv = Converter::new(&rect.corners(), Frame::WindowPixel, &Reference::Window(window), self.desktop)?;
        let screen = conv
            .rect(Frame::ScreenPixel)
            .ok_or(CoordError::Underivable(Frame::ScreenPixel.name()))?;
        Ok(self.click_screen_rect(screen))
    }

    // --- vision helpers ---

    /// Locate a template on a fresh capture. The rectangle is in capture
    /// pixels.
    pub fn find(&mut self, template: &Path) -> Result<Option<Rect>, NavError> {
        let shot = self.snapshot()?;
        self.detector.locate(&shot, template).map_err(|e| NavError::TemplateUnreadable {
            path: template.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Fractional rectangle of an annotation, scaled about its centre and
    /// clamped to the unit square.
    pub fn limit_scope(&self, annotation: &Path, scale: f64) -> Result<Rect, NavError> {
        let ann = Annotation::load(annotation)?;
        let conv = Converter::new(
            &ann.rect()?.corners(),
            Frame::WindowPixel,
            &Reference::RawPixels(ann.image_size()),
            self.desktop,
        )?;
        let unit = conv
            .rect(Frame::WindowContentPercentage)
            .ok_or(CoordError::Underivable(Frame::WindowContentPercentage.name()))?;
        Ok(unit.normalized().scaled_unit(scale))
    }

    /// Recognize text inside the scope of `annotation` on a fresh capture.
    pub fn read_text(&mut self, annotation: &Path, scale: f64) -> Result<Vec<TextHit>, NavError> {
        if self.recognizer.is_none() {
            return Err(NavError::NoTextRecognizer);
        }
        let scope = self.limit_scope(annotation, scale)?;
        let shot = self.snapshot()?;
        let size = Size::new(shot.width() as f64, shot.height() as f64);
        let conv = Converter::new(&scope.corners(), Frame::WindowContentPercentage, &Reference::RawPixels(size), self.desktop)?;
        let region = conv.rect(Frame::WindowPixel);
        let hits = match &self.recognizer {
            Some(r) => r.recognize(&shot, region),
            None => Vec::new(),
        };
        Ok(hits)
    }
}
