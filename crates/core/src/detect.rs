use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::config::Declarations;
use crate::geometry::Rect;
use crate::logger;
use crate::types::Detection;
use crate::vision::{ImageMatcher, TemplateCache};

/// Priority-ordered template tests over one screenshot.
///
/// Interrupts are always tested before pages: an overlay makes every page
/// match unreliable.
pub struct Detector {
    interrupts: Vec<(String, PathBuf)>,
    pages: Vec<(String, PathBuf)>,
    matcher: Box<dyn ImageMatcher>,
    templates: TemplateCache,
    /// Unreadable templates, each warned about once until it loads.
    unreadable: HashSet<PathBuf>,
}

impl Detector {
    pub fn new(decl: &Declarations, matcher: Box<dyn ImageMatcher>) -> Self {
        let interrupts = decl
            .interrupt_states
            .iter()
            .map(|(k, v)| (k.to_string(), decl.state_image(v)))
            .collect();
        let pages = decl
            .page_states
            .iter()
            .map(|(k, v)| (k.to_string(), decl.state_image(v)))
            .collect();
        Detector { interrupts, pages, matcher, templates: TemplateCache::default(), unreadable: HashSet::new() }
    }

    pub fn detect(&mut self, screenshot: &GrayImage) -> Option<Detection> {
        if let Some(id) = self.first_match(screenshot, true) {
            return Some(Detection::Interrupt(id));
        }
        self.first_match(screenshot, false).map(Detection::Page)
    }

    /// Match one arbitrary template file against `screenshot`.
    /// Declared templates that failed to load on their last lookup.
    pub fn unreadable(&self) -> impl Iterator<Item = &Path> {
        self.unreadable.iter().map(PathBuf::as_path)
    }

    pub fn locate(&mut self, screenshot: &GrayImage, path: &Path) -> Result<Option<Rect>, image::ImageError> {
        let template = self.templates.get(path)?;
        Ok(self.matcher.locate(screenshot, template))
    }

    fn first_match(&mut self, screenshot: &GrayImage, interrupts: bool) -> Option<String> {
        let list = if interrupts { &self.interrupts } else { &self.pages };
        for (id, path) in list {
            let template = match self.templates.get(path) {
                Ok(t) => {
                    self.unreadable.remove(path);
                    t
                }
                Err(e) => {
                    if self.unreadable.insert(path.clone()) {
                        logger::warn_p("nav", &format!("template for [{}] unavailable ({}): {}", id, path.display(), e));
                    }
                    continue;
                }
            };
            if self.matcher.locate(screenshot, template).is_some() {
                return Some(id.clone());
            }
        }
        None
    }
}
