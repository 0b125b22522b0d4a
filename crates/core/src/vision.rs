use std::collections::hash_map::{Entry, HashMap};
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use crate::annotation::{sidecar_path, Annotation};
use crate::geometry::Rect;
use crate::types::Capture;

/// Template matching collaborator.
pub trait ImageMatcher {
    /// Bounding rectangle (haystack pixels) of the best match above the
    /// acceptance threshold, if any.
    fn locate(&self, haystack: &GrayImage, template: &GrayImage) -> Option<Rect>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    pub text: String,
    pub rect: Rect,
}

/// Text recognition collaborator. No engine ships with this crate.
pub trait TextRecognizer {
    fn recognize(&self, image: &GrayImage, region: Option<Rect>) -> Vec<TextHit>;
}

/// Convert a BGRA capture to 8-bit luma.
pub fn capture_to_gray(capture: &Capture) -> GrayImage {
    let mut img = GrayImage::new(capture.width, capture.height);
    for y in 0..capture.height {
        for x in 0..capture.width {
            let idx = (y * capture.bytes_per_row + x * 4) as usize;
            let Some(px) = capture.data.get(idx..idx + 3) else { continue };
            let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
            img.put_pixel(x, y, Luma([((r * 299 + g * 587 + b * 114) / 1000) as u8]));
        }
    }
    img
}

/// Load a reference image as luma. When a sidecar annotation sits next to
/// it, the template is cropped to the annotation's first rectangle.
pub fn load_template(path: &Path) -> Result<GrayImage, image::ImageError> {
    let img = image::open(path)?.to_luma8();
    if !sidecar_path(path).is_file() {
        return Ok(img);
    }
    let Ok(rect) = Annotation::load(path).and_then(|a| a.rect()) else {
        return Ok(img);
    };
    Ok(crop(&img, rect))
}

/// Crop to `rect` (pixels), clamped to the image. An empty intersection
/// leaves the image untouched.
pub fn crop(img: &GrayImage, rect: Rect) -> GrayImage {
    let r = rect.normalized();
    let x1 = (r.p0.x.max(0.0) as u32).min(img.width());
    let y1 = (r.p0.y.max(0.0) as u32).min(img.height());
    let x2 = (r.p1.x.max(0.0) as u32).min(img.width());
    let y2 = (r.p1.y.max(0.0) as u32).min(img.height());
    if x2 <= x1 || y2 <= y1 {
        return img.clone();
    }
    imageops::crop_imm(img, x1, y1, x2 - x1, y2 - y1).to_image()
}

/// Decoded reference images by path. Only pixels are memoized; a file
/// that fails to load is retried on the next lookup.
#[derive(Default)]
pub struct TemplateCache {
    images: HashMap<PathBuf, GrayImage>,
}

impl TemplateCache {
    pub fn get(&mut self, path: &Path) -> Result<&GrayImage, image::ImageError> {
        match self.images.entry(path.to_path_buf()) {
            Entry::Occupied(o) => Ok(o.into_mut()),
            Entry::Vacant(v) => Ok(v.insert(load_template(path)?)),
        }
    }
}

/// Normalized cross-correlation (zero-mean) template matcher.
///
/// Large searches run coarse-to-fine: candidates are found on a downscaled
/// pair and re-scored at full resolution around each candidate.
pub struct NccMatcher {
    pub threshold: f32,
}

impl NccMatcher {
    pub fn new(threshold: f32) -> Self {
        NccMatcher { threshold }
    }
}

impl Default for NccMatcher {
    fn default() -> Self {
        NccMatcher::new(0.8)
    }
}

const COARSE_CANDIDATES: usize = 3;

impl ImageMatcher for NccMatcher {
    fn locate(&self, haystack: &GrayImage, template: &GrayImage) -> Option<Rect> {
        let (tw, th) = template.dimensions();
        let (hw, hh) = haystack.dimensions();
        if tw == 0 || th == 0 || tw > hw || th > hh {
            return None;
        }

        let full = Scorer::new(haystack, template);
        let scale = coarse_scale(tw, th, hw, hh);

        let best = if scale == 1 {
            full.best_in(0, 0, hw - tw, hh - th)
        } else {
            let small_h = imageops::resize(haystack, hw / scale, hh / scale, FilterType::Triangle);
            let small_t = imageops::resize(template, tw / scale, th / scale, FilterType::Triangle);
            let coarse = Scorer::new(&small_h, &small_t);
            let mut candidates = coarse.all_scores();
            candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

            let pad = scale * 2;
            candidates
                .into_iter()
                .take(COARSE_CANDIDATES)
                .filter_map(|(cx, cy, _)| {
                    let (x, y) = (cx * scale, cy * scale);
                    full.best_in(
                        x.saturating_sub(pad),
                        y.saturating_sub(pad),
                        (x + pad).min(hw - tw),
                        (y + pad).min(hh - th),
                    )
                })
                .max_by(|a, b| a.2.total_cmp(&b.2))
        };

        let (x, y, score) = best?;
        if score < self.threshold as f64 {
            return None;
        }
        Some(Rect::new(x as f64, y as f64, (x + tw) as f64, (y + th) as f64))
    }
}

/// Downscale factor keeping the template's short side at 8px or more.
fn coarse_scale(tw: u32, th: u32, hw: u32, hh: u32) -> u32 {
    if (hw as u64) * (hh as u64) < 200 * 200 {
        return 1;
    }
    let mut s = 1;
    while s < 4 && tw.min(th) / (s * 2) >= 8 {
        s *= 2;
    }
    s
}

struct Scorer<'a> {
    haystack: &'a GrayImage,
    tpl: Vec<f64>, // zero-mean template
    tw: u32,
    th: u32,
    tpl_norm: f64,
    tpl_mean: f64,
    sum: Vec<f64>,
    sq: Vec<f64>,
    stride: usize,
}

impl<'a> Scorer<'a> {
    fn new(haystack: &'a GrayImage, template: &GrayImage) -> Self {
        let (tw, th) = template.dimensions();
        let n = (tw * th) as f64;
        let tpl_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
        let tpl: Vec<f64> = template.pixels().map(|p| p[0] as f64 - tpl_mean).collect();
        let tpl_norm = tpl.iter().map(|v| v * v).sum::<f64>();

        // Integral images with a zero row/column
        let (hw, hh) = haystack.dimensions();
        let stride = hw as usize + 1;
        let mut sum = vec![0.0; stride * (hh as usize + 1)];
        let mut sq = vec![0.0; stride * (hh as usize + 1)];
        for y in 0..hh as usize {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..hw as usize {
                let v = haystack.get_pixel(x as u32, y as u32)[0] as f64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }

        Scorer { haystack, tpl, tw, th, tpl_norm, tpl_mean, sum, sq, stride }
    }

    fn window(table: &[f64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> f64 {
        table[(y + h) * stride + x + w] - table[y * stride + x + w] - table[(y + h) * stride + x]
            + table[y * stride + x]
    }

    fn score(&self, x: u32, y: u32) -> f64 {
        let (xs, ys, w, h) = (x as usize, y as usize, self.tw as usize, self.th as usize);
        let n = (w * h) as f64;
        let s = Self::window(&self.sum, self.stride, xs, ys, w, h);
        let s2 = Self::window(&self.sq, self.stride, xs, ys, w, h);
        let var = (s2 - s * s / n).max(0.0);

        if self.tpl_norm < 1e-6 {
            // Flat template: match a flat patch of the same level
            let flat = var < 1e-6 * n;
            return if flat && (s / n - self.tpl_mean).abs() < 1.0 { 1.0 } else { 0.0 };
        }
        if var < 1e-6 {
            return 0.0;
        }

        let mut num = 0.0;
        for j in 0..self.th {
            let row = (j * self.tw) as usize;
            for i in 0..self.tw {
                num += self.haystack.get_pixel(x + i, y + j)[0] as f64 * self.tpl[row + i as usize];
            }
        }
        num / (var * self.tpl_norm).sqrt()
    }

    fn best_in(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> Option<(u32, u32, f64)> {
        let mut best: Option<(u32, u32, f64)> = None;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let s = self.score(x, y);
                if best.map_or(true, |b| s > b.2) {
                    best = Some((x, y, s));
                }
            }
        }
        best
    }

    fn all_scores(&self) -> Vec<(u32, u32, f64)> {
        let (hw, hh) = self.haystack.dimensions();
        let mut out = Vec::new();
        for y in 0..=(hh - self.th) {
            for x in 0..=(hw - self.tw) {
                out.push((x, y, self.score(x, y)));
            }
        }
        out
    }
}
