//! Labelme-style sidecar annotations.
//!
//! Each reference image `foo.png` may carry a `foo.json` describing one or
//! more shapes drawn on it. Only the first shape is used: it is either a
//! click target, a template crop, or the border calibration rectangle.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AnnotationError;
use crate::geometry::{BorderInset, Point, Rect, Size};

#[derive(Debug, Clone, Deserialize)]
pub struct Shape {
    #[serde(default)]
    pub label: String,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    #[serde(rename = "imageWidth", default)]
    pub image_width: f64,
    #[serde(rename = "imageHeight", default)]
    pub image_height: f64,
    #[serde(default)]
    pub shapes: Vec<Shape>,
    #[serde(skip)]
    pub path: PathBuf,
}

impl Annotation {
    /// Load the sidecar for `path`. An image path or a bare stem is mapped
    /// to its `.json` sibling.
    pub fn load(path: &Path) -> Result<Self, AnnotationError> {
        let json_path = sidecar_path(path);
        let text = std::fs::read_to_string(&json_path)
            .map_err(|source| AnnotationError::Io { path: json_path.clone(), source })?;
        let mut ann: Annotation = serde_json::from_str(&text)
            .map_err(|source| AnnotationError::Json { path: json_path.clone(), source })?;
        ann.path = json_path;
        Ok(ann)
    }

    /// First shape's two corner points as a rectangle (image pixels).
    pub fn rect(&self) -> Result<Rect, AnnotationError> {
        let shape = self
            .shapes
            .first()
            .filter(|s| s.points.len() >= 2)
            .ok_or_else(|| AnnotationError::NoShape(self.path.clone()))?;
        let [x1, y1] = shape.points[0];
        let [x2, y2] = shape.points[1];
        Ok(Rect::from_points(Point::new(x1, y1), Point::new(x2, y2)))
    }

    pub fn image_size(&self) -> Size {
        Size::new(self.image_width, self.image_height)
    }

    /// Treat this annotation as a border calibration.
    pub fn border(&self) -> Result<BorderInset, AnnotationError> {
        Ok(BorderInset::from_calibration(self.rect()?, self.image_size()))
    }
}

pub fn sidecar_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => path.to_path_buf(),
        _ => path.with_extension("json"),
    }
}
