use std::path::PathBuf;

use thiserror::Error;

/// Coordinate-frame violations. Never clamped, always surfaced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordError {
    #[error("percentage coordinate [{x}, {y}] is outside [0, 1]")]
    InvalidCoordinate { x: f64, y: f64 },

    #[error("screen point [{x}, {y}] is outside the window")]
    OutOfWindowBounds { x: f64, y: f64 },

    #[error("window point [{x}, {y}] lies in the border, not the content area")]
    InBorderRegion { x: f64, y: f64 },

    #[error("cannot derive {0} from the reference image")]
    Underivable(&'static str),

    #[error("cannot read image size of {path}: {reason}")]
    ImageUnreadable { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("cannot read annotation {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed annotation {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("annotation {0} has no rectangle shape")]
    NoShape(PathBuf),
}

#[derive(Error, Debug)]
pub enum NavError {
    #[error("cannot read state declarations {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no recognizable state on screen")]
    UnknownState,

    #[error("no path from [{from}] to [{to}]")]
    GraphUnreachable { from: String, to: String },

    #[error("transition {0} did not reach its target state")]
    TransitionTimeout(String),

    #[error("unknown transition: {0}")]
    UnknownTransition(String),

    #[error("no dismissal configured for interrupt [{0}]")]
    NoDismissal(String),

    #[error("interrupts still present after {0} attempts")]
    InterruptsPersist(u32),

    #[error("navigation to [{target}] failed after {attempts} attempts")]
    RetriesExhausted { target: String, attempts: u32 },

    #[error("window capture failed")]
    CaptureFailed,

    #[error("window region unavailable")]
    NoWindowRegion,

    #[error("cannot load template {path}: {reason}")]
    TemplateUnreadable { path: PathBuf, reason: String },

    #[error("no text recognizer configured")]
    NoTextRecognizer,

    #[error("stopped")]
    Stopped,

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),
}

impl NavError {
    /// Failures an outer navigation retry may absorb. The next planning
    /// round clears interrupts again with a fresh budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NavError::TransitionTimeout(_) | NavError::InterruptsPersist(_) | NavError::NoDismissal(_)
        )
    }
}
