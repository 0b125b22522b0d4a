use std::path::PathBuf;

/// Window identifier (CGWindowID on macOS)
pub type WindowId = u64;

/// Screen-coordinate bounding box of a window, border included
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Region {
    pub l: i32,
    pub t: i32,
    pub r: i32,
    pub b: i32,
    pub w: i32,
    pub h: i32,
    pub cx: i32,
    pub cy: i32,
}

impl Region {
    pub fn from_ltwh(l: i32, t: i32, w: i32, h: i32) -> Self {
        Region {
            l, t, r: l + w, b: t + h,
            w, h, cx: l + w / 2, cy: t + h / 2,
        }
    }
}

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

/// Which detection namespace a state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Interrupt,
    Page,
}

/// Result of a single detection pass over one screenshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Interrupt(String),
    Page(String),
}

impl Detection {
    pub fn kind(&self) -> StateKind {
        match self {
            Detection::Interrupt(_) => StateKind::Interrupt,
            Detection::Page(_) => StateKind::Page,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Detection::Interrupt(id) | Detection::Page(id) => id,
        }
    }
}

/// One discovered task script and its runtime state
pub struct TaskEntry {
    pub name: String,
    pub window_pattern: String,
    pub description: String,
    pub enabled: bool,
    pub instances: Vec<Instance>,
    pub error: Option<String>,
    pub script_path: PathBuf,
}

/// One task instance bound to a specific window
pub struct Instance {
    pub id: String,
    pub window_id: WindowId,
    pub window_title: String,
    pub status: String,
    pub error: Option<String>,
}

impl Instance {
    pub fn new(task_name: &str, window_id: WindowId, window_title: String) -> Self {
        Self {
            id: format!("{}-{}", task_name, window_id),
            window_id,
            window_title,
            status: String::new(),
            error: None,
        }
    }
}

/// Orchestrator run state, shared with the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Running,
    Stopping,
    Stopped,
}

/// Command from console to orchestrator
pub enum Command {
    Toggle(usize),
    StartStop,
    Restart(usize),
    Quit,
}
