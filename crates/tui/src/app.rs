use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use waypoint_core::config::{AssetRoot, AuditReport, Declarations};
use waypoint_core::logger;
use waypoint_core::lua_rt::LuaTask;
use waypoint_core::settings::Settings;
use waypoint_core::types::{Command, OrchestratorState, TaskEntry};

const LOG_CAPACITY: usize = 2000;

pub struct App {
    pub state: Arc<Mutex<Vec<TaskEntry>>>,
    pub run_state: Arc<Mutex<OrchestratorState>>,
    /// Shared with every navigator; raised to abort in-flight navigation.
    pub stop: Arc<AtomicBool>,
    pub selected: usize,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub cmd_tx: mpsc::Sender<Command>,
    pub settings: Settings,
    pub settings_path: PathBuf,
    pub should_quit: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn audit_script(script: &Path, root: AssetRoot) -> anyhow::Result<(PathBuf, AuditReport)> {
    let meta = LuaTask::load_meta(script)?;
    let report = Declarations::load(&meta.states, root)?.audit();
    Ok((meta.states, report))
}

impl App {
    pub fn new(
        state: Arc<Mutex<Vec<TaskEntry>>>,
        run_state: Arc<Mutex<OrchestratorState>>,
        stop: Arc<AtomicBool>,
        log_rx: mpsc::Receiver<String>,
        cmd_tx: mpsc::Sender<Command>,
        settings: Settings,
        settings_path: PathBuf,
    ) -> Self {
        Self {
            state,
            run_state,
            stop,
            selected: 0,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            cmd_tx,
            settings,
            settings_path,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
        if self.log_messages.len() > LOG_CAPACITY {
            let excess = self.log_messages.len() - LOG_CAPACITY;
            self.log_messages.drain(..excess);
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        let len = lock(&self.state).len();
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    /// Flip the selected task, persist the enabled set, tell the orchestrator.
    pub fn toggle_selected(&mut self) {
        let enabled: Vec<String> = {
            let mut entries = lock(&self.state);
            let Some(entry) = entries.get_mut(self.selected) else { return };
            if entry.error.is_some() {
                return;
            }
            entry.enabled = !entry.enabled;
            entries.iter().filter(|e| e.enabled).map(|e| e.name.clone()).collect()
        };
        self.settings.enabled_tasks = enabled;
        if let Err(e) = self.settings.save(&self.settings_path) {
            logger::warn(&format!("cannot save settings: {}", e));
        }
        self.cmd_tx.send(Command::Toggle(self.selected)).ok();
    }

    pub fn start_stop(&mut self) {
        {
            let mut run = lock(&self.run_state);
            *run = match *run {
                OrchestratorState::Running => {
                    self.stop.store(true, Ordering::Relaxed);
                    OrchestratorState::Stopping
                }
                OrchestratorState::Stopped => {
                    self.stop.store(false, Ordering::Relaxed);
                    OrchestratorState::Running
                }
                OrchestratorState::Stopping => return,
            };
        }
        self.cmd_tx.send(Command::StartStop).ok();
    }

    pub fn restart_selected(&mut self) {
        self.cmd_tx.send(Command::Restart(self.selected)).ok();
    }

    /// Audit the declarations of the selected task into the log panel.
    pub fn audit_selected(&mut self) -> Option<AuditReport> {
        let (name, script) = {
            let entries = lock(&self.state);
            let entry = entries.get(self.selected)?;
            if entry.error.is_some() {
                return None;
            }
            (entry.name.clone(), entry.script_path.clone())
        };
        self.log_visible = true;
        self.log_scroll = 0;

        let (states, report) = match audit_script(&script, self.settings.engine.asset_root) {
            Ok(r) => r,
            Err(e) => {
                logger::warn(&format!("[{}] audit failed: {}", name, e));
                return None;
            }
        };
        if report.is_clean() {
            logger::info(&format!("[{}] {} ok", name, states.display()));
        }
        for (id, p) in &report.missing_images {
            logger::warn(&format!("[{}] missing image {} ({})", name, id, p.display()));
        }
        for (id, p) in &report.missing_annotations {
            logger::warn(&format!("[{}] missing annotation {} ({})", name, id, p.display()));
        }
        for p in &report.undeclared {
            logger::warn(&format!("[{}] undeclared {}", name, p.display()));
        }
        Some(report)
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn quit(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.cmd_tx.send(Command::Quit).ok();
        self.should_quit = true;
    }
}
