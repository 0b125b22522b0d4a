use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::logger;
use crate::lua_rt::LuaTask;
use crate::platform::Platform;
use crate::settings::EngineSettings;
use crate::types::*;

/// Recursively find all directories containing `main.lua` under `dir`.
pub fn find_task_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut results = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else { return results };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let main_lua = path.join("main.lua");
        if main_lua.is_file() {
            results.push(main_lua);
        } else {
            results.extend(find_task_dirs(&path));
        }
    }
    results.sort();
    results
}

/// Task name from its script path: tasks/harbor/daily/main.lua -> harbor/daily
pub fn derive_task_name(path: &Path, root: &Path) -> String {
    let task_dir = path.parent().unwrap_or(path);
    let rel = task_dir.strip_prefix(root).unwrap_or(task_dir);
    rel.to_string_lossy().replace('\\', "/")
}

/// Load every task under `tasks_dir`. Scripts that fail to evaluate are
/// kept with their error so the console can show them.
pub fn load_tasks(tasks_dir: &Path) -> Vec<TaskEntry> {
    find_task_dirs(tasks_dir)
        .into_iter()
        .map(|path| {
            let name = derive_task_name(&path, tasks_dir);
            let (window_pattern, description, error) = match LuaTask::load_meta(&path) {
                Ok(meta) => (meta.window_pattern, meta.description, None),
                Err(e) => {
                    logger::error(&format!("failed to load task {}: {}", name, e));
                    (String::new(), String::new(), Some(e.to_string()))
                }
            };
            TaskEntry {
                name,
                window_pattern,
                description,
                enabled: false,
                instances: Vec::new(),
                error,
                script_path: path,
            }
        })
        .collect()
}

/// Scan for windows matching each task's pattern, populate instances.
pub fn scan_instances(entries: &mut [TaskEntry], platform: &dyn Platform) {
    for entry in entries.iter_mut().filter(|e| e.error.is_none()) {
        entry.instances = platform
            .get_instances(&entry.window_pattern)
            .into_iter()
            .map(|(wid, title)| Instance::new(&entry.name, wid, title))
            .collect();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything the orchestrator thread owns.
pub struct Orchestrator {
    state: Arc<Mutex<Vec<TaskEntry>>>,
    run_state: Arc<Mutex<OrchestratorState>>,
    platform: Box<dyn Platform>,
    engine: EngineSettings,
    stop: Arc<AtomicBool>,
    tasks: HashMap<String, LuaTask>,
    cooldowns: HashMap<String, Instant>,
}

impl Orchestrator {
    /// `stop` is shared with every navigator; the console raises it to
    /// abort in-flight navigation.
    pub fn new(
        state: Arc<Mutex<Vec<TaskEntry>>>,
        run_state: Arc<Mutex<OrchestratorState>>,
        platform: Box<dyn Platform>,
        engine: EngineSettings,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Orchestrator {
            state,
            run_state,
            platform,
            engine,
            stop,
            tasks: HashMap::new(),
            cooldowns: HashMap::new(),
        }
    }

    fn spawn(&mut self, entry: &TaskEntry, inst: &Instance) {
        let window = self.platform.create_window(&entry.window_pattern, inst.window_id);
        match LuaTask::new(
            &entry.script_path,
            &inst.id,
            window,
            self.platform.screen_size(),
            self.engine.clone(),
            Arc::clone(&self.stop),
        ) {
            Ok(task) => {
                self.tasks.insert(inst.id.clone(), task);
            }
            Err(e) => logger::error(&format!("failed to start {}: {}", inst.id, e)),
        }
    }

    fn retire(&mut self, id: &str) {
        if let Some(mut task) = self.tasks.remove(id) {
            task.stop().ok();
        }
        self.cooldowns.remove(id);
    }

    fn retire_all(&mut self) {
        for (_, mut task) in self.tasks.drain() {
            task.stop().ok();
        }
        self.cooldowns.clear();
    }

    fn current(&self) -> OrchestratorState {
        *lock(&self.run_state)
    }

    fn is_running(&self) -> bool {
        self.current() == OrchestratorState::Running
    }

    /// Rescan windows: drop instances whose window closed, add new ones.
    fn rescan(&mut self) {
        let state = Arc::clone(&self.state);
        let mut entries = lock(&state);
        for entry in entries.iter_mut().filter(|e| e.error.is_none()) {
            let wins = self.platform.get_instances(&entry.window_pattern);
            let (alive, dead): (Vec<Instance>, Vec<Instance>) = std::mem::take(&mut entry.instances)
                .into_iter()
                .partition(|i| wins.iter().any(|(w, _)| *w == i.window_id));
            for inst in dead {
                self.retire(&inst.id);
            }
            entry.instances = alive;
            for (wid, title) in wins {
                if !entry.instances.iter().any(|i| i.window_id == wid) {
                    entry.instances.push(Instance::new(&entry.name, wid, title));
                }
            }
        }
    }

    /// Drain pending commands. Returns false on Quit.
    pub fn process_commands(&mut self, cmd_rx: &mpsc::Receiver<Command>) -> bool {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::Quit => {
                    logger::info("shutting down");
                    self.retire_all();
                    *lock(&self.run_state) = OrchestratorState::Stopped;
                    return false;
                }
                Command::Toggle(idx) => {
                    self.rescan();
                    let state = Arc::clone(&self.state);
                    let entries = lock(&state);
                    let Some(entry) = entries.get(idx) else { continue };
                    logger::info(&format!("enable {}: {}", entry.name, entry.enabled));

                    if entry.enabled && self.is_running() {
                        for inst in &entry.instances {
                            match self.tasks.get(&inst.id) {
                                Some(task) => {
                                    task.reset().ok();
                                }
                                None => self.spawn(entry, inst),
                            }
                        }
                    } else if !entry.enabled {
                        for inst in &entry.instances {
                            self.retire(&inst.id);
                        }
                    }
                }
                Command::StartStop => match self.current() {
                    // Teardown happens in the main loop
                    OrchestratorState::Stopping => logger::info("orchestrator stopping..."),
                    OrchestratorState::Running => {
                        logger::info("orchestrator started");
                        let state = Arc::clone(&self.state);
                        let entries = lock(&state);
                        for entry in entries.iter().filter(|e| e.enabled && e.error.is_none()) {
                            for inst in &entry.instances {
                                if !self.tasks.contains_key(&inst.id) {
                                    self.spawn(entry, inst);
                                }
                            }
                        }
                    }
                    OrchestratorState::Stopped => {}
                },
                Command::Restart(idx) => {
                    if !self.is_running() {
                        continue;
                    }
                    let state = Arc::clone(&self.state);
                    let entries = lock(&state);
                    let Some(entry) = entries.get(idx).filter(|e| e.enabled) else { continue };
                    logger::info(&format!("restarting task {}", entry.name));
                    for inst in &entry.instances {
                        self.retire(&inst.id);
                        self.spawn(entry, inst);
                    }
                }
            }
        }
        true
    }

    /// Instances whose cooldown has elapsed, in table order.
    fn ready(&self) -> Vec<String> {
        let now = Instant::now();
        lock(&self.state)
            .iter()
            .filter(|e| e.enabled)
            .flat_map(|e| e.instances.iter())
            .filter(|i| self.tasks.contains_key(&i.id) && self.cooldowns.get(&i.id).map_or(true, |t| now >= *t))
            .map(|i| i.id.clone())
            .collect()
    }

    /// One tick of one instance, then write its status back.
    fn tick(&mut self, id: &str) {
        let Some(task) = self.tasks.get(id) else { return };
        task.set_active(true);
        task.activate();
        std::thread::sleep(Duration::from_millis(200));

        let (cd, status, err) = match task.tick() {
            Ok(ms) => (ms.unwrap_or(5000), task.get_status().ok(), None),
            Err(e) => {
                logger::error(&format!("tick error {}: {}", id, e));
                (5000, None, Some(e.to_string()))
            }
        };
        task.set_active(false);
        self.cooldowns.insert(id.to_string(), Instant::now() + Duration::from_millis(cd));

        let mut entries = lock(&self.state);
        if let Some(inst) = entries.iter_mut().flat_map(|e| e.instances.iter_mut()).find(|i| i.id == id) {
            inst.status = status.unwrap_or_default();
            inst.error = err;
        }
    }

    /// Main loop. Runs on a background thread until Quit.
    pub fn run(mut self, cmd_rx: mpsc::Receiver<Command>) {
        loop {
            if !self.process_commands(&cmd_rx) {
                return;
            }

            let current = self.current();
            if current == OrchestratorState::Stopping {
                self.retire_all();
                *lock(&self.run_state) = OrchestratorState::Stopped;
                logger::info("orchestrator stopped");
                continue;
            }
            if current != OrchestratorState::Running {
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }

            for id in self.ready() {
                // Stay responsive between ticks
                if !self.process_commands(&cmd_rx) {
                    return;
                }
                if !self.is_running() {
                    break;
                }
                self.tick(&id);
            }

            std::thread::sleep(Duration::from_millis(100));
        }
    }
}
