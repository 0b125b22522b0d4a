use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use waypoint_core::config::{AssetRoot, Declarations};
use waypoint_core::logger;
use waypoint_core::orchestrator::{self, Orchestrator};
use waypoint_core::platform::create_platform;
use waypoint_core::settings::Settings;
use waypoint_core::types::{Command, OrchestratorState};

/// Print the declaration audit. With `fix`, undeclared files are appended
/// to the declaration file. Returns whether the audit was clean.
fn check(path: &Path, root: AssetRoot, fix: bool) -> Result<bool> {
    let decl = Declarations::load(path, root)?;
    let report = decl.audit();

    println!(
        "{}: {} interrupts, {} dismissals, {} pages, {} transitions",
        path.display(),
        decl.interrupt_states.len(),
        decl.interrupt_dismissals.len(),
        decl.page_states.len(),
        decl.page_transitions.len()
    );
    for (id, p) in &report.missing_images {
        println!("missing image      {:<24} {}", id, p.display());
    }
    for (id, p) in &report.missing_annotations {
        println!("missing annotation {:<24} {}", id, p.display());
    }
    for p in &report.undeclared {
        println!("undeclared         {}", p.display());
    }
    if report.is_clean() {
        println!("ok");
    } else if fix {
        let added = decl
            .append_fixes(path, &report)
            .with_context(|| format!("cannot update {}", path.display()))?;
        println!("appended {} line(s) to {}", added, path.display());
    }
    Ok(report.is_clean())
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(i) = args.iter().position(|a| a == "--check") {
        let file = args[i + 1..]
            .iter()
            .find(|a| !a.starts_with("--"))
            .context("--check needs a declaration file")?;
        let fix = args.iter().any(|a| a == "--fix");
        let root = Settings::load(Path::new("settings.json")).engine.asset_root;
        let clean = check(Path::new(file), root, fix)?;
        std::process::exit(if clean { 0 } else { 1 });
    }
    let force_stub = args.iter().any(|a| a == "--stub");

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let tasks_dir = cwd.join("tasks");
    let settings_path = cwd.join("settings.json");

    logger::init(&cwd.join("logs")).context("cannot open log file")?;

    let platform = create_platform(force_stub);
    let mut entries = orchestrator::load_tasks(&tasks_dir);
    orchestrator::scan_instances(&mut entries, platform.as_ref());

    // Restore enabled state
    let settings = Settings::load(&settings_path);
    for entry in &mut entries {
        if settings.enabled_tasks.contains(&entry.name) && entry.error.is_none() {
            entry.enabled = true;
        }
    }
    logger::info(&format!("loaded {} task(s) from {}", entries.len(), tasks_dir.display()));

    let state = Arc::new(Mutex::new(entries));
    let run_state = Arc::new(Mutex::new(OrchestratorState::Stopped));
    let stop = Arc::new(AtomicBool::new(false));

    let (log_tx, log_rx) = mpsc::channel::<String>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
    logger::set_console_sender(log_tx);
    logger::info("waypoint started");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = waypoint_tui::App::new(
        Arc::clone(&state),
        Arc::clone(&run_state),
        Arc::clone(&stop),
        log_rx,
        cmd_tx,
        settings.clone(),
        settings_path,
    );

    let engine = settings.engine;
    let worker = thread::spawn(move || {
        let orch = Orchestrator::new(state, run_state, platform, engine, stop);
        orch.run(cmd_rx)
    });

    let result = waypoint_tui::event::run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if worker.join().is_err() {
        eprintln!("orchestrator thread panicked");
    }
    result
}
