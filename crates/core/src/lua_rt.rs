use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use mlua::prelude::*;

use crate::error::NavError;
use crate::geometry::{Rect, Size};
use crate::logger;
use crate::navigator::Navigator;
use crate::platform::WindowHandle;
use crate::settings::EngineSettings;
use crate::sleep;

/// Metadata read from a task script without starting it.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub window_pattern: String,
    pub description: String,
    /// Declaration file, resolved against the script's directory.
    pub states: PathBuf,
}

/// Navigator exposed to Lua as the `nav` userdata.
struct LuaNav {
    inner: Rc<RefCell<Navigator>>,
    active: Rc<Cell<bool>>,
}

impl LuaNav {
    fn guard(&self, op: &str) -> bool {
        if !self.active.get() {
            logger::warn(&format!("dropped nav:{}, window not active", op));
        }
        self.active.get()
    }
}

/// Lua-side outcome: `true` or `false, message`. A stop aborts the script.
fn outcome<T>(r: Result<T, NavError>) -> LuaResult<(bool, Option<String>)> {
    match r {
        Ok(_) => Ok((true, None)),
        Err(NavError::Stopped) => Err(LuaError::external(NavError::Stopped)),
        Err(e) => Ok((false, Some(e.to_string()))),
    }
}

fn inactive() -> LuaResult<(bool, Option<String>)> {
    Ok((false, Some("window not active".into())))
}

impl LuaUserData for LuaNav {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        // nav:state() -> page id or nil
        methods.add_method("state", |_, this, ()| {
            if !this.guard("state") {
                return Ok(None);
            }
            match this.inner.borrow_mut().get_state() {
                Ok(s) => Ok(Some(s)),
                Err(NavError::UnknownState) => Ok(None),
                Err(e) => Err(LuaError::external(e)),
            }
        });

        methods.add_method("navigate", |_, this, (target, retries): (String, Option<u32>)| {
            if !this.guard("navigate") {
                return inactive();
            }
            let mut nav = this.inner.borrow_mut();
            let retries = retries.unwrap_or(nav.settings().navigate_retries);
            outcome(nav.navigate_to(&target, retries))
        });

        methods.add_method("execute", |_, this, id: String| {
            if !this.guard("execute") {
                return inactive();
            }
            outcome(this.inner.borrow_mut().execute_transition(&id))
        });

        methods.add_method("clear", |_, this, ()| {
            if !this.guard("clear") {
                return inactive();
            }
            let mut nav = this.inner.borrow_mut();
            let attempts = nav.settings().interrupt_attempts;
            outcome(nav.clear_interrupts(attempts))
        });

        methods.add_method("click", |_, this, annotation: String| {
            if !this.guard("click") {
                return inactive();
            }
            let mut nav = this.inner.borrow_mut();
            let path = nav.declarations().transition_annotation(&annotation);
            outcome(nav.click_annotation(&path))
        });

        methods.add_method("click_box", |_, this, (x1, y1, x2, y2): (f64, f64, f64, f64)| {
            if !this.guard("click_box") {
                return inactive();
            }
            outcome(this.inner.borrow_mut().click_window_rect(Rect::new(x1, y1, x2, y2)))
        });

        // nav:find(image) -> x1, y1, x2, y2 or nil
        methods.add_method("find", |_, this, image: String| {
            let none = (None, None, None, None);
            if !this.guard("find") {
                return Ok(none);
            }
            let mut nav = this.inner.borrow_mut();
            let path = nav.declarations().state_image(&image);
            match nav.find(&path) {
                Ok(Some(r)) => Ok((Some(r.p0.x), Some(r.p0.y), Some(r.p1.x), Some(r.p1.y))),
                Ok(None) => Ok(none),
                Err(NavError::Stopped) => Err(LuaError::external(NavError::Stopped)),
                Err(e) => {
                    logger::warn(&format!("nav:find({}): {}", image, e));
                    Ok(none)
                }
            }
        });

        // nav:read_text(annotation[, scale]) -> { "text", ... }
        methods.add_method("read_text", |lua, this, (annotation, scale): (String, Option<f64>)| {
            let out = lua.create_table()?;
            if !this.guard("read_text") {
                return Ok(out);
            }
            let mut nav = this.inner.borrow_mut();
            let path = nav.declarations().transition_annotation(&annotation);
            let hits = nav.read_text(&path, scale.unwrap_or(1.0)).map_err(LuaError::external)?;
            for (i, hit) in hits.into_iter().enumerate() {
                out.set(i + 1, hit.text)?;
            }
            Ok(out)
        });
    }
}

/// A loaded task instance, owning its own Lua VM and navigator.
pub struct LuaTask {
    lua: Lua,
    task_key: LuaRegistryKey,
    nav: Rc<RefCell<Navigator>>,
    active: Rc<Cell<bool>>,
}

/// Helper to convert mlua::Error -> anyhow::Error
fn lua_err(e: mlua::Error) -> anyhow::Error {
    anyhow!("{}", e)
}

fn eval_script(lua: &Lua, path: &Path) -> Result<LuaTable> {
    // require() resolves modules next to the script
    if let Some(dir) = path.parent() {
        let dir_str = dir.to_string_lossy();
        let pkg: LuaTable = lua.globals().get("package").map_err(lua_err)?;
        pkg.set("path", format!("{}/?.lua;{}/?/init.lua", dir_str, dir_str)).map_err(lua_err)?;
    }
    let code = std::fs::read_to_string(path)?;
    lua.load(&code).set_name(path.to_string_lossy()).eval().map_err(lua_err)
}

fn read_meta(table: &LuaTable, path: &Path) -> Result<TaskMeta> {
    let window_pattern: String = table.get("window_pattern").map_err(lua_err)?;
    let description: String = table.get("description").map_err(lua_err)?;
    let states: String = table.get("states").map_err(lua_err)?;
    let _: LuaFunction = table.get("tick").map_err(lua_err)?;
    let dir = path.parent().unwrap_or(Path::new("."));
    Ok(TaskMeta { window_pattern, description, states: dir.join(states) })
}

impl LuaTask {
    /// Evaluate a script only for its metadata. Does not call start().
    pub fn load_meta(path: &Path) -> Result<TaskMeta> {
        let lua = Lua::new();
        register_globals(&lua, "").map_err(lua_err)?;
        let table = eval_script(&lua, path)?;
        read_meta(&table, path)
    }

    /// Load the script, build its navigator over `window` and call
    /// start(nav).
    pub fn new(
        script_path: &Path,
        instance_id: &str,
        window: Box<dyn WindowHandle>,
        desktop: Size,
        settings: EngineSettings,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let lua = Lua::new();
        register_globals(&lua, instance_id).map_err(lua_err)?;
        let table = eval_script(&lua, script_path)?;
        let meta = read_meta(&table, script_path)?;

        let nav = Navigator::open(&meta.states, window, desktop, settings)?.with_stop_flag(stop);
        let nav = Rc::new(RefCell::new(nav));
        let active = Rc::new(Cell::new(false));
        let task_key = lua.create_registry_value(table.clone()).map_err(lua_err)?;

        let nav_ud = lua
            .create_userdata(LuaNav { inner: Rc::clone(&nav), active: Rc::clone(&active) })
            .map_err(lua_err)?;
        if let Ok(start_fn) = table.get::<LuaFunction>("start") {
            active.set(true);
            let started = start_fn.call::<()>(nav_ud).map_err(lua_err);
            active.set(false);
            started?;
        }

        Ok(Self { lua, task_key, nav, active })
    }

    fn table(&self) -> Result<LuaTable> {
        self.lua.registry_value(&self.task_key).map_err(lua_err)
    }

    /// Call tick() -> Option<cooldown_ms>
    pub fn tick(&self) -> Result<Option<u64>> {
        let tick_fn: LuaFunction = self.table()?.get("tick").map_err(lua_err)?;
        let result: LuaValue = tick_fn.call(()).map_err(lua_err)?;
        match result {
            LuaValue::Integer(ms) => Ok(Some(ms.max(0) as u64)),
            LuaValue::Number(ms) => Ok(Some(ms.max(0.0) as u64)),
            _ => Ok(None),
        }
    }

    /// Call get_status() -> String
    pub fn get_status(&self) -> Result<String> {
        match self.table()?.get::<LuaFunction>("get_status") {
            Ok(f) => f.call::<String>(()).map_err(lua_err),
            Err(_) => Ok(String::new()),
        }
    }

    pub fn reset(&self) -> Result<()> {
        if let Ok(f) = self.table()?.get::<LuaFunction>("reset") {
            f.call::<()>(()).map_err(lua_err)?;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Ok(f) = self.table()?.get::<LuaFunction>("stop") {
            f.call::<()>(()).map_err(lua_err)?;
        }
        Ok(())
    }

    /// Bring the window to the foreground.
    pub fn activate(&self) {
        self.nav.borrow_mut().window_mut().activate();
    }

    /// Gate every `nav` operation on whether this instance holds the window.
    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }
}

/// Register the W.* global table into a Lua state.
fn register_globals(lua: &Lua, tag: &str) -> mlua::Result<()> {
    let w_table = lua.create_table()?;

    w_table.set(
        "sleep",
        lua.create_function(|_, secs: f64| {
            sleep::sleep_jitter(secs);
            Ok(())
        })?,
    )?;

    // W.log(msg), prefixed with the instance id
    let tag = tag.to_string();
    if !tag.is_empty() {
        logger::register_prefix(&tag, logger::COLOR_BLUE);
    }
    let log_fn = lua.create_function(move |_, msg: String| {
        if tag.is_empty() {
            logger::info(&msg);
        } else {
            logger::info_p(&tag, &msg);
        }
        Ok(())
    })?;
    w_table.set("log", log_fn)?;

    lua.globals().set("W", w_table)?;
    Ok(())
}
