//! Lua sandbox creation
//!
//! Workflow definitions are plain data, so the sandbox they are evaluated in
//! has no filesystem, network or process access and cannot load other code.
//!
//! The `workflow` helper module is always injected; its functions only build
//! tables and never touch the host.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// Create a restricted Lua sandbox
///
/// Only the table, string and math libraries are loaded. `require`, `dofile`
/// and `loadfile` are removed.
///
/// # Example
/// ```no_run
/// use sluice_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let definition: mlua::Table = lua
///     .load(r#"return workflow.define { name = "CI", jobs = {} }"#)
///     .eval()?;
/// let name: String = definition.get("name")?;
/// assert_eq!(name, "CI");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )?;

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    register_workflow_module(&lua)?;

    Ok(lua)
}

/// Register the `workflow` helper module
///
/// - `workflow.define(t)`, `workflow.job(t)`, `workflow.step(t)` return their argument
/// - `workflow.checkout(opts)` builds a checkout step
/// - `workflow.toolchain(channel, opts)` builds a toolchain step
/// - `workflow.run(command, opts)` builds a command step
fn register_workflow_module(lua: &Lua) -> LuaResult<()> {
    let module = lua.create_table()?;

    let passthrough = lua.create_function(|_, definition: Table| Ok(definition))?;
    module.set("define", passthrough.clone())?;
    module.set("job", passthrough.clone())?;
    module.set("step", passthrough)?;

    // workflow.checkout { repository = "owner/name", ref = "main", path = "dir", name = "..." }
    let checkout_fn = lua.create_function(|lua, opts: Option<Table>| {
        let step = lua.create_table()?;
        match opts {
            None => step.set("checkout", true)?,
            Some(opts) => {
                let spec = lua.create_table()?;
                for key in ["repository", "ref", "path"] {
                    spec.set(key, opts.get::<Value>(key)?)?;
                }
                copy_step_fields(&opts, &step)?;
                step.set("checkout", spec)?;
            }
        }
        Ok(step)
    })?;
    module.set("checkout", checkout_fn)?;

    // workflow.toolchain("stable", { kind = "rust", components = { "rustfmt" } })
    let toolchain_fn =
        lua.create_function(|lua, (channel, opts): (Option<String>, Option<Table>)| {
            let step = lua.create_table()?;
            let spec = lua.create_table()?;
            spec.set("channel", channel)?;
            if let Some(opts) = opts {
                spec.set("kind", opts.get::<Value>("kind")?)?;
                spec.set("components", opts.get::<Value>("components")?)?;
                copy_step_fields(&opts, &step)?;
            }
            step.set("toolchain", spec)?;
            Ok(step)
        })?;
    module.set("toolchain", toolchain_fn)?;

    // workflow.run("cargo test", { name = "test", working_directory = "crate" })
    let run_fn = lua.create_function(|lua, (command, opts): (String, Option<Table>)| {
        let step = lua.create_table()?;
        step.set("run", command)?;
        if let Some(opts) = opts {
            step.set("shell", opts.get::<Value>("shell")?)?;
            copy_step_fields(&opts, &step)?;
        }
        Ok(step)
    })?;
    module.set("run", run_fn)?;

    lua.globals().set("workflow", module)?;

    Ok(())
}

/// Copies the fields every step kind accepts
fn copy_step_fields(from: &Table, to: &Table) -> LuaResult<()> {
    for key in ["name", "working_directory", "env"] {
        to.set(key, from.get::<Value>(key)?)?;
    }
    Ok(())
}
