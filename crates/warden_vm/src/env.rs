//! Capability-restricted global namespace for the guest.
//!
//! The guest state is created with only the permitted standard modules,
//! an explicit deny-list is stripped from the globals, and each permitted
//! module is rebound to a fresh table holding an allow-listed subset of
//! its members. The string metatable's `__index` is repointed at the
//! filtered string table so that method resolution on text values cannot
//! reach removed members through the unfiltered original.

use mlua::{Function, Lua, LuaOptions, StdLib, Table, Value};

/// Globals stripped from the baseline namespace.
///
/// Script/file loading, reflection and metatable manipulation, and the
/// process/io/os/debug/concurrency namespaces. The namespaces are never
/// loaded in the first place; nil-ing them here keeps the list explicit.
pub const DENIED_GLOBALS: &[&str] = &[
    "dofile",
    "loadfile",
    "load",
    "require",
    "module",
    "collectgarbage",
    "getmetatable",
    "setmetatable",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "coroutine",
    "os",
    "io",
    "debug",
    "package",
];

/// Allow-listed members of the `table` module
pub const TABLE_ALLOW: &[&str] = &["concat", "insert", "move", "pack", "remove", "sort", "unpack"];

/// Allow-listed members of the `string` module.
///
/// `dump` and the binary pack/unpack family stay out.
pub const STRING_ALLOW: &[&str] = &[
    "byte", "char", "find", "format", "gmatch", "gsub", "len", "lower", "match", "rep", "reverse",
    "sub", "upper",
];

/// Allow-listed members of the `math` module
pub const MATH_ALLOW: &[&str] = &[
    "abs",
    "acos",
    "asin",
    "atan",
    "ceil",
    "cos",
    "deg",
    "exp",
    "floor",
    "fmod",
    "huge",
    "log",
    "max",
    "maxinteger",
    "min",
    "mininteger",
    "modf",
    "pi",
    "rad",
    "random",
    "randomseed",
    "sin",
    "sqrt",
    "tan",
    "tointeger",
    "type",
    "ult",
];

/// Allow-listed members of the `utf8` module
pub const UTF8_ALLOW: &[&str] = &["char", "charpattern", "codepoint", "codes", "len", "offset"];

/// Create a guest state with only the permitted standard modules loaded.
pub(crate) fn new_state() -> mlua::Result<Lua> {
    Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
        LuaOptions::default(),
    )
}

/// Apply the sandbox to a freshly created guest state.
///
/// Deterministic and applied exactly once, before any callback
/// registration.
pub(crate) fn apply(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    // The global goes away below; the handle is still needed to reach the
    // string metatable.
    let getmetatable: Function = globals.get("getmetatable")?;

    for name in DENIED_GLOBALS {
        globals.raw_set(*name, Value::Nil)?;
    }

    let string_filtered = filter_module(lua, &globals, "string", STRING_ALLOW)?;
    filter_module(lua, &globals, "table", TABLE_ALLOW)?;
    filter_module(lua, &globals, "math", MATH_ALLOW)?;
    filter_module(lua, &globals, "utf8", UTF8_ALLOW)?;

    // Every text value resolves methods through the shared string
    // metatable, which still points at the unfiltered module.
    let metatable: Table = getmetatable.call("")?;
    metatable.set("__index", string_filtered)?;

    Ok(())
}

/// Copy the allow-listed members of a module into a fresh table and
/// rebind the global name to it, discarding the original.
fn filter_module<'lua>(
    lua: &'lua Lua,
    globals: &Table<'lua>,
    name: &str,
    allowed: &[&str],
) -> mlua::Result<Table<'lua>> {
    let original: Table = globals.get(name)?;
    let filtered = lua.create_table()?;
    for member in allowed {
        let value: Value = original.get(*member)?;
        if !matches!(value, Value::Nil) {
            filtered.set(*member, value)?;
        }
    }
    globals.set(name, filtered.clone())?;
    Ok(filtered)
}
