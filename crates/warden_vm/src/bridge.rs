//! Boundary values bridged between host and guest.

use mlua::{FromLua, IntoLua, Lua, Value};
use serde::{Deserialize, Serialize};

/// A value crossing the host/guest boundary.
///
/// This is the closed set of kinds the boundary supports. The guest's
/// richer value space (tables, functions, userdata, threads) never crosses
/// outward except as [`HostValue::Nil`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    /// Absence of a value (guest `nil`)
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float; NaN and infinities pass through unchanged
    Float(f64),
    /// Text
    Text(String),
}

impl HostValue {
    /// Name of this value's kind, for diagnostics
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    /// Whether this is [`HostValue::Nil`]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<'lua> IntoLua<'lua> for HostValue {
    fn into_lua(self, lua: &'lua Lua) -> mlua::Result<Value<'lua>> {
        match self {
            Self::Nil => Ok(Value::Nil),
            Self::Bool(b) => Ok(Value::Boolean(b)),
            Self::Int(i) => Ok(Value::Integer(i)),
            Self::Float(f) => Ok(Value::Number(f)),
            Self::Text(s) => Ok(Value::String(lua.create_string(&s)?)),
        }
    }
}

impl<'lua> FromLua<'lua> for HostValue {
    fn from_lua(value: Value<'lua>, _lua: &'lua Lua) -> mlua::Result<Self> {
        Ok(match value {
            Value::Nil => Self::Nil,
            Value::Boolean(b) => Self::Bool(b),
            Value::Integer(i) => Self::Int(i),
            Value::Number(n) => Self::Float(n),
            // Lua strings are byte strings; convert lossily rather than fail
            Value::String(s) => Self::Text(s.to_string_lossy().into_owned()),
            // Aggregates, callables, and opaque handles stay inside the guest
            _ => Self::Nil,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua() -> Lua {
        Lua::new()
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(HostValue::Nil.kind_name(), "nil");
        assert_eq!(HostValue::Bool(true).kind_name(), "bool");
        assert_eq!(HostValue::Int(1).kind_name(), "int");
        assert_eq!(HostValue::Float(1.0).kind_name(), "float");
        assert_eq!(HostValue::Text("x".into()).kind_name(), "text");
    }

    #[test]
    fn test_round_trip_primitives() {
        let lua = lua();
        let values = [
            HostValue::Nil,
            HostValue::Bool(true),
            HostValue::Bool(false),
            HostValue::Int(0),
            HostValue::Int(i64::MIN),
            HostValue::Int(i64::MAX),
            HostValue::Float(1.5),
            HostValue::Float(f64::INFINITY),
            HostValue::Float(f64::NEG_INFINITY),
            HostValue::Text(String::new()),
            HostValue::Text("héllo wörld".into()),
        ];
        for value in values {
            let guest = value.clone().into_lua(&lua).unwrap();
            let back = HostValue::from_lua(guest, &lua).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_nan_passes_through() {
        let lua = lua();
        let guest = HostValue::Float(f64::NAN).into_lua(&lua).unwrap();
        let back = HostValue::from_lua(guest, &lua).unwrap();
        match back {
            HostValue::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_subtype_preserved() {
        let lua = lua();
        let int: HostValue = lua.load("return 2").eval().unwrap();
        assert_eq!(int, HostValue::Int(2));
        let float: HostValue = lua.load("return 2.0").eval().unwrap();
        assert_eq!(float, HostValue::Float(2.0));
    }

    #[test]
    fn test_non_primitives_collapse_to_nil() {
        let lua = lua();
        let table: HostValue = lua.load("return {}").eval().unwrap();
        assert_eq!(table, HostValue::Nil);
        let function: HostValue = lua.load("return print").eval().unwrap();
        assert_eq!(function, HostValue::Nil);
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(HostValue::from(true), HostValue::Bool(true));
        assert_eq!(HostValue::from(7i64), HostValue::Int(7));
        assert_eq!(HostValue::from(1.25f64), HostValue::Float(1.25));
        assert_eq!(HostValue::from("abc"), HostValue::Text("abc".into()));
    }

    #[test]
    fn test_guest_string_to_host() {
        let lua = lua();
        let text: HostValue = lua.load("return 'abc'").eval().unwrap();
        assert_eq!(text, HostValue::Text("abc".into()));
    }
}
