//! Built-in helper functions and the registry that holds them

use std::collections::HashMap;
use std::env;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::value::{Helper, Value};

/// Named registry of callable helpers.
///
/// Every `Template` owns one; its entries are overlaid onto the derived
/// execution scope before evaluation. Cloning shallow-copies the helper
/// values into an independent map, so a clone's registry can diverge
/// from the original's.
#[derive(Debug, Clone, Default)]
pub struct HelperMap {
    helpers: HashMap<String, Value>,
}

impl HelperMap {
    /// Registry pre-populated with the built-in helpers
    pub fn new() -> Self {
        let mut hm = HelperMap::empty();
        hm.add("upper", upper);
        hm.add("lower", lower);
        hm.add("trim", trim);
        hm.add("len", len);
        hm.add("join", join);
        hm.add("default", default_value);
        hm.add("env", env_var);
        hm.add("base64_encode", base64_encode);
        hm.add("base64_decode", base64_decode);
        hm.add("inspect", inspect);
        hm
    }

    /// Registry with no entries
    pub fn empty() -> Self {
        HelperMap {
            helpers: HashMap::new(),
        }
    }

    /// Register a helper, replacing any existing entry of the same name
    pub fn add<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.helpers
            .insert(name.into(), Value::Helper(Helper::new(f)));
    }

    /// Bulk-merge entries from another registry's map
    pub fn add_many<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.helpers.extend(entries);
    }

    /// Current entries, name to helper value
    pub fn helpers(&self) -> &HashMap<String, Value> {
        &self.helpers
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.helpers.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

fn string_arg<'a>(args: &'a [Value], index: usize, helper: &str) -> Result<&'a str, String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!(
            "{} expects a string argument, got {}",
            helper,
            other.type_name()
        )),
        None => Err(format!("{} requires an argument", helper)),
    }
}

fn upper(args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(string_arg(args, 0, "upper")?.to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(string_arg(args, 0, "lower")?.to_lowercase()))
}

fn trim(args: &[Value]) -> Result<Value, String> {
    Ok(Value::from(string_arg(args, 0, "trim")?.trim()))
}

fn len(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),
        Some(Value::Array(items)) => Ok(Value::Int(items.len() as i64)),
        Some(Value::Hash(map)) => Ok(Value::Int(map.len() as i64)),
        Some(other) => Err(format!("len cannot measure {}", other.type_name())),
        None => Err("len requires an argument".to_string()),
    }
}

/// `join(array, separator?)` - separator defaults to ","
fn join(args: &[Value]) -> Result<Value, String> {
    let items = match args.first() {
        Some(Value::Array(items)) => items,
        Some(other) => return Err(format!("join expects an array, got {}", other.type_name())),
        None => return Err("join requires an array argument".to_string()),
    };
    let separator = match args.get(1) {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(format!(
                "join separator must be a string, got {}",
                other.type_name()
            ))
        }
        None => ",",
    };
    let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
    Ok(Value::from(parts.join(separator)))
}

/// `default(value, fallback)` - fallback when value is nil or empty
fn default_value(args: &[Value]) -> Result<Value, String> {
    let fallback = args
        .get(1)
        .ok_or_else(|| "default requires a fallback argument".to_string())?;
    let value = args.first().unwrap_or(&Value::Nil);
    let empty = matches!(value, Value::Nil) || matches!(value, Value::String(s) if s.is_empty());
    Ok(if empty { fallback.clone() } else { value.clone() })
}

/// `env(name, default?)` - unset and no default renders empty
fn env_var(args: &[Value]) -> Result<Value, String> {
    let name = string_arg(args, 0, "env")?;
    match env::var(name) {
        Ok(v) => Ok(Value::from(v)),
        Err(_) => match args.get(1) {
            Some(fallback) => Ok(fallback.clone()),
            None => Ok(Value::from("")),
        },
    }
}

fn base64_encode(args: &[Value]) -> Result<Value, String> {
    let input = string_arg(args, 0, "base64_encode")?;
    Ok(Value::from(BASE64.encode(input.as_bytes())))
}

fn base64_decode(args: &[Value]) -> Result<Value, String> {
    let input = string_arg(args, 0, "base64_decode")?;
    let bytes = BASE64
        .decode(input)
        .map_err(|e| format!("base64 decode error: {}", e))?;
    String::from_utf8(bytes)
        .map(Value::from)
        .map_err(|e| format!("utf-8 decode error: {}", e))
}

/// `inspect(value)` - debug form, useful while authoring templates
fn inspect(args: &[Value]) -> Result<Value, String> {
    let value = args.first().unwrap_or(&Value::Nil);
    Ok(Value::from(format!("{:?}", value)))
}
