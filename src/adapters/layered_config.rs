//! Command-line overrides layered over an optional file configuration.

use crate::adapters::file_config_adapter::parse_bool;
use crate::ports::config_port::ConfigPort;
use std::collections::HashMap;

/// Reads `(section, key)` from the overrides first, then the base.
#[derive(Default)]
pub struct LayeredConfig<'a> {
    base: Option<&'a dyn ConfigPort>,
    overrides: HashMap<(String, String), String>,
}

impl<'a> LayeredConfig<'a> {
    pub fn new(base: Option<&'a dyn ConfigPort>) -> Self {
        Self {
            base,
            overrides: HashMap::new(),
        }
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.overrides
            .insert((section.to_string(), key.to_string()), value.into());
    }

    /// Sets the override only when `value` is present.
    pub fn set_opt<T: ToString>(&mut self, section: &str, key: &str, value: Option<T>) {
        if let Some(v) = value {
            self.set(section, key, v.to_string());
        }
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&String> {
        self.overrides.get(&(section.to_string(), key.to_string()))
    }
}

impl ConfigPort for LayeredConfig<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.lookup(section, key)
            .cloned()
            .or_else(|| self.base.and_then(|b| b.get_string(section, key)))
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.lookup(section, key) {
            Some(v) => v.trim().parse().unwrap_or(default),
            None => self
                .base
                .map_or(default, |b| b.get_int(section, key, default)),
        }
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.lookup(section, key) {
            Some(v) => v.trim().parse().unwrap_or(default),
            None => self
                .base
                .map_or(default, |b| b.get_double(section, key, default)),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.lookup(section, key) {
            Some(v) => parse_bool(v).unwrap_or(default),
            None => self
                .base
                .map_or(default, |b| b.get_bool(section, key, default)),
        }
    }
}
