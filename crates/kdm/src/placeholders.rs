//! 🔤 Placeholders: `${...}` tokens in config strings, swapped for real values.
//!
//! `${key}` looks the key up. `${key:fallback}` uses the fallback when the key is absent.
//! A key that resolves to nothing and has no fallback stays exactly as written.
//! Resolution never fails, it only ever substitutes or leaves alone.
//!
//! The resolver is passed in explicitly. No process-wide regex state, no global environment
//! singleton. You want different values? Hand over a different resolver. 🦆

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::LazyLock;

use regex::{Captures, Regex};

// 🔍 ${key} or ${key:default}. keys are anything except '}' and ':'.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").unwrap_or_else(|err| {
        unreachable!("placeholder regex is a literal and must compile: {err}")
    })
});

/// 🗝️ Looks up a placeholder key. `None` means "never heard of it".
pub trait EnvironmentResolver: Send + Sync + Debug {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// 🌍 Process environment variables, as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl EnvironmentResolver for ProcessEnvironment {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// 📒 A plain map of properties. Tests use it; so does `AppConfig::properties`.
#[derive(Debug, Default, Clone)]
pub struct MapEnvironment {
    properties: HashMap<String, String>,
}

impl MapEnvironment {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self { properties }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl EnvironmentResolver for MapEnvironment {
    fn lookup(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// 🔗 First resolver that knows the key wins.
#[derive(Debug, Default)]
pub struct ChainedEnvironment {
    resolvers: Vec<Box<dyn EnvironmentResolver>>,
}

impl ChainedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, resolver: impl EnvironmentResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl EnvironmentResolver for ChainedEnvironment {
    fn lookup(&self, key: &str) -> Option<String> {
        self.resolvers.iter().find_map(|resolver| resolver.lookup(key))
    }
}

/// 🔄 Replace every `${...}` token in `raw`.
pub fn resolve_placeholders(raw: &str, resolver: &dyn EnvironmentResolver) -> String {
    if !raw.contains("${") {
        return raw.to_string();
    }
    PLACEHOLDER
        .replace_all(raw, |captures: &Captures<'_>| {
            let key = captures[1].trim();
            match (resolver.lookup(key), captures.get(2)) {
                (Some(value), _) => value,
                (None, Some(fallback)) => fallback.as_str().to_string(),
                // 🪞 unknown and no fallback: leave the literal text alone
                (None, None) => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// Same as [`resolve_placeholders`] for optional config values.
pub fn resolve_optional(raw: Option<&str>, resolver: &dyn EnvironmentResolver) -> Option<String> {
    raw.map(|value| resolve_placeholders(value, resolver))
}
