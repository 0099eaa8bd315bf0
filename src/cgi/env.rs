//! Environment access for CGI invocations
//!
//! The handler never touches the process environment directly. It reads
//! variables through an [`EnvironmentReader`], so the gateway and the tests
//! can hand it a synthetic environment.

use std::collections::HashMap;

/// CGI request method variable
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
/// CGI body length variable
pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";

/// Read-only view of the variables describing one invocation
pub trait EnvironmentReader {
    /// Value of `name`, or `None` when unset or not valid Unicode
    fn var(&self, name: &str) -> Option<String>;

    /// Value of `name`, empty string when unset
    fn var_or_empty(&self, name: &str) -> String {
        self.var(name).unwrap_or_default()
    }
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvironmentReader for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// In-memory environment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl EnvironmentReader for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_env_lookup() {
        let env = MapEnv::new().with(REQUEST_METHOD, "POST");
        assert_eq!(env.var(REQUEST_METHOD).as_deref(), Some("POST"));
        assert_eq!(env.var(CONTENT_LENGTH), None);
    }

    #[test]
    fn test_var_or_empty_defaults() {
        let env = MapEnv::new();
        assert_eq!(env.var_or_empty(REQUEST_METHOD), "");
    }

    #[test]
    fn test_map_env_from_iter() {
        let env: MapEnv = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(env.len(), 2);
        assert_eq!(env.var("B").as_deref(), Some("2"));
    }

    #[test]
    fn test_set_overwrites() {
        let mut env = MapEnv::new().with("A", "1");
        env.set("A", "2");
        assert_eq!(env.var("A").as_deref(), Some("2"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_process_env_reads_path() {
        // PATH is set in every test runner we care about
        assert_eq!(ProcessEnv.var("PATH"), std::env::var("PATH").ok());
    }
}
