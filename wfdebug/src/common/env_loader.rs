//! Environment variable loading utilities
//!
//! Every configuration knob can be overridden through a `WFDEBUG_*`
//! variable. Values that fail to parse fall back to the supplied default.

use std::env;
use std::str::FromStr;

/// Load an environment variable with a string default
pub fn load_env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load an environment variable with type conversion and default
pub fn load_env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load an environment variable as an Option<T>
pub fn load_env_optional<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Load a comma-separated environment variable, trimming and dropping empty items
pub fn load_env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// Builder for loading multiple environment variables with consistent prefix
#[derive(Debug)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Load a string value with default
    pub fn load_string(&self, suffix: &str, default: &str) -> String {
        load_env_string(&self.key(suffix), default)
    }

    /// Load a parsed value with default
    pub fn load_parsed<T>(&self, suffix: &str, default: T) -> T
    where
        T: FromStr,
    {
        load_env_parsed(&self.key(suffix), default)
    }

    /// Load an optional value
    pub fn load_optional<T>(&self, suffix: &str) -> Option<T>
    where
        T: FromStr,
    {
        load_env_optional(&self.key(suffix))
    }

    /// Load a comma-separated list
    pub fn load_list(&self, suffix: &str) -> Option<Vec<String>> {
        load_env_list(&self.key(suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_load_env_parsed() {
        let key = "WFDEBUG_TEST_PARSED_VAR";
        let default = 42u32;

        env::remove_var(key);
        assert_eq!(load_env_parsed(key, default), default);

        env::set_var(key, "123");
        assert_eq!(load_env_parsed::<u32>(key, default), 123);

        env::set_var(key, "invalid");
        assert_eq!(load_env_parsed(key, default), default);

        env::remove_var(key);
    }

    #[test]
    #[serial]
    fn test_load_env_list() {
        let key = "WFDEBUG_TEST_LIST_VAR";

        env::remove_var(key);
        assert_eq!(load_env_list(key), None);

        env::set_var(key, " payments, ,shipping ,");
        assert_eq!(
            load_env_list(key),
            Some(vec!["payments".to_string(), "shipping".to_string()])
        );

        env::remove_var(key);
    }

    #[test]
    #[serial]
    fn test_env_loader() {
        let loader = EnvLoader::new("WFDEBUG_TEST");

        let key = "WFDEBUG_TEST_STRING";
        env::remove_var(key);
        assert_eq!(loader.load_string("STRING", "default"), "default");

        env::set_var(key, "value");
        assert_eq!(loader.load_string("STRING", "default"), "value");

        let num_key = "WFDEBUG_TEST_NUMBER";
        env::remove_var(num_key);
        assert_eq!(loader.load_optional::<u32>("NUMBER"), None);

        env::set_var(num_key, "456");
        assert_eq!(loader.load_optional::<u32>("NUMBER"), Some(456));

        env::remove_var(key);
        env::remove_var(num_key);
    }
}
