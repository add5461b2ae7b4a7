use std::env;
use std::str::FromStr;

/// Source of configuration values, keyed by variable name.
///
/// Production code reads the process environment through [`process_env`];
/// tests hand in a map so they never have to mutate global state.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads a variable from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Returns the value of `key`, or `default` when unset.
pub fn var_or(lookup: Lookup<'_>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Parses the value of `key`, falling back to `default` when unset or unparsable.
pub fn parse_or<T: FromStr>(lookup: Lookup<'_>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        match var_or(lookup, "ENVIRONMENT", "development")
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}
