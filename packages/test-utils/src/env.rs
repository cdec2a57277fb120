//! Scoped environment-variable overrides for configuration tests

use std::collections::HashMap;

/// Temporarily set environment variables for the duration of a test
///
/// Returns a guard that restores the original values when dropped. Tests
/// mutating the process environment must still serialize themselves (e.g.
/// with a shared mutex), since `std::env` is process-global.
pub struct EnvGuard {
    original: HashMap<String, Option<String>>,
}

impl EnvGuard {
    /// Set the given variables, remembering their previous values
    pub fn set(vars: &[(&str, &str)]) -> Self {
        let mut original = HashMap::new();
        for (key, value) in vars {
            original.insert(key.to_string(), std::env::var(key).ok());
            std::env::set_var(key, value);
        }
        Self { original }
    }

    /// Remove the given variables, remembering their previous values
    pub fn remove(vars: &[&str]) -> Self {
        let mut original = HashMap::new();
        for key in vars {
            original.insert(key.to_string(), std::env::var(key).ok());
            std::env::remove_var(key);
        }
        Self { original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.original {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_restore() {
        std::env::set_var("UNISON_ENV_GUARD_TEST", "before");
        {
            let _guard = EnvGuard::set(&[("UNISON_ENV_GUARD_TEST", "during")]);
            assert_eq!(
                std::env::var("UNISON_ENV_GUARD_TEST").unwrap(),
                "during"
            );
        }
        assert_eq!(std::env::var("UNISON_ENV_GUARD_TEST").unwrap(), "before");
        std::env::remove_var("UNISON_ENV_GUARD_TEST");
    }

    #[test]
    fn test_remove_and_restore() {
        std::env::set_var("UNISON_ENV_GUARD_REMOVE_TEST", "value");
        {
            let _guard = EnvGuard::remove(&["UNISON_ENV_GUARD_REMOVE_TEST"]);
            assert!(std::env::var("UNISON_ENV_GUARD_REMOVE_TEST").is_err());
        }
        assert_eq!(
            std::env::var("UNISON_ENV_GUARD_REMOVE_TEST").unwrap(),
            "value"
        );
        std::env::remove_var("UNISON_ENV_GUARD_REMOVE_TEST");
    }
}
