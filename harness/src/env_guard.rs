use log::debug;
use std::env;
use std::ffi::{OsStr, OsString};

/// Sets an environment variable for as long as the guard lives. When dropped, the previous value is
/// restored, or the variable is removed if it was not set. Dropping happens on every exit path,
/// including early returns with `?` and panics, so a failing provider CLI call cannot leak its
/// `KUBECONFIG` into later scenarios.
#[derive(Debug)]
pub struct EnvVarGuard {
    key: OsString,
    previous: Option<OsString>,
}

impl EnvVarGuard {
    pub fn set<K, V>(key: K, value: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let guard = Self::save(key);
        debug!(
            "Setting {} to '{}'",
            guard.key.to_string_lossy(),
            value.as_ref().to_string_lossy()
        );
        env::set_var(&guard.key, value);
        guard
    }

    /// Records the current value without changing it.
    pub fn save<K: AsRef<OsStr>>(key: K) -> Self {
        let key = key.as_ref().to_os_string();
        let previous = env::var_os(&key);
        Self { key, previous }
    }

    pub fn previous(&self) -> Option<&OsStr> {
        self.previous.as_deref()
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => env::set_var(&self.key, value),
            None => env::remove_var(&self.key),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn restores_previous_value() {
        let key = "HOSTED_HARNESS_ENV_GUARD_RESTORE";
        env::set_var(key, "original");
        {
            let guard = EnvVarGuard::set(key, "temporary");
            assert_eq!(env::var(key).unwrap(), "temporary");
            assert_eq!(guard.previous(), Some(OsStr::new("original")));
        }
        assert_eq!(env::var(key).unwrap(), "original");
        env::remove_var(key);
    }

    #[test]
    fn removes_variable_that_was_unset() {
        let key = "HOSTED_HARNESS_ENV_GUARD_REMOVE";
        env::remove_var(key);
        {
            let _guard = EnvVarGuard::set(key, "temporary");
            assert!(env::var_os(key).is_some());
        }
        assert!(env::var_os(key).is_none());
    }

    #[test]
    fn restores_after_panic() {
        let key = "HOSTED_HARNESS_ENV_GUARD_PANIC";
        env::set_var(key, "before");
        let result = std::panic::catch_unwind(|| {
            let _guard = EnvVarGuard::set(key, "during");
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(env::var(key).unwrap(), "before");
        env::remove_var(key);
    }
}
