/*!

Stand-ins for provider CLIs such as `eksctl` and `gcloud`. Each fake is a small shell script in
its own temporary directory that prints canned output, exits with a canned code, and records how
it was called.

!*/

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STDOUT_FILE: &str = "stdout";
const STDERR_FILE: &str = "stderr";
const INVOCATIONS_FILE: &str = "invocations.log";

/// One recorded call of a [`FakeCli`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    /// The arguments, joined by single spaces.
    pub args: String,
    /// `KUBECONFIG` as the program saw it, `None` when unset or empty.
    pub kubeconfig: Option<String>,
}

#[derive(Debug)]
pub struct FakeCli {
    dir: TempDir,
    name: String,
}

impl FakeCli {
    /// A program that prints `stdout` and succeeds.
    pub fn printing(name: &str, stdout: &str) -> Result<Self> {
        Self::new(name, stdout, "", 0)
    }

    /// A program that prints `stderr` and exits with `code`.
    pub fn failing(name: &str, stderr: &str, code: i32) -> Result<Self> {
        Self::new(name, "", stderr, code)
    }

    fn new(name: &str, stdout: &str, stderr: &str, code: i32) -> Result<Self> {
        let dir = TempDir::new().context("Unable to create a directory for the fake program")?;
        let write = |file: &str, contents: &str| {
            let path = dir.path().join(file);
            fs::write(&path, contents)
                .with_context(|| format!("Unable to write '{}'", path.display()))
        };
        write(STDOUT_FILE, stdout)?;
        write(STDERR_FILE, stderr)?;
        write(INVOCATIONS_FILE, "")?;

        let root = dir.path().display();
        let script = format!(
            r#"#!/bin/sh
printf '%s\t%s\n' "$*" "${{KUBECONFIG:-}}" >> '{root}/{log}'
cat '{root}/{out}'
cat '{root}/{err}' >&2
exit {code}
"#,
            root = root,
            log = INVOCATIONS_FILE,
            out = STDOUT_FILE,
            err = STDERR_FILE,
            code = code,
        );
        write(name, &script)?;
        make_executable(&dir.path().join(name))?;
        Ok(Self {
            dir,
            name: name.to_string(),
        })
    }

    /// Absolute path of the fake program.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join(&self.name)
    }

    /// The path as a string, the way settings name programs.
    pub fn program(&self) -> String {
        self.path().to_string_lossy().to_string()
    }

    /// Every call so far, oldest first.
    pub fn invocations(&self) -> Result<Vec<Invocation>> {
        let path = self.dir.path().join(INVOCATIONS_FILE);
        let log = fs::read_to_string(&path)
            .with_context(|| format!("Unable to read '{}'", path.display()))?;
        Ok(log
            .lines()
            .map(|line| {
                let (args, kubeconfig) = line.split_once('\t').unwrap_or((line, ""));
                Invocation {
                    args: args.to_string(),
                    kubeconfig: Some(kubeconfig.to_string()).filter(|k| !k.is_empty()),
                }
            })
            .collect())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Unable to make '{}' executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_: &Path) -> Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use std::process::Command;

    #[test]
    fn records_calls_and_replays_output() {
        let cli = FakeCli::printing("eksctl", r#"[{"Name":"ng"}]"#).unwrap();
        let output = Command::new(cli.path())
            .args(["get", "nodegroup", "--cluster=a"])
            .env("KUBECONFIG", "/tmp/a.kubeconfig")
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), r#"[{"Name":"ng"}]"#);

        let calls = cli.invocations().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, "get nodegroup --cluster=a");
        assert_eq!(calls[0].kubeconfig.as_deref(), Some("/tmp/a.kubeconfig"));
    }

    #[test]
    fn failing_program_exits_with_code() {
        let cli = FakeCli::failing("gcloud", "quota exceeded", 2).unwrap();
        let output = Command::new(cli.path())
            .env_remove("KUBECONFIG")
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(2));
        assert_eq!(String::from_utf8_lossy(&output.stderr), "quota exceeded");
        assert_eq!(cli.invocations().unwrap()[0].kubeconfig, None);
    }
}
