use crate::error::{self, Result};
use log::{debug, trace};
use snafu::ResultExt;
use std::process::{Command, Output};

/// Runs `program` with `args` and returns its stdout. A non-zero exit becomes
/// [`crate::Error::Subprocess`] carrying the exit code and both output streams.
pub(crate) fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<String> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!("Running command: {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(&args)
        .output()
        .context(error::ProcessSnafu { program })?;
    check_output(program, &args, output)
}

fn check_output(program: &str, args: &[&str], output: Output) -> Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    trace!("{} stdout:\n{}", program, stdout);
    if output.status.success() {
        return Ok(stdout);
    }
    error::SubprocessSnafu {
        program,
        args: args.join(" "),
        code: output.status.code().unwrap_or(-1),
        stdout,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
    .fail()
}
