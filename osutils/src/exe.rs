use std::{
    os::unix::process::ExitStatusExt,
    process::{Command, Output},
};

use anyhow::{anyhow, Context, Error};
use log::trace;

use crate::crate_private::Sealed;

/// Extension for `std::process::Output` to check the exit status and turn a
/// failure into an error carrying whatever the process printed.
/// This is a sealed trait, so it cannot be implemented outside of this crate.
pub trait OutputChecker: Sealed {
    fn is_success(&self) -> bool;

    fn stdout(&self) -> String;

    fn stderr(&self) -> String;

    /// Describe how the process ended.
    fn explain_exit(&self) -> String;

    /// Get all available output, useful for reporting or debugging
    fn output_report(&self) -> String {
        let stdout = self.stdout();
        let stderr = self.stderr();

        let mut res = String::with_capacity(stdout.len() + stderr.len() + 20);
        if !stdout.is_empty() {
            res += &format!("stdout:\n{}\n", stdout);
        }
        if !stderr.is_empty() {
            if !res.is_empty() {
                res += "\n";
            }
            res += &format!("stderr:\n{}\n", stderr);
        }
        res
    }

    /// Return stdout if the process exited successfully, otherwise produce an
    /// error with the output.
    fn check_output(&self) -> Result<String, Error> {
        if self.is_success() {
            return Ok(self.stdout());
        }

        Err(match self.output_report() {
            s if !s.is_empty() => anyhow!("Process output:\n{}", s).context(self.explain_exit()),
            _ => anyhow!("(No output was captured)").context(self.explain_exit()),
        })
    }
}

impl Sealed for Output {}

impl OutputChecker for Output {
    fn is_success(&self) -> bool {
        self.status.success()
    }

    fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into()
    }

    fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into()
    }

    fn explain_exit(&self) -> String {
        if let Some(code) = self.status.code() {
            format!("process exited with status: {code}")
        } else if let Some(signal) = self.status.signal() {
            format!("process was terminated by signal: {signal}")
        } else {
            "process exited with unknown status".into()
        }
    }
}

pub trait RunAndCheck: Sealed {
    /// Run the command and return its stdout, failing if it did not exit
    /// successfully.
    fn output_and_check(&mut self) -> Result<String, Error>;

    fn render_command(&self) -> String;
}

impl Sealed for Command {}

impl RunAndCheck for Command {
    fn output_and_check(&mut self) -> Result<String, Error> {
        let rendered_command = self.render_command();
        trace!("Executing '{rendered_command}'");
        let output = self
            .output()
            .with_context(|| format!("Failed to execute: {rendered_command}"))?;
        trace!(
            "Executed '{rendered_command}': {}. Report:\n{}",
            output.explain_exit(),
            output.output_report(),
        );
        output
            .check_output()
            .with_context(|| format!("Error when running: {rendered_command}"))
    }

    fn render_command(&self) -> String {
        let args = self
            .get_args()
            .map(|arg| arg.to_string_lossy())
            .map(|arg| {
                if arg.contains(' ') {
                    format!("'{}'", arg)
                } else {
                    arg.into()
                }
            })
            .collect::<Vec<_>>();

        if args.is_empty() {
            self.get_program().to_string_lossy().into()
        } else {
            format!("{} {}", self.get_program().to_string_lossy(), args.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_and_check() {
        let mut cmd = Command::new("echo");
        cmd.arg("something");
        assert_eq!(cmd.output_and_check().unwrap(), "something\n");

        let mut cmd = Command::new("nonexistent_command_1234");
        cmd.arg("/nonexistent");
        let error = cmd.output_and_check().unwrap_err();
        assert!(error
            .to_string()
            .contains("Failed to execute: nonexistent_command_1234 /nonexistent"));

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg("echo oops >&2; exit 3");
        let error = cmd.output_and_check().unwrap_err();
        let report = format!("{error:?}");
        assert!(report.contains("process exited with status: 3"), "{report}");
        assert!(report.contains("stderr:\noops"), "{report}");
    }

    #[test]
    fn test_render_command() {
        let mut cmd = Command::new("lsblk");
        assert_eq!(cmd.render_command(), "lsblk");

        cmd.arg("--json").arg("/dev/disk by id");
        assert_eq!(cmd.render_command(), "lsblk --json '/dev/disk by id'");
    }
}
