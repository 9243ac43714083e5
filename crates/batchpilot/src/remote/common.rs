use std::io::Write;
use std::process::{Output, Stdio};

use bstr::ByteSlice;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::common::error::BatchError;

/// Code used for failed commands whose output does not contain a remote error code.
pub const COMMAND_FAILED: &str = "CommandFailed";

/// Arguments whose values must not end up in the log.
const SECRET_ARGUMENTS: &[&str] = &["--account-key"];

pub fn create_command(arguments: &[String]) -> Command {
    let mut command = Command::new(&arguments[0]);
    command.args(&arguments[1..]);
    command.stdin(Stdio::null());
    // Dropping the future (e.g. on Ctrl-C) terminates the child
    command.kill_on_drop(true);
    command
}

/// Runs a command of a remote command line tool and returns its output if it succeeded.
pub async fn run_command(arguments: Vec<String>) -> crate::Result<Output> {
    log::debug!("Running command `{}`", format_arguments(&arguments));
    let output = create_command(&arguments).output().await?;
    check_command_output(&arguments[0], output)
}

pub fn check_command_output(program: &str, output: Output) -> crate::Result<Output> {
    let status = output.status;
    if status.success() {
        return Ok(output);
    }
    // Terminated by a signal
    let Some(code) = status.code() else {
        return Err(BatchError::Cancelled(format!("{program} was terminated")));
    };
    Err(parse_remote_error(code, &output))
}

/// Extracts the remote error code and message from the stderr of a failed command.
///
/// Remote errors are printed either as `(Code) message` or as separate `Code: ...` and
/// `Message: ...` lines.
pub fn parse_remote_error(exit_code: i32, output: &Output) -> BatchError {
    let stderr = output.stderr.to_str_lossy();
    let mut code: Option<String> = None;
    let mut message: Option<String> = None;

    for line in stderr.lines().map(|line| line.trim()) {
        let line = line.strip_prefix("ERROR:").map(str::trim).unwrap_or(line);
        if let Some(value) = line.strip_prefix("Code:") {
            code = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Message:") {
            message = Some(value.trim().to_string());
        } else if code.is_none() {
            if let Some((parsed_code, parsed_message)) = line
                .strip_prefix('(')
                .and_then(|rest| rest.split_once(')'))
                .filter(|(parsed_code, _)| !parsed_code.contains(char::is_whitespace))
            {
                code = Some(parsed_code.to_string());
                message.get_or_insert_with(|| parsed_message.trim().to_string());
            }
        }
    }

    match code {
        Some(code) => BatchError::remote(code, message.unwrap_or_default()),
        None => BatchError::remote(
            COMMAND_FAILED,
            format!(
                "Exit code: {exit_code}\nStderr: {}\nStdout: {}",
                stderr.trim(),
                output.stdout.to_str_lossy().trim()
            ),
        ),
    }
}

pub fn parse_json_output<T: DeserializeOwned>(output: &Output) -> crate::Result<T> {
    serde_json::from_slice(&output.stdout).map_err(|error| {
        BatchError::DeserializationError(format!(
            "Cannot parse command output ({error}): {}",
            output.stdout.to_str_lossy().trim()
        ))
    })
}

/// Writes a request payload into a temporary file that is removed when the returned handle
/// is dropped.
pub fn write_json_payload<T: Serialize>(value: &T) -> crate::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("batchpilot-")
        .suffix(".json")
        .tempfile()?;
    serde_json::to_writer(&mut file, value)?;
    file.flush()?;
    Ok(file)
}

pub fn format_arguments(arguments: &[String]) -> String {
    let mut hide_next = false;
    arguments
        .iter()
        .map(|arg| {
            let formatted = if hide_next { "***" } else { arg.as_str() };
            hide_next = SECRET_ARGUMENTS.contains(&arg.as_str());
            formatted
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    use crate::common::error::BatchError;
    use crate::remote::common::{
        COMMAND_FAILED, check_command_output, format_arguments, parse_remote_error,
    };

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn parse_code_lines() {
        let error = parse_remote_error(
            1,
            &output(
                1,
                "ERROR: (JobNotFound) The specified job does not exist.\nRequestId:abc\n\
                 Time:2024-01-01T10:00:00Z\nCode: JobNotFound\nMessage: The specified job does not exist.",
            ),
        );
        assert!(error.is_not_found());
        match error {
            BatchError::RemoteError { code, message } => {
                assert_eq!(code, "JobNotFound");
                assert_eq!(message, "The specified job does not exist.");
            }
            _ => panic!("unexpected error"),
        }
    }

    #[test]
    fn parse_parenthesized_code() {
        let error = parse_remote_error(1, &output(1, "ERROR: (PoolNotFound) No such pool"));
        assert_eq!(error.remote_code(), Some("PoolNotFound"));
    }

    #[test]
    fn parse_unknown_failure() {
        let error = parse_remote_error(2, &output(2, "az: command not found"));
        assert_eq!(error.remote_code(), Some(COMMAND_FAILED));
        assert!(error.to_string().contains("az: command not found"));
    }

    #[test]
    fn signal_is_cancellation() {
        let output = Output {
            status: ExitStatus::from_raw(9),
            stdout: vec![],
            stderr: vec![],
        };
        assert!(check_command_output("az", output).unwrap_err().is_cancellation());
    }

    #[test]
    fn hide_account_key() {
        let arguments: Vec<String> = ["az", "batch", "job", "show", "--account-key", "secret"]
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            format_arguments(&arguments),
            "az batch job show --account-key ***"
        );
    }
}
