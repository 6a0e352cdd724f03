//! Collected output of one remote command and the success rule applied to it.

use crate::hub::error::HubError;

/// Raw bytes gathered from a command channel.
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the remote never reported an exit status (e.g. killed by a signal)
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn new(
        exit_status: Option<u32>,
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
        }
    }

    /// Exit code as reported to callers; -1 when unknown.
    pub fn exit_code(&self) -> i32 {
        self.exit_status.map(|c| c as i32).unwrap_or(-1)
    }

    /// Resolves to stdout unless the command exited non-zero AND wrote to
    /// stderr. A failing command with an empty stderr still yields stdout.
    pub fn into_result(self) -> Result<String, HubError> {
        let exit_code = self.exit_code();
        if exit_code != 0 && !self.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&self.stderr);
            return Err(HubError::command_failed(exit_code, stderr.trim_end()));
        }
        Ok(String::from_utf8_lossy(&self.stdout).into_owned())
    }
}
