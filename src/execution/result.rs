//! Execution result types.

use super::command::CommandSpec;

/// Result of a completed command whose exit status was accepted.
#[derive(Debug)]
pub struct ExecResult {
    spec: CommandSpec,
    exit_status: i32,
    output: Option<Vec<u8>>,
    error_output: Option<Vec<u8>>,
}

impl ExecResult {
    pub(crate) fn new(
        spec: CommandSpec,
        exit_status: i32,
        output: Option<Vec<u8>>,
        error_output: Option<Vec<u8>>,
    ) -> Self {
        Self {
            spec,
            exit_status,
            output,
            error_output,
        }
    }

    /// The spec that produced this result.
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Exit status reported by the channel.
    pub fn exit_status(&self) -> i32 {
        self.exit_status
    }

    /// Check if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Captured output bytes, when the output binding was a capture.
    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    /// Captured error bytes, when the error binding was a capture.
    pub fn error_output(&self) -> Option<&[u8]> {
        self.error_output.as_deref()
    }

    /// Captured output decoded as UTF-8 (lossy).
    pub fn output_text(&self) -> Option<String> {
        self.output
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Captured output decoded and trimmed; empty when nothing was captured.
    pub fn output_trimmed(&self) -> String {
        self.output_text()
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }

    /// Consume the result, returning its spec.
    pub fn into_spec(self) -> CommandSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CommandSpec {
        CommandSpec::builder("uname").arg("-a").build().unwrap()
    }

    #[test]
    fn test_result_success() {
        let result = ExecResult::new(spec(), 0, None, None);
        assert!(result.success());
        assert_eq!(result.exit_status(), 0);
        assert!(result.output().is_none());
        assert_eq!(result.output_trimmed(), "");
    }

    #[test]
    fn test_result_accepted_nonzero() {
        let result = ExecResult::new(spec(), 2, None, None);
        assert!(!result.success());
        assert_eq!(result.exit_status(), 2);
    }

    #[test]
    fn test_result_captured_output() {
        let result = ExecResult::new(
            spec(),
            0,
            Some(b"  Linux host 6.1\n".to_vec()),
            Some(b"warn".to_vec()),
        );
        assert_eq!(result.output(), Some(&b"  Linux host 6.1\n"[..]));
        assert_eq!(result.output_trimmed(), "Linux host 6.1");
        assert_eq!(result.error_output(), Some(&b"warn"[..]));
    }

    #[test]
    fn test_result_keeps_spec() {
        let result = ExecResult::new(spec(), 0, None, None);
        assert_eq!(result.spec().command_line(), "uname -a");
        assert_eq!(result.into_spec().args(), &["-a"]);
    }
}
