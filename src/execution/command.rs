//! Command specification and builder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::streams::{Input, Output, Streams};
use crate::error::ExecError;
use crate::resolve::PathResolver;
use crate::Result;

/// Exit statuses accepted when none are configured.
pub const DEFAULT_EXIT_VALUES: [i32; 1] = [0];

/// An immutable description of one command invocation.
///
/// Built with [`CommandSpecBuilder`] and consumed by a single execution.
#[derive(Debug)]
pub struct CommandSpec {
    command: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
    exit_values: Vec<i32>,
    merge_stderr: bool,
    capture_output: bool,
    streams: Streams,
}

impl CommandSpec {
    /// Start building a spec for `command`.
    pub fn builder(command: impl Into<PathBuf>) -> CommandSpecBuilder {
        CommandSpecBuilder::new().command(command)
    }

    /// The command to run.
    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Arguments in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment overlay.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Execution timeout; `None` means unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Accepted exit statuses.
    pub fn exit_values(&self) -> &[i32] {
        &self.exit_values
    }

    /// Whether `status` is an accepted exit status.
    pub fn accepts(&self, status: i32) -> bool {
        self.exit_values.contains(&status)
    }

    /// Whether stderr is written to the output binding.
    pub fn merge_stderr(&self) -> bool {
        self.merge_stderr
    }

    /// Whether output is captured into the result.
    pub fn captures_output(&self) -> bool {
        self.capture_output
    }

    /// The command line sent to the remote side.
    ///
    /// Arguments are separated by one space. An argument containing a space
    /// is wrapped in single quotes; nothing else is escaped, so embedded
    /// quotes and shell metacharacters pass through untouched.
    pub fn command_line(&self) -> String {
        let mut line = self.command.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Split off the stream bindings, leaving consumed placeholders behind.
    pub(crate) fn take_streams(&mut self) -> Streams {
        std::mem::replace(&mut self.streams, Streams::consumed())
    }
}

/// Builder for [`CommandSpec`] with a fluent API.
#[derive(Debug)]
pub struct CommandSpecBuilder {
    command: Option<PathBuf>,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
    exit_values: Vec<i32>,
    merge_stderr: bool,
    streams: Streams,
}

impl Default for CommandSpecBuilder {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            timeout: None,
            exit_values: DEFAULT_EXIT_VALUES.to_vec(),
            merge_stderr: false,
            streams: Streams::standard(),
        }
    }
}

impl CommandSpecBuilder {
    /// Create a new builder with default bindings and exit values `{0}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the command.
    pub fn command(mut self, command: impl Into<PathBuf>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn arg_all<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace all arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add or overwrite an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Set the execution timeout. A zero duration means unbounded.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = (!duration.is_zero()).then_some(duration);
        self
    }

    /// Set the execution timeout in milliseconds.
    pub fn timeout_millis(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    /// Replace the accepted exit statuses.
    pub fn exit_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        self.exit_values = values.into_iter().collect();
        self
    }

    /// Collect output into the execution result instead of passing it on.
    pub fn capture_output(mut self) -> Self {
        self.streams.output = Output::Capture;
        self
    }

    /// Bind standard input.
    pub fn pipe_input(mut self, input: Input) -> Self {
        self.streams.input = input;
        self
    }

    /// Bind standard output.
    pub fn pipe_output(mut self, output: Output) -> Self {
        self.streams.output = output;
        self
    }

    /// Bind standard error.
    pub fn pipe_error(mut self, error: Output) -> Self {
        self.streams.error = error;
        self
    }

    /// Send standard error to the output binding.
    pub fn pipe_error_to_output(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    /// Replace the command with its resolved path, if the resolver finds one.
    pub fn resolve_with(mut self, resolver: &PathResolver) -> Self {
        if let Some(found) = self.command.as_deref().and_then(|c| resolver.find(c)) {
            self.command = Some(found);
        }
        self
    }

    /// Validate and build the spec.
    ///
    /// Fails when no (or an empty) command was set, or when the accepted
    /// exit statuses are empty.
    pub fn build(self) -> Result<CommandSpec> {
        let command = self
            .command
            .filter(|c| !c.as_os_str().is_empty())
            .ok_or_else(|| ExecError::config("command cannot be empty"))?;

        if self.exit_values.is_empty() {
            return Err(ExecError::config("exit values cannot be empty"));
        }

        let capture_output = matches!(self.streams.output, Output::Capture);

        Ok(CommandSpec {
            command,
            args: self.args,
            env: self.env,
            timeout: self.timeout,
            exit_values: self.exit_values,
            merge_stderr: self.merge_stderr,
            capture_output,
            streams: self.streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let spec = CommandSpec::builder("ls").build().unwrap();
        assert_eq!(spec.command(), Path::new("ls"));
        assert!(spec.args().is_empty());
        assert!(spec.env().is_empty());
        assert!(spec.timeout().is_none());
        assert_eq!(spec.exit_values(), &[0]);
        assert!(!spec.merge_stderr());
        assert!(!spec.captures_output());
    }

    #[test]
    fn test_missing_command() {
        let err = CommandSpecBuilder::new().arg("x").build().unwrap_err();
        assert!(matches!(err, ExecError::Configuration(_)));

        let err = CommandSpec::builder("").build().unwrap_err();
        assert!(matches!(err, ExecError::Configuration(_)));
    }

    #[test]
    fn test_empty_exit_values_rejected() {
        let err = CommandSpec::builder("true")
            .exit_values([])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exit values"));
    }

    #[test]
    fn test_arg_appends_and_args_replaces() {
        let spec = CommandSpec::builder("git")
            .arg("status")
            .arg_all(["-s", "-b"])
            .build()
            .unwrap();
        assert_eq!(spec.args(), &["status", "-s", "-b"]);

        let spec = CommandSpec::builder("git")
            .arg("status")
            .args(["log", "--oneline"])
            .build()
            .unwrap();
        assert_eq!(spec.args(), &["log", "--oneline"]);
    }

    #[test]
    fn test_exit_values_replaced_not_merged() {
        let spec = CommandSpec::builder("grep")
            .exit_values([0, 1])
            .exit_values([2])
            .build()
            .unwrap();
        assert_eq!(spec.exit_values(), &[2]);
        assert!(spec.accepts(2));
        assert!(!spec.accepts(0));
    }

    #[test]
    fn test_env_overwrites() {
        let spec = CommandSpec::builder("env")
            .env("A", "1")
            .envs([("B", "2"), ("A", "3")])
            .build()
            .unwrap();
        assert_eq!(spec.env().len(), 2);
        assert_eq!(spec.env().get("A"), Some(&"3".to_string()));
    }

    #[test]
    fn test_timeout_forms() {
        let spec = CommandSpec::builder("sleep")
            .timeout_millis(1500)
            .build()
            .unwrap();
        assert_eq!(spec.timeout(), Some(Duration::from_millis(1500)));

        let spec = CommandSpec::builder("sleep")
            .timeout(Duration::from_secs(3))
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert!(spec.timeout().is_none());
    }

    #[test]
    fn test_capture_output_flag() {
        let spec = CommandSpec::builder("hostname")
            .capture_output()
            .build()
            .unwrap();
        assert!(spec.captures_output());

        let spec = CommandSpec::builder("hostname")
            .capture_output()
            .pipe_output(Output::Null)
            .build()
            .unwrap();
        assert!(!spec.captures_output());
    }

    #[test]
    fn test_command_line_quotes_spaced_args() {
        let spec = CommandSpec::builder("/bin/echo")
            .arg("hi there")
            .build()
            .unwrap();
        assert_eq!(spec.command_line(), "/bin/echo 'hi there'");
    }

    #[test]
    fn test_command_line_preserves_order_and_plain_args() {
        let spec = CommandSpec::builder("cp")
            .args(["-r", "my dir", "dest", "it's"])
            .build()
            .unwrap();
        assert_eq!(spec.command_line(), "cp -r 'my dir' dest it's");
    }

    #[test]
    fn test_take_streams_leaves_placeholders() {
        let mut spec = CommandSpec::builder("cat")
            .pipe_input(Input::Bytes(b"data".to_vec()))
            .build()
            .unwrap();
        let streams = spec.take_streams();
        assert!(matches!(streams.input, Input::Bytes(_)));
        assert!(matches!(spec.take_streams().input, Input::Null));
    }
}
