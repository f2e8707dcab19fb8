//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ToolPaths;
use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// How many trailing diagnostic lines are kept for error reports.
const MAX_DIAGNOSTIC_LINES: usize = 40;

/// One `-i` input together with the options that precede it.
#[derive(Debug, Clone)]
pub struct FfmpegInput {
    path: PathBuf,
    args: Vec<String>,
}

impl FfmpegInput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    /// Add an input option (placed before `-i`).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Input seek; fast, lands on the nearest keyframe before decoding.
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format!("{:.3}", seconds))
    }

    /// Limit how much of the input is read.
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.3}", seconds))
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order
    inputs: Vec<FfmpegInput>,
    /// Output file path (`-` for stdout)
    output: PathBuf,
    /// Output arguments (after the inputs)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Emit `-progress pipe:2` blocks
    progress: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::to_output(output).input(FfmpegInput::new(input))
    }

    /// Create a command with no inputs yet.
    pub fn to_output(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            progress: true,
            log_level: "error".to_string(),
        }
    }

    /// Append an input.
    pub fn input(mut self, input: FfmpegInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add an input argument to the most recently added input.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(last) = self.inputs.pop() {
            self.inputs.push(last.arg(arg));
        }
        self
    }

    /// Seek the most recently added input.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter-graph label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// JPEG quality scale (2 is near-lossless, 31 worst).
    pub fn image_quality(self, q: u8) -> Self {
        self.output_arg("-q:v").output_arg(q.to_string())
    }

    /// Force the output container/muxer.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Do not request `-progress` output.
    pub fn without_progress(mut self) -> Self {
        self.progress = false;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        if self.progress {
            args.push("-progress".to_string());
            args.push("pipe:2".to_string());
        }
        args.push("-nostats".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Receives every stderr line of a running FFmpeg process.
pub trait StderrSink: Send + 'static {
    fn on_line(&mut self, line: &str);
}

/// Discards everything.
struct NullSink;

impl StderrSink for NullSink {
    fn on_line(&mut self, _line: &str) {}
}

/// Turns `-progress` lines into callback invocations.
struct ProgressSink<F> {
    current: FfmpegProgress,
    callback: F,
}

impl<F> StderrSink for ProgressSink<F>
where
    F: FnMut(FfmpegProgress) + Send + 'static,
{
    fn on_line(&mut self, line: &str) {
        if let Some(progress) = parse_progress_line(line, &mut self.current) {
            (self.callback)(progress);
        }
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
///
/// Child processes are killed when cancelled, on timeout, and when the
/// running future is dropped.
pub struct FfmpegRunner {
    /// FFmpeg binary to execute
    program: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(u64),
}

impl FfmpegRunner {
    /// Create a runner for the configured FFmpeg binary.
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            program: tools.ffmpeg.clone(),
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: Option<watch::Receiver<bool>>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_sink(cmd, NullSink).await.map(|_| ())
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: FnMut(FfmpegProgress) + Send + 'static,
    {
        let sink = ProgressSink {
            current: FfmpegProgress::default(),
            callback: progress_callback,
        };
        self.run_with_sink(cmd, sink).await.map(|_| ())
    }

    /// Run an FFmpeg command, streaming stderr into `sink`. The sink is
    /// handed back once the process exits.
    pub async fn run_with_sink<S: StderrSink>(&self, cmd: &FfmpegCommand, sink: S) -> MediaResult<S> {
        let (sink, _) = self.run_ffmpeg(cmd, sink, false).await?;
        Ok(sink)
    }

    /// Run an FFmpeg command writing to stdout and collect the bytes.
    pub async fn run_capture(&self, cmd: &FfmpegCommand) -> MediaResult<Vec<u8>> {
        let (_, stdout) = self.run_ffmpeg(cmd, NullSink, true).await?;
        Ok(stdout)
    }

    async fn run_ffmpeg<S: StderrSink>(
        &self,
        cmd: &FfmpegCommand,
        sink: S,
        capture_stdout: bool,
    ) -> MediaResult<(S, Vec<u8>)> {
        let program = which::which(&self.program)
            .map_err(|_| MediaError::FfmpegNotFound(self.program.clone()))?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", program.display(), args.join(" "));

        let mut command = Command::new(program);
        command.args(&args);
        self.execute(command, sink, capture_stdout).await
    }

    /// Spawn `command`, drain its output and wait for it under the runner's
    /// cancellation and timeout policy.
    pub(crate) async fn execute<S: StderrSink>(
        &self,
        mut command: Command,
        sink: S,
        capture_stdout: bool,
    ) -> MediaResult<(S, Vec<u8>)> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(if capture_stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;
        let stderr_handle = tokio::spawn(drain_stderr(stderr, sink));

        let stdout_handle = child.stdout.take().map(|mut stdout| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await.map(|_| buf)
            })
        });

        let result = self.wait_for_completion(&mut child).await;

        let (sink, diagnostics) = stderr_handle
            .await
            .map_err(|e| MediaError::internal(format!("stderr reader failed: {}", e)))?;

        let stdout = match stdout_handle {
            Some(handle) => handle
                .await
                .map_err(|e| MediaError::internal(format!("stdout reader failed: {}", e)))??,
            None => Vec::new(),
        };

        let status = result?;
        if status.success() {
            Ok((sink, stdout))
        } else {
            let stderr = (!diagnostics.is_empty()).then(|| diagnostics.join("\n"));
            Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with {}", status),
                stderr,
                status.code(),
            ))
        }
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let cancel_rx = self.cancel_rx.clone();
        let timeout_secs = self.timeout_secs;

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = wait_for_cancel(cancel_rx) => Waited::Cancelled,
            secs = wait_for_timeout(timeout_secs) => Waited::TimedOut(secs),
        };

        match waited {
            Waited::Exited(status) => Ok(status?),
            Waited::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
            Waited::TimedOut(secs) => {
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
        }
    }
}

/// Resolves once the cancel flag is raised. Never resolves without a
/// receiver or after the sender is gone.
pub async fn wait_for_cancel(cancel_rx: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = cancel_rx {
        if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn wait_for_timeout(timeout_secs: Option<u64>) -> u64 {
    match timeout_secs {
        Some(secs) => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            secs
        }
        None => std::future::pending().await,
    }
}

/// Feed stderr to the sink line by line, keeping the tail of non-progress
/// output as diagnostics.
async fn drain_stderr<S: StderrSink>(stderr: ChildStderr, mut sink: S) -> (S, Vec<String>) {
    let mut reader = BufReader::new(stderr);
    let mut diagnostics = VecDeque::with_capacity(MAX_DIAGNOSTIC_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        sink.on_line(line);

        if !line.trim().is_empty() && !is_progress_line(line) {
            if diagnostics.len() == MAX_DIAGNOSTIC_LINES {
                diagnostics.pop_front();
            }
            diagnostics.push_back(line.to_string());
        }
    }

    (sink, diagnostics.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .output_args(["-c:v", "libx264", "-crf", "18"]);

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i, "seek must be an input option");
        assert_eq!(args[ss + 1], "10.000");
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_multi_input_order() {
        let cmd = FfmpegCommand::to_output("out.mp4")
            .input(FfmpegInput::new("intro.mp4"))
            .input(FfmpegInput::new("source.mp4").seek(100.0).duration(30.0))
            .input(FfmpegInput::new("ending.mp4"))
            .map("[v]")
            .map("[a]");

        let args = cmd.build_args();
        let inputs: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-i")
            .map(|(idx, _)| &args[idx + 1])
            .collect();
        assert_eq!(inputs, vec!["intro.mp4", "source.mp4", "ending.mp4"]);

        let joined = args.join(" ");
        assert!(joined.contains("-ss 100.000 -t 30.000 -i source.mp4"));
        assert!(joined.contains("-map [v] -map [a]"));
    }

    #[test]
    fn test_progress_flags() {
        let with = FfmpegCommand::new("a.mp4", "b.jpg").build_args();
        assert!(with.contains(&"pipe:2".to_string()));

        let without = FfmpegCommand::new("a.mp4", "b.jpg").without_progress().build_args();
        assert!(!without.contains(&"-progress".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let tools = ToolPaths::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let cmd = FfmpegCommand::new("a.mp4", "b.mp4");
        let result = FfmpegRunner::new(&tools).run(&cmd).await;
        assert!(matches!(result, Err(MediaError::FfmpegNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_process() {
        let (tx, rx) = watch::channel(false);
        let runner = FfmpegRunner::new(&ToolPaths::default()).with_cancel(Some(rx));

        let mut command = Command::new("sleep");
        command.arg("30");

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });

        let started = std::time::Instant::now();
        let result = runner.execute(command, NullSink, false).await;
        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = FfmpegRunner::new(&ToolPaths::default()).with_timeout(Some(1));

        let mut command = Command::new("sleep");
        command.arg("30");

        let result = runner.execute(command, NullSink, false).await;
        assert!(matches!(result, Err(MediaError::Timeout(1))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_keeps_diagnostics() {
        let runner = FfmpegRunner::new(&ToolPaths::default());

        let mut command = Command::new("sh");
        command.args(["-c", "echo 'out_time=00:00:01.000000' >&2; echo 'Invalid data found' >&2; exit 3"]);

        match runner.execute(command, NullSink, false).await {
            Err(MediaError::FfmpegFailed { stderr, exit_code, .. }) => {
                assert_eq!(exit_code, Some(3));
                let stderr = stderr.unwrap();
                assert!(stderr.contains("Invalid data found"));
                assert!(!stderr.contains("out_time"));
            }
            other => panic!("expected FfmpegFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_progress_sink_receives_lines() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let sink = ProgressSink {
            current: FfmpegProgress::default(),
            callback: move |p: FfmpegProgress| seen_cb.lock().unwrap().push(p.out_time_secs),
        };

        let mut command = Command::new("sh");
        command.args([
            "-c",
            "printf 'out_time=00:00:05.000000\\nprogress=continue\\nout_time=00:00:10.000000\\nprogress=end\\n' >&2",
        ]);

        let runner = FfmpegRunner::new(&ToolPaths::default());
        runner.execute(command, sink, false).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![5.0, 10.0]);
    }
}
