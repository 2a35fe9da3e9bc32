//! Tcpdump process wrapper.
//!
//! Runs tcpdump against a capture file as a child process via
//! `tokio::process::Command` and exposes its stdout as a line stream.
//! Stderr is forwarded to the log, minus the "reading from file" banner.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use pcaproute_core::CaptureFilter;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use crate::error::{ExtractError, Result};

/// Stderr prefix tcpdump prints for every `-r` invocation.
const INFORMATIONAL_PREFIX: &str = "reading from file";

type LineReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Anything that can replay a capture file through a filter.
pub trait CaptureSource {
    /// Start one pass over the capture, selecting packets with `filter`.
    fn open(&self, filter: CaptureFilter) -> impl Future<Output = Result<CaptureLines>>;
}

/// Lines produced by one capture-tool invocation.
///
/// Finite and single-pass: once `next_line` returns `None` the stream is
/// exhausted and the child process has been reaped.
pub struct CaptureLines {
    filter: CaptureFilter,
    lines: Lines<LineReader>,
    child: Option<Child>,
    diagnostics: Option<JoinHandle<()>>,
    produced: u64,
    finished: bool,
}

impl CaptureLines {
    /// Wrap an already-buffered reader. No process is attached.
    pub fn from_reader<R>(filter: CaptureFilter, reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let reader: LineReader = Box::new(reader);
        Self {
            filter,
            lines: reader.lines(),
            child: None,
            diagnostics: None,
            produced: 0,
            finished: false,
        }
    }

    /// Next line of tool output, or `None` once the stream has ended.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }

        match self.lines.next_line().await {
            Ok(Some(line)) => {
                self.produced += 1;
                Ok(Some(line))
            }
            Ok(None) => {
                self.finished = true;
                self.reap().await?;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(ExtractError::ToolRead {
                    filter: self.filter.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Drain the stream, returning how many lines it produced.
    pub async fn count(mut self) -> Result<u64> {
        while self.next_line().await?.is_some() {}
        Ok(self.produced)
    }

    async fn reap(&mut self) -> Result<()> {
        if let Some(task) = self.diagnostics.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Capture diagnostics task failed");
            }
        }

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().await.map_err(|e| ExtractError::ToolRead {
            filter: self.filter.to_string(),
            source: e,
        })?;

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            if self.produced == 0 {
                return Err(ExtractError::ToolFailed {
                    filter: self.filter.to_string(),
                    code,
                });
            }
            tracing::warn!(
                filter = %self.filter,
                code,
                lines = self.produced,
                "Capture tool exited with failure after producing output"
            );
        }

        Ok(())
    }
}

/// Reads a capture file with the tcpdump binary.
pub struct TcpdumpSource {
    tcpdump_path: String,
    capture_file: PathBuf,
}

impl TcpdumpSource {
    pub fn new(tcpdump_path: &str, capture_file: impl AsRef<Path>) -> Self {
        Self {
            tcpdump_path: tcpdump_path.to_string(),
            capture_file: capture_file.as_ref().to_path_buf(),
        }
    }

    /// Verify tcpdump is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.tcpdump_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| ExtractError::ToolInvocation {
                tool: self.tcpdump_path.clone(),
                source: e,
            })?;

        // Older builds print the version banner on stderr only.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        let banner = String::from_utf8_lossy(&banner);
        Ok(banner.lines().next().unwrap_or_default().to_string())
    }

    fn command(&self, filter: CaptureFilter) -> Command {
        let mut cmd = Command::new(&self.tcpdump_path);
        cmd.arg("-r")
            .arg(&self.capture_file)
            .arg("-nn")
            .args(filter.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl CaptureSource for TcpdumpSource {
    async fn open(&self, filter: CaptureFilter) -> Result<CaptureLines> {
        tracing::debug!(
            tool = %self.tcpdump_path,
            file = %self.capture_file.display(),
            filter = %filter,
            "Starting capture pass"
        );

        // TODO: a hung tcpdump stalls the whole run; there is no per-pass
        // deadline or cancellation yet.
        let mut child = self
            .command(filter)
            .spawn()
            .map_err(|e| ExtractError::ToolInvocation {
                tool: self.tcpdump_path.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ExtractError::ToolInvocation {
            tool: self.tcpdump_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
        })?;

        let diagnostics = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_diagnostics(stderr, filter)));

        let mut lines = CaptureLines::from_reader(filter, BufReader::new(stdout));
        lines.child = Some(child);
        lines.diagnostics = diagnostics;
        Ok(lines)
    }
}

/// Whether a stderr line is tcpdump's routine banner rather than a problem.
pub fn is_informational(line: &str) -> bool {
    line.starts_with(INFORMATIONAL_PREFIX)
}

async fn forward_diagnostics(stderr: ChildStderr, filter: CaptureFilter) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_informational(&line) => {
                tracing::debug!(filter = %filter, "{line}");
            }
            Ok(Some(line)) => {
                tracing::warn!(filter = %filter, "tcpdump: {line}");
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(filter = %filter, error = %e, "Failed reading tcpdump stderr");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_reader_lines_in_order() {
        let text = "first\nsecond\nthird\n";
        let mut lines =
            CaptureLines::from_reader(CaptureFilter::Summary, Cursor::new(text.as_bytes().to_vec()));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("third"));
        assert_eq!(lines.next_line().await.unwrap(), None);
        // Exhausted streams stay exhausted.
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_count_lines() {
        let lines = CaptureLines::from_reader(
            CaptureFilter::Dns,
            Cursor::new(b"a\nb\n".to_vec()),
        );
        assert_eq!(lines.count().await.unwrap(), 2);
    }

    #[test]
    fn test_informational_prefix() {
        assert!(is_informational(
            "reading from file capture.pcap, link-type EN10MB (Ethernet), snapshot length 262144"
        ));
        assert!(!is_informational("tcpdump: bad file format"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_invocation_error() {
        let source = TcpdumpSource::new("/nonexistent/bin/tcpdump", "capture.pcap");
        let err = source.open(CaptureFilter::Summary).await.err().unwrap();
        assert!(matches!(err, ExtractError::ToolInvocation { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_failing_without_output_is_fatal() {
        // `false` ignores its arguments and exits 1 without output.
        let source = TcpdumpSource::new("false", "capture.pcap");
        let lines = source.open(CaptureFilter::Summary).await.unwrap();
        let err = lines.count().await.unwrap_err();
        assert!(matches!(err, ExtractError::ToolFailed { code: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_succeeding_without_output_is_empty() {
        let source = TcpdumpSource::new("true", "capture.pcap");
        let lines = source.open(CaptureFilter::Dns).await.unwrap();
        assert_eq!(lines.count().await.unwrap(), 0);
    }
}
