use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::{fs, io::AsyncWriteExt, process::Command};
use tracing::{debug, error};

use crate::{
    dedent::dedent,
    error::Error,
    types::{ExecutionRequest, ExecutionResult},
    Result,
};

/// Runs lesson snippets and grades their output.
///
/// Every call spawns a fresh interpreter process with its own stdin/stdout
/// pipes and an empty namespace, so nothing leaks between executions and the
/// caller's standard input is never touched.
pub struct CodeRunner {
    /// Absolute path to the interpreter binary
    interpreter: PathBuf,
}

/// Raw capture of one interpreter run, before grading
struct RawRun {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CodeRunner {
    /// Create a runner using the `python3` found on PATH
    pub fn new() -> Result<Self> {
        let interpreter = which::which("python3")
            .map_err(|_| Error::InterpreterNotFound("python3".to_string()))?;
        Ok(Self { interpreter })
    }

    /// Create a runner using an explicit interpreter binary
    pub fn with_interpreter(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Run a snippet and grade its output against the expected answer.
    ///
    /// Never returns an error: every failure, including a failure to spawn
    /// the interpreter, is reported through the result record so the host UI
    /// always has something to render.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        match self.run_snippet(&request).await {
            Ok(run) => grade(run, &request.expected),
            Err(e) => {
                error!("Snippet run failed before producing output: {}", e);
                ExecutionResult::failed(String::new(), e.to_string())
            }
        }
    }

    async fn run_snippet(&self, request: &ExecutionRequest) -> Result<RawRun> {
        // Per-call scratch directory, removed on drop.
        let scratch = tempfile::tempdir()?;
        let source = scratch.path().join("snippet.py");
        fs::write(&source, dedent(&request.code)).await?;

        debug!("Runner execute - Interpreter: {:?}", self.interpreter);
        debug!("Runner execute - Source: {:?}", source);

        // -I runs the snippet isolated from the environment and user
        // site-packages, in a fresh namespace.
        let mut child = Command::new(&self.interpreter)
            .arg("-I")
            .arg(&source)
            .env_clear()
            .env("PATH", "/usr/bin:/bin:/usr/sbin:/sbin")
            .env("HOME", scratch.path())
            .current_dir(scratch.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", self.interpreter.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The snippet may exit without ever reading its input.
            if let Err(e) = stdin.write_all(request.stdin_data.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
            // Explicitly close stdin to signal EOF
            drop(stdin);
        }

        let output = child.wait_with_output().await?;

        Ok(RawRun {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn grade(run: RawRun, expected: &str) -> ExecutionResult {
    if !run.status.success() {
        let diagnostic = failure_excerpt(&run.stderr, run.status);
        return ExecutionResult::failed(run.stdout, diagnostic);
    }
    let ok = output_matches(run.stdout.trim(), expected.trim());
    ExecutionResult::passed(ok, run.stdout)
}

/// Fallback matching rules: the full trimmed output, the last non-blank
/// line, or the last non-blank line's suffix may equal the expected text.
///
/// The last two rules are lenient on purpose so a snippet that prints
/// progress lines or a `Answer: 42` style label still passes.
fn output_matches(output: &str, expected: &str) -> bool {
    if output == expected {
        return true;
    }
    let last = last_non_blank_line(output);
    last == expected || last.ends_with(expected)
}

fn last_non_blank_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(str::trim)
        .unwrap_or("")
}

/// Reduce an interpreter traceback to a single-frame excerpt: the header,
/// the outermost frame with its source echo, and the exception message.
/// Anything that does not look like a traceback passes through trimmed, and
/// an empty stderr falls back to the exit status so the diagnostic is never
/// empty.
fn failure_excerpt(stderr: &str, status: ExitStatus) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return format!("Process exited with status: {}", status);
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    let header = match lines
        .iter()
        .position(|line| line.starts_with("Traceback (most recent call last):"))
    {
        Some(i) => i,
        None => return trimmed.to_string(),
    };

    let mut excerpt = vec![lines[header]];
    let mut i = header + 1;
    if i < lines.len() && lines[i].trim_start().starts_with("File ") {
        excerpt.push(lines[i]);
        i += 1;
        // Source echo and caret markers under the frame
        while i < lines.len() && lines[i].starts_with("    ") {
            excerpt.push(lines[i]);
            i += 1;
        }
    }
    if i < lines.len() {
        excerpt.push(lines[lines.len() - 1]);
    }
    excerpt.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[test]
    fn exact_output_matches() {
        assert!(output_matches("hello", "hello"));
        assert!(!output_matches("hella", "hello"));
    }

    #[test]
    fn last_line_of_multi_line_output_matches() {
        assert!(output_matches("step1\nstep2\ndone", "done"));
    }

    #[test]
    fn last_line_suffix_matches() {
        assert!(output_matches("Answer: 42", "42"));
        assert!(output_matches("warming up\nAnswer: 42", "42"));
    }

    #[test]
    fn earlier_line_does_not_match() {
        assert!(!output_matches("done\nextra", "done"));
    }

    #[test]
    fn last_non_blank_line_skips_trailing_blanks() {
        assert_eq!(last_non_blank_line("a\nb\n\n   \n"), "b");
        assert_eq!(last_non_blank_line(""), "");
    }

    #[cfg(unix)]
    #[test]
    fn traceback_is_reduced_to_one_frame() {
        let stderr = concat!(
            "Traceback (most recent call last):\n",
            "  File \"/tmp/scratch/snippet.py\", line 4, in <module>\n",
            "    main()\n",
            "  File \"/tmp/scratch/snippet.py\", line 2, in main\n",
            "    return 1 / 0\n",
            "ZeroDivisionError: division by zero\n",
        );
        let excerpt = failure_excerpt(stderr, exit_status(1));
        assert!(excerpt.starts_with("Traceback (most recent call last):"));
        assert!(excerpt.contains("line 4, in <module>"));
        assert!(!excerpt.contains("line 2, in main"));
        assert!(excerpt.ends_with("ZeroDivisionError: division by zero"));
    }

    #[cfg(unix)]
    #[test]
    fn syntax_error_stderr_passes_through() {
        let stderr = concat!(
            "  File \"/tmp/scratch/snippet.py\", line 1\n",
            "    def (\n",
            "        ^\n",
            "SyntaxError: invalid syntax\n",
        );
        let excerpt = failure_excerpt(stderr, exit_status(1));
        assert!(excerpt.contains("SyntaxError: invalid syntax"));
    }

    #[cfg(unix)]
    #[test]
    fn empty_stderr_falls_back_to_exit_status() {
        let excerpt = failure_excerpt("", exit_status(1));
        assert!(!excerpt.is_empty());
        assert!(excerpt.contains("exited with status"));
    }

    #[cfg(unix)]
    #[test]
    fn failed_run_keeps_partial_output() {
        let run = RawRun {
            status: exit_status(1),
            stdout: "before\n".to_string(),
            stderr: "ValueError: boom\n".to_string(),
        };
        let result = grade(run, "before");
        assert!(!result.ok);
        assert_eq!(result.output, "before\n");
        assert_eq!(result.error, "ValueError: boom");
    }
}
