//! External process execution with line-streamed output.
//!
//! Both stdout and stderr are piped and forwarded into the caller's
//! sink as lines arrive, so pollers see output in near real time. A
//! non-zero exit is a normal result; only a failure to spawn at all is
//! an error.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use ssr_common::ScanError;

/// Exit code reported when a process is terminated by a signal.
const SIGNALED_EXIT: i32 = -1;

/// Run `argv` directly (no shell), forwarding output lines to `sink`.
pub async fn run_command(
    argv: &[String],
    cwd: Option<&Path>,
    sink: &mut (impl FnMut(String) + Send),
) -> Result<i32, ScanError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ScanError::Setup("empty command".to_string()))?;
    let mut command = Command::new(program);
    command.args(args);
    stream(command, argv.join(" "), cwd, sink).await
}

/// Run `script` through `sh -c`.
///
/// Chained commands share one shell session, so environment mutations
/// made by one command are visible to the ones after it.
pub async fn run_shell(
    script: &str,
    cwd: Option<&Path>,
    sink: &mut (impl FnMut(String) + Send),
) -> Result<i32, ScanError> {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    stream(command, script.to_string(), cwd, sink).await
}

async fn stream(
    mut command: Command,
    display: String,
    cwd: Option<&Path>,
    sink: &mut (impl FnMut(String) + Send),
) -> Result<i32, ScanError> {
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| ScanError::Launch {
        command: display,
        source,
    })?;

    // Reader tasks own the pipes and feed a channel; the sink runs on
    // this task only, after each line has already left the process
    // stream. No lock the sink takes can span a blocking read.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx_err = tx.clone();
    match child.stdout.take() {
        Some(stdout) => {
            tokio::spawn(forward_lines(stdout, tx));
        }
        None => drop(tx),
    }
    match child.stderr.take() {
        Some(stderr) => {
            tokio::spawn(forward_lines(stderr, tx_err));
        }
        None => drop(tx_err),
    }

    while let Some(line) = rx.recv().await {
        sink(line);
    }

    let status = child.wait().await?;
    Ok(status.code().unwrap_or(SIGNALED_EXIT))
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_zero() {
        let argv = vec!["echo".to_string(), "hello".to_string()];
        let mut lines = Vec::new();
        let mut sink = |line| lines.push(line);
        let code = run_command(&argv, None, &mut sink).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(lines, vec!["hello"]);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_normal_result() {
        let mut sink = |_line| {};
        let code = run_shell("exit 7", None, &mut sink).await.unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn stderr_lines_reach_the_sink() {
        let mut lines = Vec::new();
        let mut sink = |line| lines.push(line);
        let code = run_shell("echo out; echo err 1>&2", None, &mut sink)
            .await
            .unwrap();
        assert_eq!(code, 0);
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let argv = vec!["ssr-no-such-binary-on-path".to_string()];
        let mut sink = |_line| {};
        let err = run_command(&argv, None, &mut sink).await.unwrap_err();
        assert!(matches!(err, ScanError::Launch { .. }));
    }

    #[tokio::test]
    async fn working_directory_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let mut lines = Vec::new();
        let mut sink = |line| lines.push(line);
        let code = run_shell("pwd", Some(dir.path()), &mut sink).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(lines.len(), 1);
        let reported = std::path::Path::new(&lines[0]).canonicalize().unwrap();
        assert_eq!(reported, expected);
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let mut sink = |_line| {};
        let err = run_command(&[], None, &mut sink).await.unwrap_err();
        assert!(matches!(err, ScanError::Setup(_)));
    }
}
