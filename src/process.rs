//! Child process execution.
//!
//! Build steps and simulation launches run as out-of-process children
//! through the shell. Output streaming multiplexes stdout/stderr lines and
//! process exit into a single ordered stream: dedicated reader threads
//! forward lines over a channel, the caller drains the channel, and the
//! exit status is only observed after both pipes have closed.
//!
//! There is deliberately no timeout or cancellation path: a hung child
//! blocks the harness indefinitely. Known limitation.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::error::Result;

/// Executes `command` through the shell in `working_dir`.
///
/// With `stream_output`, combined stdout/stderr is forwarded line-by-line
/// to the harness's own stdout until the child terminates; streaming always
/// drains to completion. With `wait`, blocks until exit. Either way a
/// completed child yields `Some(exit_code)`; a nonzero code is a value, not
/// an error. Without either flag the child is left running and `None` is
/// returned.
///
/// Failure to spawn at all is a hard error.
pub fn execute(
    command: &str,
    working_dir: &Path,
    stream_output: bool,
    wait: bool,
) -> Result<Option<i32>> {
    if stream_output {
        return execute_with_sink(command, working_dir, &mut |line| println!("{line}"));
    }

    let mut child = spawn_shell(command, working_dir, false)?;
    if wait {
        let status = child.wait()?;
        Ok(Some(status.code().unwrap_or(-1)))
    } else {
        Ok(None)
    }
}

/// Executes `command`, forwarding every output line to `sink` in arrival
/// order, then reaps the child and returns its exit code.
pub fn execute_with_sink(
    command: &str,
    working_dir: &Path,
    sink: &mut dyn FnMut(&str),
) -> Result<Option<i32>> {
    let mut child = spawn_shell(command, working_dir, true)?;

    let (tx, rx) = mpsc::channel::<String>();
    let readers = [
        child.stdout.take().map(|s| spawn_line_reader(s, tx.clone())),
        child.stderr.take().map(|s| spawn_line_reader(s, tx.clone())),
    ];
    drop(tx);

    // Drains until both pipes hit end-of-stream, which coincides with
    // process termination.
    for line in rx {
        sink(line.trim_end());
    }
    for reader in readers.into_iter().flatten() {
        let _ = reader.join();
    }

    let status = child.wait()?;
    Ok(Some(status.code().unwrap_or(-1)))
}

fn spawn_shell(command: &str, working_dir: &Path, piped: bool) -> Result<Child> {
    let (stdout, stderr) = if piped {
        (Stdio::piped(), Stdio::piped())
    } else {
        (Stdio::null(), Stdio::null())
    };
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()?;
    Ok(child)
}

fn spawn_line_reader(
    stream: impl Read + Send + 'static,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(stream)
            .lines()
            .map_while(std::result::Result::ok)
        {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn cwd() -> PathBuf {
        std::env::temp_dir()
    }

    #[test]
    fn nonzero_exit_code_is_returned_not_raised() {
        let code = execute("exit 3", &cwd(), false, true).unwrap();
        assert_eq!(code, Some(3));
    }

    #[test]
    fn zero_exit_code_on_success() {
        let code = execute("true", &cwd(), false, true).unwrap();
        assert_eq!(code, Some(0));
    }

    #[test]
    fn detached_spawn_returns_no_code() {
        let code = execute("true", &cwd(), false, false).unwrap();
        assert_eq!(code, None);
    }

    #[test]
    fn spawn_failure_is_a_hard_error() {
        let missing = cwd().join("no-such-working-dir");
        assert!(execute("true", &missing, false, true).is_err());
    }

    #[test]
    fn streaming_preserves_line_order_and_exit_code() {
        let mut lines = Vec::new();
        let code = execute_with_sink(
            "printf 'one\\ntwo\\n'; printf 'three\\n'; exit 7",
            &cwd(),
            &mut |line| lines.push(line.to_string()),
        )
        .unwrap();
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(code, Some(7));
    }

    #[test]
    fn streaming_captures_stderr_too() {
        let mut lines = Vec::new();
        let code = execute_with_sink("echo oops >&2", &cwd(), &mut |line| {
            lines.push(line.to_string());
        })
        .unwrap();
        assert_eq!(lines, vec!["oops"]);
        assert_eq!(code, Some(0));
    }
}
