//! The plugin invoker: runs a local check plugin as a shell command and
//! captures its exit code plus a single line of output.
//!
//! Mirrors `dnxPlugin.c`'s `pfopen`/`pfclose`-plus-`select` approach,
//! translated into safe Rust: instead of a raw `select(2)` over two pipe
//! file descriptors, each pipe gets its own reader thread draining into
//! a channel, and the invoker blocks on `recv_timeout` against whichever
//! channel produces first. Polling stdout's channel before stderr's
//! preserves `dnxPlugin.c`'s "stdout wins when both are ready" ordering
//! (`FD_ISSET(p_out, ...)` was checked first there too).

use std::io::{BufRead, BufReader};
use std::os::unix::process::CommandExt as _;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::warn;

pub const EXIT_OK: i32 = 0;
pub const EXIT_WARNING: i32 = 1;
pub const EXIT_CRITICAL: i32 = 2;
pub const EXIT_UNKNOWN: i32 = 3;

const VALID_EXIT_CODES: [i32; 4] = [EXIT_OK, EXIT_WARNING, EXIT_CRITICAL, EXIT_UNKNOWN];

const NO_OUTPUT: &str = "(DNX: No output!)";
const TIMEOUT_OUTPUT: &str = "(DNX: Plugin Timeout)";

pub struct PluginOutput {
    pub exit_code: i32,
    pub output: String,
    pub elapsed: Duration,
}

/// Forks `/bin/sh -c <command line>`, in its own process group, with
/// stdout/stderr piped back.
pub struct PluginInvoker {
    /// Optional absolute prefix; when set, argv[0]'s basename is rewritten
    /// to `<plugin_path>/<basename>` before exec.
    plugin_path: Option<String>,
}

impl PluginInvoker {
    pub fn new(plugin_path: impl Into<Option<String>>) -> Self {
        let plugin_path = plugin_path.into().filter(|p| !p.is_empty());
        PluginInvoker { plugin_path }
    }

    pub fn invoke(&self, command_line: &str, timeout: Duration) -> PluginOutput {
        let start = Instant::now();
        let rewritten = self.rewrite_command(command_line);

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&rewritten)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so a timeout can SIGTERM every descendant the
        // shell spawned, not just the shell itself.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                warn!("plugin invoker: failed to spawn {rewritten}: {e}");
                return PluginOutput {
                    exit_code: EXIT_UNKNOWN,
                    output: format!("(DNX: exec failed: {e})"),
                    elapsed: start.elapsed(),
                };
            }
        };

        let pgid = child.id() as i32;
        let stdout_rx = spawn_line_drain(child.stdout.take().expect("stdout is piped"));
        let stderr_rx = spawn_line_drain(child.stderr.take().expect("stderr is piped"));

        let deadline = start + timeout;
        let (timed_out, output) = Self::drain_both(&stdout_rx, &stderr_rx, deadline);

        if timed_out {
            kill_process_group(pgid);
            let _ = child.wait();
            return PluginOutput {
                exit_code: EXIT_UNKNOWN,
                output: TIMEOUT_OUTPUT.to_string(),
                elapsed: start.elapsed(),
            };
        }

        let status = child.wait();
        let elapsed = start.elapsed();
        let output = output.unwrap_or_else(|| NO_OUTPUT.to_string());

        let raw_code = match status {
            Ok(s) => s.code().unwrap_or(EXIT_UNKNOWN),
            Err(e) => {
                warn!("plugin invoker: wait() failed: {e}");
                EXIT_UNKNOWN
            }
        };

        if VALID_EXIT_CODES.contains(&raw_code) {
            PluginOutput {
                exit_code: raw_code,
                output,
                elapsed,
            }
        } else {
            PluginOutput {
                exit_code: EXIT_UNKNOWN,
                output: format!("[EC {raw_code}] {output}"),
                elapsed,
            }
        }
    }

    /// Drains stdout first; falls back to stderr (tagged `[STDERR]`) only
    /// if stdout closed with nothing. Returns `(timed_out, output)`;
    /// `output` is `None` when both pipes closed without producing a
    /// line (not a timeout - a genuinely silent plugin).
    fn drain_both(
        stdout_rx: &Receiver<String>,
        stderr_rx: &Receiver<String>,
        deadline: Instant,
    ) -> (bool, Option<String>) {
        match recv_until(stdout_rx, deadline) {
            DrainOutcome::Line(line) => (false, Some(line)),
            DrainOutcome::TimedOut => (true, None),
            DrainOutcome::ClosedEmpty => match recv_until(stderr_rx, deadline) {
                DrainOutcome::Line(line) => (false, Some(format!("[STDERR] {line}"))),
                DrainOutcome::TimedOut => (true, None),
                DrainOutcome::ClosedEmpty => (false, None),
            },
        }
    }

    fn rewrite_command(&self, command_line: &str) -> String {
        let Some(prefix) = &self.plugin_path else {
            return command_line.to_string();
        };
        match command_line.split_once(char::is_whitespace) {
            Some((first, rest)) => format!("{prefix}/{} {rest}", basename(first)),
            None => format!("{prefix}/{}", basename(command_line)),
        }
    }
}

fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

enum DrainOutcome {
    Line(String),
    /// The channel disconnected (reader thread hit EOF) without ever
    /// sending a line.
    ClosedEmpty,
    TimedOut,
}

fn recv_until(rx: &Receiver<String>, deadline: Instant) -> DrainOutcome {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(line) => DrainOutcome::Line(line),
        Err(RecvTimeoutError::Disconnected) => DrainOutcome::ClosedEmpty,
        Err(RecvTimeoutError::Timeout) => DrainOutcome::TimedOut,
    }
}

/// Spawns a thread that reads `pipe` line by line, forwards the first
/// non-empty line, then keeps reading (and discarding) until EOF so the
/// child is never blocked writing into a full pipe buffer.
fn spawn_line_drain<R: std::io::Read + Send + 'static>(pipe: R) -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        let mut sent = false;
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if !sent && !line.is_empty() {
                sent = true;
                if tx.send(line).is_err() {
                    break;
                }
            }
        }
    });
    rx
}

fn kill_process_group(pgid: i32) {
    // SAFETY: `kill` takes only plain integers and performs no memory
    // access on our side; a negative pid targets the whole group.
    unsafe {
        libc::kill(-pgid, libc::SIGTERM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_first_stdout_line() {
        let invoker = PluginInvoker::new(None);
        let out = invoker.invoke("echo hello; echo world", Duration::from_secs(5));
        assert_eq!(out.exit_code, EXIT_OK);
        assert_eq!(out.output, "hello");
    }

    #[test]
    fn falls_back_to_stderr_when_stdout_empty() {
        let invoker = PluginInvoker::new(None);
        let out = invoker.invoke(">&2 echo oops", Duration::from_secs(5));
        assert_eq!(out.output, "[STDERR] oops");
    }

    #[test]
    fn reports_no_output_when_both_pipes_are_silent() {
        let invoker = PluginInvoker::new(None);
        let out = invoker.invoke("true", Duration::from_secs(5));
        assert_eq!(out.exit_code, EXIT_OK);
        assert_eq!(out.output, NO_OUTPUT);
    }

    #[test]
    fn out_of_range_exit_code_is_replaced_with_unknown() {
        let invoker = PluginInvoker::new(None);
        let out = invoker.invoke("echo weird; exit 17", Duration::from_secs(5));
        assert_eq!(out.exit_code, EXIT_UNKNOWN);
        assert_eq!(out.output, "[EC 17] weird");
    }

    #[test]
    fn timeout_kills_the_process_group_and_reports_unknown() {
        let invoker = PluginInvoker::new(None);
        let out = invoker.invoke("sleep 30", Duration::from_millis(200));
        assert_eq!(out.exit_code, EXIT_UNKNOWN);
        assert_eq!(out.output, TIMEOUT_OUTPUT);
        assert!(out.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn rewrites_argv0_basename_under_plugin_path() {
        let invoker = PluginInvoker::new(Some("/usr/lib/plugins".to_string()));
        let rewritten = invoker.rewrite_command("/opt/nagios/check_disk -w 80 -c 90");
        assert_eq!(rewritten, "/usr/lib/plugins/check_disk -w 80 -c 90");
    }

    #[test]
    fn leaves_command_unchanged_without_plugin_path() {
        let invoker = PluginInvoker::new(None);
        assert_eq!(invoker.rewrite_command("check_disk -w 80"), "check_disk -w 80");
    }
}
