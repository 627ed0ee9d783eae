use anyhow::{Context, Result};
use codetidy_core::Language;
use std::fs;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub timeout: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

pub fn unsupported_message(language: Language) -> String {
    format!("language '{language}' is not supported for test execution yet")
}

/// Import line prepended to JavaScript test files. Entry points are the
/// exported names the tests exercise; without any, the whole module is bound.
pub fn import_line(entry_points: &[String]) -> String {
    if entry_points.is_empty() {
        "const main = require('./main');\n\n".to_string()
    } else {
        format!(
            "const {{ {} }} = require('./main');\n\n",
            entry_points.join(", ")
        )
    }
}

/// Writes the code and tests into a scratch directory, runs the language
/// interpreter on the test file, and returns captured stdout followed by
/// stderr. The directory is removed when this returns. Exit status is not
/// surfaced; only the captured text is.
pub fn run_tests(
    language: Language,
    code: &str,
    tests: &str,
    entry_points: &[String],
    limits: &RunLimits,
) -> Result<String> {
    let (Some(interpreter), Some(code_name), Some(test_name)) = (
        language.interpreter(),
        language.source_file_name(),
        language.test_file_name(),
    ) else {
        return Ok(unsupported_message(language));
    };

    let dir = tempdir().context("failed creating scratch directory")?;
    let code_path = dir.path().join(code_name);
    let test_path = dir.path().join(test_name);

    fs::write(&code_path, code)
        .with_context(|| format!("failed writing {}", code_path.display()))?;
    let test_body = match language {
        Language::Javascript => format!("{}{}", import_line(entry_points), tests),
        _ => tests.to_string(),
    };
    fs::write(&test_path, test_body)
        .with_context(|| format!("failed writing {}", test_path.display()))?;

    let mut cmd = Command::new(interpreter);
    cmd.arg(&test_path).current_dir(dir.path());
    capture_child(cmd, limits.timeout)
}

fn capture_child(mut cmd: Command, timeout: Duration) -> Result<String> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed spawning {program}"))?;
    let stdout = child.stdout.take().context("child stdout was not piped")?;
    let stderr = child.stderr.take().context("child stderr was not piped")?;

    // Drain both pipes off-thread so a chatty child cannot deadlock on a
    // full pipe buffer while we poll for exit.
    let out_thread = thread::spawn(move || read_all(stdout));
    let err_thread = thread::spawn(move || read_all(stderr));

    let started = Instant::now();
    let mut timed_out = false;
    loop {
        match child
            .try_wait()
            .with_context(|| format!("failed waiting for {program}"))?
        {
            Some(_) => break,
            None => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    timed_out = true;
                    break;
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }

    let stdout_text = out_thread.join().unwrap_or_default();
    let stderr_text = err_thread.join().unwrap_or_default();
    let mut combined = format!("{stdout_text}{stderr_text}");
    if timed_out {
        combined.push_str(&format!(
            "\n[codetidy] test run exceeded {}s and was killed\n",
            timeout.as_secs()
        ));
    }
    Ok(combined)
}

fn read_all(mut source: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = source.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::{RunLimits, capture_child, import_line, run_tests, unsupported_message};
    use codetidy_core::Language;
    use std::process::Command;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn unsupported_language_returns_message_without_running() {
        let out = run_tests(
            Language::Java,
            "class A {}",
            "class ATest {}",
            &[],
            &RunLimits::default(),
        )
        .expect("must not error");
        assert!(out.contains("java"));
        assert!(out.contains("not supported"));
    }

    #[test]
    fn default_import_binds_whole_module() {
        assert_eq!(import_line(&[]), "const main = require('./main');\n\n");
    }

    #[test]
    fn declared_entry_points_are_destructured() {
        let line = import_line(&["fibonacci".to_string(), "memo".to_string()]);
        assert_eq!(line, "const { fibonacci, memo } = require('./main');\n\n");
    }

    #[test]
    fn stdout_is_returned_exactly_when_stderr_is_empty() {
        let out = capture_child(sh("printf 'OK\\n'"), Duration::from_secs(5))
            .expect("capture should pass");
        assert_eq!(out, "OK\n");
    }

    #[test]
    fn stdout_precedes_stderr() {
        let out = capture_child(
            sh("printf out; printf err >&2"),
            Duration::from_secs(5),
        )
        .expect("capture should pass");
        assert_eq!(out, "outerr");
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let out = capture_child(sh("printf failing; exit 3"), Duration::from_secs(5))
            .expect("capture should pass");
        assert_eq!(out, "failing");
    }

    #[test]
    fn hung_child_is_killed_at_the_timeout() {
        let started = Instant::now();
        let out = capture_child(sh("sleep 30"), Duration::from_millis(200))
            .expect("capture should pass");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(out.contains("was killed"));
    }

    #[test]
    fn unsupported_message_names_the_language() {
        assert!(unsupported_message(Language::Cpp).contains("c++"));
    }

    #[test]
    #[ignore]
    fn python_tests_run_end_to_end_if_enabled() {
        if std::env::var("CODETIDY_RUN_INTERPRETER_TESTS").ok().as_deref() != Some("1") {
            return;
        }

        let out = run_tests(
            Language::Python,
            "def double(x):\n    return x * 2\n",
            "from main import double\nassert double(2) == 4\nprint('OK')\n",
            &[],
            &RunLimits::default(),
        )
        .expect("run should pass");
        assert!(out.contains("OK"));
    }
}
