//! Optional build step for sources that publish compiled output.
//!
//! The repository snapshot is unpacked into a scratch directory, the install
//! and run commands are executed in `workdir`, and the outputs are collected
//! with the same rules used for zip assets. Nothing is published unless every
//! step succeeds.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use vcdn_schema::BuildConfig;
use wait_timeout::ChildExt;

use crate::archive::{self, ArchiveError};
use crate::artifact::ArtifactSet;
use crate::rules::{self, RuleError};

/// Lines of command output kept for error messages.
const TAIL_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("snapshot: {0}")]
    Archive(#[from] ArchiveError),

    #[error("workdir '{0}' does not exist in the snapshot")]
    Workdir(String),

    #[error("'{0}' is not installed on this machine")]
    MissingTool(String),

    #[error("failed to start '{step}': {source}")]
    Spawn {
        step: String,
        #[source]
        source: io::Error,
    },

    #[error("'{step}' exited with {}\n{tail}", fmt_status(.status))]
    Failed {
        step: String,
        status: Option<i32>,
        tail: String,
    },

    #[error("'{step}' timed out after {secs}s\n{tail}")]
    TimedOut { step: String, secs: u64, tail: String },

    #[error("outputs: {0}")]
    Rules(#[from] RuleError),

    #[error("build produced no files matching the output rules")]
    NoOutputs,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn fmt_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
}

/// One shell command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program_line: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code; `None` when killed by a signal or on timeout.
    pub status: Option<i32>,
    pub timed_out: bool,
    /// Last lines of combined stdout/stderr.
    pub output_tail: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }
}

/// Executes build commands. Swapped out in tests.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutcome>;

    /// Whether `program` can be found on `PATH`.
    fn has_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Runs commands through `/bin/sh -c` with output captured to a temp file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutcome> {
        let mut log = tempfile::tempfile()?;

        let mut command = Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(&spec.program_line)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?));
        // Own process group; a timeout kills the whole group.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command.spawn()?;

        let (status, timed_out) = match child.wait_timeout(spec.timeout)? {
            Some(status) => (status.code(), false),
            None => {
                warn!(command = %spec.program_line, timeout = ?spec.timeout, "command timed out");
                kill_tree(&mut child)?;
                child.wait()?;
                (None, true)
            }
        };

        Ok(CommandOutcome {
            status,
            timed_out,
            output_tail: read_last_lines(&mut log, TAIL_LINES)?,
        })
    }
}

/// Kill `child` and every process in its group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::other("child pid out of range"))?;
    // SAFETY: signals the process group led by a child we spawned and have not reaped.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Last `n` lines of `file`, reading at most 16KB from the end.
fn read_last_lines(file: &mut File, n: usize) -> io::Result<String> {
    const TAIL_SIZE: u64 = 16 * 1024;

    let len = file.seek(SeekFrom::End(0))?;
    let start = len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(start))?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    let lossy = String::from_utf8_lossy(&raw);
    let buffer: &str = &lossy;

    let content = if start > 0 {
        buffer.find('\n').map_or(buffer, |idx| &buffer[idx + 1..])
    } else {
        buffer
    };

    let lines: Vec<&str> = content.lines().collect();
    let first = lines.len().saturating_sub(n);
    Ok(lines[first..].join("\n"))
}

/// Runs [`BuildConfig`]s against repository snapshots.
#[derive(Clone)]
pub struct BuildStep {
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStep").finish_non_exhaustive()
    }
}

impl Default for BuildStep {
    fn default() -> Self {
        Self::new(Arc::new(ShellRunner))
    }
}

impl BuildStep {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Build `snapshot` (a gzipped tarball) and collect its outputs.
    ///
    /// Blocking; call from `spawn_blocking` inside async code.
    pub fn run(&self, snapshot: &[u8], config: &BuildConfig) -> Result<ArtifactSet, BuildError> {
        let outputs = rules::compile(&config.outputs)?;

        let scratch = tempfile::tempdir()?;
        archive::extract_tar_gz(snapshot, scratch.path())?;
        let top = archive::single_top_level_dir(scratch.path())?;
        let workdir = resolve_workdir(&top, &config.workdir)?;

        let install = match &config.install {
            Some(line) => line.clone(),
            None => {
                if !self.runner.has_program("npm") {
                    return Err(BuildError::MissingTool("npm".into()));
                }
                if workdir.join("package-lock.json").is_file() {
                    "npm ci".to_string()
                } else {
                    "npm install".to_string()
                }
            }
        };

        self.step(&install, &workdir, config)?;
        if let Some(run) = &config.run {
            self.step(run, &workdir, config)?;
        }

        let set = rules::collect_tree(&outputs, &workdir)?;
        if set.is_empty() {
            return Err(BuildError::NoOutputs);
        }
        info!(files = set.len(), "build outputs collected");
        Ok(set)
    }

    fn step(&self, line: &str, cwd: &Path, config: &BuildConfig) -> Result<(), BuildError> {
        let spec = CommandSpec {
            program_line: line.to_string(),
            cwd: cwd.to_path_buf(),
            env: config.env.clone(),
            timeout: config.timeout(),
        };
        debug!(command = line, cwd = %cwd.display(), "running build command");

        let outcome = self.runner.run(&spec).map_err(|source| BuildError::Spawn {
            step: line.to_string(),
            source,
        })?;

        if outcome.timed_out {
            return Err(BuildError::TimedOut {
                step: line.to_string(),
                secs: config.timeout_secs,
                tail: outcome.output_tail,
            });
        }
        if !outcome.success() {
            return Err(BuildError::Failed {
                step: line.to_string(),
                status: outcome.status,
                tail: outcome.output_tail,
            });
        }
        Ok(())
    }
}

fn resolve_workdir(top: &Path, workdir: &str) -> Result<PathBuf, BuildError> {
    let relative = Path::new(workdir);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(BuildError::Workdir(workdir.to_string()));
    }
    let dir = top.join(relative);
    if !dir.is_dir() {
        return Err(BuildError::Workdir(workdir.to_string()));
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::sync::Mutex;
    use vcdn_schema::FileRule;

    type Script = Box<dyn Fn(&CommandSpec) -> CommandOutcome + Send + Sync>;

    struct FakeRunner {
        calls: Mutex<Vec<CommandSpec>>,
        script: Script,
    }

    impl FakeRunner {
        fn new(script: impl Fn(&CommandSpec) -> CommandOutcome + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                script: Box::new(script),
            })
        }

        fn lines(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.program_line.clone())
                .collect()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutcome> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok((self.script)(spec))
        }

        fn has_program(&self, _program: &str) -> bool {
            true
        }
    }

    fn ok() -> CommandOutcome {
        CommandOutcome {
            status: Some(0),
            timed_out: false,
            output_tail: String::new(),
        }
    }

    fn snapshot(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("x-y-abc1234/{name}"), data.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn config(run: Option<&str>) -> BuildConfig {
        BuildConfig {
            enable: true,
            run: run.map(str::to_string),
            outputs: vec![FileRule {
                glob: "dist/*.js".into(),
                rename: None,
                keep_path: false,
            }],
            ..BuildConfig::default()
        }
    }

    #[test]
    fn test_npm_ci_when_lockfile_present() {
        let runner = FakeRunner::new(|spec| {
            if spec.program_line == "npm run build" {
                std::fs::create_dir_all(spec.cwd.join("dist")).unwrap();
                std::fs::write(spec.cwd.join("dist/lib.js"), "built").unwrap();
            }
            ok()
        });
        let step = BuildStep::new(runner.clone());
        let tarball = snapshot(&[("package.json", "{}"), ("package-lock.json", "{}")]);

        let set = step.run(&tarball, &config(Some("npm run build"))).unwrap();
        assert_eq!(runner.lines(), ["npm ci", "npm run build"]);
        assert_eq!(set.files()[0].name, "lib.js");
        assert_eq!(set.files()[0].bytes, b"built");
    }

    #[test]
    fn test_npm_install_without_lockfile_and_no_run() {
        let runner = FakeRunner::new(|spec| {
            std::fs::create_dir_all(spec.cwd.join("dist")).unwrap();
            std::fs::write(spec.cwd.join("dist/a.js"), "a").unwrap();
            ok()
        });
        let step = BuildStep::new(runner.clone());
        step.run(&snapshot(&[("package.json", "{}")]), &config(None))
            .unwrap();
        assert_eq!(runner.lines(), ["npm install"]);
    }

    #[test]
    fn test_failed_command_reports_tail() {
        let runner = FakeRunner::new(|_| CommandOutcome {
            status: Some(1),
            timed_out: false,
            output_tail: "npm ERR! missing script: build".into(),
        });
        let step = BuildStep::new(runner);
        let mut cfg = config(Some("npm run build"));
        cfg.install = Some("true".into());

        let err = step.run(&snapshot(&[("a", "b")]), &cfg).unwrap_err();
        match err {
            BuildError::Failed { step, status, tail } => {
                assert_eq!(step, "true");
                assert_eq!(status, Some(1));
                assert!(tail.contains("missing script"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_workdir() {
        let step = BuildStep::new(FakeRunner::new(|_| ok()));
        let mut cfg = config(None);
        cfg.workdir = "packages/web".into();
        let err = step.run(&snapshot(&[("a", "b")]), &cfg).unwrap_err();
        assert!(matches!(err, BuildError::Workdir(_)));
    }

    #[test]
    fn test_no_outputs_is_an_error() {
        let step = BuildStep::new(FakeRunner::new(|_| ok()));
        let err = step
            .run(&snapshot(&[("package.json", "{}")]), &config(None))
            .unwrap_err();
        assert!(matches!(err, BuildError::NoOutputs));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_exit_code_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hello".to_string());
        let outcome = ShellRunner
            .run(&CommandSpec {
                program_line: "echo $GREETING; echo oops >&2; exit 3".into(),
                cwd: dir.path().to_path_buf(),
                env,
                timeout: Duration::from_secs(30),
            })
            .unwrap();
        assert_eq!(outcome.status, Some(3));
        assert!(!outcome.timed_out);
        assert!(outcome.output_tail.contains("hello"));
        assert!(outcome.output_tail.contains("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ShellRunner
            .run(&CommandSpec {
                program_line: "sleep 5".into(),
                cwd: dir.path().to_path_buf(),
                env: BTreeMap::new(),
                timeout: Duration::from_millis(200),
            })
            .unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let outcome = ShellRunner
            .run(&CommandSpec {
                program_line: format!("sh -c 'sleep 2; touch {}' & wait", marker.display()),
                cwd: dir.path().to_path_buf(),
                env: BTreeMap::new(),
                timeout: Duration::from_millis(300),
            })
            .unwrap();
        assert!(outcome.timed_out);

        std::thread::sleep(Duration::from_secs(3));
        assert!(!marker.exists(), "grandchild outlived the timeout");
    }
}
