use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable pointing the host subprocess at the config file.
pub const CONFIG_PATH_VAR: &str = "FEA_CONFIG_PATH";

/// Everything needed to launch the external CAE host, carried as a value
/// instead of ambient process state. The config path still reaches the child
/// through `FEA_CONFIG_PATH`, but only as part of this record.
#[derive(Debug, Clone, PartialEq)]
pub struct HostInvocation {
    pub program: String,
    pub script: PathBuf,
    pub config_path: PathBuf,
    pub working_dir: PathBuf,
}

/// Captured output of a finished host run. Result artifacts (log, output
/// database) are produced by the host itself, outside this system's control.
#[derive(Debug, Clone)]
pub struct HostRunReport {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum HostError {
    /// The host executable is not installed or not on PATH.
    NotFound { program: String },
    /// The subprocess could not be launched for another reason.
    Launch(String),
    /// The host ran and exited non-zero; details live in the host's own log.
    Failed { code: Option<i32> },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::NotFound { program } => {
                write!(f, "'{program}' command not found; is the CAE host installed and on PATH?")
            }
            HostError::Launch(message) => write!(f, "could not launch the CAE host: {message}"),
            HostError::Failed { code: Some(code) } => {
                write!(f, "CAE host exited with status {code}")
            }
            HostError::Failed { code: None } => {
                f.write_str("CAE host was terminated before exiting")
            }
        }
    }
}

impl Error for HostError {}

impl HostInvocation {
    /// Builds the fixed-form invocation: the script's directory becomes the
    /// working directory so the host resolves its artifacts next to it.
    pub fn new(
        program: impl Into<String>,
        script: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
    ) -> Self {
        let script = script.into();
        let working_dir = script
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            program: program.into(),
            script,
            config_path: config_path.into(),
            working_dir,
        }
    }

    fn script_file_name(&self) -> &std::ffi::OsStr {
        self.script.file_name().unwrap_or(self.script.as_os_str())
    }

    /// The fixed command line selecting non-interactive script execution.
    pub fn command_line(&self) -> Vec<String> {
        vec![
            self.program.clone(),
            "cae".to_string(),
            "-script".to_string(),
            self.script_file_name().to_string_lossy().into_owned(),
        ]
    }

    /// Runs the host to completion, blocking without a timeout; an analysis
    /// may legitimately take an arbitrary external duration.
    pub fn invoke(&self) -> Result<HostRunReport, HostError> {
        let output = Command::new(&self.program)
            .arg("cae")
            .arg("-script")
            .arg(self.script_file_name())
            .current_dir(&self.working_dir)
            .env(CONFIG_PATH_VAR, &self.config_path)
            .output();

        let output = match output {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(HostError::NotFound {
                    program: self.program.clone(),
                });
            }
            Err(err) => return Err(HostError::Launch(err.to_string())),
        };

        if !output.status.success() {
            return Err(HostError::Failed {
                code: output.status.code(),
            });
        }

        Ok(HostRunReport {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{HostError, HostInvocation};

    fn invocation(program: &str) -> HostInvocation {
        let dir = std::env::temp_dir();
        HostInvocation::new(
            program,
            dir.join("simulation_runner.jnl"),
            dir.join("config.json"),
        )
    }

    #[test]
    fn command_line_has_the_fixed_script_form() {
        let invocation = invocation("abaqus");
        assert_eq!(
            invocation.command_line(),
            vec!["abaqus", "cae", "-script", "simulation_runner.jnl"]
        );
        assert_eq!(invocation.working_dir, std::env::temp_dir());
    }

    #[test]
    fn missing_executable_is_reported_distinctly() {
        let err = invocation("fea-host-that-does-not-exist")
            .invoke()
            .expect_err("bogus program should not launch");
        match err {
            HostError::NotFound { program } => {
                assert_eq!(program, "fea-host-that-does-not-exist");
            }
            other => panic!("expected not-found error, got {other:?}"),
        }
    }

    #[test]
    fn nonzero_exit_is_a_generic_run_failure() {
        let err = invocation("false")
            .invoke()
            .expect_err("false(1) exits non-zero");
        match err {
            HostError::Failed { code } => assert_eq!(code, Some(1)),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn successful_run_captures_output() {
        let report = invocation("true").invoke().expect("true(1) exits zero");
        assert!(report.stdout.is_empty());
        assert!(report.stderr.is_empty());
    }
}
