//! The remote execution collaborator.
//!
//! The backend's process API is not reimplemented here. [`RemoteExecutor`] is
//! the seam: given a pipeline description and an output path, it returns once
//! a dataset exists at that path, or fails. [`CommandExecutor`] delegates to
//! an external job-runner program. Nothing is retried.

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::pipeline::PipelineDescription;

#[derive(Error, Debug)]
pub enum RemoteExecutionError {
    #[error("Couldn't start job runner '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Couldn't send the pipeline to the job runner: {0}")]
    Stdin(std::io::Error),

    #[error("Couldn't serialise pipeline '{title}': {source}")]
    Serialise {
        title: String,
        source: serde_json::Error,
    },

    #[error("Job '{title}' failed ({status}):\n{stderr}")]
    JobFailed {
        title: String,
        status: String,
        stderr: String,
    },

    #[error("Job '{title}' finished but wrote no result to {path}")]
    MissingOutput { title: String, path: PathBuf },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Interactive OIDC (device code or refresh token).
    #[default]
    Oidc,
    /// OIDC client credentials, provided to the job runner out of band.
    ClientCredentials,
    None,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Oidc => "oidc",
            AuthMethod::ClientCredentials => "client_credentials",
            AuthMethod::None => "none",
        }
    }
}

/// Connection settings for the remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub auth_method: AuthMethod,
    /// Upper bound on the OIDC device-code poll loop.
    pub max_poll_time_secs: u64,
    /// Result file format; also the result file's extension.
    pub output_format: String,
    /// Job-runner program followed by its fixed arguments.
    pub command: Vec<String>,
    /// Passed through to every job.
    pub job_options: IndexMap<String, serde_json::Value>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_method: AuthMethod::Oidc,
            max_poll_time_secs: 30,
            output_format: "nc".to_string(),
            command: vec!["openeo-run-job".to_string()],
            job_options: [("driver-memory".to_string(), serde_json::Value::from("1g"))]
                .into_iter()
                .collect(),
        }
    }
}

pub trait RemoteExecutor {
    /// Run `pipeline` remotely and write its result to `output`.
    fn execute(&self, pipeline: &PipelineDescription, output: &Path)
        -> Result<(), RemoteExecutionError>;
}

/// Runs `command... --backend-url U --auth-method A --max-poll-time S --format F --output P`
/// with the pipeline description as JSON on stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    url: String,
    config: BackendConfig,
}

impl CommandExecutor {
    pub fn new(config: BackendConfig) -> Result<Self, ConfigError> {
        let url = match config.url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.trim_end_matches('/').to_string(),
            _ => return Err(ConfigError::MissingBackendUrl),
        };
        let (program, args) = config.command.split_first().ok_or(ConfigError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            url,
            config,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--backend-url")
            .arg(&self.url)
            .arg("--auth-method")
            .arg(self.config.auth_method.as_str())
            .arg("--max-poll-time")
            .arg(self.config.max_poll_time_secs.to_string())
            .arg("--format")
            .arg(&self.config.output_format)
            .arg("--output")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());
        cmd
    }
}

impl RemoteExecutor for CommandExecutor {
    fn execute(
        &self,
        pipeline: &PipelineDescription,
        output: &Path,
    ) -> Result<(), RemoteExecutionError> {
        let mut pipeline = pipeline.clone();
        for (k, v) in &self.config.job_options {
            pipeline.job_options.entry(k.clone()).or_insert_with(|| v.clone());
        }
        let body =
            serde_json::to_vec(&pipeline).map_err(|source| RemoteExecutionError::Serialise {
                title: pipeline.title.clone(),
                source,
            })?;

        info!("{} - Submitting job to {}", pipeline.title, self.url);
        debug!("Job runner: {} {:?}", self.program, self.args);

        let mut child =
            self.command(output)
                .spawn()
                .map_err(|source| RemoteExecutionError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;
        // Feed stdin from its own thread while stderr is drained here, so a
        // runner that exits without reading its input still gets reported.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&body))
        });
        let result = child
            .wait_with_output()
            .map_err(|source| RemoteExecutionError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let written = match writer {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked"))),
            None => Ok(()),
        };

        if !result.status.success() {
            return Err(RemoteExecutionError::JobFailed {
                title: pipeline.title.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        match written {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                return Err(RemoteExecutionError::Stdin(e))
            }
            Err(_) => debug!("{} - Job runner closed stdin early", pipeline.title),
            Ok(()) => {}
        }
        if !output.is_file() {
            return Err(RemoteExecutionError::MissingOutput {
                title: pipeline.title.clone(),
                path: output.to_path_buf(),
            });
        }
        info!("{} - Job finished, result at {}", pipeline.title, output.display());
        Ok(())
    }
}
