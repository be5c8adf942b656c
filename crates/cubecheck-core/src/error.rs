use thiserror::Error;

use crate::compare::AssertionFailure;
use crate::config::ConfigError;
use crate::dataset::InvalidDatasetError;
use crate::executor::RemoteExecutionError;
use crate::pipeline::PipelineError;
use crate::reference::ReferenceStoreError;
use crate::scenario::ScenarioError;

/// Every error the library can return.
#[derive(Error, Debug)]
pub enum CubeCheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] InvalidDatasetError),

    #[error(transparent)]
    Reference(#[from] ReferenceStoreError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    RemoteExecution(#[from] RemoteExecutionError),

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
}
