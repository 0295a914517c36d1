// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    #[error("unable to build client for {host}:{port}: {message}")]
    ConnectionError {
        host: String,
        port: u16,
        message: String,
    },
    #[error("remote call {call} failed: {message}")]
    RemoteCallError { call: &'static str, message: String },
    #[error("vault is not ready: {0}")]
    NotReady(String),
    #[error("vault is not the cluster leader")]
    NotLeader,
    #[error("no key provided")]
    NoKeyProvided,
    #[error("unable to decrypt key: {0}")]
    DecryptError(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl FleetError {
    pub fn connection(host: &str, port: u16, message: impl ToString) -> Self {
        Self::ConnectionError {
            host: host.to_string(),
            port,
            message: message.to_string(),
        }
    }

    pub fn remote(call: &'static str, message: impl ToString) -> Self {
        Self::RemoteCallError {
            call,
            message: message.to_string(),
        }
    }

    /// Conditions that are normal in a healthy multi-node cluster and are
    /// reported at info level instead of error.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::NotLeader)
    }
}

impl From<serde_yaml::Error> for FleetError {
    fn from(source: serde_yaml::Error) -> Self {
        FleetError::ConfigError(source.to_string())
    }
}

impl From<validator::ValidationErrors> for FleetError {
    fn from(source: validator::ValidationErrors) -> Self {
        FleetError::ValidationError(source.to_string())
    }
}
