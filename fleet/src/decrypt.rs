// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Decryption of at-rest key material.
//!
//! When encryption is enabled, each configured key is base64 encoded GPG
//! ciphertext. [`GpgDecrypter`] pipes the decoded bytes through the local
//! `gpg` binary, so the operator's agent and keyring are used as-is.
//!
//! # Security
//!
//! - Decrypted output is moved straight into a [`ShareKey`], which is
//!   zeroized on drop
//! - Intermediate buffers holding plaintext are zeroized on every path

use std::process::Stdio;

use async_trait::async_trait;
use data_encoding::BASE64;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use zeroize::Zeroize;

use crate::constants::GPG_BINARY;
use crate::errors::FleetError;
use crate::models::ShareKey;

/// Turns one configured ciphertext into a plaintext key share.
#[async_trait]
pub trait Decrypter: Send + Sync {
    async fn decrypt(&self, ciphertext: &str) -> Result<ShareKey, FleetError>;
}

pub struct GpgDecrypter {
    binary: String,
    major_version: OnceCell<u32>,
}

impl Default for GpgDecrypter {
    fn default() -> Self {
        Self::new()
    }
}

impl GpgDecrypter {
    pub fn new() -> Self {
        Self::with_binary(GPG_BINARY)
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            major_version: OnceCell::new(),
        }
    }

    /// GnuPG major version, detected once. Falls back to 1.x options.
    async fn major_version(&self) -> u32 {
        *self
            .major_version
            .get_or_init(|| async {
                match self.detect_major_version().await {
                    Ok(version) => version,
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "unable to determine gpg version, defaulting to gpg 1 options"
                        );
                        1
                    }
                }
            })
            .await
    }

    async fn detect_major_version(&self) -> Result<u32, String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|err| format!("error running {} --version: {err}", self.binary))?;

        if !output.status.success() {
            return Err(format!("{} --version exited with {}", self.binary, output.status));
        }

        parse_major_version(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| "could not determine gpg major version".to_string())
    }

    fn decrypt_args(major_version: u32) -> &'static [&'static str] {
        if major_version >= 2 {
            &["--decrypt", "--quiet", "--pinentry-mode", "loopback"]
        } else {
            &["--decrypt", "--quiet"]
        }
    }
}

/// Extracts the major version from the first line of `gpg --version`,
/// e.g. `gpg (GnuPG) 2.2.5`.
pub fn parse_major_version(output: &str) -> Option<u32> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .last()?
        .split('.')
        .next()?
        .parse()
        .ok()
}

#[async_trait]
impl Decrypter for GpgDecrypter {
    #[tracing::instrument(skip(self, ciphertext))]
    async fn decrypt(&self, ciphertext: &str) -> Result<ShareKey, FleetError> {
        let mut encrypted = BASE64
            .decode(ciphertext.trim().as_bytes())
            .map_err(|err| FleetError::DecryptError(format!("unable to base64 decode key: {err}")))?;

        let major_version = self.major_version().await;
        tracing::debug!(major_version, "using gpg decrypt");

        let mut child = Command::new(&self.binary)
            .args(Self::decrypt_args(major_version))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| FleetError::DecryptError(format!("error running {}: {err}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin.write_all(&encrypted).await;
            drop(stdin);
            written.map_err(|err| {
                FleetError::DecryptError(format!("unable to write to {}: {err}", self.binary))
            })?;
        }
        encrypted.zeroize();

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| FleetError::DecryptError(format!("error waiting on {}: {err}", self.binary)))?;

        let mut stdout = output.stdout;
        if !output.status.success() {
            stdout.zeroize();
            return Err(FleetError::DecryptError(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut plaintext = match String::from_utf8(stdout) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                let mut bytes = err.into_bytes();
                bytes.zeroize();
                return Err(FleetError::DecryptError(
                    "decrypted key is not valid UTF-8".to_string(),
                ));
            }
        };

        let key = ShareKey::new(plaintext.trim_end_matches(['\r', '\n']));
        plaintext.zeroize();

        Ok(key)
    }
}
