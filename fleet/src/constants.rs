// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

pub const DEFAULT_PROTOCOL: &str = "https";
pub const CONFIG_FILE_NAME: &str = ".vault-fleet.yaml";

/// Environment variables honoured by the Vault client, read once at startup.
pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
pub const ENV_VAULT_SKIP_VERIFY: &str = "VAULT_SKIP_VERIFY";

// Vault system API paths
pub const PATH_INIT: &str = "/v1/sys/init";
pub const PATH_SEAL_STATUS: &str = "/v1/sys/seal-status";
pub const PATH_LEADER: &str = "/v1/sys/leader";
pub const PATH_UNSEAL: &str = "/v1/sys/unseal";
pub const PATH_REKEY_INIT: &str = "/v1/sys/rekey/init";
pub const PATH_REKEY_UPDATE: &str = "/v1/sys/rekey/update";

pub const GPG_BINARY: &str = "gpg";
