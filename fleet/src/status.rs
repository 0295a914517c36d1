// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use crate::client::NodeClient;
use crate::models::NodeStatus;

/// Reads the initialization and seal state of a node.
///
/// Both reads are always attempted. An unreadable seal state counts as
/// sealed and an unreadable init state as uninitialized, so callers never act
/// on a false positive. The first failed read is returned in
/// [`NodeStatus::read_error`].
pub async fn get_status(client: &dyn NodeClient) -> NodeStatus {
    let mut read_error = None;

    let initialized = match client.init_status().await {
        Ok(initialized) => initialized,
        Err(err) => {
            tracing::error!(host = %client.address(), error = %err, "unable to read init status");
            read_error = Some(err);
            false
        }
    };

    let sealed = match client.seal_status().await {
        Ok(status) => status.sealed,
        Err(err) => {
            tracing::error!(host = %client.address(), error = %err, "unable to read seal status");
            read_error = read_error.or(Some(err));
            true
        }
    };

    NodeStatus {
        sealed,
        initialized,
        read_error,
    }
}
