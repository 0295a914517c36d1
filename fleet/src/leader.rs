// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use crate::client::NodeClient;
use crate::errors::FleetError;
use crate::status::get_status;

/// Asks a node whether it is currently the active node of its cluster.
///
/// An unreadable answer counts as "not leader".
pub async fn is_leader(client: &dyn NodeClient) -> bool {
    match client.leader().await {
        Ok(leader) => {
            tracing::debug!(
                host = %client.address(),
                is_self = leader.is_self,
                ha_enabled = leader.ha_enabled,
                leader_address = %leader.leader_address,
                "leader lookup"
            );
            leader.is_self
        }
        Err(err) => {
            tracing::error!(host = %client.address(), error = %err, "unable to look up leader");
            false
        }
    }
}

/// Guard for rekey operations: the node must be initialized, unsealed and the
/// cluster leader. Checked once per host per invocation.
///
/// # Errors
///
/// - The failed status read, when the node could not be asked at all
/// - [`FleetError::NotReady`] when the node is uninitialized or sealed
/// - [`FleetError::NotLeader`] when another node is active
pub async fn check_rekey_gate(client: &dyn NodeClient) -> Result<(), FleetError> {
    let status = get_status(client).await;
    let (ready, reason) = status.readiness();
    if !ready {
        return Err(status
            .read_error
            .unwrap_or_else(|| FleetError::NotReady(reason.to_string())));
    }

    if !is_leader(client).await {
        return Err(FleetError::NotLeader);
    }

    Ok(())
}
