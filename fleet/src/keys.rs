// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use crate::decrypt::Decrypter;
use crate::errors::FleetError;
use crate::models::{Datacenter, ShareKey};

/// Turns a datacenter's configured keys into plaintext shares, in order.
///
/// With `encryption_enabled` unset the configured values are used verbatim.
/// Any decrypt failure aborts resolution for the whole datacenter: no partial
/// key set is ever returned.
#[tracing::instrument(skip_all, fields(datacenter = %datacenter.name, keys = datacenter.keys.len()))]
pub async fn resolve_keys(
    datacenter: &Datacenter,
    decrypter: &dyn Decrypter,
    encryption_enabled: bool,
) -> Result<Vec<ShareKey>, FleetError> {
    let mut resolved = Vec::with_capacity(datacenter.keys.len());

    for key in &datacenter.keys {
        let share = if encryption_enabled {
            decrypter.decrypt(&key.key).await?
        } else {
            ShareKey::new(key.key.as_str())
        };
        resolved.push(share);
    }

    tracing::debug!(resolved = resolved.len(), "resolved keys");

    Ok(resolved)
}
