use core::time::Duration;

use bot_core::{
    Session,
    address::{self, AddressKind},
};
use tracing::debug;

/// Upper bound on a group metadata lookup.
pub const GROUP_LOOKUP_TIMEOUT: Duration = Duration::from_millis(400);

/// Whether `address` can receive a relay. Lookup failures count as invalid.
pub async fn is_valid(session: &dyn Session, address: &str) -> bool {
    match address::kind_of(address) {
        AddressKind::Individual => match session.lookup_address(address).await {
            Ok(found) => !found.is_empty(),
            Err(e) => {
                debug!(error = %e, address, "Address lookup failed");
                false
            }
        },
        AddressKind::Group => {
            match tokio::time::timeout(GROUP_LOOKUP_TIMEOUT, session.group_metadata(address)).await
            {
                Ok(Ok(meta)) => meta.is_some(),
                Ok(Err(e)) => {
                    debug!(error = %e, address, "Group metadata lookup failed");
                    false
                }
                Err(_) => {
                    debug!(address, "Group metadata lookup timed out");
                    false
                }
            }
        }
        AddressKind::Other => false,
    }
}
