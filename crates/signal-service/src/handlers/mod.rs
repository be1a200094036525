//! HTTP handlers for the REST API.

pub mod messages;
pub mod presence;
pub mod users;

pub use messages::{get_messages, send_message};
pub use presence::get_presence;
pub use users::list_users;

use crate::errors::SignalError;
use common::types::Identity;

/// Identity named in a `/:id` path segment.
///
/// Taken verbatim, like identities from tokens and `register`, so both
/// surfaces route to the same key.
pub(crate) fn path_identity(raw: String) -> Result<Identity, SignalError> {
    let identity = Identity::from(raw);
    if identity.is_blank() {
        return Err(SignalError::BadRequest("User id is required".to_string()));
    }
    Ok(identity)
}
