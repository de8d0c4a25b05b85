use crate::messaging::types::Sender;

// ============== Authorization ==============

/// Only a user sender whose id matches the configured admin is authorized. Messages sent on
/// behalf of a chat never are, even if an admin wrote them anonymously.
pub fn is_admin(sender: Sender, admin_user_id: i64) -> bool {
    match sender.user_id() {
        Some(id) => id.0 == admin_user_id,
        None => false,
    }
}
