//! The downstream collaborator the engine calls back into: ICMP emission and
//! buffer release live here, not in the engine.

use crate::fragment::Fragment;

/// Host-supplied callbacks invoked by the engine. Mirrors the way `elvis-core`
/// hands collaborators to a protocol as a shared trait object rather than as
/// free functions.
pub trait Notifier: Send + Sync {
    /// A queue expired with its first fragment present; the host should emit
    /// an ICMP "Fragment Reassembly Timeout" referencing it.
    fn on_expiry_notify(&self, fragment: &Fragment);
}

/// A [`Notifier`] that does nothing, for tests and embedders that don't care
/// about expiry notification.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn on_expiry_notify(&self, _fragment: &Fragment) {}
}
