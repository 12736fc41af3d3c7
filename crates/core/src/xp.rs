//! XP business rules live outside the engine; this is the read/refresh
//! seam.

use async_trait::async_trait;

use crate::errors::Result;
use crate::habits::XpState;

/// XP service contract. The engine reads snapshots to publish alongside
/// award writes and asks for a resync after importing an award from
/// another device; it never computes XP itself.
#[async_trait]
pub trait XpService: Send + Sync {
    /// Current XP snapshot for `user_id`.
    async fn snapshot(&self, user_id: &str) -> Result<XpState>;

    /// Re-pull the shared XP state so multi-device XP never diverges
    /// after importing someone else's award.
    async fn resync(&self, user_id: &str) -> Result<()>;
}
