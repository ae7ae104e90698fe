//! Grant lookup: `(principal, securable_ref, privilege) -> bool`, with
//! transitive group expansion folded into the implementation.

use async_trait::async_trait;
use lattice_domain::{CoreError, Privilege};
use lattice_ids::SecurableId;

/// Effective-privilege queries the rewriter consults before touching a
/// securable. "Effective" means the union over the principal and every
/// group transitively containing it (§3) — that expansion happens inside
/// the implementation, not in the trait surface.
#[async_trait]
pub trait GrantRepository: Send + Sync {
    /// Does `principal_name` hold `privilege` on `securable`, directly or
    /// via group membership?
    async fn has_privilege(
        &self,
        principal_name: &str,
        securable: &SecurableId,
        privilege: Privilege,
    ) -> Result<bool, CoreError>;

    /// `is_admin` is typically read straight off the authenticated
    /// principal rather than this repository, but callers that only hold a
    /// principal name (e.g. the cron dispatcher firing as a pipeline's
    /// creator) can consult this to re-derive it.
    async fn is_admin(&self, principal_name: &str) -> Result<bool, CoreError>;
}
