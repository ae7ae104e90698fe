//! Append-only audit insert. No read API is consumed by the core (§6).

use async_trait::async_trait;
use lattice_domain::AuditEntry;

/// Audit inserts are best-effort: failures are logged, never propagated
/// (§4.4, §7). Accordingly this trait has no `Result` in its signature —
/// an implementation swallows its own errors after logging them, so
/// callers never need a failure branch.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}
