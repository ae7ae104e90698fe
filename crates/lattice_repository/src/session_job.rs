//! Persistence for [`lattice_domain::SessionJob`], the session-scoped
//! mirror of a pipeline job run that tracks `RunAllAsync` invocations.

use async_trait::async_trait;
use lattice_domain::{CoreError, SessionJob, SessionJobState};
use lattice_ids::SessionJobId;

#[async_trait]
pub trait SessionJobRepository: Send + Sync {
    async fn create(&self, job: SessionJob) -> Result<(), CoreError>;
    async fn get(&self, id: &SessionJobId) -> Result<Option<SessionJob>, CoreError>;
    async fn update_state(
        &self,
        id: &SessionJobId,
        state: SessionJobState,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<(), CoreError>;
}
