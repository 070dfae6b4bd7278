//! Object-safe facade over the decision engine.
//!
//! Handlers hold an `Arc<dyn GovernanceApi>` so the router is independent of
//! the port bundle (PostgreSQL in the server, in-memory in tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use steerco_core::governance::{
    Actor, ChainPlan, ChainView, ChangeRequest, DecisionEngine, DecisionOutcome, GovernanceError,
    GovernancePorts, Lane, NewChangeRequest, Outcome,
};
use steerco_shared::types::ChangeRequestId;

/// Governance operations as used by the HTTP layer.
#[async_trait]
pub trait GovernanceApi: Send + Sync {
    /// Creates a change request.
    async fn create(
        &self,
        actor: &Actor,
        input: NewChangeRequest,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError>;

    /// Loads a change request.
    async fn get(&self, actor: &Actor, id: ChangeRequestId)
    -> Result<ChangeRequest, GovernanceError>;

    /// Submits a change for approval.
    async fn submit(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError>;

    /// Records a decision.
    async fn decide(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        decision: DecisionOutcome,
        rationale: &str,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError>;

    /// Sends a submitted change back for rework.
    async fn request_changes(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        note: Option<String>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError>;

    /// Moves a change to another lane.
    async fn move_lane(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        to: Option<Lane>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError>;

    /// Applies a plain edit.
    async fn edit_fields(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        patch: &Map<String, Value>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError>;

    /// Deletes a draft change.
    async fn delete(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequestId>, GovernanceError>;

    /// The active approval chain of a change.
    async fn active_chain(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<Option<ChainView>, GovernanceError>;

    /// The chain a submit would build now.
    async fn preview_chain(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<ChainPlan, GovernanceError>;
}

#[async_trait]
impl<P: GovernancePorts> GovernanceApi for DecisionEngine<P> {
    async fn create(
        &self,
        actor: &Actor,
        input: NewChangeRequest,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        DecisionEngine::create(self, actor, input).await
    }

    async fn get(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<ChangeRequest, GovernanceError> {
        DecisionEngine::get(self, actor, id).await
    }

    async fn submit(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        DecisionEngine::submit(self, actor, id, expected).await
    }

    async fn decide(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        decision: DecisionOutcome,
        rationale: &str,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        DecisionEngine::decide(self, actor, id, decision, rationale, expected).await
    }

    async fn request_changes(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        note: Option<String>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        DecisionEngine::request_changes(self, actor, id, note, expected).await
    }

    async fn move_lane(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        to: Option<Lane>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        DecisionEngine::move_lane(self, actor, id, to, expected).await
    }

    async fn edit_fields(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        patch: &Map<String, Value>,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequest>, GovernanceError> {
        DecisionEngine::edit_fields(self, actor, id, patch, expected).await
    }

    async fn delete(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
        expected: Option<DateTime<Utc>>,
    ) -> Result<Outcome<ChangeRequestId>, GovernanceError> {
        DecisionEngine::delete(self, actor, id, expected).await
    }

    async fn active_chain(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<Option<ChainView>, GovernanceError> {
        DecisionEngine::active_chain(self, actor, id).await
    }

    async fn preview_chain(
        &self,
        actor: &Actor,
        id: ChangeRequestId,
    ) -> Result<ChainPlan, GovernanceError> {
        DecisionEngine::preview_chain(self, actor, id).await
    }
}
