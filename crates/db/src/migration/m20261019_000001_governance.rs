//! Governance schema migration.
//!
//! Creates the change-request, approval-rule, approver-group, approval-chain
//! and audit tables together with their enums and integrity constraints.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: CHANGE REQUESTS
        // ============================================================
        db.execute_unprepared(CHANGE_REQUESTS_SQL).await?;

        // ============================================================
        // PART 3: APPROVERS, GROUPS & RULES
        // ============================================================
        db.execute_unprepared(APPROVERS_SQL).await?;
        db.execute_unprepared(APPROVAL_GROUPS_SQL).await?;
        db.execute_unprepared(APPROVAL_RULES_SQL).await?;

        // ============================================================
        // PART 4: APPROVAL CHAINS
        // ============================================================
        db.execute_unprepared(APPROVAL_CHAINS_SQL).await?;

        // ============================================================
        // PART 5: AUDIT & TIMELINE
        // ============================================================
        db.execute_unprepared(AUDIT_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE decision_status AS ENUM ('draft', 'submitted', 'approved', 'rejected', 'rework');

CREATE TYPE delivery_status AS ENUM (
    'intake', 'analysis', 'review', 'in_progress', 'implemented', 'closed'
);

CREATE TYPE approval_chain_status AS ENUM ('active', 'superseded');

CREATE TYPE approval_step_status AS ENUM ('pending', 'approved', 'rejected');

CREATE TYPE quorum_mode AS ENUM ('all', 'any');
";

const CHANGE_REQUESTS_SQL: &str = r"
CREATE TABLE change_requests (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    project_id UUID NOT NULL,
    title VARCHAR(500) NOT NULL,
    description TEXT,
    impact_analysis JSONB NOT NULL DEFAULT '{}'::jsonb,
    decision_status decision_status NOT NULL DEFAULT 'draft',
    delivery_status delivery_status NOT NULL DEFAULT 'intake',
    decision_rationale TEXT,
    decision_by UUID,
    decision_at TIMESTAMPTZ,
    decision_role VARCHAR(50),
    approval_chain_id UUID,
    impact_score NUMERIC(7, 2),
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_title_not_blank CHECK (length(btrim(title)) > 0)
);

CREATE INDEX idx_change_requests_project ON change_requests(organization_id, project_id);
CREATE INDEX idx_change_requests_board ON change_requests(project_id, delivery_status);
";

const APPROVERS_SQL: &str = r"
CREATE TABLE approvers (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    user_id UUID NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_approvers_org_user UNIQUE (organization_id, user_id)
);
";

const APPROVAL_GROUPS_SQL: &str = r"
CREATE TABLE approval_groups (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_approval_groups_org_name UNIQUE (organization_id, name)
);

-- Canonical membership: group -> approver -> user
CREATE TABLE approval_group_members (
    group_id UUID NOT NULL REFERENCES approval_groups(id) ON DELETE CASCADE,
    approver_id UUID NOT NULL REFERENCES approvers(id) ON DELETE CASCADE,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (group_id, approver_id)
);

-- Legacy membership: group -> user
CREATE TABLE approval_group_users (
    group_id UUID NOT NULL REFERENCES approval_groups(id) ON DELETE CASCADE,
    user_id UUID NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (group_id, user_id)
);
";

const APPROVAL_RULES_SQL: &str = r"
CREATE TABLE approval_rules (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    step INTEGER NOT NULL,
    approval_role VARCHAR(255) NOT NULL DEFAULT '',
    approver_user_id UUID,
    approval_group_id UUID REFERENCES approval_groups(id) ON DELETE CASCADE,
    min_amount NUMERIC(19, 4) NOT NULL DEFAULT 0,
    max_amount NUMERIC(19, 4),
    artifact_type VARCHAR(50) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_amount_range CHECK (max_amount IS NULL OR max_amount >= min_amount),
    CONSTRAINT chk_single_approver CHECK (num_nonnulls(approver_user_id, approval_group_id) = 1)
);

CREATE INDEX idx_approval_rules_lookup
    ON approval_rules(organization_id, artifact_type) WHERE is_active = true;
";

const APPROVAL_CHAINS_SQL: &str = r"
CREATE TABLE approval_chains (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL,
    artifact_id UUID NOT NULL,
    project_id UUID NOT NULL,
    artifact_type VARCHAR(50) NOT NULL,
    amount NUMERIC(19, 4) NOT NULL DEFAULT 0,
    status approval_chain_status NOT NULL DEFAULT 'active',
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- At most one active chain per artifact
CREATE UNIQUE INDEX uq_approval_chains_active_artifact
    ON approval_chains(artifact_id) WHERE status = 'active';

CREATE TABLE approval_steps (
    id UUID PRIMARY KEY,
    chain_id UUID NOT NULL REFERENCES approval_chains(id) ON DELETE CASCADE,
    step_order INTEGER NOT NULL,
    name VARCHAR(255) NOT NULL,
    quorum_mode quorum_mode NOT NULL DEFAULT 'any',
    min_approvals INTEGER NOT NULL DEFAULT 1,
    max_rejections INTEGER NOT NULL DEFAULT 1,
    status approval_step_status NOT NULL DEFAULT 'pending',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_approval_steps_order UNIQUE (chain_id, step_order),
    CONSTRAINT chk_step_order_positive CHECK (step_order >= 1)
);

CREATE TABLE approval_step_approvers (
    id UUID PRIMARY KEY,
    step_id UUID NOT NULL REFERENCES approval_steps(id) ON DELETE CASCADE,
    approver_type VARCHAR(20) NOT NULL DEFAULT 'user',
    approver_ref UUID NOT NULL,
    required BOOLEAN NOT NULL DEFAULT true,
    active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_approval_step_approver UNIQUE (step_id, approver_ref)
);
";

const AUDIT_SQL: &str = r"
CREATE TABLE change_request_audit_events (
    id UUID PRIMARY KEY,
    project_id UUID NOT NULL,
    change_id UUID NOT NULL,
    actor_id UUID NOT NULL,
    actor_role VARCHAR(50) NOT NULL,
    event_type VARCHAR(50) NOT NULL,
    from_value TEXT,
    to_value TEXT,
    note TEXT,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_audit_events_change ON change_request_audit_events(change_id, created_at);

CREATE TABLE change_request_timeline (
    id UUID PRIMARY KEY,
    project_id UUID NOT NULL,
    change_id UUID NOT NULL,
    event_type VARCHAR(50) NOT NULL,
    from_status TEXT,
    to_status TEXT,
    actor_id UUID NOT NULL,
    actor_role VARCHAR(50) NOT NULL,
    comment TEXT,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_timeline_change ON change_request_timeline(change_id, created_at);
";

const DROP_ALL_SQL: &str = r"
-- ============================================================
-- DROP ALL: Rollback migration
-- ============================================================
DROP TABLE IF EXISTS change_request_timeline CASCADE;
DROP TABLE IF EXISTS change_request_audit_events CASCADE;
DROP TABLE IF EXISTS approval_step_approvers CASCADE;
DROP TABLE IF EXISTS approval_steps CASCADE;
DROP TABLE IF EXISTS approval_chains CASCADE;
DROP TABLE IF EXISTS approval_rules CASCADE;
DROP TABLE IF EXISTS approval_group_users CASCADE;
DROP TABLE IF EXISTS approval_group_members CASCADE;
DROP TABLE IF EXISTS approval_groups CASCADE;
DROP TABLE IF EXISTS approvers CASCADE;
DROP TABLE IF EXISTS change_requests CASCADE;

DROP TYPE IF EXISTS quorum_mode;
DROP TYPE IF EXISTS approval_step_status;
DROP TYPE IF EXISTS approval_chain_status;
DROP TYPE IF EXISTS delivery_status;
DROP TYPE IF EXISTS decision_status;
";
