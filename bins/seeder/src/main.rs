//! Database seeder for Steerco development and testing.
//!
//! Seeds a demo organization with approvers, an approver group and
//! amount-banded approval rules for change requests.
//!
//! Usage: cargo run --bin seeder

use rust_decimal::Decimal;
use uuid::Uuid;

use steerco_core::governance::{ApprovalRule, ApproverRef, RuleRepository};
use steerco_db::{ApprovalGroupRepository, ApprovalRuleRepository};
use steerco_shared::types::{ApprovalGroupId, ApprovalRuleId, OrganizationId, UserId};

/// Demo organization ID (consistent for all seeds)
const DEMO_ORG_ID: &str = "00000000-0000-0000-0000-000000000001";
/// PMO lead, first step for every change
const PMO_LEAD_ID: &str = "00000000-0000-0000-0000-000000000002";
/// Finance director, last step for large changes
const FINANCE_DIRECTOR_ID: &str = "00000000-0000-0000-0000-000000000003";
/// Change advisory board members
const CAB_MEMBER_IDS: [&str; 3] = [
    "00000000-0000-0000-0000-000000000004",
    "00000000-0000-0000-0000-000000000005",
    "00000000-0000-0000-0000-000000000006",
];

const CAB_NAME: &str = "Change Advisory Board";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("STEERCO__DATABASE__URL"))
        .expect("DATABASE_URL must be set in environment");

    println!("Connecting to database...");
    let db = steerco_db::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    let groups = ApprovalGroupRepository::new(db.clone());
    let rules = ApprovalRuleRepository::new(db);

    println!("Seeding approvers...");
    let cab_approvers = seed_approvers(&groups).await;

    println!("Seeding approver groups...");
    let cab = seed_group(&groups, &cab_approvers).await;

    println!("Seeding approval rules...");
    seed_rules(&rules, cab).await;

    println!("Seeding complete!");
}

fn id(raw: &str) -> Uuid {
    Uuid::parse_str(raw).expect("seed IDs are valid UUIDs")
}

fn demo_org() -> OrganizationId {
    OrganizationId::from_uuid(id(DEMO_ORG_ID))
}

fn is_duplicate(message: &str) -> bool {
    message.contains("duplicate key")
}

/// Registers every demo user as an approver; returns the CAB approver IDs.
async fn seed_approvers(groups: &ApprovalGroupRepository) -> Vec<Uuid> {
    let mut cab = Vec::new();
    let users = [PMO_LEAD_ID, FINANCE_DIRECTOR_ID]
        .into_iter()
        .chain(CAB_MEMBER_IDS)
        .map(|raw| UserId::from_uuid(id(raw)));

    let mut inserted = 0;
    for user in users {
        match groups.create_approver(demo_org(), user).await {
            Ok(approver_id) => {
                inserted += 1;
                if CAB_MEMBER_IDS.iter().any(|raw| id(raw) == user.into_inner()) {
                    cab.push(approver_id);
                }
            }
            Err(e) if is_duplicate(&e.to_string()) => {}
            Err(e) => eprintln!("Failed to insert approver {user}: {e}"),
        }
    }
    println!("  Inserted {inserted} approvers");
    cab
}

/// Creates the CAB group and links the given approvers to it.
async fn seed_group(groups: &ApprovalGroupRepository, members: &[Uuid]) -> Option<ApprovalGroupId> {
    let group = match groups.create_group(demo_org(), CAB_NAME).await {
        Ok(group) => group,
        Err(e) if is_duplicate(&e.to_string()) => {
            println!("  {CAB_NAME} already exists, skipping...");
            return None;
        }
        Err(e) => {
            eprintln!("Failed to insert group {CAB_NAME}: {e}");
            return None;
        }
    };

    for approver_id in members {
        if let Err(e) = groups.add_member(group, *approver_id).await {
            eprintln!("Failed to add approver {approver_id} to {CAB_NAME}: {e}");
        }
    }
    println!("  Created {CAB_NAME} with {} members", members.len());
    Some(group)
}

/// Seeds a three-step amount ladder for change requests.
async fn seed_rules(rules: &ApprovalRuleRepository, cab: Option<ApprovalGroupId>) {
    match rules.active_rules(demo_org(), "change").await {
        Ok(existing) if !existing.is_empty() => {
            println!("  Approval rules already exist, skipping...");
            return;
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("Failed to read approval rules: {e}");
            return;
        }
    }

    let mut ladder = vec![(
        1,
        "PMO Lead",
        ApproverRef::User(UserId::from_uuid(id(PMO_LEAD_ID))),
        Decimal::ZERO,
    )];
    if let Some(group) = cab {
        ladder.push((2, CAB_NAME, ApproverRef::Group(group), Decimal::from(10_000)));
    }
    ladder.push((
        3,
        "Finance Director",
        ApproverRef::User(UserId::from_uuid(id(FINANCE_DIRECTOR_ID))),
        Decimal::from(100_000),
    ));

    let mut inserted = 0;
    for (step, role, approver, min_amount) in ladder {
        let rule = ApprovalRule {
            id: ApprovalRuleId::new(),
            organization_id: demo_org(),
            step,
            approval_role: role.to_string(),
            approver,
            min_amount,
            max_amount: None,
            artifact_type: "change".to_string(),
            is_active: true,
        };
        if let Err(e) = rules.create_rule(&rule).await {
            eprintln!("Failed to insert rule for step {step}: {e}");
        } else {
            inserted += 1;
        }
    }
    println!("  Inserted {inserted} approval rules");
}
