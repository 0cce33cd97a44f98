//! End-to-end upgrade tests against the simulated environment.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use facetcut::config::{FacetPlan, UpgradePlan};
use facetcut::environment::{DeployRequest, ExecutionEnvironment};
use facetcut::simulated::SimulatedEnvironment;
use facetcut::{UpgradeCoordinator, UpgradeError, UpgradeFailure, UpgradePhase};
use facetcut_core::{
    Address, AttemptState, ContractAbi, ContractRegistry, Facet, InitArg, RoutingTable,
    RoutingView, Upgrade, VersionTag, remove_cut, replace_cut, selector,
};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn owner() -> Address {
    Address::repeat_byte(0x11)
}

fn registry() -> Arc<ContractRegistry> {
    Arc::new(
        ContractRegistry::new()
            .with(ContractAbi::new("A", &["initialize(uint256)", "f1()", "f2()"]).unwrap())
            .with(ContractAbi::new("B", &["f3()"]).unwrap())
            .with(ContractAbi::new("C", &["f2()", "g()"]).unwrap())
            .with(ContractAbi::new("D", &["f3()", "h()"]).unwrap())
            .with(
                ContractAbi::new(
                    "ProtocolInitializationFacet",
                    &["initialize(bytes32,address[],bytes[],bool)"],
                )
                .unwrap(),
            ),
    )
}

fn version(tag: &str) -> VersionTag {
    VersionTag::new(tag).unwrap()
}

fn plan_ab() -> UpgradePlan {
    UpgradePlan::new(
        vec![
            FacetPlan::new("A", vec![InitArg::Number(5)]),
            FacetPlan::new("B", vec![]),
            FacetPlan::new("ProtocolInitializationFacet", vec![]),
        ],
        "1.0.0",
    )
}

async fn setup(
    env: SimulatedEnvironment,
) -> (
    Arc<SimulatedEnvironment>,
    UpgradeCoordinator<SimulatedEnvironment>,
) {
    let env = Arc::new(env);
    let diamond = env.diamond().await;
    let coordinator = UpgradeCoordinator::new(env.clone(), registry(), diamond);
    (env, coordinator)
}

/// Run `plan_ab` to completion and return the addresses of A and B.
async fn upgraded() -> (
    Arc<SimulatedEnvironment>,
    UpgradeCoordinator<SimulatedEnvironment>,
    Address,
    Address,
) {
    let (env, mut coordinator) = setup(SimulatedEnvironment::new(owner())).await;
    let outcome = coordinator
        .run(&plan_ab(), &mut AttemptState::new())
        .await
        .unwrap();
    let address_of = |name: &str| {
        outcome
            .deployed_facets
            .iter()
            .find(|f| f.name == name)
            .unwrap()
            .address
    };
    let (a, b) = (address_of("A"), address_of("B"));
    (env, coordinator, a, b)
}

// =============================================================================
// HAPPY PATH
// =============================================================================

#[tokio::test]
async fn test_add_two_facets_in_one_upgrade() {
    let (env, _, a, b) = upgraded().await;
    let table = env.routing_table().await;

    assert_eq!(table.facet_address(selector("f1()").unwrap()), Some(a));
    assert_eq!(table.facet_address(selector("f2()").unwrap()), Some(a));
    assert_eq!(table.facet_address(selector("f3()").unwrap()), Some(b));
    assert_eq!(table.facet_address(selector("initialize(uint256)").unwrap()), None);
    assert_eq!(table.facet_addresses(), vec![a, b]);
    assert_eq!(env.version().await, Some(version("1.0.0")));
}

#[tokio::test]
async fn test_outcome_lists_cuts_and_receipt() {
    let (env, mut coordinator) = setup(SimulatedEnvironment::new(owner())).await;
    let outcome = coordinator
        .run(&plan_ab(), &mut AttemptState::new())
        .await
        .unwrap();

    assert_eq!(outcome.attempt, 1);
    let names: Vec<_> = outcome.deployed_facets.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "ProtocolInitializationFacet"]);

    let a_cut = outcome.deployed_facets[0].cut.as_ref().unwrap();
    assert_eq!(a_cut.selectors, vec![selector("f1()").unwrap(), selector("f2()").unwrap()]);
    assert!(outcome.deployed_facets[2].cut.is_none());
    assert_eq!(
        outcome.protocol_initialization_facet,
        Some(outcome.deployed_facets[2].address)
    );

    let receipt = outcome.receipt.unwrap();
    assert_eq!(receipt.version, Some(version("1.0.0")));
    assert!(receipt.confirmations >= 1);
    assert_eq!(env.deployments_of("ProtocolInitializationFacet").await, 1);
}

#[tokio::test]
async fn test_remove_facet_selectors() {
    let (env, mut coordinator, a, b) = upgraded().await;
    let abi = registry().get("A").unwrap().clone();
    let removal = remove_cut(&Facet::new(abi, a), &["initialize(uint256)"]).unwrap();

    coordinator
        .submit_upgrade(Upgrade::new(vec![removal], version("1.0.1")), 1, true, std::future::pending())
        .await
        .unwrap();

    let table = env.routing_table().await;
    assert_eq!(table.facet_address(selector("f1()").unwrap()), None);
    assert_eq!(table.facet_address(selector("f2()").unwrap()), None);
    assert_eq!(table.facet_address(selector("f3()").unwrap()), Some(b));
    assert_eq!(table.facet_addresses(), vec![b]);
    assert_eq!(coordinator.phase(), UpgradePhase::Done);
}

#[tokio::test]
async fn test_replace_moves_selectors_to_new_facet() {
    let (env, mut coordinator, a, _) = upgraded().await;
    let abi = registry().get("A").unwrap().clone();
    let new_a = env.deploy(DeployRequest::new(abi.clone())).await.unwrap();
    assert_ne!(new_a, a);

    let cut = replace_cut(&Facet::new(abi, new_a), &["initialize(uint256)"]).unwrap();
    coordinator
        .submit_upgrade(Upgrade::new(vec![cut], version("1.1.0")), 1, true, std::future::pending())
        .await
        .unwrap();

    let table = env.routing_table().await;
    assert_eq!(table.facet_address(selector("f1()").unwrap()), Some(new_a));
    assert!(table.facet_function_selectors(a).is_empty());
    assert_eq!(env.version().await, Some(version("1.1.0")));
}

#[tokio::test]
async fn test_replace_retry_reuses_the_new_facet() {
    let (env, mut coordinator, a, _) = upgraded().await;
    let mut attempt = AttemptState::new();
    env.set_sender(Address::repeat_byte(0x99)).await;

    let failure = coordinator
        .replace_facet(
            "A",
            &["initialize(uint256)"],
            version("1.1.0"),
            1,
            &mut attempt,
            std::future::pending(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        failure.error,
        UpgradeError::UnauthorizedUpgrader { .. }
    ));
    let new_a = attempt.address_of("A").unwrap();
    assert_eq!(env.deployments_of("A").await, 2);

    env.set_sender(owner()).await;
    let outcome = coordinator
        .replace_facet(
            "A",
            &["initialize(uint256)"],
            version("1.1.0"),
            1,
            &mut attempt,
            std::future::pending(),
        )
        .await
        .unwrap();

    assert!(outcome.reused);
    assert_eq!(outcome.attempt, 2);
    assert_eq!(outcome.cut.facet_address, new_a);
    assert_eq!(env.deployments_of("A").await, 2);
    let table = env.routing_table().await;
    assert_eq!(table.facet_address(selector("f1()").unwrap()), Some(new_a));
    assert!(table.facet_function_selectors(a).is_empty());
}

// =============================================================================
// REJECTED UPGRADES
// =============================================================================

#[tokio::test]
async fn test_collision_is_reported_and_table_unchanged() {
    let (env, mut coordinator, a, _) = upgraded().await;
    let before = env.routing_table().await;

    let mut plan = UpgradePlan::new(vec![FacetPlan::new("C", vec![])], "2.0.0");
    plan.preflight = false;
    let failure = coordinator.run(&plan, &mut AttemptState::new()).await.unwrap_err();

    let g_owner = env
        .snapshot()
        .await
        .table()
        .facet_address(selector("g()").unwrap());
    assert_eq!(g_owner, None);
    match failure.error {
        UpgradeError::SelectorCollision {
            selector: s,
            existing,
            ..
        } => {
            assert_eq!(s, selector("f2()").unwrap());
            assert_eq!(existing, a);
        }
        other => panic!("expected a selector collision, got {other:?}"),
    }
    assert_eq!(failure.phase, UpgradePhase::Confirming);
    assert_eq!(env.routing_table().await, before);
    assert_eq!(env.version().await, Some(version("1.0.0")));
}

#[tokio::test]
async fn test_intersecting_facets_in_one_upgrade_collide() {
    let (env, mut coordinator) = setup(SimulatedEnvironment::new(owner())).await;

    let mut plan = UpgradePlan::new(
        vec![FacetPlan::new("B", vec![]), FacetPlan::new("D", vec![])],
        "1.0.0",
    );
    plan.preflight = false;
    let failure = coordinator.run(&plan, &mut AttemptState::new()).await.unwrap_err();

    match failure.error {
        UpgradeError::SelectorCollision {
            selector: s,
            existing,
            proposed,
        } => {
            assert_eq!(s, selector("f3()").unwrap());
            assert_ne!(existing, proposed);
        }
        other => panic!("expected a selector collision, got {other:?}"),
    }
    assert_eq!(failure.phase, UpgradePhase::Confirming);
    assert_eq!(env.routing_table().await, RoutingTable::new());
    assert_eq!(env.version().await, None);
}

#[tokio::test]
async fn test_preflight_stops_collision_before_submission() {
    let (env, mut coordinator, _, _) = upgraded().await;
    let before = env.routing_table().await;

    let plan = UpgradePlan::new(vec![FacetPlan::new("C", vec![])], "2.0.0");
    let failure = coordinator.run(&plan, &mut AttemptState::new()).await.unwrap_err();

    assert!(matches!(failure.error, UpgradeError::SelectorCollision { .. }));
    assert_eq!(failure.phase, UpgradePhase::Cutting);
    assert_eq!(env.routing_table().await, before);
}

#[tokio::test]
async fn test_unauthorized_upgrader() {
    let (env, mut coordinator) = setup(SimulatedEnvironment::new(owner())).await;
    let intruder = Address::repeat_byte(0x99);
    env.set_sender(intruder).await;

    let failure = coordinator
        .run(&plan_ab(), &mut AttemptState::new())
        .await
        .unwrap_err();
    assert_eq!(
        failure.error,
        UpgradeError::UnauthorizedUpgrader { sender: intruder }
    );
    assert_eq!(env.routing_table().await, RoutingTable::new());
}

#[tokio::test]
async fn test_reverting_initializer_rolls_back_everything() {
    let (env, mut coordinator) = setup(SimulatedEnvironment::new(owner())).await;
    env.revert_initializer("A", "Access denied, caller doesn't have role")
        .await;

    let failure = coordinator
        .run(&plan_ab(), &mut AttemptState::new())
        .await
        .unwrap_err();
    assert_eq!(
        failure.error,
        UpgradeError::InitializationReverted {
            reason: "Access denied, caller doesn't have role".into()
        }
    );
    assert_eq!(env.routing_table().await, RoutingTable::new());
    assert_eq!(env.version().await, None);
}

// =============================================================================
// RETRY AND CANCELLATION
// =============================================================================

#[tokio::test]
async fn test_retry_does_not_redeploy_successful_facets() {
    let (env, mut coordinator) = setup(SimulatedEnvironment::new(owner())).await;
    env.fail_next_deploy("B", "out of gas").await;
    let mut attempt = AttemptState::new();

    let failure = coordinator.run(&plan_ab(), &mut attempt).await.unwrap_err();
    assert_eq!(
        failure,
        UpgradeFailure {
            phase: UpgradePhase::Deploying,
            error: UpgradeError::DeploymentFailed {
                facet: "B".into(),
                reason: "out of gas".into(),
            },
        }
    );
    assert!(failure.error.is_retryable());
    assert!(attempt.is_deployed("A"));
    assert!(!attempt.is_deployed("B"));
    assert_eq!(env.routing_table().await, RoutingTable::new());

    let outcome = coordinator.run(&plan_ab(), &mut attempt).await.unwrap();
    assert_eq!(outcome.attempt, 2);
    assert_eq!(env.deployments_of("A").await, 1);
    assert_eq!(env.deployments_of("B").await, 1);
    assert_eq!(env.deployments_of("ProtocolInitializationFacet").await, 1);

    let a = &outcome.deployed_facets[0];
    assert!(a.reused);
    assert_eq!(Some(a.address), attempt.address_of("A"));
    assert!(!outcome.deployed_facets[1].reused);
    assert_eq!(
        env.routing_table()
            .await
            .facet_address(selector("f1()").unwrap()),
        Some(a.address)
    );
}

#[tokio::test]
async fn test_predeployed_init_facet_is_not_deployed() {
    let (env, mut coordinator) = setup(SimulatedEnvironment::new(owner())).await;
    let init_abi = registry().get("ProtocolInitializationFacet").unwrap().clone();
    let init = env.deploy(DeployRequest::new(init_abi)).await.unwrap();

    let mut plan = plan_ab();
    plan.protocol_initialization_facet_address = Some(init);
    let outcome = coordinator.run(&plan, &mut AttemptState::new()).await.unwrap();

    assert_eq!(outcome.protocol_initialization_facet, Some(init));
    assert_eq!(env.deployments_of("ProtocolInitializationFacet").await, 1);
}

#[tokio::test]
async fn test_cancelled_confirmation_wait() {
    let env = SimulatedEnvironment::new(owner()).with_block_time(Duration::from_secs(3600));
    let (env, mut coordinator) = setup(env).await;
    let mut plan = plan_ab();
    plan.confirmations = 3;

    let failure = coordinator
        .run_until(&plan, &mut AttemptState::new(), std::future::ready(()))
        .await
        .unwrap_err();

    assert_eq!(failure.phase, UpgradePhase::Confirming);
    assert!(matches!(
        failure.error,
        UpgradeError::ConfirmationCancelled { .. }
    ));
    assert_eq!(coordinator.phase(), UpgradePhase::Failed);
    // The cut itself went through; only the wait was abandoned.
    assert_eq!(env.routing_table().await.selector_count(), 3);
}

#[tokio::test]
async fn test_confirmation_wait_mines_blocks() {
    let env = SimulatedEnvironment::new(owner()).with_block_time(Duration::from_millis(1));
    let (_, mut coordinator) = setup(env).await;
    let mut plan = plan_ab();
    plan.confirmations = 3;

    let outcome = coordinator.run(&plan, &mut AttemptState::new()).await.unwrap();
    assert_eq!(outcome.receipt.unwrap().confirmations, 3);
}
