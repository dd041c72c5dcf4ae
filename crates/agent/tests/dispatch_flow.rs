//! End-to-end flows through the dispatcher with the LLM backend disabled,
//! exercising the graceful-degradation contract the system guarantees.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use fieldline_agent::Dispatcher;
use fieldline_core::config::AppConfig;
use fieldline_core::errors::DispatchError;
use fieldline_core::{
    DeterministicPricingEngine, PricingEngine, ServiceType, TurnRole, UrgencyLevel,
};

fn dispatcher() -> Dispatcher {
    // default config: backend disabled, cap 6, window 10
    Dispatcher::from_config(&AppConfig::default()).expect("standard registry should validate")
}

fn services(list: &[ServiceType]) -> BTreeSet<ServiceType> {
    list.iter().copied().collect()
}

#[tokio::test]
async fn broken_ac_request_degrades_gracefully_without_a_backend() {
    let dispatcher = dispatcher();
    let reply = dispatcher
        .handle_request("cust-1", "My AC is broken, can someone fix it this week?")
        .await;

    assert!(!reply.reply_text.is_empty());
    assert!(reply.attributes.urgency >= UrgencyLevel::Urgent);
    assert!(reply.attributes.service_types.contains(&ServiceType::AcRepair));
    let quote = reply.quote.expect("a quote should be computed");
    assert!(quote.total > Decimal::ZERO);
    assert!(reply.degraded, "fallback analysis must mark the reply degraded");
}

#[tokio::test]
async fn bundle_followup_merges_services_and_discounts_the_total() {
    let dispatcher = dispatcher();
    dispatcher
        .handle_request("cust-2", "My AC is broken, can someone fix it this week?")
        .await;

    let followup = dispatcher
        .handle_followup("cust-2", "Can you add thermostat installation too and bundle it?")
        .await
        .expect("session exists");

    assert_eq!(
        followup.attributes.service_types,
        services(&[ServiceType::AcRepair, ServiceType::ThermostatInstall])
    );

    let bundle = followup.quote.expect("bundle quote should be computed");
    assert_eq!(bundle.discount_rate, Decimal::new(15, 2));

    // strictly cheaper than quoting the two services independently
    let engine = DeterministicPricingEngine::default();
    let urgency = followup.attributes.urgency;
    let ac = engine.quote(&services(&[ServiceType::AcRepair]), urgency);
    let thermostat = engine.quote(&services(&[ServiceType::ThermostatInstall]), urgency);
    assert!(bundle.total < ac.total + thermostat.total);
}

#[tokio::test]
async fn followup_without_history_fails_with_unknown_session() {
    let dispatcher = dispatcher();
    let error = dispatcher
        .handle_followup("cust-3", "bundle a filter replacement too")
        .await
        .expect_err("no prior turns");
    assert!(matches!(error, DispatchError::UnknownSession(id) if id == "cust-3"));
}

#[tokio::test]
async fn every_nonempty_request_gets_a_wellformed_reply() {
    let dispatcher = dispatcher();
    let texts = [
        "hello?",
        "water everywhere, emergency",
        "is tuesday ok",
        "how much for duct cleaning and a filter",
    ];

    for (index, text) in texts.iter().enumerate() {
        let reply = dispatcher.handle_request(&format!("cust-4-{index}"), text).await;
        assert!(!reply.reply_text.is_empty(), "empty reply for: {text}");
        assert!(!reply.attributes.service_types.is_empty(), "empty service set for: {text}");
    }
}

#[tokio::test]
async fn session_history_is_truncated_to_the_configured_window() {
    let mut config = AppConfig::default();
    config.agent.memory_window = 4;
    let dispatcher = Dispatcher::from_config(&config).expect("registry should validate");

    for index in 0..3 {
        dispatcher.handle_request("cust-5", &format!("request number {index}")).await;
    }

    // 3 requests append 6 turns; only the last 4 survive
    let snapshot = dispatcher.session_snapshot("cust-5").await;
    assert_eq!(snapshot.turns.len(), 4);
    assert_eq!(snapshot.turns[0].text, "request number 1");
    assert_eq!(snapshot.turns.last().expect("non-empty").role, TurnRole::Agent);
}

#[tokio::test]
async fn snapshot_tracks_the_latest_merged_attributes() {
    let dispatcher = dispatcher();
    dispatcher.handle_request("cust-6", "furnace is broken").await;
    dispatcher
        .handle_followup("cust-6", "also add a maintenance plan")
        .await
        .expect("session exists");

    let snapshot = dispatcher.session_snapshot("cust-6").await;
    let attributes = snapshot.last_attributes.expect("attributes should be recorded");
    assert_eq!(
        attributes.service_types,
        services(&[ServiceType::HeatingRepair, ServiceType::MaintenancePlan])
    );
}

#[tokio::test]
async fn distinct_sessions_are_processed_concurrently() {
    let dispatcher = std::sync::Arc::new(dispatcher());

    let first = {
        let dispatcher = std::sync::Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher.handle_request("cust-7a", "AC broken, need help this week").await
        })
    };
    let second = {
        let dispatcher = std::sync::Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher.handle_request("cust-7b", "quote a thermostat install").await
        })
    };

    let (first, second) = (first.await.expect("task"), second.await.expect("task"));
    assert!(first.attributes.service_types.contains(&ServiceType::AcRepair));
    assert!(second.attributes.service_types.contains(&ServiceType::ThermostatInstall));

    let a = dispatcher.session_snapshot("cust-7a").await;
    let b = dispatcher.session_snapshot("cust-7b").await;
    assert_eq!(a.turns.len(), 2);
    assert_eq!(b.turns.len(), 2);
}

#[tokio::test]
async fn serialized_followups_observe_prior_attributes() {
    let dispatcher = std::sync::Arc::new(dispatcher());
    dispatcher.handle_request("cust-8", "my ac is broken, fix it this week").await;

    // two racing followups on one session; whichever runs second must see a
    // service set that already includes everything observed so far
    let first = {
        let dispatcher = std::sync::Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.handle_followup("cust-8", "add duct cleaning too").await })
    };
    let second = {
        let dispatcher = std::sync::Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher.handle_followup("cust-8", "and a filter replacement as well").await
        })
    };

    first.await.expect("task").expect("session exists");
    second.await.expect("task").expect("session exists");

    let snapshot = dispatcher.session_snapshot("cust-8").await;
    let attributes = snapshot.last_attributes.expect("attributes should be recorded");
    assert_eq!(
        attributes.service_types,
        services(&[
            ServiceType::AcRepair,
            ServiceType::DuctCleaning,
            ServiceType::FilterReplacement,
        ])
    );
}
