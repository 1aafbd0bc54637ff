//! Engine-level guarantees: ordering, merge, fallback, caching, invalidation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use groupscape_resolution::{
    BusEvent, DedupByIdentity, DomainPolicy, FallbackProvider, ManualClock, RequestDescriptor,
    ResolutionEngine, WalkAll,
};
use serde_json::json;

use common::{activities, fields, Behavior, ScriptedProvider};

fn stats() -> RequestDescriptor {
    RequestDescriptor::new("player-stats", "Zezima").unwrap()
}

#[tokio::test]
async fn higher_priority_provider_owns_every_field() {
    let full = fields(&[("username", json!("zezima")), ("exp", json!(200_000_000))]);
    let a = ScriptedProvider::new("a", 1, Behavior::Returns(full.clone())).arc();
    let b = ScriptedProvider::new("b", 2, Behavior::Returns(full)).arc();

    let engine = ResolutionEngine::builder()
        .provider(b.clone())
        .provider(a.clone())
        .domain(DomainPolicy::new("player-stats").with_completeness(WalkAll))
        .build()
        .unwrap();

    let record = engine.resolve(&stats()).await;
    assert!(record.fields().values().all(|f| f.source_id == "a"));
    assert_eq!(record.source_id(), "a");
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
}

#[tokio::test]
async fn lower_priority_provider_fills_gaps_only() {
    let a = ScriptedProvider::new(
        "a",
        1,
        Behavior::Returns(fields(&[("username", json!("zezima"))]).mark_partial()),
    )
    .arc();
    let b = ScriptedProvider::new(
        "b",
        2,
        Behavior::Returns(fields(&[("username", json!("other")), ("exp", json!(42))])),
    )
    .arc();

    let engine = ResolutionEngine::builder()
        .provider(a)
        .provider(b)
        .domain(DomainPolicy::new("player-stats").with_completeness(
            groupscape_resolution::RequiredFields::new(["username", "exp"]),
        ))
        .build()
        .unwrap();

    let record = engine.resolve(&stats()).await;
    assert_eq!(record.value("username"), Some(&json!("zezima")));
    assert_eq!(record.source_of("username"), Some("a"));
    assert_eq!(record.value("exp"), Some(&json!(42)));
    assert_eq!(record.source_of("exp"), Some("b"));
}

#[tokio::test]
async fn fallback_answers_when_everything_else_fails() {
    let plugin = ScriptedProvider::new("plugin", 0, Behavior::Fails).arc();
    let aggregation = ScriptedProvider::new("aggregation", 10, Behavior::Fails).arc();
    let wiki = ScriptedProvider::new("wiki", 20, Behavior::Fails).arc();

    let engine = ResolutionEngine::builder()
        .provider(plugin)
        .provider(aggregation)
        .provider(wiki)
        .provider(Arc::new(FallbackProvider::default()))
        .build()
        .unwrap();

    let record = engine.resolve(&stats()).await;
    assert!(!record.is_empty());
    assert!(record.fields().values().all(|f| f.source_id == "fallback"));
    assert_eq!(record.value("mock"), Some(&json!(true)));
    assert_eq!(record.diagnostics().errors().len(), 3);
}

#[tokio::test]
async fn cache_hit_skips_providers() {
    let provider =
        ScriptedProvider::new("a", 1, Behavior::Returns(fields(&[("exp", json!(1))]))).arc();
    let engine = ResolutionEngine::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    let first = engine.resolve(&stats()).await;
    let second = engine
        .resolve(&RequestDescriptor::new("player-stats", "  ZEZIMA ").unwrap())
        .await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(first.resolved_at(), second.resolved_at());
}

#[tokio::test]
async fn expired_entry_re_walks_providers() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    let provider =
        ScriptedProvider::new("a", 1, Behavior::Returns(fields(&[("exp", json!(1))]))).arc();
    let engine = ResolutionEngine::builder()
        .provider(provider.clone())
        .domain(DomainPolicy::new("player-stats").with_ttl(Duration::from_secs(60)))
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    engine.resolve(&stats()).await;
    clock.advance(Duration::from_secs(59));
    engine.resolve(&stats()).await;
    assert_eq!(provider.calls(), 1);

    clock.advance(Duration::from_secs(1));
    engine.resolve(&stats()).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn fetch_times_come_from_the_engine_clock() {
    let at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(at);
    let provider =
        ScriptedProvider::new("a", 1, Behavior::Returns(fields(&[("exp", json!(1))]))).arc();
    let engine = ResolutionEngine::builder()
        .provider(provider)
        .clock(Arc::new(clock))
        .build()
        .unwrap();

    let record = engine.resolve(&stats()).await;
    assert_eq!(record.field("exp").unwrap().fetched_at, at);
    assert_eq!(record.resolved_at(), at);
}

#[tokio::test]
async fn invalidation_event_forces_a_new_walk() {
    let provider =
        ScriptedProvider::new("a", 1, Behavior::Returns(fields(&[("exp", json!(1))]))).arc();
    let engine = ResolutionEngine::builder()
        .provider(provider.clone())
        .build()
        .unwrap();

    engine.resolve(&stats()).await;
    let delivered = engine
        .bus()
        .publish(BusEvent::invalidate_key(stats().cache_key()));
    assert!(delivered >= 1);
    assert!(!engine.is_cached(&stats()));

    engine.resolve(&stats()).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn policy_topic_invalidates_its_domain_only() {
    let provider =
        ScriptedProvider::new("a", 1, Behavior::Returns(activities(&["x"]))).arc();
    let engine = ResolutionEngine::builder()
        .provider(provider.clone())
        .domain(DomainPolicy::new("activities").invalidate_on("group:data-updated"))
        .build()
        .unwrap();

    let group = RequestDescriptor::new("activities", "group42").unwrap();
    engine.resolve(&group).await;
    engine.resolve(&stats()).await;
    assert_eq!(engine.cached_len(), 2);

    engine.bus().publish(BusEvent::new("group:data-updated"));
    assert!(!engine.is_cached(&group));
    assert!(engine.is_cached(&stats()));
}

#[tokio::test]
async fn external_bus_can_be_bound() {
    let provider =
        ScriptedProvider::new("a", 1, Behavior::Returns(fields(&[("exp", json!(1))]))).arc();
    let engine = ResolutionEngine::builder()
        .provider(provider)
        .build()
        .unwrap();
    let app_bus = groupscape_resolution::InvalidationBus::new();
    let subscriptions = engine.bind(&app_bus);

    engine.resolve(&stats()).await;
    app_bus.publish(BusEvent::invalidate_domain("player-stats"));
    assert!(!engine.is_cached(&stats()));

    drop(subscriptions);
    engine.resolve(&stats()).await;
    assert_eq!(app_bus.publish(BusEvent::invalidate_domain("player-stats")), 0);
    assert!(engine.is_cached(&stats()));
}

#[tokio::test]
async fn dedup_keeps_each_identity_once_with_higher_priority_source() {
    let plugin = ScriptedProvider::new("plugin", 0, Behavior::Returns(activities(&["a", "b"]))).arc();
    let aggregation =
        ScriptedProvider::new("aggregation", 10, Behavior::Returns(activities(&["b", "c"]))).arc();

    let engine = ResolutionEngine::builder()
        .provider(plugin)
        .provider(aggregation)
        .domain(
            DomainPolicy::new("activities")
                .with_merge(DedupByIdentity::default())
                .with_completeness(WalkAll),
        )
        .build()
        .unwrap();

    let record = engine
        .resolve(&RequestDescriptor::new("activities", "group42").unwrap())
        .await;

    let items: Vec<(&str, &str)> = record
        .items()
        .iter()
        .map(|i| (i.identity.as_str(), i.source_id.as_ref()))
        .collect();
    assert_eq!(
        items,
        vec![("a", "plugin"), ("b", "plugin"), ("c", "aggregation")]
    );
}

#[tokio::test]
async fn equal_priorities_break_ties_by_registration_order() {
    for _ in 0..10 {
        let first = ScriptedProvider::new("first", 5, Behavior::Returns(fields(&[("exp", json!(1))]))).arc();
        let second = ScriptedProvider::new("second", 5, Behavior::Returns(fields(&[("exp", json!(2))]))).arc();

        let engine = ResolutionEngine::builder()
            .provider(first.clone())
            .provider(second.clone())
            .build()
            .unwrap();

        assert_eq!(engine.providers_for("player-stats"), vec!["first", "second"]);
        let record = engine.resolve(&stats()).await;
        assert_eq!(record.source_of("exp"), Some("first"));
        assert_eq!(second.calls(), 0);
    }
}

#[tokio::test]
async fn unsupported_domains_are_skipped_without_a_call() {
    let wiki = ScriptedProvider::new("wiki", 1, Behavior::Fails)
        .only(&["collection-log-item"])
        .arc();
    let aggregation =
        ScriptedProvider::new("aggregation", 2, Behavior::Returns(fields(&[("exp", json!(1))]))).arc();

    let engine = ResolutionEngine::builder()
        .provider(wiki.clone())
        .provider(aggregation)
        .build()
        .unwrap();

    let record = engine.resolve(&stats()).await;
    assert_eq!(wiki.calls(), 0);
    assert_eq!(
        record.diagnostics().skip_reasons()[0].1,
        &groupscape_resolution::SkipReason::DomainNotSupported
    );
}
