//! Port feed cycle tests, including the full two-level pipeline.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use traffic_accounting::{DeltaKind, Direction, EndpointId, Tag, TagMark};
use trafficsyncd::{
    LifecycleController, PortFeedRequestSpec, PortFeedSync, Reconcile, ReconcileOutcome,
    SyncCycle, TrafficSync, PFR_FINALIZER,
};

const PERIOD: Duration = Duration::from_secs(60);
const OTHER_ADDRESS: &str = "10.0.0.2";

fn port_feed(accounting: &Accounting) -> PortFeedSync {
    PortFeedSync::new(
        accounting.accounts.clone(),
        accounting.feeds.clone(),
        accounting.codec.clone(),
    )
}

fn spec(port: u16, address: Option<&str>) -> PortFeedRequestSpec {
    port_feed_request("pfr", port, address, PERIOD).spec
}

fn endpoint(accounting: &Accounting, address: &str) -> EndpointId {
    accounting.codec.encode(address).unwrap()
}

async fn seed_account(accounting: &Accounting, address: &str, tag: &str, sent: u64, recv: u64) {
    let endpoint = endpoint(accounting, address);
    let tag = Tag::new(tag).unwrap();
    accounting
        .accounts
        .apply_delta(OWNER, &endpoint, &tag, Direction::Sent, sent, sent)
        .await
        .unwrap();
    accounting
        .accounts
        .apply_delta(OWNER, &endpoint, &tag, Direction::Recv, recv, recv)
        .await
        .unwrap();
}

async fn feed_mark(accounting: &Accounting, address: &str, tag: &str, direction: Direction) -> TagMark {
    accounting
        .feeds
        .read_mark(OWNER, &endpoint(accounting, address), &Tag::new(tag).unwrap(), direction)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_feed_consumes_account_growth() {
    let accounting = Accounting::new();
    let cycle = port_feed(&accounting);
    let spec = spec(80, None);
    let tag = Tag::new("80").unwrap();

    // Account at 1500, feed previously consumed 1000
    seed_account(&accounting, ADDRESS, "80", 1500, 0).await;
    accounting
        .feeds
        .apply_delta(OWNER, &endpoint(&accounting, ADDRESS), &tag, Direction::Sent, 1000, 1000)
        .await
        .unwrap();

    let report = cycle.sync_tag(&spec, &tag).await.unwrap();
    assert_eq!(report.total_delta(), 500);
    assert_eq!(
        feed_mark(&accounting, ADDRESS, "80", Direction::Sent).await,
        TagMark { total: 1500, last_raw_mark: 1500 }
    );

    // Account untouched by the feed cycle
    let account_sent = accounting
        .accounts
        .read_mark(OWNER, &endpoint(&accounting, ADDRESS), &tag, Direction::Sent)
        .await
        .unwrap();
    assert_eq!(account_sent, TagMark { total: 1500, last_raw_mark: 1500 });
}

#[tokio::test]
async fn test_feed_covers_every_endpoint_with_the_port() {
    let accounting = Accounting::new();
    let cycle = port_feed(&accounting);
    seed_account(&accounting, ADDRESS, "80", 100, 10).await;
    seed_account(&accounting, OTHER_ADDRESS, "80", 200, 20).await;
    seed_account(&accounting, ADDRESS, "443", 900, 90).await;

    let report = cycle
        .sync_tag(&spec(80, None), &Tag::new("80").unwrap())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.advanced_count(), 4);
    assert_eq!(report.total_delta(), 330);
    assert_eq!(feed_mark(&accounting, ADDRESS, "80", Direction::Recv).await.total, 10);
    assert_eq!(feed_mark(&accounting, OTHER_ADDRESS, "80", Direction::Sent).await.total, 200);
    assert_eq!(feed_mark(&accounting, ADDRESS, "443", Direction::Sent).await, TagMark::default());
}

#[tokio::test]
async fn test_feed_restricted_to_address() {
    let accounting = Accounting::new();
    let cycle = port_feed(&accounting);
    seed_account(&accounting, ADDRESS, "80", 100, 0).await;
    seed_account(&accounting, OTHER_ADDRESS, "80", 200, 0).await;

    cycle
        .sync_tag(&spec(80, Some(OTHER_ADDRESS)), &Tag::new("80").unwrap())
        .await
        .unwrap();

    assert_eq!(feed_mark(&accounting, ADDRESS, "80", Direction::Sent).await.total, 0);
    assert_eq!(feed_mark(&accounting, OTHER_ADDRESS, "80", Direction::Sent).await.total, 200);
}

#[tokio::test]
async fn test_missing_account_is_empty_cycle() {
    let accounting = Accounting::new();
    let cycle = port_feed(&accounting);

    let report = cycle
        .sync_tag(&spec(80, None), &Tag::new("80").unwrap())
        .await
        .unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(accounting.store.write_count(), 0);
}

#[tokio::test]
async fn test_feed_holds_when_account_below_mark() {
    let accounting = Accounting::new();
    let cycle = port_feed(&accounting);
    let tag = Tag::new("80").unwrap();
    seed_account(&accounting, ADDRESS, "80", 100, 0).await;
    accounting
        .feeds
        .apply_delta(OWNER, &endpoint(&accounting, ADDRESS), &tag, Direction::Sent, 400, 400)
        .await
        .unwrap();

    let report = cycle.sync_tag(&spec(80, None), &tag).await.unwrap();

    assert_eq!(report.outcomes[0].kind, DeltaKind::Stale);
    assert_eq!(
        feed_mark(&accounting, ADDRESS, "80", Direction::Sent).await,
        TagMark { total: 400, last_raw_mark: 400 }
    );
}

#[tokio::test]
async fn test_two_level_pipeline() {
    let accounting = Accounting::new();
    let agent = Arc::new(FakeConnector::new());
    let traffic = TrafficSync::new(
        accounting.accounts.clone(),
        agent.clone(),
        accounting.codec.clone(),
        Duration::from_secs(5),
    );
    let feed = port_feed(&accounting);
    let tsr = traffic_sync_request("tsr", &["80"], PERIOD).spec;
    let pfr = spec(80, None);
    let tag = Tag::new("80").unwrap();

    for (raw, expected) in [(1000, 1000), (1500, 1500), (200, 1500), (700, 1500), (1700, 1700)] {
        agent.set_counters(ADDRESS, "80", raw, 0);
        traffic.sync_tag(&tsr, &tag).await.unwrap();
        feed.sync_tag(&pfr, &tag).await.unwrap();
        assert_eq!(
            feed_mark(&accounting, ADDRESS, "80", Direction::Sent).await.total,
            expected,
            "after raw sample {raw}"
        );
    }
}

#[tokio::test]
async fn test_port_feed_controller_lifecycle() {
    let accounting = Accounting::new();
    let client = Arc::new(MemoryResourceClient::<PortFeedRequestSpec>::new());
    let controller = LifecycleController::new(port_feed(&accounting), client.clone());
    let name = client.insert(port_feed_request("pfr", 8080, None, PERIOD));
    seed_account(&accounting, ADDRESS, "8080", 50, 5).await;

    let outcome = controller.reconcile(&name).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::RequeueAfter(PERIOD));
    let resource = client.snapshot(&name).unwrap();
    assert!(resource.meta.has_finalizer(PFR_FINALIZER));
    assert!(resource.status.last_synced(&Tag::new("8080").unwrap()).is_some());
    assert_eq!(feed_mark(&accounting, ADDRESS, "8080", Direction::Sent).await.total, 50);

    // Final flush on deletion picks up late account growth
    seed_account(&accounting, ADDRESS, "8080", 25, 0).await;
    client.request_deletion(&name);
    assert_eq!(controller.reconcile(&name).await.unwrap(), ReconcileOutcome::Done);
    assert!(client.snapshot(&name).is_none());
    assert_eq!(feed_mark(&accounting, ADDRESS, "8080", Direction::Sent).await.total, 75);
}
