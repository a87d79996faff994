use std::{sync::Arc, time::Duration};

use tunnel_proxy_core::{
    RefreshScheduler, ResolveError, TargetStore, UpstreamTarget, scheduler::refresh,
};

mod common;
use common::{Reply, ScriptedSource};

const INTERVAL: Duration = Duration::from_secs(300);

fn target(s: &str) -> UpstreamTarget {
    s.parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn refresh_swaps_only_on_change() {
    let store = Arc::new(TargetStore::with_target(target("http://a.example")));
    let source = ScriptedSource::new(vec![
        Reply::tunnel("http://a.example"),
        Reply::tunnel("http://b.example"),
    ]);
    let resolver = common::resolver(source.clone(), 1);

    assert!(!refresh(resolver.clone(), store.clone(), INTERVAL).await);
    assert!(refresh(resolver.clone(), store.clone(), INTERVAL).await);
    assert_eq!(*store.get().unwrap(), target("http://b.example"));
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_keeps_previous_target() {
    let store = Arc::new(TargetStore::with_target(target("http://a.example")));
    let source = ScriptedSource::new(vec![Reply::Fail(ResolveError::transport("down"))]);

    assert!(!refresh(common::resolver(source.clone(), 2), store.clone(), INTERVAL).await);
    assert_eq!(source.calls(), 2);
    assert_eq!(*store.get().unwrap(), target("http://a.example"));
}

#[tokio::test(start_paused = true)]
async fn ticks_once_per_interval() {
    let store = Arc::new(TargetStore::with_target(target("http://a.example")));
    let source = ScriptedSource::new(vec![Reply::tunnel("http://b.example")]);
    let handle =
        RefreshScheduler::new(common::resolver(source.clone(), 1), store.clone(), INTERVAL).start();

    tokio::time::sleep(INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 0, "no tick before the first interval");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(*store.get().unwrap(), target("http://b.example"));

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(source.calls(), 3);

    assert!(handle.is_running());
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn survives_failing_ticks() {
    let store = Arc::new(TargetStore::with_target(target("http://a.example")));
    let source = ScriptedSource::new(vec![
        Reply::Fail(ResolveError::transport("down")),
        Reply::Json("{}".to_string()),
        Reply::tunnel("http://c.example"),
    ]);
    let handle =
        RefreshScheduler::new(common::resolver(source.clone(), 1), store.clone(), INTERVAL).start();

    tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)).await;
    assert_eq!(*store.get().unwrap(), target("http://a.example"));

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(*store.get().unwrap(), target("http://c.example"));
    assert!(handle.is_running());
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn hung_tick_does_not_block_the_next() {
    let store = Arc::new(TargetStore::with_target(target("http://a.example")));
    let source = ScriptedSource::new(vec![Reply::Hang, Reply::tunnel("http://d.example")]);
    let handle =
        RefreshScheduler::new(common::resolver(source.clone(), 1), store.clone(), INTERVAL).start();

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(*store.get().unwrap(), target("http://a.example"));

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(*store.get().unwrap(), target("http://d.example"));
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_ends_ticking() {
    let store = Arc::new(TargetStore::new());
    let source = ScriptedSource::new(vec![Reply::tunnel("http://a.example")]);
    let handle =
        RefreshScheduler::new(common::resolver(source.clone(), 1), store.clone(), INTERVAL).start();

    handle.stop().await;
    tokio::time::sleep(INTERVAL * 3).await;

    assert_eq!(source.calls(), 0);
    assert!(store.get().is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_scheduler() {
    let store = Arc::new(TargetStore::new());
    let source = ScriptedSource::new(vec![Reply::tunnel("http://a.example")]);
    drop(RefreshScheduler::new(common::resolver(source.clone(), 1), store, INTERVAL).start());

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(source.calls(), 0);
}
