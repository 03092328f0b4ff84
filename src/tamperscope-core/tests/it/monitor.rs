//! Continuous monitor behavior under paused time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tamperscope_core::monitor::{self, MonitorExit};
use tamperscope_core::{CheckVerdict, Environment, MonitorConfig, StaticEnvironment, TrustEngine};

use crate::fixtures;

type Detections = Arc<Mutex<Vec<CheckVerdict>>>;

fn recorder() -> (Detections, impl FnOnce(CheckVerdict) + Send + 'static) {
    let detections: Detections = Arc::default();
    let sink = Arc::clone(&detections);
    let callback = move |verdict: CheckVerdict| {
        if let Ok(mut list) = sink.lock() {
            list.push(verdict);
        }
    };
    (detections, callback)
}

fn fast() -> MonitorConfig {
    MonitorConfig::from_bounds(Duration::from_millis(100), Duration::from_millis(300))
}

#[tokio::test(start_paused = true)]
async fn first_query_attached_reports_once_and_stops() {
    let env = Arc::new(StaticEnvironment::new().with_debugger(Ok(true)));
    let (detections, callback) = recorder();

    let handle = monitor::spawn(env.clone() as Arc<dyn Environment>, fast(), callback);
    assert_eq!(handle.join().await, MonitorExit::DebuggerDetected);

    let detections = detections.lock().unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].name, "debugger-presence");
    assert!(!detections[0].passed);
    assert_eq!(env.debugger_query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn later_detection_stops_further_queries() {
    let env = Arc::new(
        StaticEnvironment::new().with_debugger_sequence(vec![Ok(false), Ok(false), Ok(true)]),
    );
    let (detections, callback) = recorder();

    let handle = monitor::spawn(env.clone() as Arc<dyn Environment>, fast(), callback);
    assert_eq!(handle.join().await, MonitorExit::DebuggerDetected);
    assert_eq!(env.debugger_query_count(), 3);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(env.debugger_query_count(), 3);
    assert_eq!(detections.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_the_loop() {
    let env = Arc::new(StaticEnvironment::new());
    let (detections, callback) = recorder();

    let handle = monitor::spawn(env.clone() as Arc<dyn Environment>, fast(), callback);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!handle.is_finished());

    handle.cancel();
    handle.cancel();
    assert_eq!(handle.join().await, MonitorExit::Cancelled);

    let queries = env.debugger_query_count();
    assert!(queries >= 2, "only {queries} queries in 2s");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(env.debugger_query_count(), queries);
    assert!(detections.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_bounds_do_not_spin() {
    let env = Arc::new(StaticEnvironment::new());
    let (_detections, callback) = recorder();
    let zero = MonitorConfig {
        min_interval_ms: 0,
        max_interval_ms: 0,
    };

    let handle = monitor::spawn(env.clone() as Arc<dyn Environment>, zero, callback);
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel();
    assert_eq!(handle.join().await, MonitorExit::Cancelled);

    let queries = env.debugger_query_count();
    assert!((1..=12).contains(&queries), "{queries} queries in 10ms");
}

#[tokio::test(start_paused = true)]
async fn cancel_before_first_poll_skips_the_query() {
    let env = Arc::new(StaticEnvironment::new().with_debugger(Ok(true)));
    let (detections, callback) = recorder();

    let handle = monitor::spawn(env.clone() as Arc<dyn Environment>, fast(), callback);
    handle.cancel();
    assert_eq!(handle.join().await, MonitorExit::Cancelled);
    assert_eq!(env.debugger_query_count(), 0);
    assert!(detections.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn query_errors_keep_monitoring() {
    let env = Arc::new(StaticEnvironment::new().with_debugger_sequence(vec![
        Err(tamperscope_core::QueryError::Unsupported {
            capability: "query_debugger_attached",
        }),
        Ok(true),
    ]));
    let (_detections, callback) = recorder();

    let handle = monitor::spawn(env.clone() as Arc<dyn Environment>, fast(), callback);
    assert_eq!(handle.join().await, MonitorExit::DebuggerDetected);
    assert_eq!(env.debugger_query_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn engine_starts_monitor_with_its_config() {
    let mut config = fixtures::config(&[]);
    config.monitor = fast();
    let env = Arc::new(StaticEnvironment::new().with_debugger_sequence(vec![Ok(false), Ok(true)]));
    let engine = TrustEngine::new(config, env.clone());
    let (detections, callback) = recorder();

    let handle = engine.start_continuous_monitor(callback);
    assert_eq!(handle.join().await, MonitorExit::DebuggerDetected);
    assert_eq!(detections.lock().unwrap().len(), 1);
}
