//! End-to-end watchdog orchestration tests with scripted in-memory sources
//! and a recording notifier — no network involved.

use async_trait::async_trait;
use spotd::cache::Delta;
use spotd::notify::{Notifier, NotifyError};
use spotd::source::{AgentSource, SourceError};
use spotd::watchdog::Watchdog;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays a fixed sequence of query results, one per cycle. Once the script
/// runs out it keeps returning "nothing offline".
struct ScriptedSource {
    name: String,
    script: Mutex<VecDeque<Result<Vec<String>, SourceError>>>,
}

impl ScriptedSource {
    fn new(name: &str, script: Vec<Result<Vec<String>, SourceError>>) -> Arc<dyn AgentSource> {
        Arc::new(Self {
            name: format!("[mock] {name}"),
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl AgentSource for ScriptedSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn find_offline_agents(&self) -> Result<Vec<String>, SourceError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct RecordingNotifier {
    deliveries: Mutex<Vec<Delta>>,
    fail: bool,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn deliveries(&self) -> Vec<Delta> {
        self.deliveries.lock().unwrap().clone()
    }

    fn sink(self: &Arc<Self>) -> Option<Arc<dyn Notifier>> {
        Some(Arc::clone(self) as Arc<dyn Notifier>)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, delta: &Delta) -> Result<(), NotifyError> {
        self.deliveries.lock().unwrap().push(delta.clone());
        if self.fail {
            Err(NotifyError::Status(reqwest::StatusCode::BAD_GATEWAY))
        } else {
            Ok(())
        }
    }
}

fn agents(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}

fn delta(entries: &[(&str, &[&str])]) -> Delta {
    entries
        .iter()
        .map(|(source, list)| (source.to_string(), agents(list)))
        .collect()
}

fn transient_error() -> SourceError {
    SourceError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)
}

#[tokio::test]
async fn one_healthy_one_failing_source_notifies_once_then_goes_quiet() {
    let healthy = ScriptedSource::new(
        "one",
        vec![Ok(agents(&["p"])), Ok(agents(&["p"]))],
    );
    let broken = ScriptedSource::new(
        "two",
        vec![Err(transient_error()), Err(transient_error())],
    );
    let notifier = RecordingNotifier::new();
    let mut watchdog = Watchdog::new(vec![healthy, broken], notifier.sink());

    // First cycle: p is newly offline, the failing source contributes nothing.
    watchdog.run_cycle_and_notify().await.unwrap();
    assert_eq!(
        notifier.deliveries(),
        vec![delta(&[("[mock] one", &["p"])])]
    );

    // Second cycle: same report, nothing new, sink is not invoked again.
    watchdog.run_cycle_and_notify().await.unwrap();
    assert_eq!(notifier.deliveries().len(), 1);
}

#[tokio::test]
async fn empty_cycle_never_invokes_the_sink() {
    let quiet = ScriptedSource::new("quiet", vec![Ok(Vec::new())]);
    let notifier = RecordingNotifier::new();
    let mut watchdog = Watchdog::new(vec![quiet], notifier.sink());

    watchdog.run_cycle_and_notify().await.unwrap();

    assert!(notifier.deliveries().is_empty());
}

#[tokio::test]
async fn missing_notifier_is_logged_not_an_error() {
    let source = ScriptedSource::new("one", vec![Ok(agents(&["p"]))]);
    let mut watchdog = Watchdog::new(vec![source], None);

    watchdog.run_cycle_and_notify().await.unwrap();
}

#[tokio::test]
async fn delivery_failure_propagates_but_cache_stays_committed() {
    let source = ScriptedSource::new(
        "one",
        vec![Ok(agents(&["p"])), Ok(agents(&["p"]))],
    );
    let notifier = RecordingNotifier::failing();
    let mut watchdog = Watchdog::new(vec![source], notifier.sink());

    // The failed delivery surfaces to the caller...
    watchdog.run_cycle_and_notify().await.unwrap_err();

    // ...but the cycle's cache mutation already committed: the same agents
    // are not re-reported, so no second delivery is attempted.
    watchdog.run_cycle_and_notify().await.unwrap();
    assert_eq!(notifier.deliveries().len(), 1);
}

#[tokio::test]
async fn source_errors_drop_tracking_and_rearm_the_alert() {
    let flaky = ScriptedSource::new(
        "flaky",
        vec![
            Ok(agents(&["x"])),
            Err(transient_error()),
            Ok(agents(&["x"])),
        ],
    );
    let notifier = RecordingNotifier::new();
    let mut watchdog = Watchdog::new(vec![flaky], notifier.sink());

    watchdog.run_cycle_and_notify().await.unwrap();
    // The failing cycle reads as "all clear" — x drops out of tracking.
    watchdog.run_cycle_and_notify().await.unwrap();
    // A later successful cycle re-reports x as newly offline.
    watchdog.run_cycle_and_notify().await.unwrap();

    let expected = delta(&[("[mock] flaky", &["x"])]);
    assert_eq!(notifier.deliveries(), vec![expected.clone(), expected]);
}

#[tokio::test]
async fn sources_sharing_a_name_merge_under_one_key() {
    let first = ScriptedSource::new("shared", vec![Ok(agents(&["a"]))]);
    let second = ScriptedSource::new("shared", vec![Ok(agents(&["b"]))]);
    let mut watchdog = Watchdog::new(vec![first, second], None);

    let result = watchdog.run_cycle().await;

    assert_eq!(result.len(), 1);
    let merged = &result["[mock] shared"];
    assert_eq!(merged.len(), 2);
    assert!(merged.contains(&"a".to_string()));
    assert!(merged.contains(&"b".to_string()));
}

#[tokio::test]
async fn run_cycle_alone_never_notifies() {
    let source = ScriptedSource::new("one", vec![Ok(agents(&["p"]))]);
    let notifier = RecordingNotifier::new();
    let mut watchdog = Watchdog::new(vec![source], notifier.sink());

    let result = watchdog.run_cycle().await;

    assert_eq!(result, delta(&[("[mock] one", &["p"])]));
    assert!(notifier.deliveries().is_empty());
}

#[tokio::test]
async fn multi_source_deltas_arrive_in_one_delivery() {
    let jenkins = ScriptedSource::new("a", vec![Ok(agents(&["x"]))]);
    let bamboo = ScriptedSource::new("b", vec![Ok(agents(&["y"]))]);
    let notifier = RecordingNotifier::new();
    let mut watchdog = Watchdog::new(vec![jenkins, bamboo], notifier.sink());

    watchdog.run_cycle_and_notify().await.unwrap();

    assert_eq!(
        notifier.deliveries(),
        vec![delta(&[("[mock] a", &["x"]), ("[mock] b", &["y"])])]
    );
}
