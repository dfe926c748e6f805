//! Update-cycle integration tests: engine + fetch port + boot intent.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use otablink::app::ports::{
    AppliedUpdate, FetchError, OtaFetchPort, PartitionPort,
};
use otablink::app::source::{ResolvedSource, SourceOrigin, UrlString};
use otablink::app::updater::{CycleOutcome, EngineState, RetryPolicy, UpdateEngine};

use crate::mock_env::{applied_to, MockPartitions, RecordingSink, ScriptedFetcher};

const URL: &str = "https://firmware.otablink.dev/releases/otablink.bin";

fn source() -> ResolvedSource {
    ResolvedSource {
        url: UrlString::try_from(URL).unwrap(),
        origin: SourceOrigin::StoredDefault,
    }
}

/// Fetcher that honours the port contract against a shared partition
/// table: boot intent moves on success, and only on success.
struct IntentSettingFetcher {
    table: Rc<RefCell<MockPartitions>>,
    script: Vec<Result<AppliedUpdate, FetchError>>,
    next: usize,
}

impl OtaFetchPort for IntentSettingFetcher {
    fn fetch_and_apply(&mut self, _url: &str) -> Result<AppliedUpdate, FetchError> {
        let result = self
            .script
            .get(self.next)
            .cloned()
            .unwrap_or(Err(FetchError::Connect));
        self.next += 1;
        if let Ok(applied) = &result {
            self.table
                .borrow_mut()
                .set_boot_target(&applied.partition)
                .map_err(|_| FetchError::BootSet)?;
        }
        result
    }
}

#[test]
fn success_transition_points_intent_at_new_partition() {
    let table = Rc::new(RefCell::new(MockPartitions::standard()));
    let mut fetcher = IntentSettingFetcher {
        table: Rc::clone(&table),
        script: vec![Ok(applied_to("ota_1", 900_000))],
        next: 0,
    };
    let mut engine = UpdateEngine::new(source(), RetryPolicy::default());

    let outcome = engine.run_cycle(&mut fetcher, &mut RecordingSink::new());

    assert_eq!(outcome, CycleOutcome::RestartRequired);
    assert_eq!(engine.state(), EngineState::Rebooting);
    assert_eq!(table.borrow().boot_label(), "ota_1");
}

#[test]
fn failed_fetch_leaves_boot_intent_unchanged() {
    let table = Rc::new(RefCell::new(MockPartitions::standard()));
    let mut fetcher = IntentSettingFetcher {
        table: Rc::clone(&table),
        script: vec![
            Err(FetchError::Connect),
            Err(FetchError::Http(503)),
            Err(FetchError::Validation),
        ],
        next: 0,
    };
    let mut engine = UpdateEngine::new(source(), RetryPolicy::default());

    for _ in 0..3 {
        let outcome = engine.run_cycle(&mut fetcher, &mut RecordingSink::new());
        assert!(matches!(outcome, CycleOutcome::RetryAfter(_)));
        assert_eq!(engine.state(), EngineState::Idle);
    }
    assert_eq!(table.borrow().boot_label(), "ota_0");
    assert!(table.borrow().intent_writes.is_empty());
}

#[test]
fn retry_liveness_under_persistent_failure() {
    let mut engine = UpdateEngine::new(source(), RetryPolicy::default());
    let mut fetcher = ScriptedFetcher::failing();
    let mut sink = RecordingSink::new();

    // A stuck unreachable URL retries forever at a constant period.
    for _ in 0..100 {
        match engine.run_cycle(&mut fetcher, &mut sink) {
            CycleOutcome::RetryAfter(delay) => {
                assert_eq!(delay, Duration::from_secs(60));
            }
            other => panic!("expected RetryAfter, got {:?}", other),
        }
    }
    assert_eq!(fetcher.calls, 100);
}

#[test]
fn eventual_success_after_transient_failures() {
    let mut engine = UpdateEngine::new(source(), RetryPolicy::default());
    let mut fetcher = ScriptedFetcher::new(vec![
        Err(FetchError::Connect),
        Err(FetchError::NoUpdate),
        Ok(applied_to("ota_1", 1_200_000)),
    ]);
    let mut sink = RecordingSink::new();

    assert!(matches!(
        engine.run_cycle(&mut fetcher, &mut sink),
        CycleOutcome::RetryAfter(_)
    ));
    assert!(matches!(
        engine.run_cycle(&mut fetcher, &mut sink),
        CycleOutcome::RetryAfter(_)
    ));
    assert_eq!(
        engine.run_cycle(&mut fetcher, &mut sink),
        CycleOutcome::RestartRequired
    );
}
