//! Mock port implementations for integration tests.
//!
//! Every mock records enough history (writes, boot-intent changes,
//! emitted events) for tests to assert on the full sequence without
//! touching NVS, the partition table, or the network.

use std::collections::HashMap;

use otablink::app::events::AppEvent;
use otablink::app::ports::{
    AppliedUpdate, EventSink, FetchError, Label, OtaFetchPort, Partition, PartitionError,
    PartitionPort, PartitionRole, StorageError, StoragePort,
};

// ── Storage ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStore {
    map: HashMap<(String, String), String>,
    pub writes: usize,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: &str, key: &str, value: &str) {
        self.map
            .insert((namespace.into(), key.into()), value.into());
    }

    pub fn value(&self, namespace: &str, key: &str) -> Option<&str> {
        self.map
            .get(&(namespace.into(), key.into()))
            .map(String::as_str)
    }
}

impl StoragePort for MemStore {
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.fail_reads {
            return Err(StorageError::IoError);
        }
        match self.map.get(&(namespace.into(), key.into())) {
            Some(v) => {
                let bytes = v.as_bytes();
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::WriteFailed);
        }
        self.writes += 1;
        self.insert(namespace, key, value);
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.map.contains_key(&(namespace.into(), key.into()))
    }
}

// ── Partition table ───────────────────────────────────────────

pub struct MockPartitions {
    pub labels: Vec<(&'static str, PartitionRole)>,
    pub running: usize,
    pub boot: usize,
    pub pending: bool,
    pub fail_running: bool,
    pub fail_pending: bool,
    /// History of boot-intent writes, in order.
    pub intent_writes: Vec<Label>,
}

#[allow(dead_code)]
impl MockPartitions {
    /// Factory + two application slots, running `ota_0`.
    pub fn standard() -> Self {
        Self {
            labels: vec![
                ("factory", PartitionRole::Factory),
                ("ota_0", PartitionRole::Application),
                ("ota_1", PartitionRole::Application),
            ],
            running: 1,
            boot: 1,
            pending: false,
            fail_running: false,
            fail_pending: false,
            intent_writes: Vec::new(),
        }
    }

    fn part(&self, idx: usize) -> Partition {
        Partition {
            label: Label::try_from(self.labels[idx].0).unwrap(),
            role: self.labels[idx].1,
        }
    }

    pub fn boot_label(&self) -> &'static str {
        self.labels[self.boot].0
    }
}

impl PartitionPort for MockPartitions {
    fn running(&self) -> Result<Partition, PartitionError> {
        if self.fail_running {
            return Err(PartitionError::MetadataRead);
        }
        Ok(self.part(self.running))
    }

    fn factory(&self) -> Result<Partition, PartitionError> {
        self.labels
            .iter()
            .position(|(_, role)| *role == PartitionRole::Factory)
            .map(|idx| self.part(idx))
            .ok_or(PartitionError::NoFactorySlot)
    }

    fn boot_target(&self) -> Result<Partition, PartitionError> {
        Ok(self.part(self.boot))
    }

    fn set_boot_target(&mut self, label: &str) -> Result<(), PartitionError> {
        let idx = self
            .labels
            .iter()
            .position(|(l, _)| *l == label)
            .ok_or(PartitionError::NotFound)?;
        self.boot = idx;
        self.intent_writes.push(Label::try_from(label).unwrap());
        Ok(())
    }

    fn rollback_pending(&self) -> Result<bool, PartitionError> {
        if self.fail_pending {
            return Err(PartitionError::MetadataRead);
        }
        Ok(self.pending)
    }

    fn mark_running_valid(&mut self) -> Result<(), PartitionError> {
        self.pending = false;
        Ok(())
    }
}

// ── Fetcher ───────────────────────────────────────────────────

/// Scripted fetcher: pops one result per call, then fails with Connect.
pub struct ScriptedFetcher {
    pub script: std::collections::VecDeque<Result<AppliedUpdate, FetchError>>,
    pub calls: usize,
}

#[allow(dead_code)]
impl ScriptedFetcher {
    pub fn new(script: Vec<Result<AppliedUpdate, FetchError>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }

    pub fn failing() -> Self {
        Self::new(Vec::new())
    }
}

impl OtaFetchPort for ScriptedFetcher {
    fn fetch_and_apply(&mut self, _url: &str) -> Result<AppliedUpdate, FetchError> {
        self.calls += 1;
        self.script.pop_front().unwrap_or(Err(FetchError::Connect))
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink(pub Vec<AppEvent>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, pred: impl Fn(&AppEvent) -> bool) -> Option<usize> {
        self.0.iter().position(pred)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.0.push(event.clone());
    }
}

// ── Helpers ───────────────────────────────────────────────────

#[allow(dead_code)]
pub fn applied_to(label: &str, bytes: usize) -> AppliedUpdate {
    AppliedUpdate {
        partition: Label::try_from(label).unwrap(),
        bytes,
        version: None,
    }
}
