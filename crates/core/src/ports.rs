use crate::domain::{BoundingBox, Record, RunState};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::io::Read;

pub type PortError = Box<dyn Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, PortError>;

/// Remote feature service queried once per run.
pub trait FrameSource {
    /// Issues the feature query for `bbox` and hands back the raw response body.
    fn fetch(&self, bbox: &BoundingBox) -> Result<Box<dyn Read + Send>>;
}

/// Persistent storage for records and run state.
pub trait FrameStore {
    /// Raw stored `last_run` value, `None` before the first successful run.
    fn load_last_run(&self) -> Result<Option<String>>;

    /// Starts the write side of a run. Nothing becomes visible until
    /// [`RunTransaction::commit`]; dropping the transaction discards it.
    fn begin_run(&mut self) -> Result<Box<dyn RunTransaction + '_>>;
}

pub trait RunTransaction {
    /// Insert-or-update keyed by `(gml_id, slm_id, smcislo)`.
    fn upsert(&mut self, record: &Record) -> Result<()>;

    /// Persists `state` and makes every upsert of this run durable.
    fn commit(self: Box<Self>, state: &RunState) -> Result<()>;
}

/// Time source, injected so runs can be replayed at a fixed instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
