use crate::domain::{BoundingBox, RunState};
use crate::error::{Error, Result};
use crate::parser::FrameReader;
use crate::ports::{Clock, FrameSource, FrameStore};
use crate::throttle::{Gate, ThrottleGate};
use std::io::BufReader;
use tracing::{info, warn};

/// What a single invocation ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The previous run is too recent; nothing was fetched or written.
    Skipped { state: RunState, elapsed_days: i64 },
    /// Records were stored and `state` is the new persisted run state.
    Completed { state: RunState, records: usize },
}

/// Application service running one throttled fetch-parse-store cycle
pub struct IngestionServiceImpl {
    frame_source: Box<dyn FrameSource>,
    frame_store: Box<dyn FrameStore>,
    clock: Box<dyn Clock>,
    gate: ThrottleGate,
    bounding_box: BoundingBox,
}

impl IngestionServiceImpl {
    /// Creates a new IngestionServiceImpl with the given dependencies
    pub fn new(
        frame_source: Box<dyn FrameSource>,
        frame_store: Box<dyn FrameStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            frame_source,
            frame_store,
            clock,
            gate: ThrottleGate::weekly(),
            bounding_box: BoundingBox::default(),
        }
    }

    pub fn with_gate(mut self, gate: ThrottleGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }

    /// Executes one run: throttle check, fetch, parse, and store.
    ///
    /// All upserts and the new `last_run` are committed together; any error
    /// leaves the store exactly as it was.
    pub fn execute_ingestion(&mut self) -> Result<RunOutcome> {
        let raw = self.frame_store.load_last_run().map_err(Error::Storage)?;
        let state = RunState::from_stored(raw.as_deref())?;

        if let Gate::Skip {
            last_run,
            elapsed_days,
        } = self.gate.check(&state, self.clock.now())
        {
            info!(
                %last_run,
                elapsed_days,
                min_days = self.gate.min_days(),
                "last run is too recent, skipping"
            );
            return Ok(RunOutcome::Skipped {
                state,
                elapsed_days,
            });
        }

        let bbox = &self.bounding_box;
        info!(
            west = bbox.west,
            south = bbox.south,
            east = bbox.east,
            north = bbox.north,
            "connecting to feature service"
        );
        let body = self.frame_source.fetch(bbox).map_err(Error::Fetch)?;

        info!("parsing response");
        let frames = FrameReader::new(BufReader::new(body), self.clock.as_ref());
        let mut tx = self.frame_store.begin_run().map_err(Error::Storage)?;

        let mut records = 0;
        for frame in frames {
            let record = frame.inspect_err(|e| warn!("aborting run: {e}"))?;
            tx.upsert(&record).map_err(Error::Storage)?;
            records += 1;
        }

        let next = RunState::finished_at(self.clock.now());
        tx.commit(&next).map_err(Error::Storage)?;
        info!(records, "stored frames");

        Ok(RunOutcome::Completed {
            state: next,
            records,
        })
    }
}
