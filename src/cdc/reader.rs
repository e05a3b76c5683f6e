//! Change-log reading
//!
//! `CdcLogReader` is the source-facing capability: where the log is now,
//! what it still retains, and the changes between two positions. `LogFeed`
//! wraps a reader into the position-agnostic `CdcFeed` driven by the engine.

use super::gtid::GtidSet;
use super::position::CdcPosition;
use super::validator::{OffsetValidator, Retention, ValidationOutcome};
use crate::engine::Message;
use crate::error::{CdcRecovery, Error, Result};
use crate::state::{CdcLogState, GlobalKey, StreamKey};
use crate::types::{InvalidCdcPositionBehavior, JsonValue, OpaqueStateValue, Row};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Offsets and events
// ============================================================================

/// A log position plus what is needed to resume reading at it
#[derive(Debug, Clone, PartialEq)]
pub struct CdcOffset<P> {
    pub position: P,
    /// Transactions processed up to the position, for GTID sources
    pub gtids: Option<GtidSet>,
    /// Snapshot of the log's schema history at the position
    pub schema_history: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawOffset {
    position: String,
    #[serde(default)]
    gtids: Option<String>,
    #[serde(default)]
    schema_history: Option<JsonValue>,
}

impl<P: CdcPosition> CdcOffset<P> {
    pub fn new(position: P) -> Self {
        Self {
            position,
            gtids: None,
            schema_history: None,
        }
    }

    #[must_use]
    pub fn with_gtids(mut self, gtids: GtidSet) -> Self {
        self.gtids = Some(gtids);
        self
    }

    #[must_use]
    pub fn with_schema_history(mut self, history: JsonValue) -> Self {
        self.schema_history = Some(history);
        self
    }

    /// The same metadata at a later position
    #[must_use]
    pub fn advanced_to(&self, position: P) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    /// Record one more executed transaction
    ///
    /// No-op for offsets of sources without GTIDs.
    pub fn add_transaction(&mut self, uuid: &str, transaction: u64) {
        if let Some(gtids) = &mut self.gtids {
            gtids.add(uuid, transaction, transaction);
        }
    }

    /// Opaque persisted form
    pub fn to_value(&self) -> OpaqueStateValue {
        json!({
            "position": self.position.to_string(),
            "gtids": self.gtids.as_ref().map(ToString::to_string),
            "schema_history": self.schema_history,
        })
    }

    /// Parse the persisted form
    pub fn from_value(value: &OpaqueStateValue) -> Result<Self> {
        let raw: RawOffset = serde_json::from_value(value.clone())
            .map_err(|e| Error::state(format!("invalid CDC offset {value}: {e}")))?;
        let gtids = match raw.gtids.as_deref().map(str::trim) {
            Some(gtids) if !gtids.is_empty() => Some(gtids.parse()?),
            _ => None,
        };
        Ok(Self {
            position: raw.position.parse()?,
            gtids,
            schema_history: raw.schema_history,
        })
    }
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One row change read from the log
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<P> {
    pub stream: StreamKey,
    pub position: P,
    pub op: ChangeOp,
    pub data: Row,
    /// Server UUID and transaction number, for GTID sources
    pub gtid: Option<(String, u64)>,
}

impl<P: CdcPosition> ChangeEvent<P> {
    /// Row data with change metadata columns added
    pub fn into_record(self) -> Row {
        let mut data = self.data;
        data.insert("_cdc_position".into(), json!(self.position.to_string()));
        data.insert("_cdc_cursor".into(), json!(self.position.cursor_value()));
        data.insert("_cdc_op".into(), json!(self.op));
        data
    }
}

/// Lazily read changes
pub type ChangeStream<'a, P> = BoxStream<'a, Result<ChangeEvent<P>>>;

// ============================================================================
// Log reader capability
// ============================================================================

/// Source-specific access to a change log
#[async_trait]
pub trait CdcLogReader: Send + Sync {
    type Position: CdcPosition;

    /// Offset at the current end of the log
    async fn current_position(&self) -> Result<CdcOffset<Self::Position>>;

    /// What the log still retains
    async fn retention(&self) -> Result<Retention<Self::Position>>;

    /// Changes after `from` up to and including `target`, in log order
    fn changes(
        &self,
        from: &CdcOffset<Self::Position>,
        target: &Self::Position,
    ) -> ChangeStream<'_, Self::Position>;

    fn serialize(&self, offset: &CdcOffset<Self::Position>) -> OpaqueStateValue {
        offset.to_value()
    }

    fn deserialize(&self, value: &OpaqueStateValue) -> Result<CdcOffset<Self::Position>> {
        CdcOffset::from_value(value)
    }
}

// ============================================================================
// Feed driven by the engine
// ============================================================================

/// Starting point of the change log for one sync
#[derive(Debug, Clone, PartialEq)]
pub struct CdcBootstrap {
    pub state: CdcLogState,
    /// Set when saved CDC state was discarded; nested streams start over
    pub reset: Option<String>,
}

/// End of the log interval read by one sync
#[derive(Debug, Clone, PartialEq)]
pub struct CdcTarget {
    pub position: String,
    pub offset: OpaqueStateValue,
}

/// Outcome of reading one log interval
#[derive(Debug, Clone, PartialEq)]
pub struct CdcRun {
    pub state: CdcLogState,
    /// Rows emitted per nested stream
    pub stream_counts: HashMap<StreamKey, u64>,
}

/// Position-agnostic change-log access for the engine
#[async_trait]
pub trait CdcFeed: Send + Sync {
    /// Streams read through the log
    fn streams(&self) -> &GlobalKey;

    /// Validate saved state and decide where the log starts
    async fn bootstrap(&self, saved: Option<&OpaqueStateValue>) -> Result<CdcBootstrap>;

    /// Capture the current end of the log
    async fn target(&self) -> Result<CdcTarget>;

    /// Read changes after `from` up to `target`
    ///
    /// Stops early at a position boundary once `stop` is cancelled, checking
    /// it every `fetch_size` changes.
    async fn run(
        &self,
        from: &OpaqueStateValue,
        target: &CdcTarget,
        output: &mpsc::Sender<Message>,
        stop: &CancellationToken,
        fetch_size: usize,
    ) -> Result<CdcRun>;
}

/// `CdcFeed` over a `CdcLogReader`
pub struct LogFeed<R> {
    reader: Arc<R>,
    streams: GlobalKey,
    validator: OffsetValidator,
}

impl<R: CdcLogReader + 'static> LogFeed<R> {
    pub fn new(reader: Arc<R>, streams: GlobalKey, behavior: InvalidCdcPositionBehavior) -> Self {
        Self {
            reader,
            streams,
            validator: OffsetValidator::new(behavior),
        }
    }

    async fn fresh_start(&self) -> Result<CdcLogState> {
        let offset = self.reader.current_position().await?;
        info!(position = %offset.position, "Starting change log at current position");
        Ok(CdcLogState::Completed {
            offset: self.reader.serialize(&offset),
        })
    }
}

#[async_trait]
impl<R: CdcLogReader + 'static> CdcFeed for LogFeed<R> {
    fn streams(&self) -> &GlobalKey {
        &self.streams
    }

    async fn bootstrap(&self, saved: Option<&OpaqueStateValue>) -> Result<CdcBootstrap> {
        let Some(saved) = saved else {
            return Ok(CdcBootstrap {
                state: self.fresh_start().await?,
                reset: None,
            });
        };

        let offset = self.reader.deserialize(saved)?;
        let retention = self.reader.retention().await?;
        match self.validator.validate(&offset, &retention) {
            ValidationOutcome::Valid => {
                debug!(position = %offset.position, "Resuming change log");
                Ok(CdcBootstrap {
                    state: CdcLogState::Ongoing {
                        offset: saved.clone(),
                    },
                    reset: None,
                })
            }
            ValidationOutcome::Abort => Err(Error::invalid_cdc_position(
                CdcRecovery::ManualReset,
                format!("saved position {}", offset.position),
            )),
            ValidationOutcome::Reset => {
                let notice = Error::invalid_cdc_position(
                    CdcRecovery::AutoResync,
                    format!("saved position {}", offset.position),
                )
                .to_string();
                warn!("{notice}");
                Ok(CdcBootstrap {
                    state: self.fresh_start().await?,
                    reset: Some(notice),
                })
            }
        }
    }

    async fn target(&self) -> Result<CdcTarget> {
        let offset = self.reader.current_position().await?;
        Ok(CdcTarget {
            position: offset.position.to_string(),
            offset: self.reader.serialize(&offset),
        })
    }

    async fn run(
        &self,
        from: &OpaqueStateValue,
        target: &CdcTarget,
        output: &mpsc::Sender<Message>,
        stop: &CancellationToken,
        fetch_size: usize,
    ) -> Result<CdcRun> {
        let from = self.reader.deserialize(from)?;
        let target_offset = self.reader.deserialize(&target.offset)?;
        let mut stream_counts = HashMap::new();
        if from.position >= target_offset.position {
            return Ok(CdcRun {
                state: CdcLogState::Completed {
                    offset: target.offset.clone(),
                },
                stream_counts,
            });
        }

        let batch = fetch_size.max(1);
        let mut changes = self.reader.changes(&from, &target_offset.position);
        let mut reached = from.clone();
        let mut last: Option<R::Position> = None;
        let mut since_check = 0usize;
        let mut stopping = false;
        let mut interrupted = false;

        while let Some(event) = changes.try_next().await? {
            if since_check >= batch {
                since_check = 0;
                stopping = stopping || stop.is_cancelled();
            }
            // Changes sharing a position are never split across runs
            if stopping && last.as_ref().is_some_and(|l| *l != event.position) {
                interrupted = true;
                break;
            }
            since_check += 1;
            last = Some(event.position.clone());
            if let Some((uuid, transaction)) = &event.gtid {
                reached.add_transaction(uuid, *transaction);
            }

            if !self.streams.contains(&event.stream) {
                continue;
            }
            let stream = event.stream.clone();
            output
                .send(Message::record(stream.clone(), event.into_record()))
                .await
                .map_err(|_| Error::output("output channel closed"))?;
            *stream_counts.entry(stream).or_insert(0) += 1;
        }

        let state = match last {
            Some(position) if interrupted => {
                debug!(position = %position, "Change log read stopped early");
                CdcLogState::Ongoing {
                    offset: self.reader.serialize(&reached.advanced_to(position)),
                }
            }
            _ => CdcLogState::Completed {
                offset: target.offset.clone(),
            },
        };
        Ok(CdcRun {
            state,
            stream_counts,
        })
    }
}
