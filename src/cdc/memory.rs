//! In-memory change log
//!
//! LSN-positioned log for tests and dry runs. Supports purging, which moves
//! the oldest retained position forward.

use super::position::Lsn;
use super::reader::{CdcLogReader, CdcOffset, ChangeEvent, ChangeOp, ChangeStream};
use super::validator::Retention;
use crate::error::Result;
use crate::state::StreamKey;
use crate::types::Row;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

const LSN_STEP: u64 = 0x28;

#[derive(Debug)]
struct Log {
    events: Vec<ChangeEvent<Lsn>>,
    oldest: Lsn,
    head: Lsn,
}

/// Change log held in memory
#[derive(Debug)]
pub struct MemoryChangeLog {
    log: Mutex<Log>,
}

impl Default for MemoryChangeLog {
    fn default() -> Self {
        Self::starting_at(Lsn::new(0x16_0000_0000))
    }
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty log whose head is `start`
    pub fn starting_at(start: Lsn) -> Self {
        Self {
            log: Mutex::new(Log {
                events: Vec::new(),
                oldest: start,
                head: start,
            }),
        }
    }

    /// Append one change in its own transaction
    pub fn append(&self, stream: StreamKey, op: ChangeOp, data: Row) -> Lsn {
        self.append_transaction([(stream, op, data)])
    }

    /// Append changes sharing one commit position
    pub fn append_transaction(
        &self,
        changes: impl IntoIterator<Item = (StreamKey, ChangeOp, Row)>,
    ) -> Lsn {
        let mut log = self.log.lock();
        let position = Lsn::new(log.head.value() + LSN_STEP);
        log.head = position;
        log.events
            .extend(changes.into_iter().map(|(stream, op, data)| ChangeEvent {
                stream,
                position,
                op,
                data,
                gtid: None,
            }));
        position
    }

    /// Drop every change before `position`
    pub fn purge_before(&self, position: Lsn) {
        let mut log = self.log.lock();
        log.events.retain(|event| event.position >= position);
        log.oldest = log.oldest.max(position);
    }

    pub fn head(&self) -> Lsn {
        self.log.lock().head
    }

    pub fn len(&self) -> usize {
        self.log.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().events.is_empty()
    }
}

#[async_trait]
impl CdcLogReader for MemoryChangeLog {
    type Position = Lsn;

    async fn current_position(&self) -> Result<CdcOffset<Lsn>> {
        Ok(CdcOffset::new(self.head()))
    }

    async fn retention(&self) -> Result<Retention<Lsn>> {
        let log = self.log.lock();
        Ok(Retention::range(log.oldest, log.head))
    }

    fn changes(&self, from: &CdcOffset<Lsn>, target: &Lsn) -> ChangeStream<'_, Lsn> {
        let (from, target) = (from.position, *target);
        let events: Vec<_> = self
            .log
            .lock()
            .events
            .iter()
            .filter(|event| from < event.position && event.position <= target)
            .cloned()
            .collect();
        stream::iter(events.into_iter().map(Ok)).boxed()
    }
}
