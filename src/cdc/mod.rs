//! Change data capture module
//!
//! Log positions, saved-offset validation, and log reading for streams
//! replicated through the source's change log.
//!
//! # Overview
//!
//! - `CdcPosition` - Ordered log marker (`Lsn`, `BinlogPosition`)
//! - `OffsetValidator` - Decides whether a saved offset is still retained
//! - `CdcLogReader` - Source capability for reading the log
//! - `CdcFeed` / `LogFeed` - Log reading as driven by the engine

mod gtid;
mod memory;
mod position;
mod reader;
mod validator;

pub use gtid::GtidSet;
pub use memory::MemoryChangeLog;
pub use position::{BinlogPosition, CdcPosition, Lsn};
pub use reader::{
    CdcBootstrap, CdcFeed, CdcLogReader, CdcOffset, CdcRun, CdcTarget, ChangeEvent, ChangeOp,
    ChangeStream, LogFeed,
};
pub use validator::{OffsetValidator, Retention, ValidationOutcome};
