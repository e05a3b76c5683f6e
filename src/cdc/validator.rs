//! Saved offset validation
//!
//! Decides whether a saved change-log offset can still be resumed from,
//! given what the source currently retains. Retention boundaries are
//! inclusive: a saved position equal to the oldest or newest retained
//! position is valid.

use super::gtid::GtidSet;
use super::position::CdcPosition;
use super::reader::CdcOffset;
use crate::types::InvalidCdcPositionBehavior;
use tracing::{info, warn};

/// What the source currently retains of its change log
#[derive(Debug, Clone, PartialEq)]
pub struct Retention<P> {
    /// Retained units (e.g. binlog files), oldest first
    pub units: Vec<String>,
    /// Oldest position still readable, if the source reports one
    pub oldest: Option<P>,
    /// Current end of the log
    pub newest: P,
    /// Transactions the source has executed
    pub executed: Option<GtidSet>,
    /// Transactions the source has executed but no longer retains
    pub purged: Option<GtidSet>,
}

impl<P: CdcPosition> Retention<P> {
    /// Retention of a source that keeps everything from `oldest` to `newest`
    pub fn range(oldest: P, newest: P) -> Self {
        Self {
            units: Vec::new(),
            oldest: Some(oldest),
            newest,
            executed: None,
            purged: None,
        }
    }

    #[must_use]
    pub fn with_units(mut self, units: Vec<String>) -> Self {
        self.units = units;
        self
    }

    #[must_use]
    pub fn with_gtids(mut self, executed: GtidSet, purged: Option<GtidSet>) -> Self {
        self.executed = Some(executed);
        self.purged = purged;
        self
    }
}

/// Outcome of validating a saved offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Resume from the saved offset
    Valid,
    /// Stop; the offset cannot be recovered automatically
    Abort,
    /// Discard saved CDC state and start over
    Reset,
}

/// Checks saved offsets against source retention
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetValidator {
    behavior: InvalidCdcPositionBehavior,
}

impl OffsetValidator {
    pub fn new(behavior: InvalidCdcPositionBehavior) -> Self {
        Self { behavior }
    }

    pub fn behavior(&self) -> InvalidCdcPositionBehavior {
        self.behavior
    }

    /// Validate a saved offset
    pub fn validate<P: CdcPosition>(
        &self,
        saved: &CdcOffset<P>,
        retention: &Retention<P>,
    ) -> ValidationOutcome {
        let position = &saved.position;

        if let Some(saved_gtids) = &saved.gtids {
            let Some(executed) = retention.executed.as_ref().filter(|e| !e.is_empty()) else {
                warn!(
                    saved = %saved_gtids,
                    "Offset was saved with GTIDs but the source reports none"
                );
                return ValidationOutcome::Abort;
            };
            return self.validate_gtids(saved_gtids, executed, retention.purged.as_ref());
        }

        if let Some(unit) = position.retention_unit() {
            if retention.units.is_empty() {
                warn!(unit, "Source reports no retained log units");
                return ValidationOutcome::Abort;
            }
            if !retention.units.iter().any(|u| u == unit) {
                info!(
                    unit,
                    retained = %retention.units.join(", "),
                    "Source no longer retains the saved log unit"
                );
                return self.policy();
            }
        }

        if let Some(oldest) = &retention.oldest {
            if position < oldest {
                info!(saved = %position, oldest = %oldest, "Saved position was purged");
                return self.policy();
            }
        }

        if position > &retention.newest {
            warn!(
                saved = %position,
                newest = %retention.newest,
                "Saved position is ahead of the source's log"
            );
            return self.policy();
        }

        ValidationOutcome::Valid
    }

    fn validate_gtids(
        &self,
        saved: &GtidSet,
        executed: &GtidSet,
        purged: Option<&GtidSet>,
    ) -> ValidationOutcome {
        if !saved.is_contained_within(executed) {
            info!(
                saved = %saved,
                executed = %executed,
                "Source does not know every saved GTID"
            );
            return self.policy();
        }
        let unseen = executed.subtract(saved);
        if let Some(purged) = purged {
            if unseen.intersects(purged) {
                info!(
                    unseen = %unseen,
                    purged = %purged,
                    "Some GTIDs still to replicate were purged"
                );
                return self.policy();
            }
        }
        ValidationOutcome::Valid
    }

    fn policy(&self) -> ValidationOutcome {
        match self.behavior {
            InvalidCdcPositionBehavior::FailSync => ValidationOutcome::Abort,
            InvalidCdcPositionBehavior::ResetSync => ValidationOutcome::Reset,
        }
    }
}
