use rachsim_core::SimTime;
use rachsim_core::entities::RachEntity;
use rachsim_saps::stats::EpochEnd;
use rachsim_saps::{Sap, SapMsg, SapMsgInner};

use crate::{EventHandle, EventQueue};

/// Epoch window of one statistics collector.
///
/// The collector flushes and clears its records at every boundary; the
/// window then advances by its own duration, regardless of how many records
/// were produced. Changing the start time or the duration cancels the
/// pending boundary event and schedules a fresh one, so a stale boundary
/// can never fire twice.
pub struct EpochTimer {
    start_time: SimTime,
    epoch_duration: SimTime,
    pending_event: Option<EventHandle>,
}

impl EpochTimer {
    pub fn new(start_time: SimTime, epoch_duration: SimTime) -> Self {
        assert!(epoch_duration > SimTime::ZERO, "epoch duration must be positive");
        Self {
            start_time,
            epoch_duration,
            pending_event: None,
        }
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    pub fn epoch_duration(&self) -> SimTime {
        self.epoch_duration
    }

    pub fn set_start_time(&mut self, queue: &mut EventQueue, owner: RachEntity, t: SimTime) {
        self.start_time = t;
        self.reschedule(queue, owner);
    }

    pub fn set_epoch_duration(&mut self, queue: &mut EventQueue, owner: RachEntity, e: SimTime) {
        assert!(e > SimTime::ZERO, "epoch duration must be positive");
        self.epoch_duration = e;
        self.reschedule(queue, owner);
    }

    /// Cancel the pending boundary and schedule the next one at
    /// start_time + epoch_duration. Called at setup and after every
    /// parameter change.
    pub fn reschedule(&mut self, queue: &mut EventQueue, owner: RachEntity) {
        if let Some(handle) = self.pending_event.take() {
            queue.cancel(handle);
        }
        let msg = Self::epoch_end_msg(queue, owner);
        self.pending_event = Some(queue.schedule_at(self.start_time + self.epoch_duration, msg));
    }

    /// Advance the window after a boundary fired and schedule the next one.
    /// Called from the owner's EpochEnd handler, after flushing.
    pub fn advance(&mut self, queue: &mut EventQueue, owner: RachEntity) {
        self.start_time += self.epoch_duration;
        let msg = Self::epoch_end_msg(queue, owner);
        self.pending_event = Some(queue.schedule_in(self.epoch_duration, msg));
    }

    fn epoch_end_msg(queue: &EventQueue, owner: RachEntity) -> SapMsg {
        SapMsg::new(
            Sap::StatsSap,
            owner,
            owner,
            queue.now(),
            SapMsgInner::EpochEnd(EpochEnd {}),
        )
    }
}
