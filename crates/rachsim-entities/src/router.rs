use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use rachsim_core::SimTime;
use rachsim_core::entities::RachEntity;
use rachsim_saps::SapMsg;

use crate::RachEntityTrait;

/// Handle to a scheduled future event. Cancellation is lazy: a cancelled
/// event stays in the heap and is dropped when it reaches the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

struct TimedEvent {
    /// Monotonic sequence number, doubles as the FIFO tie-breaker:
    /// events scheduled for the same time fire in scheduling order.
    seq: u64,
    time: SimTime,
    msg: SapMsg,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior (earliest time first)
        other.time.cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Immediate message queue plus the future-event heap. Handed to entities
/// in rx_prim so they can emit primitives and schedule or cancel timers.
pub struct EventQueue {
    now: SimTime,
    messages: VecDeque<SapMsg>,
    timed: BinaryHeap<TimedEvent>,
    next_seq: u64,
    cancelled: HashSet<u64>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            messages: VecDeque::new(),
            timed: BinaryHeap::new(),
            next_seq: 0,
            cancelled: HashSet::new(),
        }
    }

    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Queue a message for delivery within the current time step
    pub fn push_back(&mut self, message: SapMsg) {
        self.messages.push_back(message);
    }

    pub fn pop_front(&mut self) -> Option<SapMsg> {
        self.messages.pop_front()
    }

    /// Schedule a message for delivery at an absolute simulated time.
    /// Scheduling into the past indicates a causality bug and panics.
    pub fn schedule_at(&mut self, time: SimTime, msg: SapMsg) -> EventHandle {
        assert!(
            time >= self.now,
            "schedule_at: {} is in the past (now {})",
            time,
            self.now
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timed.push(TimedEvent { seq, time, msg });
        EventHandle(seq)
    }

    /// Schedule a message for delivery after a delay
    pub fn schedule_in(&mut self, delay: SimTime, msg: SapMsg) -> EventHandle {
        self.schedule_at(self.now + delay, msg)
    }

    /// Cancel a previously scheduled event. Cancelling an event that has
    /// already fired is a no-op.
    pub fn cancel(&mut self, handle: EventHandle) {
        self.cancelled.insert(handle.0);
    }

    /// Set the clock directly. Only the router advances time in a running
    /// simulation; unit tests use this to drive components without one.
    pub(crate) fn set_now(&mut self, now: SimTime) {
        self.now = now;
    }

    /// Pop the next live timed event not later than `horizon`
    fn pop_due(&mut self, horizon: SimTime) -> Option<TimedEvent> {
        while let Some(ev) = self.timed.peek() {
            if self.cancelled.remove(&ev.seq) {
                self.timed.pop();
                continue;
            }
            if ev.time > horizon {
                return None;
            }
            return self.timed.pop();
        }
        None
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-threaded cooperative scheduler: delivers immediate messages in
/// FIFO order, advances simulated time to the next pending event, and hands
/// each message to the entity registered for its destination.
pub struct MessageRouter {
    entities: HashMap<RachEntity, Box<dyn RachEntityTrait>>,
    /// Registration order, for deterministic shutdown iteration
    registration_order: Vec<RachEntity>,
    queue: EventQueue,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            registration_order: Vec::new(),
            queue: EventQueue::new(),
        }
    }

    pub fn register_entity(&mut self, entity: Box<dyn RachEntityTrait>) {
        let ent = entity.entity();
        tracing::debug!("register_entity {:?}", ent);
        self.registration_order.push(ent);
        self.entities.insert(ent, entity);
    }

    /// Returns a mut ref to the entity registered under the given id
    pub fn get_entity(&mut self, ent: RachEntity) -> Option<&mut dyn RachEntityTrait> {
        self.entities.get_mut(&ent).map(|entity| entity.as_mut())
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    /// The event queue, e.g. for entities that schedule events at
    /// construction time (the statistics collectors)
    pub fn event_queue_mut(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    pub fn submit_message(&mut self, message: SapMsg) {
        tracing::debug!(
            "submit_message {:?}: {:?} -> {:?}",
            message.get_sap(),
            message.get_source(),
            message.get_dest()
        );
        self.queue.push_back(message);
    }

    /// Schedule a message for future delivery, e.g. scenario arrivals
    pub fn schedule_message(&mut self, time: SimTime, message: SapMsg) -> EventHandle {
        self.queue.schedule_at(time, message)
    }

    pub fn deliver_message(&mut self) {
        let message = self.queue.pop_front();
        if let Some(message) = message {
            tracing::trace!(
                "deliver_message: got {:?}: {:?} -> {:?}",
                message.get_sap(),
                message.get_source(),
                message.get_dest()
            );

            let dest = *message.get_dest();
            if let Some(entity) = self.entities.get_mut(&dest) {
                entity.rx_prim(&mut self.queue, message);
            } else {
                tracing::warn!(
                    "deliver_message: entity {:?} not found for {:?} from {:?}",
                    dest,
                    message.get_sap(),
                    message.get_source()
                );
            }
        }
    }

    pub fn deliver_all_messages(&mut self) {
        while !self.queue.messages.is_empty() {
            self.deliver_message();
        }
    }

    /// Runs the simulation up to and including time `t`: drains the
    /// immediate queue, then repeatedly advances to the next timed event.
    pub fn run_until(&mut self, t: SimTime) {
        loop {
            self.deliver_all_messages();

            match self.queue.pop_due(t) {
                Some(ev) => {
                    self.queue.now = ev.time;
                    self.queue.push_back(ev.msg);
                }
                None => break,
            }
        }
        self.queue.now = t;
    }

    /// Ends the run: gives every entity (in registration order) the chance
    /// to flush buffered output, then delivers what that produced.
    pub fn finalize(&mut self) {
        for ent in self.registration_order.clone() {
            if let Some(entity) = self.entities.get_mut(&ent) {
                entity.shutdown(&mut self.queue);
            }
        }
        self.deliver_all_messages();
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rachsim_saps::cmac::{UeTimer, UeTimerExpiry};
    use rachsim_saps::{Sap, SapMsgInner};

    /// Records the timers it receives, in arrival order
    struct Probe {
        ent: RachEntity,
        received: Vec<(SimTime, UeTimer)>,
    }

    impl RachEntityTrait for Probe {
        fn entity(&self) -> RachEntity {
            self.ent
        }

        fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg) {
            if let SapMsgInner::UeTimerExpiry(e) = message.msg {
                self.received.push((queue.now(), e.timer));
            }
        }
    }

    fn timer_msg(dest: RachEntity, timer: UeTimer) -> SapMsg {
        SapMsg::new(
            Sap::CmacSap,
            dest,
            dest,
            SimTime::ZERO,
            SapMsgInner::UeTimerExpiry(UeTimerExpiry { timer }),
        )
    }

    #[test]
    fn same_time_events_fire_in_scheduling_order() {
        let dest = RachEntity::UeMac(1);
        let mut router = MessageRouter::new();
        router.register_entity(Box::new(Probe { ent: dest, received: vec![] }));

        let t = SimTime::from_millis(5);
        router.schedule_message(t, timer_msg(dest, UeTimer::Backoff));
        router.schedule_message(t, timer_msg(dest, UeTimer::RarWindow));
        router.schedule_message(t, timer_msg(dest, UeTimer::ContentionResolution));
        router.run_until(SimTime::from_millis(10));

        let probe = router
            .get_entity(dest)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<Probe>()
            .unwrap();
        assert_eq!(
            probe.received,
            vec![
                (t, UeTimer::Backoff),
                (t, UeTimer::RarWindow),
                (t, UeTimer::ContentionResolution),
            ]
        );
    }

    #[test]
    fn cancelled_events_do_not_fire() {
        let dest = RachEntity::UeMac(2);
        let mut router = MessageRouter::new();
        router.register_entity(Box::new(Probe { ent: dest, received: vec![] }));

        let h1 = router.schedule_message(SimTime::from_millis(1), timer_msg(dest, UeTimer::Backoff));
        router.schedule_message(SimTime::from_millis(2), timer_msg(dest, UeTimer::RarWindow));
        router.queue.cancel(h1);
        router.run_until(SimTime::from_millis(10));

        let probe = router
            .get_entity(dest)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<Probe>()
            .unwrap();
        assert_eq!(probe.received.len(), 1);
        assert_eq!(probe.received[0].1, UeTimer::RarWindow);
    }

    #[test]
    fn events_beyond_horizon_stay_pending() {
        let dest = RachEntity::UeMac(3);
        let mut router = MessageRouter::new();
        router.register_entity(Box::new(Probe { ent: dest, received: vec![] }));

        router.schedule_message(SimTime::from_millis(20), timer_msg(dest, UeTimer::Backoff));
        router.run_until(SimTime::from_millis(10));
        assert_eq!(router.now(), SimTime::from_millis(10));

        router.run_until(SimTime::from_millis(30));
        let probe = router
            .get_entity(dest)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<Probe>()
            .unwrap();
        assert_eq!(probe.received, vec![(SimTime::from_millis(20), UeTimer::Backoff)]);
    }

    #[test]
    #[should_panic]
    fn scheduling_into_the_past_panics() {
        let mut queue = EventQueue::new();
        queue.now = SimTime::from_millis(10);
        queue.schedule_at(
            SimTime::from_millis(5),
            timer_msg(RachEntity::UeMac(4), UeTimer::Backoff),
        );
    }
}
