use as_any::AsAny;

use rachsim_core::entities::RachEntity;
use rachsim_saps::SapMsg;

use crate::EventQueue;

/// Trait for simulation entities
/// Used by MessageRouter for passing primitives between entities
pub trait RachEntityTrait: AsAny {
    /// Returns the entity identifier this instance is registered under
    fn entity(&self) -> RachEntity;

    /// Handle incoming SAP primitive
    fn rx_prim(&mut self, queue: &mut EventQueue, message: SapMsg);

    /// Called once when the run ends. Entities with buffered output
    /// (the statistics collectors) perform their final flush here.
    fn shutdown(&mut self, _queue: &mut EventQueue) {}
}
