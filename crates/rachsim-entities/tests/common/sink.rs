use rachsim_core::entities::RachEntity;
use rachsim_entities::{EventQueue, RachEntityTrait};
use rachsim_saps::sapmsg::SapMsg;

/// An entity sink for testing purposes
/// Collects all received SapMsg messages for later inspection
pub struct Sink {
    entity: RachEntity,
    msgqueue: Vec<SapMsg>,
}

impl Sink {
    pub fn new(entity: RachEntity) -> Self {
        Self {
            entity,
            msgqueue: vec![],
        }
    }

    pub fn take_msgqueue(&mut self) -> Vec<SapMsg> {
        std::mem::take(&mut self.msgqueue)
    }
}

impl RachEntityTrait for Sink {
    fn entity(&self) -> RachEntity {
        self.entity
    }

    fn rx_prim(&mut self, _queue: &mut EventQueue, message: SapMsg) {
        tracing::debug!("rx_prim: {:?}", message);
        self.msgqueue.push(message);
    }
}
