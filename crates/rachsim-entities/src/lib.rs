#![allow(dead_code)]

pub mod entity_trait;
pub mod mac;
pub mod phy;
pub mod router;
pub mod stats;
pub mod ue;

// Re-export commonly used items from router
pub use entity_trait::RachEntityTrait;
pub use router::{EventHandle, EventQueue, MessageRouter};
