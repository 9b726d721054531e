//! Typed primitives exchanged between rachsim entities
//!
//! Each module holds the primitive structs for one service access point;
//! `sapmsg` wraps them in the routable `SapMsg` envelope.

pub mod cmac;
pub mod cphy;
pub mod prach;
pub mod sapmsg;
pub mod stats;

pub use sapmsg::{Sap, SapMsg, SapMsgInner};
