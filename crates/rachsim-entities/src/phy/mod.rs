pub mod chunk_processor;
pub mod interference;
pub mod phy_enb;
