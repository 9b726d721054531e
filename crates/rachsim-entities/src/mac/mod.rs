pub mod mac_enb;
pub mod subcomp;
