pub mod ue_mac;
