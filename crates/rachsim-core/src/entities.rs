use crate::Imsi;

/// Addressable entities in the simulation.
/// Used by the MessageRouter for delivering primitives between entities.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Copy)]
pub enum RachEntity {
    /// eNB physical layer (interference tracking, preamble detection)
    EnbPhy,
    /// eNB MAC (random access procedure controller)
    EnbMac,
    /// Per-terminal MAC, keyed by IMSI
    UeMac(Imsi),
    /// Collector for end-to-end RACH completion delays
    RaCompleteStats,
    /// Collector for preamble receptions and collision outcomes
    RaPreambleStats,
    /// Collector for raw PHY-layer preamble receptions
    RaPreamblePhyStats,
    /// Scenario/user layer. Receives procedure completion notifications
    User,
}
