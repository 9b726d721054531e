use std::collections::HashMap;

use rachsim_core::{NUM_RA_PREAMBLES_TOTAL, RapId, Rnti, SimTime};

/// Info associated with a preamble allocated for non-contention based RA
#[derive(Debug, Clone, Copy)]
struct NcPreambleInfo {
    /// RNTI previously allocated for this non-contention procedure
    rnti: Rnti,
    /// Expiration time of this allocation, so that stale preambles can be
    /// reused
    expiry: SimTime,
}

/// A dedicated preamble grant handed back to the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NcPreambleGrant {
    pub rap_id: RapId,
    pub rnti: Rnti,
    pub expiry: SimTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// Every non-contention preamble id has a live, unexpired allocation
    Exhausted,
}

/// Pending non-contention preamble allocations, keyed by preamble id.
///
/// At most one live allocation exists per id. An id with an expired entry
/// may be reallocated, but only after the stale entry is removed; a live
/// entry is never overwritten.
pub struct NcPreambleStore {
    allocated: HashMap<RapId, NcPreambleInfo>,
    /// First id of the non-contention range
    first_id: RapId,
}

impl NcPreambleStore {
    pub fn new(first_id: RapId) -> Self {
        assert!(first_id < NUM_RA_PREAMBLES_TOTAL);
        Self {
            allocated: HashMap::new(),
            first_id,
        }
    }

    /// Allocate a free non-contention preamble id for the given RNTI.
    /// Scans the non-contention range for an id that has no entry or whose
    /// entry has expired; expired entries are invalidated before reuse.
    pub fn allocate(
        &mut self,
        now: SimTime,
        rnti: Rnti,
        expiry_interval: SimTime,
    ) -> Result<NcPreambleGrant, AllocationError> {
        for rap_id in self.first_id..NUM_RA_PREAMBLES_TOTAL {
            match self.allocated.get(&rap_id) {
                Some(info) if info.expiry >= now => continue,
                Some(stale) => {
                    tracing::debug!(
                        "reusing preamble {}: allocation for rnti {} expired at {}",
                        rap_id,
                        stale.rnti,
                        stale.expiry
                    );
                    self.allocated.remove(&rap_id);
                }
                None => {}
            }
            let expiry = now + expiry_interval;
            self.allocated.insert(rap_id, NcPreambleInfo { rnti, expiry });
            return Ok(NcPreambleGrant { rap_id, rnti, expiry });
        }
        Err(AllocationError::Exhausted)
    }

    /// Consume the pending allocation matched by a detected preamble.
    /// Returns the granted RNTI, or None if the allocation expired or never
    /// existed (the detection is then ignored by the caller).
    pub fn consume(&mut self, now: SimTime, rap_id: RapId) -> Option<Rnti> {
        match self.allocated.remove(&rap_id) {
            Some(info) if info.expiry >= now => Some(info.rnti),
            Some(stale) => {
                tracing::warn!(
                    "preamble {} detected after its allocation for rnti {} expired at {}",
                    rap_id,
                    stale.rnti,
                    stale.expiry
                );
                None
            }
            None => {
                tracing::warn!("preamble {} detected without a pending allocation", rap_id);
                None
            }
        }
    }

    /// RNTI of the live allocation for a preamble id, if any
    pub fn pending_rnti(&self, rap_id: RapId) -> Option<Rnti> {
        self.allocated.get(&rap_id).map(|info| info.rnti)
    }
}
