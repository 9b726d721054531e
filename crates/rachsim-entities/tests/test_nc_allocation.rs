mod common;

use common::{ComponentTest, default_test_config};
use rachsim_core::SimTime;
use rachsim_core::debug;
use rachsim_core::entities::RachEntity;
use rachsim_entities::mac::subcomp::nc_preamble_store::{AllocationError, NcPreambleGrant};
use rachsim_entities::ue::ue_mac::RaState;
use rachsim_saps::SapMsgInner;
use rachsim_saps::cmac::RaFailureReason;

#[test]
fn test_dedicated_preamble_skips_contention() {
    // A terminal with a dedicated grant (e.g. incoming handover) uses its
    // assigned preamble id and the pre-allocated RNTI end to end
    debug::setup_logging_verbose();
    let cfg = default_test_config("nc");

    let mut test = ComponentTest::new(cfg);
    test.populate_entities(&[1], vec![RachEntity::User]);

    let grant = test
        .mac_mut()
        .allocate_nc_ra_preamble(SimTime::ZERO, 1000)
        .unwrap();
    assert!(grant.rap_id >= 52);
    test.ue_mut(1).set_nc_grant(grant);
    test.start_ue_at(1, SimTime::from_millis(5));

    test.run_until(SimTime::from_millis(300));
    test.router.finalize();

    assert_eq!(test.ue_mut(1).state(), RaState::Completed);
    assert_eq!(test.ue_mut(1).rnti(), Some(1000));
    // The pending allocation was consumed by the detection
    assert_eq!(test.mac_mut().nc_store.pending_rnti(grant.rap_id), None);
}

#[test]
fn test_allocation_exhaustion_is_reported() {
    // One id in the non-contention range, both requests inside the expiry
    // interval: the second must be rejected, not silently overwrite
    debug::setup_logging_verbose();
    let mut cfg = default_test_config("exhaust");
    cfg.rach.num_contention_preambles = 63;

    let mut test = ComponentTest::new(cfg);
    test.populate_entities(&[], vec![]);

    let mac = test.mac_mut();
    let first = mac.allocate_nc_ra_preamble(SimTime::ZERO, 100).unwrap();
    assert_eq!(first.rap_id, 63);
    assert_eq!(
        mac.allocate_nc_ra_preamble(SimTime::ZERO, 101),
        Err(AllocationError::Exhausted)
    );
    // The original allocation is untouched
    assert_eq!(mac.nc_store.pending_rnti(63), Some(100));
}

#[test]
fn test_expired_grant_fails_the_procedure() {
    debug::setup_logging_verbose();
    let cfg = default_test_config("expired");

    let mut test = ComponentTest::new(cfg);
    test.populate_entities(&[1], vec![RachEntity::User]);

    // A grant that expires before the terminal gets to use it
    test.ue_mut(1).set_nc_grant(NcPreambleGrant {
        rap_id: 60,
        rnti: 500,
        expiry: SimTime::from_millis(1),
    });
    test.start_ue_at(1, SimTime::from_millis(5));

    test.run_until(SimTime::from_millis(100));
    test.router.finalize();

    assert_eq!(test.ue_mut(1).state(), RaState::Failed);
    let sink_msgs = test.dump_sinks();
    let failures: Vec<_> = sink_msgs
        .iter()
        .filter_map(|m| match &m.msg {
            SapMsgInner::RaFailedInd(f) => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reason, RaFailureReason::NcGrantExpired);
}
