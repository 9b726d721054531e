mod common;

use common::{ComponentTest, default_test_config};
use rachsim_core::SimTime;
use rachsim_core::debug;
use rachsim_core::entities::RachEntity;
use rachsim_entities::ue::ue_mac::RaState;
use rachsim_saps::SapMsgInner;

#[test]
fn test_same_preamble_same_window_collides_for_both() {
    // With a single contention preamble, two terminals starting in the same
    // subframe are guaranteed to pick the same id and collide. Both must be
    // flagged, back off, and eventually resolve in separate windows.
    debug::setup_logging_verbose();
    let mut cfg = default_test_config("collision");
    cfg.rach.num_contention_preambles = 1;
    let preamble_file = cfg.stats.preamble_rx_filename.clone();

    let mut test = ComponentTest::new(cfg);
    test.populate_entities(&[1, 2], vec![RachEntity::User]);
    test.start_ue_at(1, SimTime::from_millis(5));
    test.start_ue_at(2, SimTime::from_millis(5));

    test.run_until(SimTime::from_secs(1.0));
    test.router.finalize();

    // Both needed at least one retransmission
    assert!(test.ue_mut(1).preamble_tx_count() >= 2);
    assert!(test.ue_mut(2).preamble_tx_count() >= 2);

    // And both eventually completed, in different windows
    assert_eq!(test.ue_mut(1).state(), RaState::Completed);
    assert_eq!(test.ue_mut(2).state(), RaState::Completed);
    let sink_msgs = test.dump_sinks();
    let completions = sink_msgs
        .iter()
        .filter(|m| matches!(m.msg, SapMsgInner::RaCompletedInd(_)))
        .count();
    assert_eq!(completions, 2);

    // The preamble log flags the first-window receptions of both terminals
    // as collided (coll column = 1)
    let contents = std::fs::read_to_string(&preamble_file).unwrap();
    let collided_rows: Vec<&str> = contents
        .lines()
        .skip(1)
        .filter(|l| l.split('\t').nth(5) == Some("1"))
        .collect();
    assert!(
        collided_rows.len() >= 2,
        "expected at least two collided rows, got:\n{}",
        contents
    );

    std::fs::remove_file(&preamble_file).ok();
}

#[test]
fn test_different_preambles_do_not_collide() {
    // Terminals transmitting in different subframes never share a
    // detection window, so even an identical preamble id cannot collide
    debug::setup_logging_verbose();
    let cfg = default_test_config("noclash");

    let mut test = ComponentTest::new(cfg);
    test.populate_entities(&[1, 2], vec![RachEntity::User]);
    // Different subframes: windows cannot overlap regardless of the ids
    test.start_ue_at(1, SimTime::from_millis(5));
    test.start_ue_at(2, SimTime::from_millis(7));

    test.run_until(SimTime::from_millis(300));
    test.router.finalize();

    assert_eq!(test.ue_mut(1).state(), RaState::Completed);
    assert_eq!(test.ue_mut(2).state(), RaState::Completed);
    assert_eq!(test.ue_mut(1).preamble_tx_count(), 1);
    assert_eq!(test.ue_mut(2).preamble_tx_count(), 1);
}
