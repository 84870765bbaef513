mod common;

use chunkwise_core::analysis::reconcile::{
    grow_backward, plan_tail_from, tail_seeds, Direction, Propagation, ReconcileOptions, Reconciler,
};
use common::{chunks_of, fid, range, Fixture, I};

/// `g` owns `[0x5010, 0x5018)`. Hanging run `0x5008..0x5010` leads into it
/// and is itself entered from a hanging conditional branch at `0x5004`.
fn tail_fixture() -> Fixture {
    Fixture::new()
        .text(0x5000, 0x6000)
        .function("g", 0x5010, &[(0x5010, 0x5018)])
        .insn(I::cond(0x5004, 0x5100))
        .ops(0x5008, 0x5014)
        .insn(I::ret(0x5014))
        .insn(I::ret(0x5100))
}

fn tail_only() -> ReconcileOptions {
    ReconcileOptions { propagation: Propagation::tail(), ..ReconcileOptions::default() }
}

#[test]
fn seeds_are_block_starts_with_eligible_predecessors() {
    let image = tail_fixture().image();
    let seeds = tail_seeds(&image, range(0x5000, 0x6000));
    assert_eq!(seeds.into_iter().collect::<Vec<_>>(), vec![0x5010]);
}

#[test]
fn backward_walk_stops_at_branch_predecessor() {
    let image = tail_fixture().image();
    assert_eq!(grow_backward(&image, 0x500c), Some(range(0x5008, 0x5010)));

    let plan = plan_tail_from(&image, 0x5010, 0x500c).expect("absorption");
    assert_eq!(plan.function, fid(&image, "g"));
    assert_eq!(plan.range, range(0x5008, 0x5010));
    assert_eq!(plan.frontier, 0x5008);
    assert_eq!(plan.direction, Direction::Tail);
}

#[test]
fn backward_walk_stops_at_join_point() {
    let image = tail_fixture().insn(I::branch(0x5200, 0x500c)).image();
    assert_eq!(grow_backward(&image, 0x500c), Some(range(0x500c, 0x5010)));
}

#[test]
fn call_falling_into_the_run_is_walked_past() {
    let image = Fixture::new()
        .text(0x5000, 0x6000)
        .function("g", 0x5010, &[(0x5010, 0x5018)])
        .function("callee", 0x5800, &[(0x5800, 0x5804)])
        .insn(I::ret(0x5000))
        .insn(I::op(0x5004))
        .insn(I::call(0x5008, 0x5800))
        .ops(0x500c, 0x5014)
        .insn(I::ret(0x5014))
        .insn(I::ret(0x5800))
        .image();
    assert_eq!(grow_backward(&image, 0x500c), Some(range(0x5004, 0x5010)));
}

#[test]
fn call_into_the_run_stops_the_walk() {
    let image = Fixture::new()
        .text(0x5000, 0x6000)
        .function("g", 0x5010, &[(0x5010, 0x5018)])
        .insn(I::call(0x5000, 0x5008))
        .insn(I::ret(0x5004))
        .ops(0x5008, 0x5014)
        .insn(I::ret(0x5014))
        .image();
    assert_eq!(grow_backward(&image, 0x500c), Some(range(0x5008, 0x5010)));
}

#[test]
fn plain_predecessor_across_padding_is_walked_past() {
    let image = Fixture::new()
        .text(0x5000, 0x6000)
        .function("g", 0x5010, &[(0x5010, 0x5018)])
        .insn(I::op(0x5000).succ(&[0x5008]))
        .ops(0x5008, 0x5014)
        .insn(I::ret(0x5014))
        .image();
    assert_eq!(grow_backward(&image, 0x500c), Some(range(0x5000, 0x5010)));
}

#[test]
fn owned_predecessor_is_not_a_source() {
    let image = Fixture::new()
        .text(0x5000, 0x6000)
        .function("f", 0x5008, &[(0x5008, 0x500c)])
        .function("g", 0x5010, &[(0x5010, 0x5018)])
        .ops(0x5008, 0x5014)
        .insn(I::ret(0x5014))
        .image();
    assert!(plan_tail_from(&image, 0x5010, 0x500c).is_some());
    assert!(plan_tail_from(&image, 0x500c, 0x5008).is_none());
}

#[test]
fn tail_pass_reseeds_with_new_block_start() {
    let mut image = tail_fixture().image();
    let options = tail_only();
    let outcome =
        Reconciler::new(&mut image, range(0x5000, 0x6000), &options).tail_pass().unwrap();

    // The run is absorbed, then the branch that enters it.
    assert_eq!(outcome.merges, 2);
    assert_eq!(chunks_of(&image, "g"), vec![range(0x5004, 0x5018)]);
    assert!(image.is_hanging(0x5100));
}

#[test]
fn run_with_both_directions_reaches_fixed_point() {
    let mut image = tail_fixture().image();
    let options = ReconcileOptions { propagation: Propagation::both(), ..ReconcileOptions::default() };
    let report = Reconciler::new(&mut image, range(0x5000, 0x6000), &options).run().unwrap();

    assert_eq!(report.hanging_before, 4);
    assert_eq!(report.tail_merges, 2);
    // 0x5100 is a jump target, not a fallthrough: it stays hanging.
    assert_eq!(report.hanging_after, 1);
    assert!(image.is_hanging(0x5100));
}
