mod common;

use chunkwise_core::analysis::reconcile::{
    CancelToken, Propagation, ReconcileOptions, Reconciler, SeedOrder,
};
use chunkwise_core::model::Image;
use common::{assert_partition, chunk_map, chunks_of, range, Fixture, I};

const TEXT: (u64, u64) = (0x1000, 0x2000);

/// Hanging code after `f` (two fallthrough hops), before `g`, and one jump
/// target that only `follow_jumps` can reach.
fn mixed_fixture() -> Fixture {
    Fixture::new()
        .text(TEXT.0, TEXT.1)
        .function("f", 0x1000, &[(0x1000, 0x100c)])
        .function("g", 0x1200, &[(0x1200, 0x1208)])
        .ops(0x1000, 0x1010)
        .insn(I::cond(0x1010, 0x1100))
        .insn(I::op(0x1014))
        .insn(I::ret(0x1018))
        .insn(I::op(0x1100))
        .insn(I::ret(0x1104))
        .ops(0x11f8, 0x1204)
        .insn(I::ret(0x1204))
}

fn options(order: SeedOrder) -> ReconcileOptions {
    ReconcileOptions {
        propagation: Propagation::both(),
        seed_order: order,
        ..ReconcileOptions::default()
    }
}

fn run(image: &mut Image, options: &ReconcileOptions) -> chunkwise_core::analysis::ReconcileReport {
    Reconciler::new(image, range(TEXT.0, TEXT.1), options).run().unwrap()
}

#[test]
fn converges_to_expected_chunks() {
    let mut image = mixed_fixture().image();
    let report = run(&mut image, &options(SeedOrder::Ascending));

    assert_eq!(chunks_of(&image, "f"), vec![range(0x1000, 0x101c)]);
    assert_eq!(chunks_of(&image, "g"), vec![range(0x11f8, 0x1208)]);
    assert_eq!(report.head_merges, 2);
    assert_eq!(report.tail_merges, 1);
    assert_eq!(report.hanging_before, 8);
    assert_eq!(report.hanging_after, 2);
    assert_partition(&image);
}

#[test]
fn seed_order_does_not_change_result() {
    let mut ascending = mixed_fixture().image();
    let mut descending = mixed_fixture().image();
    run(&mut ascending, &options(SeedOrder::Ascending));
    run(&mut descending, &options(SeedOrder::Descending));
    assert_eq!(chunk_map(&ascending), chunk_map(&descending));
}

#[test]
fn converged_image_is_left_untouched() {
    let mut image = mixed_fixture().image();
    let opts = options(SeedOrder::Ascending);
    run(&mut image, &opts);
    let before = chunk_map(&image);

    let again = run(&mut image, &opts);
    assert_eq!(again.head_merges + again.tail_merges, 0);
    assert_eq!(again.iterations, 1);
    assert_eq!(chunk_map(&image), before);
}

#[test]
fn hanging_count_never_increases() {
    let mut image = mixed_fixture().image();
    let opts = options(SeedOrder::Ascending);
    let text = range(TEXT.0, TEXT.1);
    let mut reconciler = Reconciler::new(&mut image, text, &opts);

    let mut last = reconciler.image().hanging_count(text);
    for _ in 0..4 {
        reconciler.head_pass().unwrap();
        let now = reconciler.image().hanging_count(text);
        assert!(now <= last, "head pass grew hanging set {last} -> {now}");
        last = now;

        reconciler.tail_pass().unwrap();
        let now = reconciler.image().hanging_count(text);
        assert!(now <= last, "tail pass grew hanging set {last} -> {now}");
        last = now;
    }
}

#[test]
fn follow_jumps_reaches_branch_targets() {
    let mut image = mixed_fixture().image();
    let opts = ReconcileOptions { follow_jumps: true, ..options(SeedOrder::Ascending) };
    let report = run(&mut image, &opts);

    assert_eq!(report.hanging_after, 0);
    assert_eq!(chunks_of(&image, "f"), vec![range(0x1000, 0x101c), range(0x1100, 0x1108)]);
    assert_partition(&image);
}

#[test]
fn iteration_cap_stops_without_failing() {
    let mut image = mixed_fixture().image();
    let opts = ReconcileOptions { max_iterations: 1, ..options(SeedOrder::Ascending) };
    let report = run(&mut image, &opts);

    assert!(report.cap_reached);
    assert_eq!(report.iterations, 1);
    assert!(report.hanging_after < report.hanging_before);
}

#[test]
fn cancelled_token_stops_before_any_merge() {
    let mut image = mixed_fixture().image();
    let opts = options(SeedOrder::Ascending);
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = Reconciler::new(&mut image, range(TEXT.0, TEXT.1), &opts)
        .with_cancel(cancel)
        .run()
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.head_merges + report.tail_merges, 0);
    assert_eq!(report.hanging_after, report.hanging_before);
}

#[test]
fn empty_propagation_is_a_no_op() {
    let mut image = mixed_fixture().image();
    let before = chunk_map(&image);
    let report = run(&mut image, &ReconcileOptions::default());

    assert_eq!(report.iterations, 0);
    assert_eq!(report.hanging_after, report.hanging_before);
    assert_eq!(chunk_map(&image), before);
}
