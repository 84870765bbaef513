mod common;

use std::fs;

use chunkwise_core::analysis::{CancelToken, Propagation};
use chunkwise_core::output::{CsvSink, MemorySink, OutputLayout, RecordKind};
use chunkwise_core::{AnalysisConfig, Pipeline};
use common::{range, Fixture, I};
use tempfile::tempdir;

/// `.text` with a two-instruction hanging tail after `f`, `.init` with a
/// call whose return site hangs.
fn firmware() -> Fixture {
    Fixture::new()
        .section(".init", 0x800, 0x900)
        .text(0x1000, 0x2000)
        .section(".rodata", 0x3000, 0x3100)
        .function("f", 0x1000, &[(0x1000, 0x1008)])
        .function("g", 0x1100, &[(0x1100, 0x1104)])
        .function("init", 0x800, &[(0x800, 0x808)])
        .ops(0x1000, 0x100c)
        .insn(I::ret(0x100c))
        .insn(I::ret(0x1100))
        .insn(I::op(0x800))
        .insn(I::call(0x804, 0x1100))
        .insn(I::ret(0x808))
        .string(0x3000, "boot", &[0x1004])
}

fn reconciling() -> AnalysisConfig {
    AnalysisConfig { hanging: Propagation::both(), ..AnalysisConfig::default() }
}

#[test]
fn run_reconciles_then_emits_every_section() {
    let mut image = firmware().image();
    let mut sink = MemorySink::new();
    let report = Pipeline::new(reconciling()).run(&mut image, &mut sink).unwrap();

    let names: Vec<&str> = report.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![".text", ".init"]);
    assert!(!report.cancelled);
    assert_eq!(report.hanging_remaining(), 0);

    let text = report.section(".text").unwrap();
    assert_eq!(text.range, range(0x1000, 0x2000));
    let rec = text.reconcile.as_ref().expect("reconcile report");
    assert_eq!((rec.hanging_before, rec.hanging_after), (2, 0));
    assert!(text.relocation.is_none());

    // Ids keep counting across sections.
    let functions: Vec<(usize, &str)> =
        sink.functions.iter().map(|f| (f.id, f.name.as_str())).collect();
    assert_eq!(functions, vec![(0, "f"), (1, "g"), (2, "init")]);
    let init_blocks: Vec<(usize, u64, u64)> = sink
        .blocks
        .iter()
        .filter(|b| b.function_id == 2)
        .map(|b| (b.id, b.start, b.end))
        .collect();
    assert_eq!(init_blocks, vec![(2, 0x800, 0x808), (3, 0x808, 0x80c)]);

    // The call leaves `.init` so it is only a calls row; its return site
    // stays in `.init`, where no edge is drawn.
    assert_eq!(sink.calls.len(), 1);
    assert_eq!(sink.calls[0].function_name, "init");
    assert_eq!(sink.calls[0].destination_name, "g");
    assert!(sink.edges.is_empty());
    assert_eq!(report.section(".init").unwrap().emit.foreign_section_edges, 1);

    let totals = report.totals();
    assert_eq!(totals.functions, 3);
    assert_eq!(totals.instructions, 8);
    assert_eq!(totals.strings, 1);
    assert_eq!(totals.string_xrefs, 1);
}

#[test]
fn without_propagation_hanging_code_is_not_emitted() {
    let mut image = firmware().image();
    let mut sink = MemorySink::new();
    let report = Pipeline::new(AnalysisConfig::default()).run(&mut image, &mut sink).unwrap();

    assert!(report.sections.iter().all(|s| s.reconcile.is_none()));
    assert_eq!(report.section(".text").unwrap().hanging_remaining, 2);
    assert_eq!(report.hanging_remaining(), 3);
    assert_eq!(sink.instructions.len(), 5);
    assert!(sink.instructions.iter().all(|i| i.address != 0x1008));
}

#[test]
fn missing_sections_are_skipped() {
    let mut image = firmware().image();
    let config = AnalysisConfig {
        sections: vec![".fini".into(), ".text".into()],
        switch_dest_to_tail: true,
        ..reconciling()
    };
    let report = Pipeline::new(config).run(&mut image, &mut MemorySink::new()).unwrap();

    assert_eq!(report.sections.len(), 1);
    assert_eq!(report.sections[0].name, ".text");
    assert_eq!(report.sections[0].relocation.as_ref().map(|r| r.moves_applied), Some(0));
}

#[test]
fn cancellation_stops_before_emission() {
    let mut image = firmware().image();
    let mut sink = MemorySink::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let pipeline = Pipeline::new(reconciling()).with_cancel(cancel);
    let report = pipeline.run(&mut image, &mut sink).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.sections.len(), 1);
    assert_eq!(report.sections[0].hanging_remaining, 2);
    assert_eq!(sink, MemorySink::new());
}

#[test]
fn csv_sink_writes_all_record_files() {
    let tmp = tempdir().expect("temp dir");
    let layout = OutputLayout::new(tmp.path().join("out"), "fw", Some("ht".into()));

    let mut image = firmware().image();
    let mut sink = CsvSink::create(&layout).expect("create csv files");
    let report = Pipeline::new(reconciling()).run(&mut image, &mut sink).unwrap();
    drop(sink);

    for kind in RecordKind::ALL {
        let path = layout.path(kind);
        assert!(path.exists(), "missing {}", path.display());
    }

    let functions = fs::read_to_string(layout.path(RecordKind::Functions)).unwrap();
    assert_eq!(functions, "id,name\n0,f\n1,g\n2,init\n");

    let calls = fs::read_to_string(tmp.path().join("out/fw.ht.calls")).unwrap();
    assert_eq!(calls, "ins_address,ins_function_name,dest_address,dest_name,plt\n2052,init,4352,g,FALSE\n");

    let edges = fs::read_to_string(layout.path(RecordKind::Edges)).unwrap();
    assert_eq!(edges, "id,block_id,ins_address,dest_address,plt,edge_type\n");

    let strings = fs::read_to_string(layout.path(RecordKind::Strings)).unwrap();
    assert_eq!(strings, "address,length,strtype,string\n12288,4,0,\"boot\"\n");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sections"][1]["name"], ".init");
    assert_eq!(json["cancelled"], false);
}
