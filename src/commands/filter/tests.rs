use super::{
    filter,
    metrics::{compute_in_flight_capacity, PipelineQueueMetrics, QueueDepthTracker},
    sequencer::{run_sequencer, SequencerReport},
    shutdown::finalize_filter_threads,
    store::ArtifactStore,
    types::{BatchArtifact, BatchSummary, SequencerEvent},
};
use crate::cli::{Cli, Command, FilterArgs};
use crate::core::header::VcfHeader;
use crate::error::VcfCleanError;
use crate::io::vcf_writer::VcfWriter;
use crate::utils::util::init_logger;
use clap::Parser;
use crossbeam_channel::unbounded;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};

const HEADER: &str = "\
##fileformat=VCFv4.2
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype Quality\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">
##FORMAT=<ID=AD,Number=R,Type=Integer,Description=\"Allelic Depths\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2
";

fn write_vcf(dir: &Path, name: &str, data_lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut contents = HEADER.to_string();
    for line in data_lines {
        contents.push_str(line);
        contents.push('\n');
    }
    fs::write(&path, contents).expect("test VCF should be writable");
    path
}

fn parse_filter_args(args: &[&str]) -> FilterArgs {
    let parsed = Cli::try_parse_from(args).expect("CLI parse should succeed");
    let Command::Filter(args) = parsed.command else {
        panic!("expected filter subcommand");
    };
    args
}

fn run_filter(input: &Path, output: &Path, extra: &[&str]) -> crate::utils::util::Result<()> {
    let mut args = vec![
        "vcfclean",
        "filter",
        input.to_str().expect("input path should be UTF-8"),
        "--output",
        output.to_str().expect("output path should be UTF-8"),
        "--no-version",
    ];
    args.extend_from_slice(extra);
    filter(parse_filter_args(&args))
}

fn data_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("output VCF should be readable")
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Mixed SNVs, indels, dropped records, repeated positions and reference
/// blocks ending on the next variant, on two contigs.
fn mixed_records() -> Vec<String> {
    let mut lines = Vec::new();
    for (chrom, positions) in [("chr1", 1..=24u64), ("chr2", 1..=18u64)] {
        for pos in positions {
            let pos = pos * 10;
            match pos / 10 % 4 {
                0 => {
                    lines.push(format!(
                        "{chrom}\t{}\t.\tT\t<NON_REF>\t.\t.\tEND={pos}\tGT:GQ:DP\t0/0:99:30\t0/0:99:30",
                        pos - 5
                    ));
                    lines.push(format!(
                        "{chrom}\t{pos}\t.\tA\tG\t.\t.\t.\tGT:GQ:DP:AD\t0/1:99:30:15,15\t1/1:99:30:1,29"
                    ));
                }
                1 => lines.push(format!(
                    "{chrom}\t{pos}\t.\tC\tT\t.\t.\t.\tGT:GQ:DP:AD\t0/1:99:5:3,2\t0/0:99:30:30,0"
                )),
                2 => lines.push(format!(
                    "{chrom}\t{pos}\t.\tAT\tA\t.\t.\t.\tGT:GQ:DP:AD\t1/1:99:30:10,20\t0/1:99:40:2,38"
                )),
                _ => {
                    lines.push(format!(
                        "{chrom}\t{pos}\t.\tG\t.\t.\t.\t.\tGT:GQ:DP\t0/0:99:30\t0/0:99:30"
                    ));
                    lines.push(format!(
                        "{chrom}\t{pos}\t.\tG\tC\t.\t.\t.\tGT:GQ:DP:AD\t0/1:10:30:15,15\t0/1:99:30:20,10"
                    ));
                }
            }
        }
    }
    lines
}

#[test]
fn output_order_is_independent_of_batch_size() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let records = mixed_records();
    let input = write_vcf(dir.path(), "in.vcf", &records);

    for keep_hom_ref in [&[][..], &["--keep-hom-ref"][..]] {
        let reference_path = dir.path().join("reference.vcf");
        let mut reference_args = vec!["--batch-size", "100000"];
        reference_args.extend_from_slice(keep_hom_ref);
        run_filter(&input, &reference_path, &reference_args).unwrap();
        let reference = data_lines(&reference_path);
        assert!(!reference.is_empty());

        for batch_size in 1..=records.len() {
            let out = dir.path().join(format!("out-{batch_size}.vcf"));
            let batch_size = batch_size.to_string();
            let mut args = vec!["-@", "3", "--batch-size", batch_size.as_str()];
            args.extend_from_slice(keep_hom_ref);
            run_filter(&input, &out, &args).unwrap();
            assert_eq!(
                data_lines(&out),
                reference,
                "batch size {batch_size} {keep_hom_ref:?} changed the output"
            );
        }
    }
}

#[test]
fn block_ending_on_a_snv_is_trimmed_at_any_batch_size() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_vcf(
        dir.path(),
        "in.vcf",
        &[
            "chr1\t100\t.\tA\t.\t.\t.\tEND=110\tGT:GQ:DP\t0/0:99:30\t0/0:99:30".to_string(),
            "chr1\t110\t.\tA\tG\t.\t.\t.\tGT:GQ:DP:AD\t0/1:99:30:15,15\t0/0:99:30:30,0"
                .to_string(),
        ],
    );
    for batch_size in ["1", "2"] {
        let out = dir.path().join(format!("out-{batch_size}.vcf"));
        run_filter(
            &input,
            &out,
            &["--batch-size", batch_size, "--keep-hom-ref"],
        )
        .unwrap();
        let lines = data_lines(&out);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\tEND=109\t"), "got {}", lines[0]);
    }
}

#[test]
fn corrections_and_af_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_vcf(
        dir.path(),
        "in.vcf",
        &[
            "chr1\t100\t.\tA\tG\t50\tPASS\tDP=60\tGT:GQ:DP:AD\t0/1:99:30:20,10\t0/1:99:30:1,29"
                .to_string(),
            "chr1\t200\t.\tC\tT\t50\tPASS\tDP=60\tGT:GQ:DP:AD\t0/1:99:5:3,2\t0/0:99:30:30,0"
                .to_string(),
        ],
    );
    let out = dir.path().join("out.vcf");
    run_filter(&input, &out, &[]).unwrap();

    assert_eq!(
        data_lines(&out),
        vec!["chr1\t100\t.\tA\tG\t.\t.\t.\tGT:AF:GQ:DP:AD\t0/1:0.33:99:30:20,10\t1/1:0.97:99:30:1,29"]
    );
    let header = fs::read_to_string(&out).unwrap();
    assert!(header.contains("##FORMAT=<ID=AF,"));
    assert!(!header.contains("##vcfcleanVersion="));
}

#[test]
fn batch_boundary_never_separates_reference_block_from_indel() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_vcf(
        dir.path(),
        "in.vcf",
        &[
            "chr1\t100\t.\tA\t<NON_REF>\t.\t.\tEND=101\tGT:GQ:DP\t0/0:99:30\t0/0:99:30".to_string(),
            "chr1\t101\t.\tAT\tA\t.\t.\t.\tGT:GQ:DP:AD\t0/1:99:30:15,15\t0/0:99:30:30,0"
                .to_string(),
        ],
    );
    let out = dir.path().join("out.vcf");
    run_filter(&input, &out, &["--batch-size", "1", "--keep-hom-ref"]).unwrap();
    let lines = data_lines(&out);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\tEND=100\t"), "got {}", lines[0]);
}

#[test]
fn scratch_directory_mode_matches_memory_mode_and_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_vcf(dir.path(), "in.vcf", &mixed_records());

    let memory_out = dir.path().join("memory.vcf");
    run_filter(&input, &memory_out, &["-@", "2", "--batch-size", "3"]).unwrap();

    let scratch = dir.path().join("scratch");
    let scratch_out = dir.path().join("scratch.vcf");
    run_filter(
        &input,
        &scratch_out,
        &[
            "-@",
            "2",
            "--batch-size",
            "3",
            "--scratch-dir",
            scratch.to_str().unwrap(),
        ],
    )
    .unwrap();

    assert_eq!(data_lines(&scratch_out), data_lines(&memory_out));
    assert!(!scratch.exists());
}

#[test]
fn existing_scratch_directory_is_rejected_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_vcf(dir.path(), "in.vcf", &mixed_records());
    let out = dir.path().join("out.vcf");
    let err = run_filter(
        &input,
        &out,
        &["--scratch-dir", dir.path().to_str().unwrap()],
    )
    .unwrap_err();
    assert!(matches!(err, VcfCleanError::ScratchDirExists { .. }));
    assert!(!out.exists());
}

#[test]
fn malformed_line_aborts_the_whole_run() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut records = mixed_records();
    let broken = records.len() - 5;
    records[broken] = "chr2\t999\t.\tA\tG\t.\t.\t.\tGT:GQ:DP:AD\t0/1:99:30:15,15".to_string();
    let input = write_vcf(dir.path(), "in.vcf", &records);
    let out = dir.path().join("out.vcf");

    let err = run_filter(&input, &out, &["-@", "2", "--batch-size", "2"]).unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains("header declares 11 columns"),
        "unexpected error: {message}"
    );
}

#[test]
fn header_without_depth_fields_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.vcf");
    fs::write(
        &input,
        "##fileformat=VCFv4.2\n##FORMAT=<ID=GT,Number=1,Type=String,Description=\"\">\n##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"\">\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n",
    )
    .unwrap();
    let out = dir.path().join("out.vcf");
    let err = run_filter(&input, &out, &[]).unwrap_err();
    assert!(matches!(err, VcfCleanError::MissingFormatField { ref field } if field == "DP|DPI|AD"));
}

#[test]
fn empty_input_produces_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_vcf(dir.path(), "in.vcf", &[]);
    let out = dir.path().join("out.vcf");
    run_filter(&input, &out, &["-@", "2"]).unwrap();
    assert!(data_lines(&out).is_empty());
    assert!(fs::read_to_string(&out).unwrap().contains("#CHROM"));
}

fn artifact(number: u64) -> BatchArtifact {
    BatchArtifact {
        number,
        text: format!("chr1\t{}\t.\tA\tC\t.\t.\t.\n", number + 1),
        records: 1,
        summary: BatchSummary {
            records_in: 1,
            records_kept: 1,
            ..Default::default()
        },
    }
}

fn sequencer_header() -> VcfHeader {
    VcfHeader::new(
        vec!["##fileformat=VCFv4.2".to_string()],
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO".to_string(),
    )
    .unwrap()
}

#[test]
fn sequencer_restores_order_of_out_of_order_completions() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.vcf");
    let store = ArtifactStore::InMemory;
    let metrics = PipelineQueueMetrics::default();
    let (event_sender, event_receiver) = unbounded();
    let (_ticket_sender, ticket_receiver) = unbounded();

    for number in [2, 1, 0] {
        event_sender
            .send(SequencerEvent::Completed(store.stash(artifact(number)).unwrap()))
            .unwrap();
    }
    event_sender.send(SequencerEvent::LastBatch(Some(2))).unwrap();

    let mut writer = VcfWriter::new(&sequencer_header(), Some(&out)).unwrap();
    let report =
        run_sequencer(&mut writer, &store, event_receiver, ticket_receiver, &metrics).unwrap();
    writer.finish().unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.records_written, 3);
    assert_eq!(report.summary.records_in, 3);
    let positions: Vec<String> = data_lines(&out)
        .iter()
        .map(|line| line.split('\t').nth(1).unwrap().to_string())
        .collect();
    assert_eq!(positions, vec!["1", "2", "3"]);
}

#[test]
fn sequencer_reports_incomplete_run_when_producers_vanish() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.vcf");
    let store = ArtifactStore::InMemory;
    let metrics = PipelineQueueMetrics::default();
    let (event_sender, event_receiver) = unbounded();
    let (_ticket_sender, ticket_receiver) = unbounded();

    event_sender
        .send(SequencerEvent::Completed(store.stash(artifact(0)).unwrap()))
        .unwrap();
    event_sender
        .send(SequencerEvent::Completed(store.stash(artifact(2)).unwrap()))
        .unwrap();
    drop(event_sender);

    let mut writer = VcfWriter::new(&sequencer_header(), Some(&out)).unwrap();
    let err = run_sequencer(&mut writer, &store, event_receiver, ticket_receiver, &metrics)
        .unwrap_err();
    assert!(matches!(err, VcfCleanError::IncompleteRun { next_batch: 1 }));
}

#[test]
fn sequencer_stops_on_worker_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.vcf");
    let store = ArtifactStore::InMemory;
    let metrics = PipelineQueueMetrics::default();
    let (event_sender, event_receiver) = unbounded();
    let (_ticket_sender, ticket_receiver) = unbounded();

    event_sender.send(SequencerEvent::WorkerFailed(0)).unwrap();
    let mut writer = VcfWriter::new(&sequencer_header(), Some(&out)).unwrap();
    let err = run_sequencer(&mut writer, &store, event_receiver, ticket_receiver, &metrics)
        .unwrap_err();
    assert!(matches!(err, VcfCleanError::IncompleteRun { next_batch: 0 }));
    drop(event_sender);
}

#[test]
fn sequencer_handles_empty_input() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.vcf");
    let store = ArtifactStore::InMemory;
    let metrics = PipelineQueueMetrics::default();
    let (event_sender, event_receiver) = unbounded();
    let (_ticket_sender, ticket_receiver) = unbounded();

    event_sender.send(SequencerEvent::LastBatch(None)).unwrap();
    let mut writer = VcfWriter::new(&sequencer_header(), Some(&out)).unwrap();
    let report =
        run_sequencer(&mut writer, &store, event_receiver, ticket_receiver, &metrics).unwrap();
    assert_eq!(report.batches, 0);
}

#[test]
fn in_flight_capacity_is_twice_the_thread_count() {
    assert_eq!(compute_in_flight_capacity(1), 2);
    assert_eq!(compute_in_flight_capacity(8), 16);
    assert_eq!(compute_in_flight_capacity(0), 2);
}

#[test]
fn queue_depth_tracker_tracks_current_and_peak() {
    let tracker = QueueDepthTracker::default();

    tracker.increment();
    tracker.increment();
    assert_eq!(tracker.snapshot().current, 2);
    assert_eq!(tracker.snapshot().peak, 2);

    tracker.decrement();
    tracker.decrement();
    tracker.decrement();
    assert_eq!(tracker.snapshot().current, 0);
    assert_eq!(tracker.snapshot().peak, 2);
}

#[test]
fn finalize_filter_threads_aggregates_failures_from_all_threads() {
    let pool_thread = thread::spawn(|| -> crate::utils::util::Result<()> {
        Err(crate::vcfclean_error!("worker failed"))
    });
    let sequencer_thread = thread::spawn(|| -> crate::utils::util::Result<SequencerReport> {
        panic!("sequencer failed");
    });

    let result = finalize_filter_threads(
        Err(crate::vcfclean_error!("dispatch failed")),
        pool_thread,
        sequencer_thread,
    );
    let message = result.expect_err("expected aggregated errors").to_string();
    assert!(message.contains("Multiple pipeline errors"));
    assert!(message.contains("dispatch failed"));
    assert!(message.contains("Worker pool thread failed: worker failed"));
    assert!(message.contains("Sequencer thread panicked: sequencer failed"));
}
