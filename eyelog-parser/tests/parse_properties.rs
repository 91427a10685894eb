// End-to-end parsing behavior through the public API
use eyelog_parser::{
    Cell, Corpus, Parser, ParserConfig, Scalar, Trace, TraceLabel, WarningKind,
};
use std::io::Write;
use std::sync::Arc;

fn parse(config: ParserConfig, text: &str) -> eyelog_parser::ParsedFile {
    Parser::new(config).unwrap().parse_str("test.asc", text).unwrap()
}

fn samples(start: i64, count: usize) -> String {
    (0..count)
        .map(|i| format!("{}\t512.0\t384.0\t{}.0\t...\n", start + i as i64, 1000 + i))
        .collect()
}

#[test]
fn one_row_per_start_trial() {
    let text = "start_trial 1\nend_trial\nstart_trial 2\nstart_trial 3\nend_trial\nstart_trial 4\n";
    let parsed = parse(ParserConfig::new(), text);
    assert_eq!(parsed.rows.len(), 4);
    let ids: Vec<&Scalar> = parsed
        .rows
        .iter()
        .map(|r| r.scalar("trialid").unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![&Scalar::Int(1), &Scalar::Int(2), &Scalar::Int(3), &Scalar::Int(4)]
    );
}

#[test]
fn single_trial_single_phase() {
    let text = format!(
        "MSG 1 start_trial 1\nMSG 2 var cond a\nMSG 3 start_phase p\n{}MSG 7 end_phase\nMSG 8 end_trial\n",
        samples(4, 3)
    );
    let parsed = parse(ParserConfig::new(), &text);
    assert_eq!(parsed.rows.len(), 1);
    assert!(parsed.warnings.is_empty());

    let row = &parsed.rows[0];
    assert_eq!(row.scalar("cond"), Some(&Scalar::Text("a".to_string())));
    for prefix in ["ptrace_", "xtrace_", "ytrace_", "ttrace_"] {
        let column = format!("{}p", prefix);
        assert_eq!(row.trace(&column).map(Vec::len), Some(3), "{}", column);
    }
}

#[test]
fn renamed_phases_merge_in_order() {
    let text = format!(
        "start_trial 1\nstart_phase first\n{}end_phase\nstart_phase second\n{}end_phase\nend_trial\n",
        samples(10, 2),
        samples(20, 3)
    );
    let config = ParserConfig::new()
        .rename_phase("first", "merged")
        .rename_phase("second", "merged");
    let parsed = parse(config, &text);
    let pupil = parsed.rows[0].trace("ptrace_merged").unwrap();
    assert_eq!(
        pupil,
        &vec![
            Some(1000.0),
            Some(1001.0),
            Some(1000.0),
            Some(1001.0),
            Some(1002.0)
        ]
    );
}

#[test]
fn over_long_traces_truncated_with_warning() {
    let text = format!(
        "start_trial 1\nstart_phase long\n{}end_phase\nstart_phase short\n{}end_phase\nend_trial\n",
        samples(0, 8),
        samples(100, 5)
    );
    let parsed = parse(ParserConfig::new().with_max_trace_len(5), &text);
    let row = &parsed.rows[0];
    assert_eq!(row.trace("ptrace_long").map(Vec::len), Some(5));
    assert_eq!(row.trace("ptrace_short").map(Vec::len), Some(5));

    assert_eq!(parsed.warnings.len(), 1);
    assert_eq!(
        parsed.warnings[0].kind,
        WarningKind::TraceTruncated {
            phase: "long".to_string(),
            original_len: 8,
            max_len: 5,
        }
    );
}

#[test]
fn blink_reconstruction_fills_interior_gaps_only() {
    let text = "start_trial 1\nstart_phase p\n\
                1 . . 0.0\n2 1.0 1.0 10.0\n3 . . 0.0\n4 . . 0.0\n5 1.0 1.0 20.0\n\
                end_phase\nend_trial\n";
    let parsed = parse(ParserConfig::new().with_blink_reconstruct(true), text);
    let pupil = parsed.rows[0].trace("ptrace_p").unwrap();
    assert_eq!(pupil[0], None);
    for value in &pupil[2..4] {
        let v = value.unwrap();
        assert!(v > 10.0 && v < 20.0);
    }
    let time = parsed.rows[0].trace("ttrace_p").unwrap();
    assert!(time.iter().all(Option::is_some));
}

#[test]
fn downsampling_keeps_labels_aligned() {
    let text = "start_trial 1\nMSG 0 start_phase p\n\
                1 1.0 1.0 1.0\n2 2.0 2.0 2.0\n3 3.0 3.0 3.0\n4 4.0 4.0 4.0\n5 5.0 5.0 5.0\n\
                end_phase\nend_trial\n";
    let parsed = parse(ParserConfig::new().with_downsample(2), text);
    let row = &parsed.rows[0];
    let expected: Trace = vec![Some(1.5), Some(3.5)];
    for column in ["ptrace_p", "xtrace_p", "ytrace_p", "ttrace_p"] {
        assert_eq!(row.trace(column), Some(&expected), "{}", column);
    }
}

#[test]
fn eof_inside_trial_emits_row() {
    let text = format!("start_trial 9\nstart_phase p\n{}", samples(0, 2));
    let parsed = parse(ParserConfig::new(), &text);
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.rows[0].trace("ptrace_p").map(Vec::len), Some(2));
    assert!(matches!(
        &parsed.warnings[..],
        [w] if matches!(w.kind, WarningKind::UnterminatedTrial { .. })
    ));
}

#[test]
fn nested_start_trial_does_not_misattribute_samples() {
    let text = format!(
        "start_trial 1\nstart_phase p\n{}start_trial 2\n{}start_phase p\n{}end_phase\nend_trial\n",
        samples(0, 2),
        samples(10, 4),
        samples(20, 3)
    );
    let parsed = parse(ParserConfig::new(), &text);
    assert_eq!(parsed.rows.len(), 2);
    assert_eq!(parsed.rows[0].trace("ptrace_p").map(Vec::len), Some(2));
    assert_eq!(parsed.rows[1].trace("ptrace_p").map(Vec::len), Some(3));
    assert!(matches!(
        parsed.warnings[0].kind,
        WarningKind::ForcedTrialClose { .. }
    ));
}

#[test]
fn disjoint_variables_across_files() {
    let parser = Parser::new(ParserConfig::new()).unwrap();
    let mut corpus = Corpus::new();
    corpus
        .add_result("a.asc", parser.parse_str("a.asc", "start_trial 1\nvar left 1\nend_trial\n"))
        .unwrap();
    corpus
        .add_result("b.asc", parser.parse_str("b.asc", "start_trial 1\nvar right 2\nend_trial\n"))
        .unwrap();

    let table = corpus.table();
    assert_eq!(table.len(), 2);
    assert!(table.cell(0, "right").is_missing());
    assert!(table.cell(1, "left").is_missing());
    assert_eq!(table.cell(0, "left"), &Cell::Scalar(Scalar::Int(1)));
    assert_eq!(table.cell(1, "right"), &Cell::Scalar(Scalar::Int(2)));
}

#[test]
fn disabled_channels_drop_columns() {
    let text = format!("start_trial 1\nstart_phase p\n{}end_phase\nend_trial\n", samples(0, 2));
    let config = ParserConfig::new().with_gaze_pos(false).with_time_trace(false);
    let parsed = parse(config, &text);
    let columns: Vec<&str> = parsed.rows[0]
        .columns()
        .filter(|c| c.ends_with("trace_p"))
        .collect();
    assert_eq!(columns, vec!["ptrace_p"]);
}

#[test]
fn custom_processor_sees_every_label() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let processor = move |label: TraceLabel, trace: Trace| -> Trace {
        record.lock().unwrap().push(label);
        trace
    };
    let parser = Parser::new(ParserConfig::new())
        .unwrap()
        .with_trace_processor(Arc::new(processor))
        .unwrap();
    parser
        .parse_str("x.asc", "start_trial 1\nstart_phase p\nend_phase\nend_trial\n")
        .unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), &TraceLabel::ALL);
}

#[test]
fn binocular_recording() {
    let text = "start_trial 1\nstart_phase p\n\
                1 100.0 100.0 1000.0 200.0 200.0 2000.0 .....\n\
                end_phase\nend_trial\n";
    let config = ParserConfig::new().with_recording_mode(eyelog_parser::RecordingMode::Binocular {
        eye: eyelog_parser::Eye::Right,
    });
    let parsed = parse(config, text);
    assert_eq!(parsed.rows[0].trace("ptrace_p"), Some(&vec![Some(2000.0)]));
}

#[test]
fn parse_file_from_disk() {
    let mut file = tempfile::Builder::new().suffix(".asc").tempfile().unwrap();
    write!(
        file,
        "** CONVERTED FROM subject.edf\nMSG 10 start_trial 1\nMSG 11 phase p\n{}MSG 20 stop_phase\nMSG 21 stop_trial\n",
        samples(12, 4)
    )
    .unwrap();
    file.flush().unwrap();

    let parser = Parser::new(ParserConfig::new()).unwrap();
    let parsed = parser.parse_file(file.path()).unwrap();
    assert_eq!(parsed.rows.len(), 1);
    assert_eq!(parsed.lines, 9);
    assert_eq!(
        parsed.rows[0].scalar("path"),
        Some(&Scalar::Text(file.path().display().to_string()))
    );
    assert_eq!(
        parsed.rows[0].trace("ttrace_p"),
        Some(&vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)])
    );
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let parser = Parser::new(ParserConfig::new()).unwrap();
    let err = parser.parse_file(dir.path().join("absent.asc")).unwrap_err();
    assert!(!err.is_configuration_error());
}

#[test]
fn reconstruction_runs_before_downsampling() {
    let text = "start_trial 1\nstart_phase p\n\
                1\t1.0\t1.0\t10.0\n2\t1.0\t1.0\t.\n3\t1.0\t1.0\t30.0\n4\t1.0\t1.0\t40.0\n\
                end_phase\nend_trial\n";
    let config = ParserConfig::new()
        .with_blink_reconstruct(true)
        .with_downsample(2);
    let parsed = parse(config, text);
    assert_eq!(
        parsed.rows[0].trace("ptrace_p"),
        Some(&vec![Some(15.0), Some(35.0)])
    );
}

#[test]
fn truncation_applies_to_downsampled_length() {
    let text = format!("start_trial 1\nstart_phase p\n{}end_phase\nend_trial\n", samples(0, 8));

    let parsed = parse(
        ParserConfig::new().with_downsample(2).with_max_trace_len(4),
        &text,
    );
    assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
    assert_eq!(parsed.rows[0].trace("ptrace_p").map(Vec::len), Some(4));

    let parsed = parse(
        ParserConfig::new().with_downsample(2).with_max_trace_len(3),
        &text,
    );
    assert_eq!(parsed.rows[0].trace("ptrace_p").map(Vec::len), Some(3));
    assert_eq!(parsed.warnings.len(), 1);
    assert!(matches!(
        parsed.warnings[0].kind,
        WarningKind::TraceTruncated {
            original_len: 4,
            max_len: 3,
            ..
        }
    ));
}

#[test]
fn merged_time_trace_keeps_increasing() {
    let text = format!(
        "MSG 0 start_trial 1\nMSG 100 start_phase a\n{}MSG 110 end_phase\nMSG 200 start_phase b\n{}MSG 210 end_phase\nMSG 211 end_trial\n",
        samples(101, 3),
        samples(201, 3)
    );
    let config = ParserConfig::new()
        .rename_phase("a", "merged")
        .rename_phase("b", "merged");
    let parsed = parse(config, &text);
    let time = parsed.rows[0].trace("ttrace_merged").unwrap();
    assert_eq!(time.len(), 6);
    assert!(time.windows(2).all(|w| w[0] < w[1]), "{:?}", time);
    assert_eq!(parsed.rows[0].scalar("t_onset_merged"), Some(&Scalar::Int(100)));
}
