use pcmon::counters::{SimulatedCounterSource, Topology};
use pcmon::domain::ScopeSelection;
use pcmon::report::{encoder_for, ReportContext, ReportFormat};
use pcmon::sampling::{IntervalSource, LoopConfig, RotationPolicy, SamplingLoop};
use std::fs::File;
use std::future::pending;
use std::io::{BufWriter, Write};
use std::time::Duration;

async fn sample_to_file(format: ReportFormat, scopes: ScopeSelection, samples: u64) -> String {
    let file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let topology = Topology::synthetic(4, 2);

    {
        let out = BufWriter::new(File::create(file.path()).expect("Failed to open temp file"));
        let encoder = encoder_for(format, ReportContext { topology: topology.clone(), scopes });
        let config = LoopConfig {
            interval: IntervalSource::FixedDelay(Duration::from_millis(5)),
            scopes,
            policy: RotationPolicy::default(),
            sample_limit: Some(samples),
        };
        let mut sampler = SamplingLoop::new(SimulatedCounterSource::new(topology), encoder, out, config);
        sampler.run(pending::<()>()).await.expect("sampling failed");

        let (_, mut out) = sampler.into_parts();
        out.flush().expect("flush failed");
    }

    std::fs::read_to_string(file.path()).expect("Failed to read output")
}

#[tokio::test]
async fn test_csv_file_has_single_header() {
    let text = sample_to_file(ReportFormat::Csv, ScopeSelection::all(), 3).await;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2 + 3);

    assert!(lines[0].starts_with("SYSTEM;"));
    assert!(lines[1].starts_with("TIME;EXEC;IPC;"));
    // Two sockets: interconnect columns are present
    assert!(lines[1].contains("TotalQPIin;QPItoMC;"));
    assert!(lines[0].contains("SKT1;"));
    assert!(lines[0].contains("C3@S1;"));

    let width = lines[1].split(';').count();
    for row in &lines[2..] {
        assert_eq!(row.split(';').count(), width, "{row}");
        // HH:MM:SS:mmm
        let time = row.split(';').next().unwrap();
        assert_eq!(time.len(), 12, "{time}");
    }
}

#[tokio::test]
async fn test_csv_without_cores() {
    let scopes = ScopeSelection { cores: false, sockets: true, system: true };
    let text = sample_to_file(ReportFormat::Csv, scopes, 2).await;
    assert!(!text.lines().next().unwrap().contains("C0@S0"));
    assert_eq!(text.lines().count(), 4);
}

#[tokio::test]
async fn test_json_lines_parse() {
    let text = sample_to_file(ReportFormat::Json, ScopeSelection::all(), 2).await;
    let modes: Vec<String> = text
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("invalid JSON line");
            assert_eq!(value["cores"].as_array().unwrap().len(), 4);
            assert_eq!(value["sockets"].as_array().unwrap().len(), 2);
            value["mode"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(modes, ["CACHE", "TLB"]);
}

#[tokio::test]
async fn test_simple_format_without_cores_is_empty() {
    let scopes = ScopeSelection { cores: false, sockets: true, system: true };
    let text = sample_to_file(ReportFormat::Simple, scopes, 2).await;
    assert!(text.is_empty());
}
