use std::env;
use std::fs;
use std::io::{self, Read};

use collector_core::{FRESHNESS_WINDOW_MS, now_ms, session_id_from_source};
use ingest::{classify, extract_usage_events, parse_records, summarize};
use serde_json::json;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("usage: transcript_cli <path|-> [watermark_ms]");
        std::process::exit(2);
    }

    let path = &args[1];
    let watermark = match args.get(2) {
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) => Some(value),
            Err(err) => {
                eprintln!("invalid watermark {}: {}", raw, err);
                std::process::exit(2);
            }
        },
        None => None,
    };

    let mut data = Vec::new();
    if path == "-" {
        io::stdin().read_to_end(&mut data).unwrap_or_else(|err| {
            eprintln!("failed to read stdin: {}", err);
            std::process::exit(1);
        });
    } else {
        data = fs::read(path).unwrap_or_else(|err| {
            eprintln!("failed to read {}: {}", path, err);
            std::process::exit(1);
        });
    }

    let session_id = if path == "-" {
        "stdin".to_string()
    } else {
        session_id_from_source(path)
    };
    let records = parse_records(&data);
    let summary = summarize(&session_id, &records, now_ms(), FRESHNESS_WINDOW_MS);
    let extraction = extract_usage_events(&session_id, &records, watermark);

    let report = json!({
        "session_id": session_id,
        "records": records.len(),
        "kind": classify(&records),
        "summary": summary,
        "pending_events": extraction.events,
        "next_watermark": extraction.watermark,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{}", text),
        Err(err) => {
            eprintln!("failed to render report: {}", err);
            std::process::exit(1);
        }
    }
    if summary.is_none() {
        std::process::exit(3);
    }
}
