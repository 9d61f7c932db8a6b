mod classify;
mod extract;
mod parser;
mod paths;
mod reader;
mod summary;
mod types;

pub use classify::{classify, classify_key, has_group_chat_tag};
pub use extract::{Extraction, extract_usage_events};
pub use paths::{default_transcripts_dir, is_transcript_path, list_transcripts};
pub use reader::{Record, parse_records, read_transcript};
pub use summary::summarize;
pub use types::{IngestError, IngestIssue, Result};
