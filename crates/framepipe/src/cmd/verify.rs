use std::path::Path;

use serde::Serialize;
use tracing::warn;

use framepipe_channel::EndpointConfig;
use framepipe_frame::{sequence_number, verify_body, Verification};
use framepipe_harness::{FileSource, HarnessError};

use crate::cmd::VerifyArgs;
use crate::exit::{harness_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_json, print_table, schema_id, OutputFormat};

#[derive(Serialize, Debug, Default, PartialEq, Eq)]
struct VerifyCounts {
    frames: u64,
    valid: u64,
    checksum_rewrites: u64,
    corrupt: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_corrupt: Option<CorruptFrame>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
struct CorruptFrame {
    index: u64,
    sequence_number: i32,
    offset: usize,
    expected: u8,
    found: u8,
}

#[derive(Serialize)]
struct VerifyOutput<'a> {
    schema_id: String,
    path: String,
    #[serde(flatten)]
    counts: &'a VerifyCounts,
}

pub fn run(args: VerifyArgs, format: OutputFormat) -> CliResult<i32> {
    let mut endpoint = EndpointConfig::default();
    if let Some(max) = args.max_frame_len {
        endpoint.max_frame_len = max;
    }

    let runtime = super::runtime()?;
    let counts = runtime
        .block_on(verify_file(&args.path, &endpoint))
        .map_err(|err| harness_error("verify failed", &err))?;

    let output = VerifyOutput {
        schema_id: schema_id("verify"),
        path: args.path.display().to_string(),
        counts: &counts,
    };
    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Table => print_table(
            &["FILE", "FRAMES", "VALID", "REWRITTEN", "CORRUPT"],
            [vec![
                output.path.clone(),
                counts.frames.to_string(),
                counts.valid.to_string(),
                counts.checksum_rewrites.to_string(),
                counts.corrupt.to_string(),
            ]],
        ),
        OutputFormat::Pretty => println!(
            "{}: frames={} valid={} checksum_rewrites={} corrupt={}",
            output.path, counts.frames, counts.valid, counts.checksum_rewrites, counts.corrupt
        ),
    }

    if counts.corrupt > 0 {
        Ok(DATA_INVALID)
    } else {
        Ok(SUCCESS)
    }
}

async fn verify_file(path: &Path, endpoint: &EndpointConfig) -> Result<VerifyCounts, HarnessError> {
    let mut source = FileSource::open(path, endpoint).await?;
    let mut counts = VerifyCounts::default();

    while let Some(mut record) = source.read_record().await? {
        let index = counts.frames;
        counts.frames += 1;
        let verification = match verify_body(&mut record) {
            Ok(verification) => verification,
            Err(err) => {
                counts.corrupt += 1;
                warn!(index, error = %err, "frame could not be verified");
                continue;
            }
        };
        match verification {
            Verification::Valid => counts.valid += 1,
            Verification::ChecksumRewritten { .. } => {
                counts.valid += 1;
                counts.checksum_rewrites += 1;
            }
            Verification::Corrupt {
                offset,
                expected,
                found,
            } => {
                counts.corrupt += 1;
                let sequence_number = sequence_number(&record)?;
                warn!(index, sequence_number, offset, expected, found, "corrupt frame body");
                counts.first_corrupt.get_or_insert(CorruptFrame {
                    index,
                    sequence_number,
                    offset,
                    expected,
                    found,
                });
            }
        }
    }
    Ok(counts)
}
