use std::path::{Path, PathBuf};

use serde::Serialize;

use framepipe_channel::EndpointConfig;
use framepipe_harness::split_records;

use crate::cmd::SplitArgs;
use crate::exit::{harness_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, schema_id, OutputFormat};

#[derive(Serialize)]
struct SplitOutput {
    schema_id: String,
    input: String,
    records: u64,
    parts: Vec<String>,
}

pub fn run(args: SplitArgs, format: OutputFormat) -> CliResult<i32> {
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| default_out_dir(&args.path));

    let runtime = super::runtime()?;
    let summary = runtime
        .block_on(split_records(
            &args.path,
            args.parts,
            &out_dir,
            &EndpointConfig::default(),
        ))
        .map_err(|err| harness_error("split failed", &err))?;

    let output = SplitOutput {
        schema_id: schema_id("split"),
        input: args.path.display().to_string(),
        records: summary.records,
        parts: summary
            .paths
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    };
    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Table => print_table(
            &["PART", "FILE"],
            output
                .parts
                .iter()
                .enumerate()
                .map(|(i, path)| vec![i.to_string(), path.clone()]),
        ),
        OutputFormat::Pretty => {
            println!("{} records from {}", output.records, output.input);
            for path in &output.parts {
                println!("  {path}");
            }
        }
    }
    Ok(SUCCESS)
}

fn default_out_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_land_next_to_input_by_default() {
        assert_eq!(
            default_out_dir(Path::new("/data/run/hits.dat")),
            PathBuf::from("/data/run")
        );
        assert_eq!(default_out_dir(Path::new("hits.dat")), PathBuf::from("."));
    }
}
