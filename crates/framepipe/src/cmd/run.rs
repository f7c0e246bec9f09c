use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use framepipe_harness::{Harness, HarnessConfig, RunSummary, TaskReport};

use crate::cmd::RunArgs;
use crate::exit::{config_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_json, print_table, schema_id, OutputFormat};

#[derive(Serialize)]
struct RunOutput<'a> {
    schema_id: String,
    mode: &'a str,
    success: bool,
    failures: usize,
    interrupted: bool,
    tasks: Vec<TaskRow>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
struct TaskRow {
    name: String,
    status: &'static str,
    frames: u64,
    bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verify_failures: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    oversized_allocations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config =
        HarnessConfig::from_path(&args.config).map_err(|err| config_error("config load failed", &err))?;
    let mode = if args.cooperative {
        "cooperative"
    } else {
        "independent"
    };

    let runtime = super::runtime()?;
    let (summary, interrupted) = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_interrupt(cancel.clone()));

        let harness = Harness::build(config).await;
        info!(mode, pairs = harness.pairs().len(), "run starting");
        let summary = if args.cooperative {
            harness.run_cooperative(&cancel).await
        } else {
            harness.run_independent(&cancel).await
        };
        watcher.abort();
        (summary, cancel.is_cancelled())
    });

    let output = RunOutput {
        schema_id: schema_id("run-summary"),
        mode,
        success: summary.is_success(),
        failures: summary.failures(),
        interrupted,
        tasks: task_rows(&summary),
    };
    print_run(&output, format);

    if output.success {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupt received, stopping run");
            cancel.cancel();
        }
        Err(err) => warn!(error = %err, "interrupt handler unavailable"),
    }
}

fn task_rows(summary: &RunSummary) -> Vec<TaskRow> {
    let mut rows: Vec<TaskRow> = summary
        .outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(TaskReport::Producer(report)) => TaskRow {
                name: outcome.name.clone(),
                status: "ok",
                frames: report.frames_sent,
                bytes: report.bytes_sent,
                reason: Some(report.reason.as_str()),
                verify_failures: None,
                oversized_allocations: None,
                error: None,
            },
            Ok(TaskReport::Consumer(report)) => TaskRow {
                name: outcome.name.clone(),
                status: "ok",
                frames: report.frames,
                bytes: report.bytes,
                reason: Some(report.reason.as_str()),
                verify_failures: Some(report.verify_failures),
                oversized_allocations: Some(report.oversized_allocations),
                error: None,
            },
            Err(err) => failed_row(outcome.name.clone(), "failed", err.to_string()),
        })
        .collect();

    rows.extend(summary.rejected.iter().map(|rejection| {
        failed_row(
            format!("pair-{}", rejection.index),
            "rejected",
            rejection.error.to_string(),
        )
    }));
    rows
}

fn failed_row(name: String, status: &'static str, error: String) -> TaskRow {
    TaskRow {
        name,
        status,
        frames: 0,
        bytes: 0,
        reason: None,
        verify_failures: None,
        oversized_allocations: None,
        error: Some(error),
    }
}

fn print_run(output: &RunOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => print_table(
            &["TASK", "STATUS", "FRAMES", "BYTES", "REASON"],
            output.tasks.iter().map(|row| {
                vec![
                    row.name.clone(),
                    row.status.to_string(),
                    row.frames.to_string(),
                    row.bytes.to_string(),
                    row.reason
                        .map(str::to_string)
                        .or_else(|| row.error.clone())
                        .unwrap_or_default(),
                ]
            }),
        ),
        OutputFormat::Pretty => {
            for row in &output.tasks {
                match &row.error {
                    Some(error) => println!("{} {}: {}", row.name, row.status, error),
                    None => println!(
                        "{} frames={} bytes={} reason={}",
                        row.name,
                        row.frames,
                        row.bytes,
                        row.reason.unwrap_or("-")
                    ),
                }
            }
            println!(
                "mode={} failures={} interrupted={}",
                output.mode, output.failures, output.interrupted
            );
        }
    }
}
