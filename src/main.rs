//! exec-match - judge predicted SQL against gold SQL by execution.

mod cli;

use std::path::Path;

use anyhow::Context;
use cli::Cli;
use exec_match::{logging, EvalError, Judge, JudgeRequest};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<EvalError>() {
            Some(eval) => error!("{}: {e:#}", eval.category()),
            None => error!("{e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = cli.load_config()?;
    let judge = Judge::from_config(&config);

    if let Some(batch) = &cli.batch {
        return run_batch(&judge, &cli, batch).await;
    }

    let request = cli
        .single_request()
        .context("--db, --pred and --gold are required without --batch")?;
    let verdict = judge.judge(&request).await?;
    println!("{verdict}");
    Ok(())
}

/// Judges every JSON line of `path`, printing one verdict per datapoint.
async fn run_batch(judge: &Judge, cli: &Cli, path: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;

    let mut passed = 0usize;
    let mut total = 0usize;

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let location = format!("{}:{}", path.display(), line_no + 1);

        let mut request: JudgeRequest = serde_json::from_str(line)
            .with_context(|| format!("Invalid datapoint at {location}"))?;
        cli.apply_flags(&mut request);

        let verdict = judge
            .judge(&request)
            .await
            .with_context(|| format!("Aborted at {location}"))?;
        println!("{verdict}");

        total += 1;
        if verdict.is_pass() {
            passed += 1;
        }
    }

    if total > 0 {
        info!(
            "Execution accuracy: {passed}/{total} ({:.2}%)",
            100.0 * passed as f64 / total as f64
        );
    } else {
        info!("Batch file {} contained no datapoints", path.display());
    }
    Ok(())
}
