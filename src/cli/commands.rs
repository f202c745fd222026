//! Command dispatch: wires the service container and executes CLI
//! subcommands.

use crate::cli::output::{
    OutputFormat, format_eval_report, format_ingest_report, format_query_response, format_stats,
};
use crate::cli::parser::{Cli, Commands};
use crate::config::Settings;
use crate::core::Dataset;
use crate::error::{CommandError, Result};
use crate::eval::{
    AnswerProvider, ExtractiveAnswerer, HarnessConfig, HeuristicJudgeClient, LlmJudge,
    SyntheticConfig, SyntheticGenerator, TemplateQuestionGenerator, run_eval,
};
use crate::service::Services;
use crate::store::with_store;
use serde_json::json;
use std::sync::Arc;

/// Executes the parsed CLI, returning the output to print.
///
/// # Errors
///
/// Returns an error for invalid input, store failures, or a failed
/// evaluation gate (which maps to a non-zero exit code).
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let mut settings = Settings::from_env()?;
    settings.db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => {
            let services = Services::open(settings)?;
            if *force {
                with_store(&services.store, crate::store::SqliteStore::reset)?;
            }
            Ok(format!(
                "Initialized store at {}\n",
                services.settings.db_path.display()
            ))
        }

        Commands::Status => {
            let services = Services::open(settings)?;
            let stats = services.stats()?;
            Ok(format_stats(&stats, format))
        }

        Commands::Ingest { path, force } => {
            let services = Services::open(settings)?;
            let report = services.ingest_path(path, *force)?;
            Ok(format_ingest_report(&report, format))
        }

        Commands::Query { question, top_k } => {
            let services = Services::open(settings)?;
            let response = services.query(question, *top_k)?;
            Ok(format_query_response(&response, format))
        }

        Commands::RunEval {
            dataset,
            dataset_version,
            report,
        } => {
            let services = Services::open(settings)?;
            let dataset = Dataset::load(dataset)?;
            let eval_report = run_eval(
                &services,
                &dataset,
                dataset_version.as_deref(),
                &HarnessConfig::default(),
            )?;
            eval_report.save(report)?;

            let output = format_eval_report(&eval_report, format);
            if eval_report.gate_passed {
                Ok(output)
            } else {
                // Non-zero exit: the report is on disk, the gate failed
                Err(CommandError::ExecutionFailed(format!(
                    "evaluation gate failed ({}/{} cases passed); report written to {}",
                    eval_report.summary.passed,
                    eval_report.summary.total,
                    report.display()
                ))
                .into())
            }
        }

        Commands::GenerateSynthetic { chunks, output } => {
            let services = Services::open(settings)?;
            let generator = SyntheticGenerator::new(
                Arc::clone(&services.store),
                Box::new(TemplateQuestionGenerator::new()),
            );
            let dataset = generator.generate(&SyntheticConfig::new(*chunks))?;
            dataset.save(output)?;
            Ok(format!(
                "Generated {} case(s) into {} (version {})\n",
                dataset.cases.len(),
                output.display(),
                dataset.version
            ))
        }

        Commands::JudgeEval {
            dataset,
            report,
            no_cache,
        } => {
            let services = Services::open(settings)?;
            let dataset = Dataset::load(dataset)?;
            let judge = LlmJudge::new(
                Arc::new(HeuristicJudgeClient::new()),
                services.settings.judge_cache_dir.clone(),
                !no_cache,
                Arc::clone(&services.costs),
            );
            let answerer = ExtractiveAnswerer::new();

            let mut case_reports = Vec::with_capacity(dataset.cases.len());
            for case in &dataset.cases {
                let response = services.query(&case.question, Some(case.max_chunks))?;
                let answer =
                    answerer.answer(&case.question, &response.retrieved, &response.evidence);
                let scores = judge.judge_case(&case.question, &response.retrieved, &answer);
                case_reports.push(json!({
                    "id": case.id,
                    "question": case.question,
                    "answer": answer,
                    "scores": scores,
                }));
            }

            let payload = json!({
                "dataset_version": dataset.version,
                "code_version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Local::now().to_rfc3339(),
                "cases": case_reports,
            });
            let rendered = serde_json::to_string_pretty(&payload)
                .map_err(|e| CommandError::OutputFormat(e.to_string()))?;
            if let Some(parent) = report.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(report, &rendered)?;
            Ok(format!(
                "Judged {} case(s); report written to {}\n",
                dataset.cases.len(),
                report.display()
            ))
        }
    }
}
