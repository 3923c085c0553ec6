use std::path::Path;
use std::sync::Arc;

use courseplan_engine::{
    Outcome, PendingDecision, ProgrammeSummary, Removal, ValidationEngine,
};
use courseplan_lookup::{MemoizedLookup, StaticLookup};
use serde::Serialize;

use crate::config::load_config;
use crate::script::{Script, Step};
use crate::{exit_with, read_catalog, OutputFormat};

pub(crate) struct PlanOptions<'a> {
    pub catalog: &'a Path,
    pub programmes: &'a [String],
    pub script: &'a Path,
    pub config: Option<&'a Path>,
    pub output: OutputFormat,
    pub quiet: bool,
}

/// What one script step produced.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum StepReport {
    Add { outcome: Outcome },
    Resolve { outcome: Outcome },
    Remove { removal: Removal },
    Abandon { abandoned: Option<PendingDecision> },
}

#[derive(Debug, Serialize)]
struct PlanReport<'a> {
    steps: &'a [StepReport],
    programmes: Vec<ProgrammeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<&'a PendingDecision>,
}

pub(crate) async fn cmd_plan(opts: PlanOptions<'_>) {
    let (output, quiet) = (opts.output, opts.quiet);

    let config = load_config(opts.config).unwrap_or_else(|e| exit_with(&e, output, quiet));
    let doc = read_catalog(opts.catalog, output, quiet);
    let script_text = std::fs::read_to_string(opts.script).unwrap_or_else(|e| {
        let msg = format!("error reading file '{}': {}", opts.script.display(), e);
        exit_with(&msg, output, quiet)
    });
    let script = Script::parse(&script_text)
        .unwrap_or_else(|e| exit_with(&format!("{}: {}", opts.script.display(), e), output, quiet));

    let lookup = Arc::new(MemoizedLookup::new(StaticLookup::new(doc)));
    let mut engine = ValidationEngine::load(lookup, opts.programmes, config)
        .await
        .unwrap_or_else(|e| exit_with(&e.to_string(), output, quiet));
    if !script.preload.is_empty() {
        // Detached: the steps below do not wait for it.
        drop(engine.preload(script.preload.clone()));
    }

    let text = output == OutputFormat::Text && !quiet;
    let mut reports = Vec::with_capacity(script.steps.len());
    for (i, step) in script.steps.into_iter().enumerate() {
        let n = i + 1;
        let report = match step {
            Step::Add {
                course,
                box_id,
                target,
            } => {
                let outcome = engine
                    .validate_and_commit(&course, &box_id, target.as_deref())
                    .await;
                if text {
                    print_outcome(n, &format!("add {} -> {}", course, box_id), &outcome);
                }
                StepReport::Add { outcome }
            }
            Step::Resolve { decision, option } => {
                let decision = match decision {
                    Some(id) => id,
                    None => match engine.pending_decision() {
                        Some(d) => d.decision_id.clone(),
                        None => exit_with(&format!("step {}: no decision is pending", n), output, quiet),
                    },
                };
                let outcome = engine
                    .resolve_decision(&decision, &option)
                    .await
                    .unwrap_or_else(|e| exit_with(&format!("step {}: {}", n, e), output, quiet));
                if text {
                    print_outcome(n, &format!("resolve {} = {}", decision, option), &outcome);
                }
                StepReport::Resolve { outcome }
            }
            Step::Remove { course, box_id } => {
                let removal = engine
                    .remove(&course, &box_id)
                    .unwrap_or_else(|e| exit_with(&format!("step {}: {}", n, e), output, quiet));
                if text {
                    print_removal(n, &course, &box_id, &removal);
                }
                StepReport::Remove { removal }
            }
            Step::Abandon => {
                let abandoned = engine.abandon_decision();
                if text {
                    match &abandoned {
                        Some(d) => println!("[{}] abandon: {}", n, d.decision_id),
                        None => println!("[{}] abandon: nothing pending", n),
                    }
                }
                StepReport::Abandon { abandoned }
            }
        };
        reports.push(report);
    }

    let programmes = engine.programme_summaries();
    match output {
        OutputFormat::Text => print_summaries(&programmes),
        OutputFormat::Json => {
            let report = PlanReport {
                steps: &reports,
                programmes,
                pending: engine.pending_decision(),
            };
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => exit_with(&format!("failed to serialize plan report: {}", e), output, quiet),
            }
        }
    }
}

fn print_outcome(n: usize, action: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Accepted(a) => {
            let counted = if a.attributions.is_empty() {
                "unattributed".to_string()
            } else {
                a.attributions.join(", ")
            };
            println!(
                "[{}] {}: accepted ({}), +{} units",
                n, action, counted, a.units_added
            );
            for forced in &a.forced {
                println!("      forced {} -> {}", forced.course, forced.box_id);
            }
            for slot in &a.slots {
                println!(
                    "      slot {}: one of {}",
                    slot.slot_id,
                    slot.options.join(", ")
                );
            }
            for w in &a.warnings {
                println!("      warning {}: {}", w.kind.code(), w.message);
            }
        }
        Outcome::Rejected(r) => {
            println!("[{}] {}: rejected {}: {}", n, action, r.reason.code(), r.message);
        }
        Outcome::PendingDecision(d) => {
            println!(
                "[{}] {}: {} ({}): {}",
                n,
                action,
                d.decision_id,
                d.kind.code(),
                d.prompt
            );
            for option in &d.options {
                println!("      [{}] {}", option.id, option.label);
            }
        }
    }
}

fn print_removal(n: usize, course: &str, box_id: &str, removal: &Removal) {
    println!(
        "[{}] remove {} from {}: {} box(es), -{} units",
        n,
        course,
        box_id,
        removal.removed.len(),
        removal.units_removed
    );
    for (course, box_id) in &removal.retained {
        println!("      kept {} in {}: still a prerequisite", course, box_id);
    }
    for (course, path) in &removal.restored {
        println!("      restored {} in {}", course, path);
    }
}

fn print_summaries(programmes: &[ProgrammeSummary]) {
    for p in programmes {
        println!(
            "{} ({}): {}/{} units",
            p.label,
            p.kind.as_str(),
            p.fulfilled,
            p.required
        );
        for s in &p.sections {
            let mut line = format!("  {}: {}/{}", s.label, s.fulfilled, s.required);
            if s.cap_exceeded {
                line.push_str(" (cap exceeded)");
            }
            if !s.minimum_met {
                line.push_str(" (below minimum)");
            }
            println!("{}", line);
        }
        if let Some(ue) = &p.ue {
            println!("  Unrestricted electives: {}/{}", ue.fulfilled, ue.required);
        }
    }
}
