//! Terminal front-end: renders the pipeline's event stream.

use std::io::{BufRead, Write};

use anyhow::Result;

use crate::pipeline::Pipeline;
use crate::types::{PipelineEvent, RequestContext};

/// Sample queries shown when the user asks for inspiration.
pub const EXAMPLE_QUERIES: &[&str] = &[
    "Where is the closest Starbucks?",
    "What are some good bars near me?",
    "Find me a great sushi restaurant in San Jose and show me some reviews",
    "How far is the airport from downtown Austin?",
    "What are the five best-rated taco places within 10 miles of Oakland?",
];

/// Run one query to completion, printing events as they arrive.
pub async fn run_query(pipeline: &Pipeline, query: &str, ctx: RequestContext) -> Result<()> {
    let mut rx = pipeline.handle(query.to_string(), ctx);
    let mut stdout = std::io::stdout();

    print!("Plan: ");
    stdout.flush()?;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::PlanDelta(delta) => {
                print!("{}", delta);
                stdout.flush()?;
            }
            PipelineEvent::PlanReady(plan) => {
                println!("\rPlan: {}", plan);
            }
            PipelineEvent::PlanStep { index, text } => {
                println!("  {}. {}", index + 1, text);
            }
            PipelineEvent::StepText { text, .. } => {
                print!("\r  {}", text);
                stdout.flush()?;
            }
            PipelineEvent::Results(results) => {
                println!("\n{} result(s) collected", results.len());
            }
            PipelineEvent::RelevantPlaces(places) => {
                for place in places {
                    println!("  * {} ({})", place.name, place.address);
                }
                println!();
            }
            PipelineEvent::SummaryDelta(delta) => {
                print!("{}", delta);
                stdout.flush()?;
            }
            PipelineEvent::Failed(message) => {
                println!("{}", message);
            }
            PipelineEvent::Done(_) => {
                println!();
            }
        }
    }
    Ok(())
}

/// Read queries from stdin until EOF or "exit".
pub async fn run_interactive(pipeline: &Pipeline, ctx: RequestContext) -> Result<()> {
    println!("Ask about places (\"examples\" for ideas, \"exit\" to quit).");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        match query {
            "" => continue,
            "exit" | "quit" => break,
            "examples" => {
                for example in EXAMPLE_QUERIES {
                    println!("  - {}", example);
                }
            }
            _ => run_query(pipeline, query, ctx.clone()).await?,
        }
    }
    Ok(())
}
