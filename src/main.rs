use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;

use weft_rs::adk::model::openai::OpenAiCompatModel;
use weft_rs::adk::model::ChatModel;
use weft_rs::weft::steps::MODEL_RESOURCE;
use weft_rs::weft::workflow::builder::Builder;
use weft_rs::weft::workflow::loader::WorkflowLoader;
use weft_rs::weft::workflow::node::{NoopStep, END};
use weft_rs::weft::workflow::types::WorkflowDefinition;
use weft_rs::weft::workflow::{dedup, normalizer, FunctionRegistry, WorkflowState};

use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the normalized, deduplicated layers of a workflow
    Normalize {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,
    },
    /// Print the nodes and edges a workflow compiles to, using stub steps
    Plan {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,
    },
    /// Run a workflow whose steps are the prompts declared in the file
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Initial state as a JSON object
        #[arg(short, long, default_value = "{}")]
        state: String,

        /// Model used when the file does not name one
        #[arg(short, long, default_value = "gpt-4o-mini")]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Normalize { file } => {
            let def = load(&file)?;
            let prepared = dedup::deduplicate(&normalizer::normalize(&def.nodes));

            println!("Workflow: {}", def.name);
            for (i, layer) in prepared.spec().layers().iter().enumerate() {
                println!("{:>3}. {}", i + 1, layer);
            }
            let mut aliases: Vec<_> = prepared.aliases().iter().collect();
            aliases.sort();
            for (id, name) in aliases {
                println!("     {} -> {}", id, name);
            }
        }
        Commands::Plan { file } => {
            let def = load(&file)?;
            let registry = stub_registry(&def);
            let compiled = Builder::new(Arc::new(registry)).build_from_def(&def)?;
            let graph = compiled.graph();

            println!("Nodes: {}", graph.node_ids().join(", "));
            println!("Edges:");
            for (source, target) in graph.edges() {
                println!("  {} -> {}", source, target);
            }
            for id in graph.node_ids() {
                if let Some(routes) = graph.routes(id) {
                    println!("Routes from {}:", id);
                    for (outcome, targets) in routes {
                        println!("  {} => {}", outcome, targets.join(", "));
                    }
                }
            }
        }
        Commands::Run { file, state, model } => {
            let def = load(&file)?;
            if def.prompts.is_empty() {
                bail!("workflow '{}' declares no prompts to run", def.name);
            }

            let values = match serde_json::from_str::<Value>(&state)
                .context("--state is not valid JSON")?
            {
                Value::Object(map) => map,
                other => bail!("--state must be a JSON object, got {}", other),
            };

            let model_name = def.model.model_name.clone().unwrap_or(model);
            log::info!("Using model: {}", model_name);
            let chat: Arc<dyn ChatModel> = Arc::new(OpenAiCompatModel::new(model_name)?);

            let compiled = Builder::new(Arc::new(FunctionRegistry::new())).build_from_def(&def)?;
            let initial: WorkflowState = def
                .initial_state()
                .with_values(values)
                .with_resource(MODEL_RESOURCE, chat);

            println!("Running workflow: {}", def.name);
            let report = compiled.invoke_with_report(initial).await?;

            for (i, step) in report.steps.iter().enumerate() {
                println!("  step {}: {}", i + 1, step.join(", "));
            }
            println!("{}", serde_json::to_string_pretty(&report.state.to_json())?);
            log::info!(
                "Run {} took {} ms",
                report.run_id,
                (report.finished_at - report.started_at).num_milliseconds()
            );
        }
    }

    Ok(())
}

fn load(file: &str) -> anyhow::Result<WorkflowDefinition> {
    WorkflowLoader::new()
        .load_workflow(file)
        .with_context(|| format!("failed to load workflow from {}", file))
}

/// Registry that knows every name the file uses, backed by no-op steps and
/// conditions that end the run
fn stub_registry(def: &WorkflowDefinition) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    for name in def.nodes.step_names() {
        if !registry.contains_step(name) {
            registry.register_node(name, Arc::new(NoopStep));
        }
    }
    for name in def.nodes.condition_names() {
        if !def.routes.contains_key(name) {
            registry.register_condition(name, Arc::new(|_: &WorkflowState| END.to_string()));
        }
    }
    registry
}
