use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{LevelFilter, debug};

use bayun_pipeline::config::PipelineConfig;
use bayun_pipeline::query::executor::context::QueryContext;
use bayun_pipeline::query::executor::enumerable::QueryingEnumerable;
use bayun_pipeline::query::executor::result::{DataValue, QueryResultSet, Row};
use bayun_pipeline::query::executor::shaper::{GroupingShaper, row_shaper};
use bayun_pipeline::query::planner::logical::LogicalPlan;
use bayun_pipeline::query::planner::optimizer::ParameterValueBasedOptimizer;
use bayun_pipeline::query::planner::parameters::ParameterValues;
use bayun_pipeline::query::sql::generator::{CommandCompilerFactory, SqlGeneratorFactory};
use bayun_pipeline::storage::memory::MemoryBackend;

#[derive(Parser)]
#[command(author, version, about = "BayunDB pipeline CLI - compile and stream queries over a JSON dataset")]
struct Cli {
    /// Dataset file (JSON)
    #[arg(short, long)]
    data: PathBuf,

    /// Pipeline configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Specialize a plan and print the generated command
    Sql {
        /// Logical plan file (JSON)
        #[arg(short, long)]
        plan: PathBuf,

        /// Parameter binding as name=json, may be repeated
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Execute a plan and stream its results
    Run {
        /// Logical plan file (JSON)
        #[arg(short, long)]
        plan: PathBuf,

        /// Parameter binding as name=json, may be repeated
        #[arg(long = "param")]
        params: Vec<String>,

        /// Group consecutive rows by these columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        group_by: Vec<String>,
    },

    /// List the tables in the dataset
    Tables,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Warn })
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let backend = Arc::new(MemoryBackend::from_json_file("memory", &cli.data)?);

    match cli.command {
        Commands::Sql { plan, params } => {
            let plan = load_plan(&plan)?;
            let parameters = parse_params(&params)?;
            print_command(&plan, &parameters, &config)
        }
        Commands::Run { plan, params, group_by } => {
            let plan = load_plan(&plan)?;
            let parameters = parse_params(&params)?;
            let context = Arc::new(QueryContext::for_backend(backend, config).with_parameters(parameters));
            if group_by.is_empty() {
                run_rows(context, plan)
            } else {
                run_groups(context, plan, &group_by)
            }
        }
        Commands::Tables => {
            for name in backend.table_names() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn load_plan(path: &PathBuf) -> Result<LogicalPlan> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Cannot read plan {}", path.display()))?;
    let plan: LogicalPlan =
        serde_json::from_str(&text).with_context(|| format!("Invalid plan {}", path.display()))?;
    debug!("Loaded plan:\n{}", plan);
    Ok(plan)
}

fn parse_params(assignments: &[String]) -> Result<ParameterValues> {
    let mut parameters = ParameterValues::new();
    for assignment in assignments {
        let (name, value) = ParameterValues::parse_assignment(assignment)?;
        parameters.insert(name, value);
    }
    Ok(parameters)
}

fn print_command(plan: &LogicalPlan, parameters: &ParameterValues, config: &PipelineConfig) -> Result<()> {
    let specialized = ParameterValueBasedOptimizer::new().optimize(plan, parameters)?;
    let command = SqlGeneratorFactory::new(config.sql.clone()).create().compile(&specialized)?;
    println!("{}", command.text);
    if !command.parameters.is_empty() {
        let names: Vec<&str> = command.parameters.iter().map(|p| p.placeholder.as_str()).collect();
        println!("Parameters: {}", names.join(", "));
    }
    Ok(())
}

fn run_rows(context: Arc<QueryContext>, plan: LogicalPlan) -> Result<()> {
    let query = QueryingEnumerable::new(context, plan, row_shaper());
    let mut result: Option<QueryResultSet> = None;
    for row in &query {
        let row = row?;
        let result = result.get_or_insert_with(|| QueryResultSet::new(row.columns().into_iter().cloned().collect()));
        result.add_row(row);
    }
    display_result(result.unwrap_or_else(|| QueryResultSet::new(Vec::new())));
    Ok(())
}

fn run_groups(context: Arc<QueryContext>, plan: LogicalPlan, group_by: &[String]) -> Result<()> {
    let keys: Vec<&str> = group_by.iter().map(|c| c.as_str()).collect();
    let query = QueryingEnumerable::new(context, plan, GroupingShaper::rows(&keys).into_shaper());

    let mut columns = group_by.to_vec();
    columns.push("rows".to_string());
    let mut result = QueryResultSet::new(columns.clone());
    for group in &query {
        let group = group?;
        let count = i64::try_from(group.elements.len())?;
        let mut values = group.key;
        values.push(DataValue::Integer(count));
        result.add_row(Row::from_values(columns.clone(), values));
    }
    display_result(result);
    Ok(())
}

fn display_result(result: QueryResultSet) {
    let table = result.to_string_table();
    if table.ends_with('\n') {
        print!("{}", table);
    } else {
        println!("{}", table);
    }
    let count = result.row_count();
    println!("({} {})", count, if count == 1 { "row" } else { "rows" });
}
