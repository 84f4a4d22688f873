use bq_example_gen::pipeline::Split;
use bq_example_gen::runner::{GenArgs, run_generate};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Split name used when a single `--query` is given
const DEFAULT_SPLIT: &str = "examples";

#[derive(Parser, Clone)]
#[command(version, about = "Convert BigQuery query results into typed example records")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    #[command(group(ArgGroup::new("input").required(true).args(["query", "split"])))]
    Generate {
        /// Query whose rows become a single split named "examples"
        #[arg(long)]
        query: Option<String>,

        /// Named split with its own query (format: NAME=QUERY, repeatable)
        #[arg(long = "split", value_name = "NAME=QUERY")]
        split: Vec<Split>,

        /// Directory for <split>.jsonl files and summary.json
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Project to run and bill queries under
        #[arg(short, long)]
        project: Option<String>,

        /// Engine the pipeline runs on (e.g. DataflowRunner, DirectRunner)
        #[arg(short, long)]
        runner: Option<String>,

        /// Engine-style pipeline argument such as --runner=DataflowRunner (repeatable)
        #[arg(long = "pipeline-arg", value_name = "ARG", allow_hyphen_values = true)]
        pipeline_args: Vec<String>,

        /// Always use the bulk read strategy
        #[arg(long)]
        use_legacy_source: bool,

        /// OAuth2 access token for the query service
        #[arg(long, env = "BQ_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,

        /// Query service endpoint (default: the public BigQuery v2 API)
        #[arg(long)]
        endpoint: Option<String>,

        /// Rows converted per batch
        #[arg(short, long, default_value = "1000")]
        batch_size: usize,

        /// Number of batches converted concurrently
        #[arg(long, default_value = "8")]
        concurrency: usize,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Generate {
            query,
            split,
            output_dir,
            project,
            runner,
            pipeline_args,
            use_legacy_source,
            access_token,
            endpoint,
            batch_size,
            concurrency,
            quiet,
        } => {
            // Initialize tracing based on quiet mode
            use tracing_subscriber::{EnvFilter, FmtSubscriber};
            let filter = if quiet {
                EnvFilter::new("bq_example_gen=warn")
            } else {
                EnvFilter::new("bq_example_gen=info")
            };
            let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
            let _ = tracing::subscriber::set_global_default(subscriber);

            let splits = cli::collect_splits(query, split);

            if !quiet {
                println!("BigQuery Example Generator");
                println!("==========================");
                for s in &splits {
                    println!("Split {}: {}", s.name, s.query);
                }
                println!("Output: {}", output_dir.display());
                println!();
            }

            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("Interrupted, stopping...");
                        cancel.cancel();
                    }
                }
            });

            let mut gen_args = GenArgs::new(splits, output_dir);
            gen_args.pipeline_args = pipeline_args;
            gen_args.runner = runner;
            gen_args.project = project;
            gen_args.use_legacy_source = use_legacy_source;
            gen_args.access_token = access_token;
            gen_args.endpoint = endpoint;
            gen_args.batch_size = batch_size;
            gen_args.concurrency = concurrency;
            gen_args.cancel = cancel;

            let result = run_generate(gen_args).await?;

            println!();
            println!("Generation Summary");
            println!("==================");
            println!("Run ID: {}", result.run_id);
            for outcome in &result.splits {
                println!(
                    "  {}: {} records, {} columns ({} read)",
                    outcome.split, outcome.records_written, outcome.columns, outcome.strategy
                );
            }
            println!("Records written: {}", result.records_written);
            println!("Duration: {:.2}s", result.duration.as_secs_f64());
            if let Some(pct) = result.batch_percentiles {
                println!("Batch time: {}", pct);
            }
            println!("Summary: {}", result.summary_path.display());
        }
    }
    Ok(())
}

/// CLI utility functions for turning command-line arguments into run arguments
mod cli {
    use super::{DEFAULT_SPLIT, Split};

    /// A lone `--query` becomes the default split, ahead of any `--split`
    pub fn collect_splits(query: Option<String>, splits: Vec<Split>) -> Vec<Split> {
        query
            .map(|q| Split::new(DEFAULT_SPLIT, q))
            .into_iter()
            .chain(splits)
            .collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        let args = Args::try_parse_from([
            "bq-example-gen",
            "generate",
            "--split",
            "train=SELECT * FROM t",
            "--split",
            "eval=SELECT * FROM e",
            "--output-dir",
            "/tmp/out",
            "--pipeline-arg",
            "--runner=DataflowRunner",
            "--access-token",
            "tok",
        ])
        .unwrap();

        let Command::Generate {
            split,
            pipeline_args,
            query,
            ..
        } = args.command;
        assert!(query.is_none());
        assert_eq!(split[0], Split::new("train", "SELECT * FROM t"));
        assert_eq!(split[1].name, "eval");
        assert_eq!(pipeline_args, vec!["--runner=DataflowRunner".to_string()]);
    }

    #[test]
    fn test_requires_query_or_split() {
        let result = Args::try_parse_from(["bq-example-gen", "generate", "--output-dir", "/tmp/out"]);
        assert!(result.is_err());
    }
}
