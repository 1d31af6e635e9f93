use anyhow::Result;
use clap::{Parser, Subcommand};
use dojo_backend::config::DojoConfig;
use dojo_backend::node::DojoNode;
use dojo_backend::telemetry;
use dojo_backend::utils;

#[derive(Parser)]
#[command(author, version, about = "Martial-arts forum and blog backend")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (Axum) for REST/API access
    Serve,
    /// Fill an empty database with sample topics, threads and replies
    Seed,
    /// Recount every stored counter from the rows it summarizes
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::print_banner();
    telemetry::init_tracing();

    let args = Args::parse();

    let config = DojoConfig::from_env()?;
    let node = DojoNode::start(config)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => node.run_http_server().await,
        Command::Seed => {
            let outcome = node.seed()?;
            tracing::info!(
                seeded = outcome.seeded,
                topics = outcome.topics,
                threads = outcome.threads,
                replies = outcome.replies,
                "{}",
                outcome.message
            );
            Ok(())
        }
        Command::Reconcile => {
            let report = node.reconcile()?;
            tracing::info!(
                topics = report.topics,
                thread_replies = report.thread_replies,
                post_comments = report.post_comments,
                likes = report.likes,
                "counters reconciled"
            );
            Ok(())
        }
    }
}
