use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "settlement-core", about = "Crypto-deposit-to-fiat settlement pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the webhook ingress and the settlement worker pool.
    Serve,
    /// Run the settlement worker pool only.
    Worker,
    /// Put an exhausted job back on the queue.
    Requeue { job_id: Uuid },
}
