use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "processvault")]
#[command(about = "Judicial process document materialization service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP ingress plus a worker pool in the same process.
    Serve(ServeArgs),

    /// Run a worker pool with no HTTP ingress.
    Worker,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to. Overrides `server.bind_addr` in
    /// configuration when given.
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
