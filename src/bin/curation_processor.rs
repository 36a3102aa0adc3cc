//! Data curation workload: removes null-valued and duplicate records.

use clap::Parser;

use compute_worker::workload::{curate, to_output};

#[derive(Parser, Debug)]
#[command(name = "curation-processor")]
#[command(about = "Deduplicate a JSON record list and prune records with null fields")]
struct Args {
    /// JSON string or http(s) URL referencing one
    input_source: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    println!("{}", to_output(&curate::run(&args.input_source).await));
}
