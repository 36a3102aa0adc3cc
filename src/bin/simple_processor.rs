//! Built-in multiply workload.
//!
//! Served directly for the trusted `simple-processor` image and packaged as
//! that image's entrypoint elsewhere.

use clap::Parser;

use compute_worker::workload::{multiply, to_output};

#[derive(Parser, Debug)]
#[command(name = "simple-processor")]
#[command(about = "Element-wise multiplication of two JSON lists")]
struct Args {
    /// JSON input, e.g. '{"a": [1, 2], "b": [3, 4]}'
    input_data: String,
}

fn main() {
    let args = Args::parse();
    println!("{}", to_output(&multiply::process(&args.input_data)));
}
