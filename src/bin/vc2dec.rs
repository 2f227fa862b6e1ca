// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! vc2dec, a simple decoder program using vc2-decoder. Reads a VC-2 stream
//! and writes the decoded pictures (or one of the intermediate artifacts) to
//! a planar file.

use std::fs::File;
use std::io::Read;
use std::io::Write;

use anyhow::Context;
use argh::FromArgs;
use log::info;

use vc2_decoder::decoder::Decoder;
use vc2_decoder::OutputMode;

/// Decode a VC-2 stream to an uncompressed planar file.
#[derive(Debug, FromArgs)]
struct Args {
    /// input stream, or "-" for standard input
    #[argh(positional)]
    input: String,

    /// output file, or "-" for standard output
    #[argh(positional)]
    output: String,

    /// what to write: decoded, transform, quantised or indices.
    /// Default: decoded
    #[argh(option, default = "OutputMode::Decoded")]
    mode: OutputMode,

    /// log each decode step (same as RUST_LOG=debug)
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let mut data = Vec::new();
    if args.input == "-" {
        std::io::stdin()
            .read_to_end(&mut data)
            .context("failed to read standard input")?;
    } else {
        File::open(&args.input)
            .with_context(|| format!("failed to open input file \"{}\"", args.input))?
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read input file \"{}\"", args.input))?;
    }

    let mut sink: Box<dyn Write> = if args.output == "-" {
        Box::new(std::io::stdout())
    } else {
        Box::new(
            File::create(&args.output)
                .with_context(|| format!("failed to open output file \"{}\"", args.output))?,
        )
    };

    let mut decoder = Decoder::new(args.mode);
    let stats = decoder
        .decode_stream(&data, &mut sink)
        .context("failed to write output")?;
    sink.flush().context("failed to flush output")?;

    info!(
        "{} data units: {} pictures decoded, {} frames, {} dropped",
        stats.data_units, stats.pictures, stats.frames, stats.dropped
    );

    // A stream decoded successfully if it ended cleanly, or produced at
    // least one complete output.
    let produced_output = match args.mode {
        OutputMode::Decoded => stats.frames > 0,
        _ => stats.pictures > 0,
    };
    Ok(stats.end_of_sequence || produced_output)
}

fn main() {
    let args: Args = argh::from_env();

    if args.verbose && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("no decodable sequence in \"{}\"", args.input);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}
