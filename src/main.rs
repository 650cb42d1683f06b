mod cli;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use clap::{error::ErrorKind, ArgMatches};
use cli::{expect_arg, files};
use env_logger::Env;
use log::{error, info};
use std::{
    fs,
    io::{self, Write},
    path::Path,
    process,
};
use tpn_extract::{
    petri::{write_net, Project},
    pipeline::extract,
};

fn main() {
    let matches = match cli::args().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => process::exit(0),
                _ => process::exit(1),
            }
        }
    };

    let level = expect_arg(&matches, "verbose");
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(&matches) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let options = cli::options(matches);
    let output = Path::new(expect_arg(matches, "output-file"));

    let stdin = io::stdin();
    let extraction = extract(stdin.lock(), &options)?;

    let name = match std::env::current_dir() {
        Ok(dir) => dir.join(output),
        Err(_) => output.to_path_buf(),
    };
    let project = Project {
        name: name.display().to_string(),
        includes: files(matches, "include"),
        inputs: files(matches, "input"),
    };

    let mut model = Vec::new();
    write_net(&extraction.net, &project, &mut model)?;

    fs::write(output, &model)
        .with_context(|| format!("failed to write model to {}", output.display()))?;

    info!(
        "wrote {} model to {}",
        ByteSize(model.len() as u64),
        output.display()
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Some(data) = &extraction.program_data {
        out.write_all(data.as_bytes())?;
    }
    out.write_all(extraction.functions.as_bytes())?;
    out.flush()?;

    if let Some(query) = extraction.query(&options) {
        info!("property to get the execution times: {}", query);
    }

    Ok(())
}
