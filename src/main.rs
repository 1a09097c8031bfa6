use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use rusty_dataloader::{DataLoader, DataPars, Output, Value};

#[derive(Parser, Debug)]
#[command(name = "rusty-dataloader")]
#[command(about = "Load a dataset described by a JSON configuration and report its shape")]
struct Cli {
    /// Configuration file (JSON)
    config: PathBuf,

    /// Key of the section holding the data parameters, e.g. `data_pars`
    #[arg(short, long)]
    section: Option<String>,

    /// Print the intermediate (unshaped) output instead of the final one
    #[arg(long)]
    intermediate: bool,
}

fn describe(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Frame(_) => match value.shape() {
            Some(shape) => format!("{} {shape:?}", value.kind()),
            None => value.kind().to_string(),
        },
        Value::Scalar(s) => format!("scalar {s}"),
        Value::Stream(s) => match s.n_batches() {
            Some(n) => format!("stream of {n} batches"),
            None => "stream".to_string(),
        },
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let pars = DataPars::from_path(&cli.config, cli.section.as_deref())
        .with_context(|| format!("reading {}", cli.config.display()))?;
    let mut loader = DataLoader::new(pars);
    loader.compute().context("computing dataset")?;
    let output = loader.get_data(cli.intermediate)?;

    println!("{} ({} entries)", output.case_name(), output.len());
    match &output {
        Output::Single(v) => println!("  {}", describe(v)),
        Output::Sequence(values) => {
            for (i, v) in values.iter().enumerate() {
                println!("  [{i}] {}", describe(v));
            }
        }
        Output::Map(named) => {
            for (name, v) in named.iter() {
                println!("  {name}: {}", describe(v));
            }
        }
        Output::SequenceOfMaps(records) => {
            for (i, record) in records.iter().enumerate() {
                for (name, v) in record.iter() {
                    println!("  [{i}].{name}: {}", describe(v));
                }
            }
        }
        Output::MapOfMaps(named) => {
            for (outer, record) in named.iter() {
                for (name, v) in record.iter() {
                    println!("  {outer}.{name}: {}", describe(v));
                }
            }
        }
    }
    Ok(())
}
