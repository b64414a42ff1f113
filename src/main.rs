use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use similar::TextDiff;
use stage_linker::{samples::Sample, symbol::meta::ShaderStage, InterfaceProcessor, LinkerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SampleArg {
    Compute,
    VertexPixel,
    Shared,
    Tessellation,
    Geometry,
}
impl From<SampleArg> for Sample {
    fn from(value: SampleArg) -> Self {
        match value {
            SampleArg::Compute => Self::Compute,
            SampleArg::VertexPixel => Self::VertexPixel,
            SampleArg::Shared => Self::Shared,
            SampleArg::Tessellation => Self::Tessellation,
            SampleArg::Geometry => Self::Geometry,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "links the stream-based stages of a sample shader module", long_about = None)]
struct CliArgs {
    #[arg(value_enum, default_value_t = SampleArg::VertexPixel)]
    sample: SampleArg,

    /// Print a unified diff between the module before and after linking
    #[arg(long)]
    diff: bool,

    /// Entry point name override, as `<stage>=<name>` (e.g. `pixel=PSMain`)
    #[arg(long = "names", value_parser = parse_entry_point_name)]
    names: Vec<(ShaderStage, String)>,

    /// Raise log verbosity (`-v` debug, `-vv` trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_entry_point_name(arg: &str) -> Result<(ShaderStage, String), String> {
    let (stage, name) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected <stage>=<name>, got {arg:?}"))?;
    let stage = ShaderStage::ALL
        .into_iter()
        .find(|s| s.to_string() == stage || s.id().eq_ignore_ascii_case(stage))
        .ok_or_else(|| format!("unknown stage {stage:?}"))?;

    Ok((stage, name.to_owned()))
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(filter));

    let mut config = LinkerConfig::default();
    for (stage, name) in &args.names {
        config.entry_points.set(*stage, name.as_str());
    }

    let (mut module, mut table) = Sample::from(args.sample).build();
    let before = module.to_string();
    let result = match InterfaceProcessor::new(config).process(&mut table, &mut module) {
        Ok(r) => r,
        Err(e) => {
            log::error!("link failed ({:?}): {e}", e.kind());
            return ExitCode::FAILURE;
        }
    };

    if args.diff {
        let after = module.to_string();
        let diff = TextDiff::from_lines(&before, &after);
        print!("{}", diff.unified_diff().context_radius(3).header("source", "linked"));
    } else {
        print!("{module}");
    }

    println!();
    println!("entry points:");
    for e in &result.entry_points {
        println!("  {:<10} %{:<5} {}", e.stage.to_string(), e.id, e.name);
    }
    if !result.input_attributes.is_empty() {
        println!("vertex input attributes:");
        for a in &result.input_attributes {
            println!(
                "  location {}: {} {}",
                a.location, a.semantic_name, a.semantic_index
            );
        }
    }

    ExitCode::SUCCESS
}
