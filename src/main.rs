//! rawbuf - diagnostic front end for the raw block library

use anyhow::Context as _;
use clap::Parser;
use rawbuf::cli::{Cli, Commands, ConfigArgs, CrcArgs, DumpArgs};
use rawbuf::config::Config;
use rawbuf::format::JsonFormatter;
use rawbuf::logging::init_tracing;
use rawbuf::{Context, PoolIndex, RawBlock};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    init_tracing(config.effective_log_filter().as_deref(), cli.verbose, cli.json);

    match cli.command {
        Commands::Probe => {
            let ctx = Context::install(&config)?;
            let report = serde_json::json!({
                "features": ctx.features(),
                "crc32c": ctx.crc().kernel(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Crc(args) => {
            if args.kernel.is_some() {
                config.crc_kernel = args.kernel;
            }
            let ctx = Context::install(&config)?;
            handle_crc_command(ctx, &args)?;
        }

        Commands::Dump(args) => {
            config.debug_mode |= args.debug_mode;
            let ctx = Context::install(&config)?;
            handle_dump_command(ctx, &args)?;
        }

        Commands::Config(args) => {
            handle_config_command(&config, args)?;
        }
    }

    Ok(())
}

fn handle_crc_command(ctx: &Context, args: &CrcArgs) -> anyhow::Result<()> {
    for path in &args.files {
        let block = RawBlock::file_mapped(ctx.mempools(), PoolIndex::BufferMeta, path)
            .with_context(|| format!("mapping {}", path.display()))?;
        let len = block.len();

        let value = if args.raw {
            ctx.crc().checksum(0, block.as_slice())
        } else {
            !ctx.crc().checksum(!0, block.as_slice())
        };

        tracing::debug!(path = %path.display(), len, "Checksummed file");
        println!("{:08x}  {}", value, path.display());
    }
    Ok(())
}

fn handle_dump_command(ctx: &Context, args: &DumpArgs) -> anyhow::Result<()> {
    let mut blocks = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let block = RawBlock::file_mapped(ctx.mempools(), args.pool, path)
            .with_context(|| format!("mapping {}", path.display()))?;
        blocks.push(block);
    }

    let mut f = JsonFormatter::new();
    ctx.mempools().dump(&mut f);
    println!("{}", f.to_string_pretty());
    drop(blocks);
    Ok(())
}

fn handle_config_command(config: &Config, args: ConfigArgs) -> anyhow::Result<()> {
    if let Some(path) = args.init {
        Config::default().save_to(&path)?;
        println!("Created default configuration at {}", path.display());
    } else {
        println!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
