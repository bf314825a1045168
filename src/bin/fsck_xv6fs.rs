use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;
use xv6fs::fsck::{fsck, fsck_types::*};

#[derive(Parser)]
#[command(name = "fsck.xv6fs", version, about = "Verifica la consistencia de una imagen xv6")]
struct Cli {
    /// Imagen del sistema de archivos
    image: PathBuf,

    /// Un bloque marcado en el bitmap que ningún inodo usa es un error
    #[arg(long)]
    strict_bitmap: bool,

    /// Más detalle en stderr (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "xv6fs=debug",
        _ => "xv6fs=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<Option<StageFailure>> {
    // ——————————————————————————————————————————
    //       CARGAR LA IMAGEN (solo lectura)
    // ——————————————————————————————————————————
    let image = std::fs::read(&cli.image)
        .with_context(|| format!("No se pudo leer la imagen {:?}", cli.image))?;

    let options = CheckOptions {
        strict_bitmap: cli.strict_bitmap,
    };

    // ——————————————————————————————————————————
    //       EJECUTAR FSCK
    // ——————————————————————————————————————————
    match fsck::run_fsck(&image, &options) {
        Ok(report) => {
            for block in &report.unreferenced_marked {
                eprintln!(
                    "{} bitmap marks block {} in use but it is not referenced",
                    "warning:".yellow().bold(),
                    block
                );
            }
            Ok(None)
        }
        Err(failure) => Ok(Some(failure)),
    }
}

fn main() -> ExitCode {
    // Solo se usan los códigos 0 y 1; `--help` y `--version` salen con 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(None) => ExitCode::SUCCESS,
        Ok(Some(failure)) => {
            eprintln!("{} {}.", "ERROR:".red().bold(), failure);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {:#}", "ERROR:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
