use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use xv6fs::{ImageBuilder, ROOT_INO};

#[derive(Parser)]
#[command(name = "mkfs.xv6fs", version, about = "Crea una imagen xv6 nueva")]
struct Cli {
    /// Archivo de salida
    image: PathBuf,

    /// Tamaño total en bloques
    #[arg(long, default_value_t = 1024)]
    size: u32,

    /// Número de inodos
    #[arg(long, default_value_t = 200)]
    inodes: u32,

    /// Archivos del host a copiar en el directorio raíz
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Superblock, tabla de inodos, bitmap y directorio raíz
    let mut builder = ImageBuilder::new(cli.size, cli.inodes)
        .with_context(|| format!("No se pudo crear el layout ({} bloques, {} inodos)", cli.size, cli.inodes))?;

    // 2. Copiar cada archivo al directorio raíz
    for path in &cli.files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Nombre de archivo inválido: {:?}", path))?;
        let contents = fs::read(path).with_context(|| format!("No se pudo leer {:?}", path))?;
        builder
            .add_file(ROOT_INO, name, &contents)
            .with_context(|| format!("No se pudo agregar {:?}", path))?;
    }

    // 3. Escribir la imagen
    let layout = *builder.layout();
    fs::write(&cli.image, builder.finish())
        .with_context(|| format!("No se pudo escribir la imagen {:?}", cli.image))?;

    println!(
        "mkfs.xv6fs: imagen creada con {} bloques, {} inodos, {} bloques de datos ({} archivos).",
        layout.total_blocks,
        layout.ninodes,
        layout.data_blocks,
        cli.files.len()
    );

    Ok(())
}
