use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::warn;

use ggpk::{bundled, Ggpk, Index};

#[derive(Parser, Debug)]
struct ActionInfo {
    /// Input .ggpk path (or index path with --bundled)
    #[arg(index = 1)]
    input: String,

    /// Treat the input as a bundle index and open this GGPK file inside it
    #[arg(short, long)]
    bundled: Option<String>,
}

#[derive(Parser, Debug)]
struct ActionList {
    /// Input .ggpk path (or index path with --bundled)
    #[arg(index = 1)]
    input: String,

    /// Treat the input as a bundle index and open this GGPK file inside it
    #[arg(short, long)]
    bundled: Option<String>,
}

#[derive(Parser, Debug)]
struct ActionGet {
    /// Input .ggpk path (or index path with --bundled)
    #[arg(index = 1)]
    input: String,

    /// Path of the file inside the archive
    #[arg(index = 2)]
    file: String,

    /// Output file. Defaults to stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Treat the input as a bundle index and open this GGPK file inside it
    #[arg(short, long)]
    bundled: Option<String>,
}

#[derive(Parser, Debug)]
struct ActionUnpack {
    /// Input .ggpk path (or index path with --bundled)
    #[arg(index = 1)]
    input: String,

    /// Output directory
    #[arg(index = 2)]
    output: String,

    /// Treat the input as a bundle index and open this GGPK file inside it
    #[arg(short, long)]
    bundled: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print archive info
    Info(ActionInfo),
    /// List archive contents
    List(ActionList),
    /// Write one file to stdout or a path
    Get(ActionGet),
    /// Extract the whole archive into a directory
    Unpack(ActionUnpack),
}

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let result = match args.action {
        Action::Info(action) => info(action),
        Action::List(action) => list(action),
        Action::Get(action) => get(action),
        Action::Unpack(action) => unpack(action),
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn info(args: ActionInfo) -> Result<(), ggpk::Error> {
    match args.bundled {
        Some(inner) => print_info(&mut open_bundled(&args.input, &inner)?),
        None => print_info(&mut Ggpk::open(&args.input)?),
    }
}

fn list(args: ActionList) -> Result<(), ggpk::Error> {
    match args.bundled {
        Some(inner) => print_tree(&mut open_bundled(&args.input, &inner)?),
        None => print_tree(&mut Ggpk::open(&args.input)?),
    }
}

fn get(args: ActionGet) -> Result<(), ggpk::Error> {
    let data = match args.bundled {
        Some(inner) => read_file(&mut open_bundled(&args.input, &inner)?, &args.file)?,
        None => read_file(&mut Ggpk::open(&args.input)?, &args.file)?,
    };
    match args.output {
        Some(path) => fs::write(path, data)?,
        None => std::io::stdout().write_all(&data)?,
    }
    Ok(())
}

fn unpack(args: ActionUnpack) -> Result<(), ggpk::Error> {
    match args.bundled {
        Some(inner) => unpack_all(&mut open_bundled(&args.input, &inner)?, &args.output),
        None => unpack_all(&mut Ggpk::open(&args.input)?, &args.output),
    }
}

fn open_bundled(
    index_path: &str,
    path_in_bundle: &str,
) -> Result<Ggpk<std::io::Cursor<Vec<u8>>>, ggpk::Error> {
    let mut index = Index::open(index_path)?;
    bundled::open(&mut index, path_in_bundle)
}

fn print_info<R: Read + Seek>(archive: &mut Ggpk<R>) -> Result<(), ggpk::Error> {
    println!("version: {}", archive.version());
    println!("root offset: {:#x}", archive.root_offset());
    println!("free offset: {:#x}", archive.free_offset());
    let mut files = 0u64;
    let mut directories = 0u64;
    let mut stack = vec![archive.root()];
    while let Some(id) = stack.pop() {
        for child in archive.children(id)? {
            if archive.node(child).is_dir() {
                directories += 1;
                stack.push(child);
            } else {
                files += 1;
            }
        }
    }
    println!("{files} files in {directories} directories");
    Ok(())
}

fn print_tree<R: Read + Seek>(archive: &mut Ggpk<R>) -> Result<(), ggpk::Error> {
    println!("/");
    let mut stack = vec![archive.root()];
    while let Some(id) = stack.pop() {
        for child in archive.children(id)? {
            println!("{}", archive.path(child));
            if archive.node(child).is_dir() {
                stack.push(child);
            }
        }
    }
    Ok(())
}

fn read_file<R: Read + Seek>(archive: &mut Ggpk<R>, path: &str) -> Result<Vec<u8>, ggpk::Error> {
    let node = archive.get_node_by_path(path)?;
    archive.read_file_data(node)
}

fn unpack_all<R: Read + Seek>(archive: &mut Ggpk<R>, output: &str) -> Result<(), ggpk::Error> {
    let output = Path::new(output);
    let mut stack = vec![archive.root()];
    while let Some(id) = stack.pop() {
        for child in archive.children(id)? {
            if archive.node(child).is_dir() {
                stack.push(child);
                continue;
            }
            let path = archive.path(child);
            let out: PathBuf = output.join(&path);
            if let Some(dir) = out.parent() {
                fs::create_dir_all(dir)?;
            }
            // keep going past individual unreadable entries
            match archive.read_file_data(child) {
                Ok(data) => fs::write(&out, data)?,
                Err(err) => warn!("skipping {path}: {err}"),
            }
        }
    }
    Ok(())
}
