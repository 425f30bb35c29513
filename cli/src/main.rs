//! `kestrel` — inspect, extract, and repack resource databases.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use kestrel_resource::{NodeKind, ResourceDatabase, SceneNode};
use kestrel_vfs::{DirectoryProvider, Vfs};

#[derive(Parser)]
#[command(name = "kestrel", version, about = "Resource database tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header and chunk table of a database.
    Info {
        /// Database file.
        db: String,
    },
    /// Print the scene graph as a tree.
    Tree {
        /// Database file.
        db: String,
    },
    /// Write one chunk's payload to a file.
    Extract {
        /// Database file.
        db: String,
        /// Chunk id to extract.
        #[arg(long)]
        id: u32,
        /// Write the GPU payload instead of the CPU payload.
        #[arg(long)]
        gpu: bool,
        /// Output file.
        out: String,
    },
    /// Load a database and save it back out (round-trip).
    Repack {
        /// Database file.
        db: String,
        /// Output file.
        out: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli.command) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Info { db } => {
            let db = load_database(&db)?;
            println!(
                "platform {:?}, container version {}, {} chunk(s)",
                db.platform(),
                db.version(),
                db.chunks().len()
            );
            println!("{:<6} {:<12} {:>10} {:>10} {:>7}  name", "kind", "id", "cpu", "gpu", "relocs");
            for chunk in db.chunks() {
                println!(
                    "{:<6} {:<#12x} {:>10} {:>10} {:>7}  {}",
                    chunk.kind.to_string(),
                    chunk.id,
                    chunk.data.len(),
                    chunk.gpu_data.len(),
                    chunk.relocations.len(),
                    chunk.name,
                );
            }
        }
        Command::Tree { db } => {
            let db = load_database(&db)?;
            match db.root() {
                Some(root) => print_node(&root, 0),
                None => println!("(no scene graph)"),
            }
        }
        Command::Extract { db, id, gpu, out } => {
            let db = load_database(&db)?;
            let chunk = db
                .find_chunk_by_id(id)
                .ok_or_else(|| format!("no chunk with id {id:#x}"))?;
            let payload = if gpu { &chunk.gpu_data } else { &chunk.data };
            write_file(&out, payload)?;
            println!("wrote {} bytes from chunk {} to {}", payload.len(), chunk.kind, out);
        }
        Command::Repack { db, out } => {
            let input = read_file(&db)?;
            let database = ResourceDatabase::from_bytes(&input)?;
            let bytes = database.to_bytes();
            write_file(&out, &bytes)?;
            println!(
                "repacked {} chunk(s): {} bytes in, {} bytes out",
                database.chunks().len(),
                input.len(),
                bytes.len()
            );
        }
    }
    Ok(())
}

/// Mount the file's directory and read it through the VFS.
fn read_file(file: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let (vfs, name) = mount_parent(file)?;
    Ok(vfs.read(&format!("db/{name}"))?)
}

fn write_file(file: &str, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let (vfs, name) = mount_parent(file)?;
    vfs.write(&format!("db/{name}"), data)?;
    Ok(())
}

fn mount_parent(file: &str) -> Result<(Vfs, String), Box<dyn std::error::Error>> {
    let path = Path::new(file);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("not a file path: {file}"))?;
    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => Path::new("."),
    };
    let mut vfs = Vfs::new();
    vfs.mount("db", DirectoryProvider::new(parent));
    Ok((vfs, name.to_owned()))
}

fn load_database(file: &str) -> Result<ResourceDatabase, Box<dyn std::error::Error>> {
    let bytes = read_file(file)?;
    log::debug!("read {} bytes from {file}", bytes.len());
    Ok(ResourceDatabase::from_bytes(&bytes)?)
}

fn print_node(node: &Rc<RefCell<SceneNode>>, depth: usize) {
    let node = node.borrow();
    let label = match node.kind {
        NodeKind::Folder => String::new(),
        NodeKind::Locator => " [locator]".to_owned(),
        NodeKind::Mesh { buffer_chunk } => format!(" [mesh → chunk {buffer_chunk:#x}]"),
        NodeKind::Marker { index } => format!(" [marker {index}]"),
        NodeKind::Unknown { tag, .. } => format!(" [kind {tag:#x}]"),
    };
    println!(
        "{:indent$}{} ({:#010x}){}",
        "",
        if node.name.is_empty() { "<unnamed>" } else { node.name.as_str() },
        node.uid,
        label,
        indent = depth * 2
    );
    for child in node.children() {
        print_node(child, depth + 1);
    }
}
