use clap::Parser;
use libc::c_int;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tinyfs::shell::Shell;
use tinyfs::*;

#[derive(Parser)]
#[command(name = "tinyfs-shell", about = "Interactive shell over a tinyfs disk image")]
struct Cli {
    /// Disk image on the host, created if missing
    image: PathBuf,

    /// Volume size in blocks
    #[arg(long, short, default_value_t = 200)]
    blocks: u64,
}

fn run(cli: Cli) -> FsResult<()> {
    let volume = Arc::new(Volume::open(&cli.image, cli.blocks)?);
    let stdin = io::stdin();
    let mut shell = Shell::new(volume, stdin.lock(), io::stdout());
    shell.run()
}

fn main() {
    if cfg!(debug_assertions) {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("tinyfs-shell: {}", e);
        let code: c_int = e.into();
        std::process::exit(code);
    }
}
