use clap::Parser;
use logserver::LogServer;
use std::thread;
use std::time::Duration;

/// Runs the out-of-band log server: binds `./log/server.sock`, appends
/// whatever arrives to a timestamped file under `./log/`.
#[derive(Parser)]
#[command(name = "logserver", version, author = "Bush Hammer Industries", about = "Runs the log server.")]
struct Cli {
    /// Directory to run from; the server always writes under `./log`
    /// relative to the current directory.
    #[arg(long)]
    chdir: Option<String>,
}

pub fn main() {
    let cli = Cli::parse();

    if let Some(dir) = &cli.chdir {
        std::env::set_current_dir(dir).expect("chdir to requested directory");
    }

    let server = LogServer::start().expect("log server failed to start");
    println!("logserver: writing to {}", server.log_file_path());

    // The writer thread does the actual work; this thread just keeps the
    // process (and `server`, whose `Drop` unlinks the socket) alive.
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}
