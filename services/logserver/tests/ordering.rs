//! `spec.md` §8 E6: a single thread emits 100 formatted records; the log
//! file contains them in ascending order with no gaps.

use logserver::{Client, Level, LogRecord};
use std::thread;
use std::time::Duration;

#[test]
fn single_thread_records_land_in_order() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let server = logserver::LogServer::start().unwrap();

    for i in 0..100 {
        Client::trace(LogRecord::formatted(file!(), line!(), "single_thread_records_land_in_order", Level::Info, format_args!("R{}", i)));
    }

    // give the writer thread time to drain and fsync every record
    thread::sleep(Duration::from_millis(300));

    let contents = std::fs::read_to_string(server.log_file_path()).unwrap();
    let lines: Vec<&str> = contents.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 100);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.ends_with(&format!("R{}", i)), "line {} was {:?}", i, line);
    }
}
