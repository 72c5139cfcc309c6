//! `spec.md` §8 E1: a client connects and writes `PING`; the forked
//! business process reads the handed-off fd's 4 bytes and writes them to a
//! file, whose contents are asserted afterward.

use connector_core::Connector;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::io::FromRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;
use subprocess::Channel;

fn free_tcp_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

fn business(out_path: String) -> impl FnOnce(Channel) -> i32 {
    move |channel: Channel| -> i32 {
        loop {
            match channel.recv_fd() {
                Ok(fd) if fd >= 0 => {
                    let mut stream = unsafe { UnixStream::from_raw_fd(fd) };
                    let mut buf = [0u8; 4];
                    if stream.read_exact(&mut buf).is_err() {
                        return 1;
                    }
                    if std::fs::write(&out_path, buf).is_err() {
                        return 2;
                    }
                }
                Ok(_) => return 0,
                Err(_) => return 3,
            }
        }
    }
}

#[test]
fn accept_and_hand_off_to_business_process() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.txt");

    let port = free_tcp_port();
    let mut connector = Connector::init(business(out_path.to_string_lossy().into_owned()), "127.0.0.1", port).unwrap();

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.write_all(b"PING").unwrap();

    std::thread::sleep(Duration::from_millis(300));

    connector.close().unwrap();
    if let Some(pid) = connector.child_pid() {
        let _ = nix::sys::wait::waitpid(pid, None);
    }

    let contents = std::fs::read(&out_path).unwrap();
    assert_eq!(contents, b"PING");
}
