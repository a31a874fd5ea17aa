#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};

use serde_json::{json, Value};

/// Stand-in for the PyMOL socket plugin: answers one connection with canned replies.
pub struct FakePymol {
    pub port: u16,
    handle: Option<JoinHandle<Vec<String>>>,
}

impl FakePymol {
    /// Reply to each request in order with the given JSON values, then hang up.
    pub fn serve(replies: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        let port = listener.local_addr().expect("No local addr").port();

        let handle = thread::spawn(move || {
            let mut received = Vec::new();
            let Ok((stream, _)) = listener.accept() else {
                return received;
            };
            let mut writer = stream.try_clone().expect("Failed to clone stream");
            let mut reader = BufReader::new(stream);

            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let request: Value = serde_json::from_str(&line).expect("Request is not JSON");
                received.push(request["code"].as_str().unwrap_or_default().to_string());

                let frame = format!("{reply}\n");
                if writer.write_all(frame.as_bytes()).is_err() {
                    break;
                }
            }
            received
        });

        Self {
            port,
            handle: Some(handle),
        }
    }

    pub fn success(output: &str) -> Value {
        json!({ "status": "success", "output": output })
    }

    pub fn failure(error: &str) -> Value {
        json!({ "status": "error", "error": error })
    }

    /// Code strings the server received.
    pub fn received(mut self) -> Vec<String> {
        self.handle
            .take()
            .map(|h| h.join().expect("Server thread panicked"))
            .unwrap_or_default()
    }
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    listener.local_addr().expect("No local addr").port()
}

/// Run the binary with an isolated home directory and an empty PATH.
pub fn molbridge(home: &Path, port: u16, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_molbridge"))
        .args(args)
        .env("MOLBRIDGE_HOME", home)
        .env("HOME", home)
        .env_remove("XDG_CACHE_HOME")
        .env("MOLBRIDGE_HOST", "127.0.0.1")
        .env("MOLBRIDGE_PORT", port.to_string())
        .env("PATH", home.join("bin"))
        .env_remove("MOLBRIDGE_PYMOL")
        .env_remove("MOLBRIDGE_TIMEOUT")
        .env_remove("MOLBRIDGE_LAUNCH_TIMEOUT")
        .env_remove("RUST_LOG")
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn molbridge");

    if let Some(input) = stdin {
        let mut pipe = child.stdin.take().expect("stdin not piped");
        pipe.write_all(input.as_bytes()).expect("Failed to write stdin");
    }

    child.wait_with_output().expect("Failed to wait for molbridge")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
