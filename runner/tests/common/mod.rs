//! A minimal stand-in for the network store, speaking just enough HTTP for a blocking client.

use std::{
    collections::BTreeMap,
    fs,
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    path::Path,
    sync::Arc,
    thread,
};

use parking_lot::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct State {
    pub requests: Vec<String>,
    pub columns: Vec<String>,
    pub rows: BTreeMap<i64, String>,
    // refuse the nth request (1-based) whose path starts with the prefix
    pub fail: Option<(String, usize)>,
    seen: BTreeMap<String, usize>,
}

impl State {
    pub fn count(&self, prefix: &str) -> usize {
        self.requests.iter().filter(|r| r.starts_with(prefix)).count()
    }

    fn should_fail(&mut self, path: &str) -> bool {
        let Some((prefix, nth)) = self.fail.clone() else {
            return false;
        };
        if !path.starts_with(&prefix) {
            return false;
        }

        let seen = self.seen.entry(prefix).or_default();
        *seen += 1;
        *seen == nth
    }

    fn insert(&mut self, command: &str) -> u16 {
        let Some((fields, timestamp)) = command
            .trim_end_matches("::HIDE")
            .rsplit_once("::TIMESTAMP=")
        else {
            return 400;
        };
        let Ok(mut key) = timestamp.parse::<i64>() else {
            return 400;
        };

        let pairs = fields
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect::<Vec<_>>();
        if self.columns.is_empty() {
            self.columns = pairs.iter().map(|(c, _)| c.to_string()).collect();
        }

        // colliding keys move to the next free millisecond
        while self.rows.contains_key(&key) {
            key += 1;
        }
        let values = pairs.iter().map(|(_, v)| *v).collect::<Vec<_>>().join(",");
        self.rows.insert(key, values);

        200
    }

    fn respond(&mut self, path: &str, data_dir: &Path, dump_file: &str) -> u16 {
        self.requests.push(path.to_owned());

        if self.should_fail(path) {
            return 500;
        }

        if path.starts_with("LOAD::") {
            self.rows.clear();
            self.columns.clear();
            200
        } else if let Some(command) = path.strip_prefix("INSERT::") {
            self.insert(command)
        } else if path.starts_with("LIST::") {
            200
        } else if let Some(key) = path
            .strip_prefix("REMOVE::ONE::TIMESTAMP=")
            .and_then(|rest| rest.strip_suffix("::HIDE"))
        {
            match key.parse::<i64>() {
                Ok(key) => {
                    self.rows.remove(&key);
                    200
                }
                Err(_) => 400,
            }
        } else if path == "SAVE::CSV" {
            let mut text = format!("timestamp,{}\n", self.columns.join(","));
            for (key, values) in self.rows.iter() {
                text.push_str(&format!("{key},{values}\n"));
            }
            fs::write(data_dir.join(dump_file), text).map_or(500, |_| 200)
        } else if let Some(name) = path.strip_prefix("SAVE::") {
            fs::write(data_dir.join(format!("{name}.r2d2")), vec![7u8; self.rows.len() * 16])
                .map_or(500, |_| 200)
        } else {
            404
        }
    }
}

pub struct FakeStore {
    pub base_url: String,
    state: Arc<Mutex<State>>,
}

fn serve(mut stream: TcpStream, state: &Mutex<State>, data_dir: &Path, dump_file: &str) {
    let Ok(clone) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(clone);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).unwrap_or(0) == 0 || header == "\r\n" {
            break;
        }
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .trim_start_matches('/')
        .to_owned();
    let status = state.lock().respond(&path, data_dir, dump_file);
    let body = if status == 200 { "OK" } else { "ERR" };

    let _ = write!(
        stream,
        "HTTP/1.1 {status} {body}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.flush();
}

impl FakeStore {
    pub fn spawn(data_dir: &Path, dump_file: &str, fail: Option<(&str, usize)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let state = Arc::new(Mutex::new(State {
            fail: fail.map(|(prefix, nth)| (prefix.to_owned(), nth)),
            ..State::default()
        }));

        let shared = state.clone();
        let dir = data_dir.to_owned();
        let dump = dump_file.to_owned();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                serve(stream, &shared, &dir, &dump);
            }
        });

        Self {
            base_url: format!("http://{address}"),
            state,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }
}
