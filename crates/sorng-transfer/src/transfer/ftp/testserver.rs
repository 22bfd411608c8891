//! In-process FTP server for unit tests. Keeps files in memory and speaks
//! just enough RFC 959 / 3659 for the session code.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct FakeFtpOptions {
    pub mlsd: bool,
    pub epsv: bool,
    pub rest_stream: bool,
    pub password: String,
}

impl Default for FakeFtpOptions {
    fn default() -> Self {
        Self {
            mlsd: true,
            epsv: true,
            rest_stream: true,
            password: "secret".into(),
        }
    }
}

#[derive(Default)]
struct Fs {
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
    commands: usize,
}

pub struct FakeFtp {
    port: u16,
    fs: Arc<Mutex<Fs>>,
}

impl FakeFtp {
    pub async fn start(opts: FakeFtpOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let fs = Arc::new(Mutex::new(Fs::default()));
        fs.lock().unwrap().dirs.insert("/".into());

        let shared = fs.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone(), opts.clone()));
            }
        });
        Self { port, fs }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.fs.lock().unwrap().files.get(path).cloned()
    }

    pub fn put(&self, path: &str, data: Vec<u8>) {
        self.fs.lock().unwrap().files.insert(path.into(), data);
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.fs.lock().unwrap().dirs.contains(path)
    }

    pub fn command_count(&self) -> usize {
        self.fs.lock().unwrap().commands
    }

    pub async fn wait_for_len(&self, path: &str, len: usize) {
        for _ in 0..200 {
            if self.file(path).map(|f| f.len()) == Some(len) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reached {} bytes", path, len);
    }
}

fn resolve(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), arg)
    };
    let parts: Vec<&str> = joined.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".into(),
        Some(i) => path[..i].into(),
    }
}

async fn reply(wr: &mut OwnedWriteHalf, text: &str) {
    let _ = wr.write_all(format!("{}\r\n", text).as_bytes()).await;
}

async fn accept(passive: &mut Option<TcpListener>) -> Option<TcpStream> {
    let listener = passive.take()?;
    listener.accept().await.ok().map(|(s, _)| s)
}

async fn serve(stream: TcpStream, fs: Arc<Mutex<Fs>>, opts: FakeFtpOptions) {
    let (rd, mut wr) = stream.into_split();
    let mut lines = BufReader::new(rd).lines();
    let mut passive: Option<TcpListener> = None;
    let mut rest = 0usize;
    let mut cwd = "/".to_string();

    reply(&mut wr, "220 fake ftp ready").await;

    while let Ok(Some(line)) = lines.next_line().await {
        fs.lock().unwrap().commands += 1;
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        // A restart marker only applies to the command right after it.
        if verb != "REST" && verb != "RETR" {
            rest = 0;
        }

        match verb.as_str() {
            "USER" => reply(&mut wr, "331 Password required").await,
            "PASS" if arg == opts.password => reply(&mut wr, "230 Logged in").await,
            "PASS" => reply(&mut wr, "530 Login incorrect").await,
            "FEAT" => {
                let mut feat = String::from("211-Features:\r\n SIZE\r\n MDTM\r\n");
                if opts.rest_stream {
                    feat.push_str(" REST STREAM\r\n");
                }
                if opts.mlsd {
                    feat.push_str(" MLST type*;size*;modify*;\r\n");
                }
                if opts.epsv {
                    feat.push_str(" EPSV\r\n");
                }
                feat.push_str("211 End");
                reply(&mut wr, &feat).await;
            }
            "TYPE" | "OPTS" => reply(&mut wr, "200 OK").await,
            "PWD" => reply(&mut wr, &format!("257 \"{}\" is current directory", cwd)).await,
            "CWD" => {
                let target = resolve(&cwd, &arg);
                if fs.lock().unwrap().dirs.contains(&target) {
                    cwd = target;
                    reply(&mut wr, "250 OK").await;
                } else {
                    reply(&mut wr, "550 No such directory").await;
                }
            }
            "MKD" => {
                let target = resolve(&cwd, &arg);
                let ok = {
                    let mut guard = fs.lock().unwrap();
                    let ok = !guard.dirs.contains(&target) && guard.dirs.contains(&parent(&target));
                    if ok {
                        guard.dirs.insert(target.clone());
                    }
                    ok
                };
                if ok {
                    reply(&mut wr, &format!("257 \"{}\" created", target)).await;
                } else {
                    reply(&mut wr, "550 Cannot create").await;
                }
            }
            "EPSV" | "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();
                passive = Some(listener);
                if verb == "EPSV" {
                    reply(&mut wr, &format!("229 Entering Extended Passive Mode (|||{}|)", port)).await;
                } else {
                    reply(
                        &mut wr,
                        &format!("227 Entering Passive Mode (127,0,0,1,{},{})", port / 256, port % 256),
                    )
                    .await;
                }
            }
            "SIZE" => {
                let size = fs.lock().unwrap().files.get(&resolve(&cwd, &arg)).map(|f| f.len());
                match size {
                    Some(n) => reply(&mut wr, &format!("213 {}", n)).await,
                    None => reply(&mut wr, "550 No such file").await,
                }
            }
            "MDTM" => reply(&mut wr, "213 20250102030405").await,
            "REST" => {
                rest = arg.parse().unwrap_or(0);
                reply(&mut wr, &format!("350 Restarting at {}", rest)).await;
            }
            "STOR" | "APPE" => {
                let Some(mut data) = accept(&mut passive).await else {
                    reply(&mut wr, "425 No data connection").await;
                    continue;
                };
                reply(&mut wr, "150 Opening data connection").await;
                let mut buf = Vec::new();
                let _ = data.read_to_end(&mut buf).await;
                let path = resolve(&cwd, &arg);
                {
                    let mut guard = fs.lock().unwrap();
                    let file = guard.files.entry(path).or_default();
                    if verb == "STOR" {
                        file.clear();
                    }
                    file.extend_from_slice(&buf);
                }
                reply(&mut wr, "226 Transfer complete").await;
            }
            "RETR" => {
                let content = fs.lock().unwrap().files.get(&resolve(&cwd, &arg)).cloned();
                let Some(content) = content else {
                    passive = None;
                    reply(&mut wr, "550 No such file").await;
                    continue;
                };
                let Some(mut data) = accept(&mut passive).await else {
                    reply(&mut wr, "425 No data connection").await;
                    continue;
                };
                reply(&mut wr, "150 Opening data connection").await;
                let start = rest.min(content.len());
                rest = 0;
                let sent = data.write_all(&content[start..]).await;
                drop(data);
                match sent {
                    Ok(()) => reply(&mut wr, "226 Transfer complete").await,
                    Err(_) => reply(&mut wr, "426 Connection closed; transfer aborted").await,
                }
            }
            "LIST" | "MLSD" => {
                let dir = resolve(&cwd, &arg);
                let listing = {
                    let guard = fs.lock().unwrap();
                    let mut out = String::new();
                    for (path, content) in &guard.files {
                        if parent(path) != dir {
                            continue;
                        }
                        let name = &path[path.rfind('/').map(|i| i + 1).unwrap_or(0)..];
                        if verb == "MLSD" {
                            out.push_str(&format!(
                                "type=file;size={};modify=20250102030405; {}\r\n",
                                content.len(),
                                name
                            ));
                        } else {
                            out.push_str(&format!(
                                "-rw-r--r--   1 demo demo {} Jan  2  2025 {}\r\n",
                                content.len(),
                                name
                            ));
                        }
                    }
                    out
                };
                let Some(mut data) = accept(&mut passive).await else {
                    reply(&mut wr, "425 No data connection").await;
                    continue;
                };
                reply(&mut wr, "150 Here comes the listing").await;
                let _ = data.write_all(listing.as_bytes()).await;
                drop(data);
                reply(&mut wr, "226 Directory send OK").await;
            }
            "DELE" => {
                let removed = fs.lock().unwrap().files.remove(&resolve(&cwd, &arg)).is_some();
                if removed {
                    reply(&mut wr, "250 Deleted").await;
                } else {
                    reply(&mut wr, "550 No such file").await;
                }
            }
            "QUIT" => {
                reply(&mut wr, "221 Bye").await;
                break;
            }
            _ => reply(&mut wr, "502 Command not implemented").await,
        }
    }
}
