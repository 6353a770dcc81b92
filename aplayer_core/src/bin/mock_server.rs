//! Stand-in module server speaking the line protocol.
//!
//! Hosts an in-memory fake module universe so the client core can be
//! exercised end to end without a real server: handles are booked per
//! `AddFile`, state transitions are checked, and module facts are derived
//! deterministically from the file path. Failure injection by path
//! substring: "missing" fails `AddFile`, "badload" fails `LoadFile`,
//! "broken" fails `InitPlayer`.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use aplayer_core::transport::escape_payload;
use aplayer_protocol::{encode_error, Command, MixerSettings, UNCHANGED};
use tracing::{debug, info, warn};

const DEFAULT_ADDR: &str = "127.0.0.1:0";

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileState {
    Added,
    Loaded,
    Initialized,
    Playing,
}

#[derive(Debug)]
struct ServerFile {
    path: String,
    state: FileState,
    mixer: MixerSettings,
    output_agent: String,
    current_song: i16,
    position: i16,
    volume: u16,
    held: bool,
}

#[derive(Default)]
struct ServerEngine {
    next_handle: i32,
    files: HashMap<i32, ServerFile>,
}

impl ServerEngine {
    fn handle_line(&mut self, line: &str) -> String {
        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(err) => return encode_error(100, &err.to_string()),
        };
        match self.apply(cmd) {
            Ok(payload) => payload,
            Err((number, message)) => encode_error(number, &message),
        }
    }

    fn apply(&mut self, cmd: Command) -> Result<String, (i32, String)> {
        if let Command::AddFile { path } = &cmd {
            if path.contains("missing") {
                return Err((10, format!("file not found: {path}")));
            }
            self.next_handle += 1;
            self.files.insert(
                self.next_handle,
                ServerFile {
                    path: path.clone(),
                    state: FileState::Added,
                    // Server-side defaults a fresh session starts from.
                    mixer: MixerSettings {
                        frequency: 44_100,
                        interpolation: 0,
                        dolby_prologic: 0,
                        stereo_separation: 100,
                        amiga_filter: 0,
                    },
                    output_agent: "MediaKit".to_string(),
                    current_song: 0,
                    position: 0,
                    volume: 256,
                    held: false,
                },
            );
            return Ok(self.next_handle.to_string());
        }

        let handle = cmd.handle().unwrap_or(UNCHANGED);
        let file = self
            .files
            .get_mut(&handle)
            .ok_or((1, format!("unknown handle {handle}")))?;
        let facts = ModuleFacts::for_path(&file.path);

        match cmd {
            Command::AddFile { .. } => unreachable!("handled above"),
            Command::RemoveFile { .. } => {
                if file.state != FileState::Added {
                    return Err((2, "file still loaded".to_string()));
                }
                self.files.remove(&handle);
                Ok(String::new())
            }
            Command::LoadFile { .. } => {
                expect_state(file, FileState::Added)?;
                if file.path.contains("badload") {
                    return Err((11, "unknown module format".to_string()));
                }
                file.state = FileState::Loaded;
                Ok(String::new())
            }
            Command::UnloadFile { .. } => {
                expect_state(file, FileState::Loaded)?;
                file.state = FileState::Added;
                Ok(String::new())
            }
            Command::InitPlayer { .. } => {
                expect_state(file, FileState::Loaded)?;
                if file.path.contains("broken") {
                    return Err((12, "player initialization failed".to_string()));
                }
                file.state = FileState::Initialized;
                Ok(String::new())
            }
            Command::EndPlayer { .. } => {
                expect_state(file, FileState::Initialized)?;
                file.state = FileState::Loaded;
                Ok(String::new())
            }
            Command::StartPlayer { sub_song, start_pos, .. } => {
                expect_state(file, FileState::Initialized)?;
                file.current_song = if sub_song < 0 {
                    facts.default_song
                } else {
                    sub_song
                };
                file.position = start_pos.max(0);
                file.state = FileState::Playing;
                Ok(String::new())
            }
            Command::StopPlayer { .. } => {
                expect_state(file, FileState::Playing)?;
                file.state = FileState::Initialized;
                Ok(String::new())
            }
            Command::PausePlayer { .. } | Command::ResumePlayer { .. } => {
                expect_state(file, FileState::Playing)?;
                Ok(String::new())
            }
            Command::HoldPlaying { hold, .. } => {
                file.held = hold;
                Ok(String::new())
            }
            Command::SetPosition { position, .. } => {
                file.position = position;
                Ok(String::new())
            }
            Command::SetVolume { volume, .. } => {
                file.volume = volume;
                Ok(String::new())
            }
            Command::SetMixerSettings { mixer, .. } => {
                // -1 fields pass through without touching the stored value.
                if mixer.frequency != UNCHANGED {
                    file.mixer.frequency = mixer.frequency;
                }
                if mixer.interpolation != UNCHANGED {
                    file.mixer.interpolation = mixer.interpolation;
                }
                if mixer.dolby_prologic != UNCHANGED {
                    file.mixer.dolby_prologic = mixer.dolby_prologic;
                }
                if mixer.stereo_separation != UNCHANGED {
                    file.mixer.stereo_separation = mixer.stereo_separation;
                }
                if mixer.amiga_filter != UNCHANGED {
                    file.mixer.amiga_filter = mixer.amiga_filter;
                }
                Ok(String::new())
            }
            Command::SetOutputAgent { agent, .. } => {
                if !agent.is_empty() {
                    file.output_agent = agent;
                }
                Ok(String::new())
            }
            Command::ChangeChannels { .. } => Ok(String::new()),
            Command::GetSongLength { .. } => Ok(facts.song_length.to_string()),
            Command::GetSongPosition { .. } => Ok(file.position.to_string()),
            Command::GetCurrentSong { .. } => Ok(file.current_song.to_string()),
            Command::GetMaxSongNumber { .. } => Ok(facts.max_song.to_string()),
            Command::GetModuleChannels { .. } => Ok(facts.channels.to_string()),
            Command::GetModuleSize { .. } => Ok(facts.size.to_string()),
            Command::GetModuleName { .. } => Ok(facts.name),
            Command::GetAuthor { .. } => Ok(facts.author),
            Command::GetModuleFormat { .. } => Ok(facts.format),
            Command::GetPlayerName { .. } => Ok(facts.player_name),
            Command::GetTotalTime { .. } => Ok(facts.total_time_ms.to_string()),
            Command::GetTimeList { .. } => Ok(facts
                .position_times()
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(",")),
            Command::GetModuleInformation { .. } => Ok(facts.info_lines()),
            Command::CanChangePosition { .. } => Ok("1".to_string()),
        }
    }
}

fn expect_state(file: &ServerFile, state: FileState) -> Result<(), (i32, String)> {
    if file.state == state {
        Ok(())
    } else {
        Err((2, format!("bad state {:?}, expected {state:?}", file.state)))
    }
}

/// Deterministic module facts derived from the file path, so repeated runs
/// and both client connections see the same universe.
struct ModuleFacts {
    name: String,
    author: String,
    format: String,
    player_name: String,
    channels: u16,
    song_length: i16,
    max_song: i16,
    default_song: i16,
    total_time_ms: i64,
    size: i64,
}

impl ModuleFacts {
    fn for_path(path: &str) -> Self {
        let hash: u32 = path.bytes().fold(17u32, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(b as u32)
        });
        let stem = std::path::Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        Self {
            name: stem,
            author: format!("composer {}", hash % 7),
            format: "ProTracker".to_string(),
            player_name: "MockTracker".to_string(),
            channels: 4 + (hash % 4) as u16,
            song_length: 32 + (hash % 32) as i16,
            max_song: (hash % 3) as i16,
            default_song: 0,
            total_time_ms: (60 + (hash % 180) as i64) * 1000,
            size: 10_000 + (hash % 90_000) as i64,
        }
    }

    fn position_times(&self) -> Vec<i64> {
        let len = self.song_length as i64;
        (0..len).map(|i| i * self.total_time_ms / len).collect()
    }

    fn info_lines(&self) -> String {
        format!(
            "Channels\t{}\nSong length\t{}\nFormat\t{}",
            self.channels, self.song_length, self.format
        )
    }
}

fn serve_client(stream: TcpStream, engine: Arc<Mutex<ServerEngine>>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    let _ = stream.set_nodelay(true);
    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(err) => {
            warn!(%peer, error = %err, "client setup failed");
            return;
        }
    };
    let reader = BufReader::new(stream);

    info!(%peer, "client connected");
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let response = {
            let mut engine = engine.lock().unwrap_or_else(|e| e.into_inner());
            engine.handle_line(line.trim_end())
        };
        debug!(%peer, command = %line, %response, "round-trip");
        let wire = escape_payload(&response);
        if writer
            .write_all(format!("{wire}\n").as_bytes())
            .and_then(|_| writer.flush())
            .is_err()
        {
            break;
        }
    }
    info!(%peer, "client disconnected");
}

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("APLAYER_SERVER_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);

    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(err) => {
            eprintln!("bind failed on {addr}: {err}");
            std::process::exit(1);
        }
    };
    let local = match listener.local_addr() {
        Ok(a) => a,
        Err(err) => {
            eprintln!("listener address unavailable: {err}");
            std::process::exit(1);
        }
    };
    if let Some(path) = &addr_file {
        let _ = fs::write(path, local.to_string());
    }
    println!("mock_server listening on {local}");

    let _ = listener.set_nonblocking(true);
    let engine = Arc::new(Mutex::new(ServerEngine::default()));
    let start = Instant::now();

    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let engine = Arc::clone(&engine);
                thread::spawn(move || serve_client(stream, engine));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(25));
            }
            Err(err) => {
                warn!(error = %err, "accept failed");
                thread::sleep(Duration::from_millis(25));
            }
        }
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }
}
