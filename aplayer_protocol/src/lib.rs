//! Logical command/response protocol between the APlayer client and the
//! module server, plus the static add-on descriptor types.
//!
//! Every exchange is one command line out, one response line back. Commands
//! are encoded as `"Name=arg1,arg2,..."`. A response starting with `ERR=`
//! carries `"ERR=<number>,<message>"`; anything else is the success payload.

use serde::{Deserialize, Serialize};

mod addon_info;

pub use addon_info::{AddOnCategory, AddOnInfo, AddOnSupport};

/// Sentinel prefix marking a failed protocol call.
pub const ERR_PREFIX: &str = "ERR=";

/// Sentinel meaning "leave this mixer field unchanged" / "value unavailable".
pub const UNCHANGED: i32 = -1;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error("server error {}: {}", .0.number, .0.message)]
    Server(ServerError),
    #[error("bad payload: expected {expected}, got {got:?}")]
    BadPayload {
        expected: &'static str,
        got: String,
    },
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
    #[error("command {0} is missing an argument")]
    MissingArgument(String),
}

/// Error payload of an `ERR=` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub number: i32,
    pub message: String,
}

/// Mixer parameters applied to a loaded module. Any field set to
/// [`UNCHANGED`] is passed through without altering the server-side value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerSettings {
    pub frequency: i32,
    pub interpolation: i32,
    pub dolby_prologic: i32,
    pub stereo_separation: i32,
    pub amiga_filter: i32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            frequency: UNCHANGED,
            interpolation: UNCHANGED,
            dolby_prologic: UNCHANGED,
            stereo_separation: UNCHANGED,
            amiga_filter: UNCHANGED,
        }
    }
}

/// One protocol command. [`Command::encode`] produces the wire line;
/// [`Command::parse`] is the server-side inverse (used by the mock server
/// and by tests).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddFile { path: String },
    RemoveFile { handle: i32 },
    LoadFile { handle: i32, change_type: bool },
    UnloadFile { handle: i32 },
    InitPlayer { handle: i32 },
    EndPlayer { handle: i32 },
    StartPlayer { handle: i32, sub_song: i16, start_pos: i16 },
    StopPlayer { handle: i32 },
    PausePlayer { handle: i32 },
    ResumePlayer { handle: i32 },
    HoldPlaying { handle: i32, hold: bool },
    SetPosition { handle: i32, position: i16 },
    SetVolume { handle: i32, volume: u16 },
    SetMixerSettings { handle: i32, mixer: MixerSettings },
    SetOutputAgent { handle: i32, agent: String },
    ChangeChannels { handle: i32, enabled: bool, start: u16, stop: u16 },
    GetSongLength { handle: i32 },
    GetSongPosition { handle: i32 },
    GetCurrentSong { handle: i32 },
    GetMaxSongNumber { handle: i32 },
    GetModuleChannels { handle: i32 },
    GetModuleSize { handle: i32 },
    GetModuleName { handle: i32 },
    GetAuthor { handle: i32 },
    GetModuleFormat { handle: i32 },
    GetPlayerName { handle: i32 },
    GetTotalTime { handle: i32 },
    GetTimeList { handle: i32 },
    GetModuleInformation { handle: i32 },
    CanChangePosition { handle: i32 },
}

impl Command {
    /// Wire name of this command (the part before `=`).
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddFile { .. } => "AddFile",
            Command::RemoveFile { .. } => "RemoveFile",
            Command::LoadFile { .. } => "LoadFile",
            Command::UnloadFile { .. } => "UnloadFile",
            Command::InitPlayer { .. } => "InitPlayer",
            Command::EndPlayer { .. } => "EndPlayer",
            Command::StartPlayer { .. } => "StartPlayer",
            Command::StopPlayer { .. } => "StopPlayer",
            Command::PausePlayer { .. } => "PausePlayer",
            Command::ResumePlayer { .. } => "ResumePlayer",
            Command::HoldPlaying { .. } => "HoldPlaying",
            Command::SetPosition { .. } => "SetPosition",
            Command::SetVolume { .. } => "SetVolume",
            Command::SetMixerSettings { .. } => "SetMixerSettings",
            Command::SetOutputAgent { .. } => "SetOutputAgent",
            Command::ChangeChannels { .. } => "ChangeChannels",
            Command::GetSongLength { .. } => "GetSongLength",
            Command::GetSongPosition { .. } => "GetSongPosition",
            Command::GetCurrentSong { .. } => "GetCurrentSong",
            Command::GetMaxSongNumber { .. } => "GetMaxSongNumber",
            Command::GetModuleChannels { .. } => "GetModuleChannels",
            Command::GetModuleSize { .. } => "GetModuleSize",
            Command::GetModuleName { .. } => "GetModuleName",
            Command::GetAuthor { .. } => "GetAuthor",
            Command::GetModuleFormat { .. } => "GetModuleFormat",
            Command::GetPlayerName { .. } => "GetPlayerName",
            Command::GetTotalTime { .. } => "GetTotalTime",
            Command::GetTimeList { .. } => "GetTimeList",
            Command::GetModuleInformation { .. } => "GetModuleInformation",
            Command::CanChangePosition { .. } => "CanChangePosition",
        }
    }

    /// File handle this command addresses, if any (`AddFile` has none yet).
    pub fn handle(&self) -> Option<i32> {
        match *self {
            Command::AddFile { .. } => None,
            Command::RemoveFile { handle }
            | Command::LoadFile { handle, .. }
            | Command::UnloadFile { handle }
            | Command::InitPlayer { handle }
            | Command::EndPlayer { handle }
            | Command::StartPlayer { handle, .. }
            | Command::StopPlayer { handle }
            | Command::PausePlayer { handle }
            | Command::ResumePlayer { handle }
            | Command::HoldPlaying { handle, .. }
            | Command::SetPosition { handle, .. }
            | Command::SetVolume { handle, .. }
            | Command::SetMixerSettings { handle, .. }
            | Command::SetOutputAgent { handle, .. }
            | Command::ChangeChannels { handle, .. }
            | Command::GetSongLength { handle }
            | Command::GetSongPosition { handle }
            | Command::GetCurrentSong { handle }
            | Command::GetMaxSongNumber { handle }
            | Command::GetModuleChannels { handle }
            | Command::GetModuleSize { handle }
            | Command::GetModuleName { handle }
            | Command::GetAuthor { handle }
            | Command::GetModuleFormat { handle }
            | Command::GetPlayerName { handle }
            | Command::GetTotalTime { handle }
            | Command::GetTimeList { handle }
            | Command::GetModuleInformation { handle }
            | Command::CanChangePosition { handle } => Some(handle),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Command::AddFile { path } => format!("AddFile={path}"),
            Command::LoadFile {
                handle,
                change_type,
            } => format!("LoadFile={handle},{}", bool_arg(*change_type)),
            Command::StartPlayer {
                handle,
                sub_song,
                start_pos,
            } => format!("StartPlayer={handle},{sub_song},{start_pos}"),
            Command::HoldPlaying { handle, hold } => {
                format!("HoldPlaying={handle},{}", bool_arg(*hold))
            }
            Command::SetPosition { handle, position } => {
                format!("SetPosition={handle},{position}")
            }
            Command::SetVolume { handle, volume } => format!("SetVolume={handle},{volume}"),
            Command::SetMixerSettings { handle, mixer } => format!(
                "SetMixerSettings={handle},{},{},{},{},{}",
                mixer.frequency,
                mixer.interpolation,
                mixer.dolby_prologic,
                mixer.stereo_separation,
                mixer.amiga_filter
            ),
            Command::SetOutputAgent { handle, agent } => {
                format!("SetOutputAgent={handle},{agent}")
            }
            Command::ChangeChannels {
                handle,
                enabled,
                start,
                stop,
            } => format!(
                "ChangeChannels={handle},{},{start},{stop}",
                bool_arg(*enabled)
            ),
            // Everything else is "Name=handle".
            other => format!(
                "{}={}",
                other.name(),
                other.handle().unwrap_or(UNCHANGED)
            ),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (name, rest) = line
            .split_once('=')
            .ok_or_else(|| ProtocolError::UnknownCommand(line.to_string()))?;

        // AddFile and SetOutputAgent take a free-form trailing argument.
        if name == "AddFile" {
            if rest.is_empty() {
                return Err(ProtocolError::MissingArgument("AddFile".to_string()));
            }
            return Ok(Command::AddFile {
                path: rest.to_string(),
            });
        }

        let mut args = rest.split(',');
        let handle = parse_arg::<i32>(args.next(), name)?;

        let cmd = match name {
            "RemoveFile" => Command::RemoveFile { handle },
            "LoadFile" => Command::LoadFile {
                handle,
                change_type: parse_arg::<i32>(args.next(), name)? != 0,
            },
            "UnloadFile" => Command::UnloadFile { handle },
            "InitPlayer" => Command::InitPlayer { handle },
            "EndPlayer" => Command::EndPlayer { handle },
            "StartPlayer" => Command::StartPlayer {
                handle,
                sub_song: parse_arg(args.next(), name)?,
                start_pos: parse_arg(args.next(), name)?,
            },
            "StopPlayer" => Command::StopPlayer { handle },
            "PausePlayer" => Command::PausePlayer { handle },
            "ResumePlayer" => Command::ResumePlayer { handle },
            "HoldPlaying" => Command::HoldPlaying {
                handle,
                hold: parse_arg::<i32>(args.next(), name)? != 0,
            },
            "SetPosition" => Command::SetPosition {
                handle,
                position: parse_arg(args.next(), name)?,
            },
            "SetVolume" => Command::SetVolume {
                handle,
                volume: parse_arg(args.next(), name)?,
            },
            "SetMixerSettings" => Command::SetMixerSettings {
                handle,
                mixer: MixerSettings {
                    frequency: parse_arg(args.next(), name)?,
                    interpolation: parse_arg(args.next(), name)?,
                    dolby_prologic: parse_arg(args.next(), name)?,
                    stereo_separation: parse_arg(args.next(), name)?,
                    amiga_filter: parse_arg(args.next(), name)?,
                },
            },
            "SetOutputAgent" => Command::SetOutputAgent {
                handle,
                agent: args.collect::<Vec<_>>().join(","),
            },
            "ChangeChannels" => Command::ChangeChannels {
                handle,
                enabled: parse_arg::<i32>(args.next(), name)? != 0,
                start: parse_arg(args.next(), name)?,
                stop: parse_arg(args.next(), name)?,
            },
            "GetSongLength" => Command::GetSongLength { handle },
            "GetSongPosition" => Command::GetSongPosition { handle },
            "GetCurrentSong" => Command::GetCurrentSong { handle },
            "GetMaxSongNumber" => Command::GetMaxSongNumber { handle },
            "GetModuleChannels" => Command::GetModuleChannels { handle },
            "GetModuleSize" => Command::GetModuleSize { handle },
            "GetModuleName" => Command::GetModuleName { handle },
            "GetAuthor" => Command::GetAuthor { handle },
            "GetModuleFormat" => Command::GetModuleFormat { handle },
            "GetPlayerName" => Command::GetPlayerName { handle },
            "GetTotalTime" => Command::GetTotalTime { handle },
            "GetTimeList" => Command::GetTimeList { handle },
            "GetModuleInformation" => Command::GetModuleInformation { handle },
            "CanChangePosition" => Command::CanChangePosition { handle },
            _ => return Err(ProtocolError::UnknownCommand(name.to_string())),
        };
        Ok(cmd)
    }
}

fn bool_arg(v: bool) -> i32 {
    if v {
        1
    } else {
        0
    }
}

fn parse_arg<T: std::str::FromStr>(arg: Option<&str>, cmd: &str) -> Result<T, ProtocolError> {
    let arg = arg.ok_or_else(|| ProtocolError::MissingArgument(cmd.to_string()))?;
    arg.trim()
        .parse()
        .map_err(|_| ProtocolError::BadPayload {
            expected: "numeric argument",
            got: arg.to_string(),
        })
}

/// Split a raw response line into success payload or [`ServerError`].
///
/// A malformed `ERR=` payload (no comma) still counts as a failure; it maps
/// to error number 0 with the remainder as the message.
pub fn parse_response(line: &str) -> Result<&str, ServerError> {
    let Some(err) = line.strip_prefix(ERR_PREFIX) else {
        return Ok(line);
    };
    match err.split_once(',') {
        Some((num, msg)) => Err(ServerError {
            number: num.trim().parse().unwrap_or(0),
            message: msg.to_string(),
        }),
        None => Err(ServerError {
            number: 0,
            message: err.to_string(),
        }),
    }
}

/// Format a [`ServerError`] back into its wire form.
pub fn encode_error(number: i32, message: &str) -> String {
    format!("{ERR_PREFIX}{number},{message}")
}

pub fn parse_i64(payload: &str) -> Result<i64, ProtocolError> {
    payload
        .trim()
        .parse()
        .map_err(|_| ProtocolError::BadPayload {
            expected: "64-bit integer",
            got: payload.to_string(),
        })
}

pub fn parse_i32(payload: &str) -> Result<i32, ProtocolError> {
    payload
        .trim()
        .parse()
        .map_err(|_| ProtocolError::BadPayload {
            expected: "32-bit integer",
            got: payload.to_string(),
        })
}

pub fn parse_i16(payload: &str) -> Result<i16, ProtocolError> {
    payload
        .trim()
        .parse()
        .map_err(|_| ProtocolError::BadPayload {
            expected: "16-bit integer",
            got: payload.to_string(),
        })
}

/// Boolean-as-number payload (`CanChangePosition` and friends).
pub fn parse_bool(payload: &str) -> Result<bool, ProtocolError> {
    Ok(parse_i32(payload)? != 0)
}

/// Comma-separated 64-bit millisecond values (`GetTimeList`).
pub fn parse_time_list(payload: &str) -> Result<Vec<i64>, ProtocolError> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }
    payload.split(',').map(parse_i64).collect()
}

/// Newline-separated `"description\tvalue"` records (`GetModuleInformation`).
/// Records without a tab are dropped rather than treated as errors.
pub fn parse_info_lines(payload: &str) -> Vec<(String, String)> {
    payload
        .lines()
        .filter_map(|line| {
            line.split_once('\t')
                .map(|(d, v)| (d.to_string(), v.to_string()))
        })
        .collect()
}
