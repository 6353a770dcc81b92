//! Protocol-engine behavior against a recording in-memory server.
//!
//! The mock transport answers like a well-behaved module server, records
//! every wire line, and injects failures by path substring ("badload"
//! fails LoadFile, "broken" fails InitPlayer). The assertions are about
//! the exact call sequences the engine emits and the effects left on the
//! playlist view, the attribute store, and the shared player info.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use aplayer_core::attributes::MemoryAttributeStore;
use aplayer_core::config::{ErrorPolicy, ListEndPolicy, Settings};
use aplayer_core::loader::{Loader, DEFAULT_SUB_SONG};
use aplayer_core::player_info::PlayerInfoState;
use aplayer_core::playlist::{PlaylistView, SimplePlaylist};
use aplayer_core::transport::{ServerTransport, TransportError};
use aplayer_protocol::MixerSettings;

const TOTAL_TIME_MS: i64 = 180_000;

#[derive(Default)]
struct MockState {
    log: Vec<String>,
    next_handle: i32,
    paths: HashMap<i32, String>,
    /// Per-handle sub-song the last StartPlayer selected.
    current_songs: HashMap<i32, i16>,
    /// Per-handle applied mixer values:
    /// [frequency, interpolation, dolby, stereo separation, amiga filter].
    mixers: HashMap<i32, [i32; 5]>,
}

const SERVER_MIXER_DEFAULTS: [i32; 5] = [44_100, 0, 0, 100, 0];

/// Recording stand-in for the module server. Clonable so a test can keep
/// inspecting the log after handing the transport to the loader.
#[derive(Clone, Default)]
struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    fn mixer_of(&self, handle: i32) -> [i32; 5] {
        self.state.lock().unwrap().mixers[&handle]
    }

    fn count_of(&self, name: &str) -> usize {
        let prefix = format!("{name}=");
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|l| l.starts_with(&prefix))
            .count()
    }
}

impl ServerTransport for MockServer {
    fn send_command(&mut self, command: &str) -> Result<String, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(command.to_string());

        let (name, rest) = command.split_once('=').expect("well-formed command");
        let response = match name {
            "AddFile" => {
                state.next_handle += 1;
                let handle = state.next_handle;
                state.paths.insert(handle, rest.to_string());
                state.mixers.insert(handle, SERVER_MIXER_DEFAULTS);
                handle.to_string()
            }
            "SetMixerSettings" => {
                let mut args = rest.split(',').map(|a| a.parse::<i32>().unwrap());
                let handle = args.next().unwrap();
                let mixer = state.mixers.entry(handle).or_insert(SERVER_MIXER_DEFAULTS);
                for slot in mixer.iter_mut() {
                    let value = args.next().unwrap();
                    if value != -1 {
                        *slot = value;
                    }
                }
                String::new()
            }
            "LoadFile" | "InitPlayer" => {
                let handle: i32 = rest.split(',').next().unwrap().parse().unwrap();
                let path = state.paths.get(&handle).cloned().unwrap_or_default();
                let trigger = if name == "LoadFile" { "badload" } else { "broken" };
                if path.contains(trigger) {
                    format!("ERR=12,injected {name} failure")
                } else {
                    String::new()
                }
            }
            "StartPlayer" => {
                let mut args = rest.split(',');
                let handle: i32 = args.next().unwrap().parse().unwrap();
                let sub_song: i16 = args.next().unwrap().parse().unwrap();
                state.current_songs.insert(handle, sub_song.max(0));
                String::new()
            }
            "GetSongLength" => "4".to_string(),
            "GetSongPosition" => "0".to_string(),
            "GetCurrentSong" => {
                let handle: i32 = rest.parse().unwrap();
                state
                    .current_songs
                    .get(&handle)
                    .copied()
                    .unwrap_or(0)
                    .to_string()
            }
            "GetMaxSongNumber" => "0".to_string(),
            "GetModuleChannels" => "8".to_string(),
            "GetTotalTime" => TOTAL_TIME_MS.to_string(),
            "GetTimeList" => "0,45000,90000,135000".to_string(),
            "GetModuleSize" => "42000".to_string(),
            "GetModuleName" => "mock module".to_string(),
            "GetAuthor" => "tester".to_string(),
            "GetModuleFormat" => "ProTracker".to_string(),
            "GetPlayerName" => "MockTracker".to_string(),
            "CanChangePosition" => "1".to_string(),
            "GetModuleInformation" => "Speed\t6\nTempo\t125".to_string(),
            _ => String::new(),
        };
        Ok(response)
    }
}

struct Fixture {
    loader: Loader,
    server: MockServer,
    view: Arc<Mutex<SimplePlaylist>>,
    attributes: Arc<Mutex<MemoryAttributeStore>>,
    info: Arc<PlayerInfoState>,
}

fn fixture(paths: &[&str], settings: Settings) -> Fixture {
    let server = MockServer::default();
    let view = Arc::new(Mutex::new(SimplePlaylist::new(paths.iter().copied())));
    let attributes = Arc::new(Mutex::new(MemoryAttributeStore::new()));
    let info = Arc::new(PlayerInfoState::new());

    let loader = Loader::new(
        Box::new(server.clone()),
        view.clone(),
        attributes.clone(),
        info.clone(),
        settings,
    );
    Fixture {
        loader,
        server,
        view,
        attributes,
        info,
    }
}

fn play_settings() -> Settings {
    Settings {
        output_agent: "MediaKit".to_string(),
        ..Settings::default()
    }
}

#[test]
fn play_issues_exact_call_order() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    let log = fx.server.log();
    assert_eq!(
        &log[..6],
        &[
            "AddFile=/mods/one.mod",
            "LoadFile=1,0",
            "SetMixerSettings=1,-1,-1,-1,-1,-1",
            "SetOutputAgent=1,MediaKit",
            "InitPlayer=1",
            "StartPlayer=1,-1,-1",
        ]
    );
    // The fact queries follow playback start, never precede it.
    assert!(log.iter().any(|l| l == "GetTotalTime=1"));
    assert!(log.iter().any(|l| l == "GetModuleInformation=1"));

    assert_eq!(fx.loader.session_count(), 1);
    let view = fx.view.lock().unwrap();
    assert_eq!(view.playing(), Some(0));
    assert_eq!(view.duration_ms(0), Some(TOTAL_TIME_MS));
    assert!(view.refresh_count() > 0);
}

#[test]
fn play_publishes_module_facts() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    assert!(fx.info.has_info());
    assert!(fx.info.is_playing());
    assert_eq!(fx.info.module_name(), "mock module");
    assert_eq!(fx.info.author(), "tester");
    assert_eq!(fx.info.file_name(), "one.mod");
    assert_eq!(fx.info.module_format(), "ProTracker");
    assert_eq!(fx.info.player_name(), "MockTracker");
    assert_eq!(fx.info.output_agent(), "MediaKit");
    assert_eq!(fx.info.module_channels(), 8);
    assert_eq!(fx.info.song_length(), 4);
    assert_eq!(fx.info.total_time_ms(), TOTAL_TIME_MS);
    assert_eq!(fx.info.module_size(), 42_000);
    assert_eq!(fx.info.position_time_ms(2), 90_000);
    assert_eq!(
        fx.info.module_information(0),
        Some(("Speed".to_string(), "6".to_string()))
    );

    // Default sub-song playback writes the duration attribute back.
    let attrs = fx.attributes.lock().unwrap();
    assert_eq!(
        aplayer_core::attributes::AttributeStore::duration(&*attrs, Path::new("/mods/one.mod")),
        Some("3:00".to_string())
    );
}

#[test]
fn explicit_sub_song_playback_skips_the_duration_attribute() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader.load_init_module(0, Some(2), None, false).unwrap();

    assert!(fx.server.log().contains(&"StartPlayer=1,2,-1".to_string()));
    assert_eq!(fx.info.current_song(), 2);

    // Only default sub-song playback persists the total time; a sub-song's
    // length is not the file's duration.
    let attrs = fx.attributes.lock().unwrap();
    assert_eq!(
        aplayer_core::attributes::AttributeStore::duration(&*attrs, Path::new("/mods/one.mod")),
        None
    );
}

#[test]
fn channel_mask_compacts_disabled_runs() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    // Channels 2..=4 disabled out of 8: exactly one ChangeChannels call.
    fx.loader.set_channel_mask(vec![
        true, true, false, false, false, true, true, true,
    ]);
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    let log = fx.server.log();
    let changes: Vec<&String> = log
        .iter()
        .filter(|l| l.starts_with("ChangeChannels="))
        .collect();
    assert_eq!(changes, vec!["ChangeChannels=1,0,2,4"]);

    // The mask goes out after InitPlayer and before StartPlayer.
    let init = log.iter().position(|l| l == "InitPlayer=1").unwrap();
    let change = log.iter().position(|l| l == "ChangeChannels=1,0,2,4").unwrap();
    let start = log.iter().position(|l| l == "StartPlayer=1,-1,-1").unwrap();
    assert!(init < change && change < start);
}

#[test]
fn playing_load_replaces_the_current_session() {
    let mut fx = fixture(&["/mods/one.mod", "/mods/two.mod"], play_settings());
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();
    fx.loader
        .load_init_module(1, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    // The first session was fully unwound before the second was added.
    let log = fx.server.log();
    let removed = log.iter().position(|l| l == "RemoveFile=1").unwrap();
    let added = log.iter().position(|l| l == "AddFile=/mods/two.mod").unwrap();
    assert!(removed < added);
    assert_eq!(fx.loader.session_count(), 1);
    assert_eq!(fx.view.lock().unwrap().playing(), Some(1));

    // Pass-throughs address the new session, not a stale handle.
    fx.loader.set_volume(90).unwrap();
    assert!(fx.server.log().contains(&"SetVolume=2,90".to_string()));
}

#[test]
fn init_failure_unwinds_and_pairs_add_with_remove() {
    let settings = Settings {
        error_policy: ErrorPolicy::Stop,
        ..play_settings()
    };
    let mut fx = fixture(&["/mods/broken.mod"], settings);
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    let log = fx.server.log();
    assert_eq!(
        log,
        vec![
            "AddFile=/mods/broken.mod",
            "LoadFile=1,0",
            "SetMixerSettings=1,-1,-1,-1,-1,-1",
            "SetOutputAgent=1,MediaKit",
            "InitPlayer=1",
            "UnloadFile=1",
            "RemoveFile=1",
        ]
    );
    assert_eq!(fx.loader.session_count(), 0);

    let view = fx.view.lock().unwrap();
    assert_eq!(view.playing(), None);
    // The failure leaves the zero-duration marker behind.
    assert!(view.has_zero_duration_marker(0));
}

#[test]
fn suppressed_errors_return_to_the_caller() {
    let mut fx = fixture(&["/mods/broken.mod"], play_settings());
    let err = fx
        .loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, true)
        .unwrap_err();
    assert!(err.to_string().contains("injected InitPlayer failure"));

    // Unwound, but no recovery ran: no marker, nothing removed.
    assert_eq!(fx.loader.session_count(), 0);
    assert_eq!(fx.server.count_of("AddFile"), fx.server.count_of("RemoveFile"));
    assert!(!fx.view.lock().unwrap().has_zero_duration_marker(0));
}

#[test]
fn skip_policy_advances_to_the_next_item() {
    let settings = Settings {
        error_policy: ErrorPolicy::Skip,
        ..play_settings()
    };
    let mut fx = fixture(&["/mods/broken.mod", "/mods/b.mod"], settings);
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    let view = fx.view.lock().unwrap();
    assert_eq!(view.len(), 2);
    assert!(view.has_zero_duration_marker(0));
    assert_eq!(view.playing(), Some(1));
    assert_eq!(fx.loader.session_count(), 1);
}

#[test]
fn skip_and_remove_retries_the_shifted_index() {
    let settings = Settings {
        error_policy: ErrorPolicy::SkipAndRemove,
        ..play_settings()
    };
    let mut fx = fixture(
        &["/mods/broken.mod", "/mods/b.mod", "/mods/c.mod"],
        settings,
    );
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    {
        let view = fx.view.lock().unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.item_path(0).unwrap(), Path::new("/mods/b.mod"));
        // The marker went onto the removed item, not its successor.
        assert!(!view.has_zero_duration_marker(0));
        // After removal the successor sits at the failed index itself.
        assert_eq!(view.playing(), Some(0));
    }

    let log = fx.server.log();
    assert!(log.contains(&"AddFile=/mods/b.mod".to_string()));
    assert!(!log.iter().any(|l| l.starts_with("AddFile=/mods/c")));
    // Two adds (broken + b), one remove (broken); b's session is live.
    assert_eq!(fx.server.count_of("AddFile"), 2);
    assert_eq!(fx.server.count_of("RemoveFile"), 1);
    assert_eq!(fx.loader.session_count(), 1);
}

#[test]
fn failure_on_last_item_wraps_to_start() {
    let settings = Settings {
        error_policy: ErrorPolicy::Skip,
        list_end: ListEndPolicy::JumpToStart,
        ..play_settings()
    };
    let mut fx = fixture(&["/mods/a.mod", "/mods/broken.mod"], settings);
    fx.loader
        .load_init_module(1, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    let view = fx.view.lock().unwrap();
    assert!(view.has_zero_duration_marker(1));
    assert_eq!(view.playing(), Some(0));
}

#[test]
fn wrap_to_start_refuses_an_already_failed_first_item() {
    let settings = Settings {
        error_policy: ErrorPolicy::Skip,
        list_end: ListEndPolicy::JumpToStart,
        ..play_settings()
    };
    let mut fx = fixture(&["/mods/a.mod", "/mods/broken.mod"], settings);
    // Pre-mark item 0 as previously failed.
    fx.view.lock().unwrap().set_duration_ms(0, 0);

    fx.loader
        .load_init_module(1, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    // No wrap: item 0 was never added.
    assert!(!fx
        .server
        .log()
        .contains(&"AddFile=/mods/a.mod".to_string()));
    assert_eq!(fx.view.lock().unwrap().playing(), None);
    assert_eq!(fx.loader.session_count(), 0);
}

#[test]
fn stop_list_end_policy_never_wraps() {
    let settings = Settings {
        error_policy: ErrorPolicy::Skip,
        list_end: ListEndPolicy::Stop,
        ..play_settings()
    };
    let mut fx = fixture(&["/mods/a.mod", "/mods/broken.mod"], settings);
    fx.loader
        .load_init_module(1, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    assert!(!fx
        .server
        .log()
        .contains(&"AddFile=/mods/a.mod".to_string()));
    assert_eq!(fx.loader.session_count(), 0);
}

#[test]
fn mixer_settings_encode_dash_one_for_untouched_fields() {
    let settings = Settings {
        mixer: MixerSettings {
            frequency: 48_000,
            ..MixerSettings::default()
        },
        ..play_settings()
    };
    let mut fx = fixture(&["/mods/one.mod"], settings);
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();

    // Only the changed field carries a real value; the rest pass -1
    // through so the server leaves them alone.
    assert!(fx
        .server
        .log()
        .contains(&"SetMixerSettings=1,48000,-1,-1,-1,-1".to_string()));
}

#[test]
fn mid_playback_mixer_change_leaves_dash_one_fields_untouched() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();
    // The all-default load left the server-side values alone.
    assert_eq!(fx.server.mixer_of(1), [44_100, 0, 0, 100, 0]);

    fx.loader
        .set_mixer_settings(MixerSettings {
            frequency: -1,
            interpolation: 1,
            dolby_prologic: 0,
            stereo_separation: 50,
            amiga_filter: -1,
        })
        .unwrap();

    // Frequency and filter carried -1 and kept their pre-call values.
    assert_eq!(fx.server.mixer_of(1), [44_100, 1, 0, 50, 0]);
}

#[test]
fn free_current_resets_everything_but_volume() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();
    fx.loader.set_volume(200).unwrap();
    fx.loader.free_current_module();

    let info = fx.info.lock();
    assert!(!info.has_info);
    assert!(!info.is_playing);
    assert_eq!(info.module_name, "");
    assert_eq!(info.author, "");
    assert_eq!(info.song_length, 0);
    assert_eq!(info.song_position, 0);
    assert_eq!(info.total_time_ms, 0);
    assert!(info.position_times_ms.is_empty());
    assert_eq!(info.volume, 200);
    drop(info);

    assert_eq!(fx.loader.session_count(), 0);
    assert_eq!(fx.server.count_of("AddFile"), fx.server.count_of("RemoveFile"));
    assert_eq!(fx.view.lock().unwrap().playing(), None);
}

#[test]
fn free_all_unwinds_a_playing_session_in_reverse_order() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();
    fx.loader.set_volume(128).unwrap();
    fx.loader.free_all_modules();

    let log = fx.server.log();
    let tail: Vec<&str> = log[log.len() - 4..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec!["StopPlayer=1", "EndPlayer=1", "UnloadFile=1", "RemoveFile=1"]
    );
    assert_eq!(fx.loader.session_count(), 0);

    // Reset clears the module facts but keeps the user's volume.
    assert!(!fx.info.has_info());
    assert!(!fx.info.is_playing());
    assert_eq!(fx.info.volume(), 128);
    assert_eq!(fx.view.lock().unwrap().playing(), None);
}

#[test]
fn control_calls_without_a_session_are_no_ops() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader.pause().unwrap();
    fx.loader.resume().unwrap();
    fx.loader.set_position(5).unwrap();
    fx.loader.hold(true).unwrap();
    assert!(fx.server.log().is_empty());
}

#[test]
fn probe_pairs_add_with_remove_on_every_path() {
    let mut fx = fixture(&[], play_settings());

    let total = fx.loader.probe_total_time(Path::new("/mods/good.mod")).unwrap();
    assert_eq!(total, TOTAL_TIME_MS);
    assert_eq!(
        fx.server.log(),
        vec![
            "AddFile=/mods/good.mod",
            "LoadFile=1,0",
            "InitPlayer=1",
            "GetTotalTime=1",
            "EndPlayer=1",
            "UnloadFile=1",
            "RemoveFile=1",
        ]
    );

    fx.loader
        .probe_total_time(Path::new("/mods/broken.mod"))
        .unwrap_err();
    fx.loader
        .probe_total_time(Path::new("/mods/badload.mod"))
        .unwrap_err();

    // Every probe, failed or not, released its handle.
    assert_eq!(fx.server.count_of("AddFile"), 3);
    assert_eq!(fx.server.count_of("RemoveFile"), 3);
    // A failed InitPlayer never reaches GetTotalTime.
    assert_eq!(fx.server.count_of("GetTotalTime"), 1);
    // The probe leaves no session behind.
    assert_eq!(fx.loader.session_count(), 0);
}

#[test]
fn worker_serves_requests_and_frees_on_shutdown() {
    use aplayer_core::worker::{LoaderRequest, LoaderWorker};
    use std::time::{Duration, Instant};

    let fx = fixture(&["/mods/one.mod"], play_settings());
    let server = fx.server.clone();
    let view = fx.view.clone();
    let info = fx.info.clone();

    let worker = LoaderWorker::spawn(fx.loader);
    worker.request(LoaderRequest::LoadInitModule {
        index: 0,
        sub_song: Some(DEFAULT_SUB_SONG),
        start_pos: None,
        suppress_error: false,
    });
    worker.request(LoaderRequest::SetVolume(64));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !(info.is_playing() && info.volume() == 64) {
        assert!(Instant::now() < deadline, "worker did not serve the requests");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(view.lock().unwrap().playing(), Some(0));

    drop(worker);
    // Shutdown released the session.
    assert_eq!(server.count_of("AddFile"), server.count_of("RemoveFile"));
    assert!(!info.is_playing());
}

#[test]
fn start_song_stops_before_restarting() {
    let mut fx = fixture(&["/mods/one.mod"], play_settings());
    fx.loader
        .load_init_module(0, Some(DEFAULT_SUB_SONG), None, false)
        .unwrap();
    fx.loader.start_song(2).unwrap();

    let log = fx.server.log();
    let stop = log.iter().position(|l| l == "StopPlayer=1").unwrap();
    let restart = log.iter().position(|l| l == "StartPlayer=1,2,-1").unwrap();
    assert!(stop < restart);
    assert_eq!(fx.loader.session_count(), 1);
}
