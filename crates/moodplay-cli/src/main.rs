//! moodplay CLI: mood player powered by moodplay-core.
//!
//! Commands:
//!   moodplay moods                     List mood folders
//!   moodplay list <mood>               List a mood's tracks
//!   moodplay play <mood> [index]       Play, then read transport commands
//!
//! Options:
//!   --null                             Headless output (no audio device)
//!
//! While playing, stdin accepts: pause, resume, toggle, stop, next, prev,
//! play <n>, seek <seconds>, volume <0-100>, now, quit.

use std::io::{BufRead, Write};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use moodplay_core::{
    format_time, paths, EngineConfig, NullDevice, PlaybackCommand, PlaybackEngine, PlaybackEvent,
    PlaybackState, PlaylistManager, Progress, ProgressTracker,
};

fn main() {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let headless = take_flag(&mut args, "--null");
    if args.is_empty() {
        print_usage();
        return;
    }

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config: {}", e);
            std::process::exit(2);
        }
    };

    match args[0].as_str() {
        "moods" => cmd_moods(&config),
        "list" => cmd_list(&config, &args[1..]),
        "play" => cmd_play(&config, &args[1..], headless),
        other => {
            eprintln!("unknown command: {}", other);
            print_usage();
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_moods(config: &EngineConfig) {
    let manager = PlaylistManager::new(config.music_root.clone());
    let found = manager.moods();
    if found.is_empty() {
        println!("no mood folders under {}", config.music_root.display());
        println!("expected e.g. {}", paths::DEFAULT_MOODS.join(", "));
        return;
    }
    for mood in found {
        println!("{}", mood);
    }
}

fn cmd_list(config: &EngineConfig, args: &[String]) {
    if args.is_empty() {
        eprintln!("usage: moodplay list <mood>");
        return;
    }
    match PlaylistManager::new(config.music_root.clone()).load_mood(&args[0]) {
        Ok(playlist) => {
            for (i, track) in playlist.tracks().iter().enumerate() {
                println!("{:>3}  {:<8} {}", i, track.kind().as_str(), track.display_name());
            }
        }
        Err(e) => eprintln!("{}", e),
    }
}

fn cmd_play(config: &EngineConfig, args: &[String], headless: bool) {
    if args.is_empty() {
        eprintln!("usage: moodplay play <mood> [index]");
        return;
    }
    let index = match args.get(1).map(|s| s.parse::<usize>()) {
        None => 0,
        Some(Ok(i)) => i,
        Some(Err(_)) => {
            eprintln!("index must be a number: {}", args[1]);
            return;
        }
    };

    let mut engine = open_engine(config, headless);
    if let Err(e) = engine.load_mood(&args[0]) {
        eprintln!("{}", e);
        return;
    }
    if let Err(e) = engine.play_index(index) {
        log::error!("moodplay: play failed: {}", e);
        return;
    }

    let mut input = Some(spawn_stdin_reader());
    let mut tracker = ProgressTracker::new(config.progress_interval());
    let interval = tracker.interval();

    loop {
        let line = match &input {
            Some(rx) => match rx.recv_timeout(interval) {
                Ok(line) => Some(line),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    input = None;
                    None
                }
            },
            None => {
                std::thread::sleep(interval);
                None
            }
        };

        if let Some(line) = line {
            match parse_input(&line) {
                Some(Input::Quit) => break,
                Some(Input::Now) => {
                    println!();
                    println!("{}", serde_json::to_string_pretty(&engine.snapshot()).unwrap_or_default());
                }
                Some(Input::Command(cmd)) => {
                    if let Err(e) = engine.apply(cmd) {
                        println!();
                        log::error!("moodplay: {}", e);
                    }
                    tracker.refresh(&engine);
                }
                None if line.trim().is_empty() => {}
                None => {
                    println!();
                    eprintln!("unknown input: {}", line.trim());
                }
            }
        }

        match engine.poll() {
            Some(PlaybackEvent::Finished(track)) => {
                println!();
                println!("finished: {}", track.display_name());
                tracker.refresh(&engine);
            }
            Some(PlaybackEvent::Failed(e)) => {
                println!();
                log::error!("moodplay: playback failed: {}", e);
                tracker.refresh(&engine);
            }
            None => {}
        }

        // Nothing left to do once stdin is gone and playback ended.
        if input.is_none() && engine.state() == PlaybackState::Stopped {
            break;
        }

        let progress = tracker.sample(&engine);
        print_progress(&engine, &progress);
    }

    engine.stop();
    println!();
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

enum Input {
    Command(PlaybackCommand),
    Now,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let mut words = line.split_whitespace();
    let cmd = match (words.next()?, words.next()) {
        ("quit" | "q" | "exit", _) => return Some(Input::Quit),
        ("now", _) => return Some(Input::Now),
        ("pause", _) => PlaybackCommand::Pause,
        ("resume", _) => PlaybackCommand::Resume,
        ("toggle" | "p", _) => PlaybackCommand::TogglePause,
        ("stop", _) => PlaybackCommand::Stop,
        ("next" | "n", _) => PlaybackCommand::Next,
        ("prev" | "previous", _) => PlaybackCommand::Previous,
        ("play", Some(n)) => PlaybackCommand::Play { index: n.parse().ok()? },
        ("seek", Some(secs)) => {
            let secs: f64 = secs.parse().ok().filter(|s: &f64| s.is_finite() && *s >= 0.0)?;
            PlaybackCommand::Seek {
                position_ms: (secs * 1000.0) as u64,
            }
        }
        ("volume" | "vol", Some(level)) => PlaybackCommand::SetVolume {
            level: level.parse::<u8>().ok()?.min(100),
        },
        _ => return None,
    };
    Some(Input::Command(cmd))
}

/// Forward stdin lines over a channel so the player loop can time out.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

#[cfg(feature = "native")]
fn open_engine(config: &EngineConfig, headless: bool) -> PlaybackEngine {
    if headless {
        PlaybackEngine::new(config, Arc::new(NullDevice::new()))
    } else {
        PlaybackEngine::native(config)
    }
}

#[cfg(not(feature = "native"))]
fn open_engine(config: &EngineConfig, _headless: bool) -> PlaybackEngine {
    PlaybackEngine::new(config, Arc::new(NullDevice::new()))
}

fn print_progress(engine: &PlaybackEngine, progress: &Progress) {
    let bar_width = 30;
    let filled = progress.permille() as usize * bar_width / 1000;
    let empty = bar_width - filled;
    let title = engine.current_track().map(|t| t.display_name()).unwrap_or("-");
    let state = match engine.state() {
        PlaybackState::Playing => ">",
        PlaybackState::Paused => "||",
        PlaybackState::Stopped => "[]",
    };

    print!(
        "\r  {} {}  [{}{}] {} / {}  vol: {}%    ",
        state,
        title,
        "=".repeat(filled),
        " ".repeat(empty),
        progress.elapsed(),
        format_time(progress.total_micros.unwrap_or(0)),
        engine.volume(),
    );
    std::io::stdout().flush().ok();
}

fn print_usage() {
    println!("moodplay - mood music player");
    println!();
    println!("usage: moodplay [--null] <command> [args]");
    println!();
    println!("commands:");
    println!("  moods                  List mood folders");
    println!("  list <mood>            List a mood's tracks");
    println!("  play <mood> [index]    Play a mood, then control it from stdin");
    println!();
    println!("while playing:");
    println!("  pause | resume | toggle | stop | next | prev");
    println!("  play <n>               Play track n of the mood");
    println!("  seek <seconds>         Seek within the track");
    println!("  volume <0-100>         Set volume");
    println!("  now                    Print the playback snapshot");
    println!("  quit                   Exit");
}
