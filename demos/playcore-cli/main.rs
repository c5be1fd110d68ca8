// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Minimal command-line embedding of `playcore`, mostly useful for
//! exercising the engine by hand: `playcore-cli play some.wav` loads a
//! file and plays it to completion, printing status transitions as they
//! happen. Also the one place in this workspace that loads plugins from
//! a directory, since a library crate has no business doing that itself.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use playcore::config::EngineConfig;
use playcore::engine::PlayerEngine;
use playcore::plugins::PluginDirectory;
use playcore::track::TrackInfo;
use playcore::PlayerStatus;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("playcore=info".parse().unwrap()))
        .init();

    let mut args = env::args().skip(1);
    let command = args.next();
    match command.as_deref() {
        Some("play") => {
            let Some(path) = args.next() else {
                eprintln!("usage: playcore-cli play <file> [--plugins <dir>]");
                return ExitCode::FAILURE;
            };
            let plugin_dir = parse_plugin_dir(args);
            play(path, plugin_dir)
        }
        Some("probe") => {
            let Some(path) = args.next() else {
                eprintln!("usage: playcore-cli probe <file>");
                return ExitCode::FAILURE;
            };
            probe(path)
        }
        _ => {
            eprintln!("usage: playcore-cli <play|probe> <file> [--plugins <dir>]");
            ExitCode::FAILURE
        }
    }
}

fn parse_plugin_dir(mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
    while let Some(arg) = args.next() {
        if arg == "--plugins" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

fn play(path: String, plugin_dir: Option<PathBuf>) -> ExitCode {
    let engine = PlayerEngine::new(EngineConfig::default());

    if let Some(dir) = plugin_dir {
        let mut loader = PluginDirectory::new();
        let loaded = loader.scan_and_register(&dir, &engine);
        tracing::info!(loaded, ?dir, "loaded plugins");
    }

    engine.start();
    engine.play_file(TrackInfo::new(path, None, vec![]));

    loop {
        let info = engine.player_info();
        match info.status() {
            PlayerStatus::Stopped if info.track().is_none() => break,
            PlayerStatus::Stopped => {
                if let Some(err) = info.error_msg() {
                    eprintln!("playback stopped: {err}");
                }
                break;
            }
            _ => {}
        }
        println!(
            "{:>4}s  buffer {}/{} chunks  vol {:?}",
            info.position(),
            info.buffer_fill(),
            info.buffer_size(),
            info.volume()
        );
        std::thread::sleep(Duration::from_millis(500));
    }

    engine.shutdown();
    ExitCode::SUCCESS
}

fn probe(path: String) -> ExitCode {
    let engine = PlayerEngine::new(EngineConfig::default());
    match engine.get_fileinfo(&PathBuf::from(&path)) {
        Ok((duration, comments)) => {
            match duration {
                Some(d) => println!("duration: {d:.1}s"),
                None => println!("duration: unknown"),
            }
            for (key, value) in comments {
                println!("{key}: {value}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("probe failed: {e}");
            ExitCode::FAILURE
        }
    }
}
