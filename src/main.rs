//! haptic-bind - Main Application
//!
//! Loads configs/default.toml and an optional profile (JSON path as the
//! first argument), then runs the binding engine against the mock device
//! backend. Keyboard and mouse events are read from stdin, one per line:
//!
//! ```text
//! key down space      key up space
//! mouse down x1       mouse up x1       wheel 120
//! toggle              stop              quit
//! ```
//!
//! Controllers are read through XInput on Windows.

use anyhow::{bail, Context};
use haptic_bind::manager::Notification;
use haptic_bind::mapping::{Config, ProfileData};
use haptic_bind::source::{ChannelHook, GamepadSource, MouseButton, RawKeyEvent, RawMouseEvent};
use haptic_bind::{HapticManager, KeyCode, MockDeviceBackend};
use log::{info, warn};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

#[derive(Debug)]
enum Control {
    Toggle,
    StopAll,
    Quit,
}

#[derive(Debug)]
enum ConsoleLine {
    Key(RawKeyEvent),
    Mouse(RawMouseEvent),
    Control(Control),
}

fn parse_button(name: &str) -> anyhow::Result<MouseButton> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "left" => MouseButton::Left,
        "right" => MouseButton::Right,
        "middle" => MouseButton::Middle,
        "x1" => MouseButton::X1,
        "x2" => MouseButton::X2,
        other => bail!("unknown mouse button '{other}'"),
    })
}

fn parse_key(name: &str) -> anyhow::Result<KeyCode> {
    KeyCode::parse(name).with_context(|| format!("unknown key '{name}'"))
}

fn parse_line(line: &str) -> anyhow::Result<ConsoleLine> {
    let words: Vec<&str> = line.split_whitespace().collect();

    Ok(match words.as_slice() {
        ["key", "down", name] => ConsoleLine::Key(RawKeyEvent::Down(parse_key(name)?)),
        ["key", "up", name] => ConsoleLine::Key(RawKeyEvent::Up(parse_key(name)?)),
        ["mouse", "down", name] => ConsoleLine::Mouse(RawMouseEvent::ButtonDown(parse_button(name)?)),
        ["mouse", "up", name] => ConsoleLine::Mouse(RawMouseEvent::ButtonUp(parse_button(name)?)),
        ["wheel", delta] => ConsoleLine::Mouse(RawMouseEvent::Wheel {
            delta: delta.parse().context("wheel delta must be an integer")?,
        }),
        ["toggle"] => ConsoleLine::Control(Control::Toggle),
        ["stop"] => ConsoleLine::Control(Control::StopAll),
        ["quit"] | ["exit"] => ConsoleLine::Control(Control::Quit),
        _ => bail!("unrecognized command '{line}'"),
    })
}

#[cfg(windows)]
fn platform_gamepads() -> Arc<dyn GamepadSource> {
    Arc::new(haptic_bind::source::XInputGamepads)
}

#[cfg(not(windows))]
fn platform_gamepads() -> Arc<dyn GamepadSource> {
    info!("XInput is not available on this platform; no controllers will be polled");
    Arc::new(haptic_bind::SimulatedGamepads::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== haptic-bind ===");
    println!();

    let config = match Config::load_default() {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; using built-in defaults", e);
            Config::default()
        }
    };

    let backend = Arc::new(MockDeviceBackend::new());
    let (key_feed, keyboard_hook) = ChannelHook::new("keyboard-hook");
    let (mouse_feed, mouse_hook) = ChannelHook::new("mouse-hook");

    let mut manager = HapticManager::new(
        &config,
        backend,
        Box::new(keyboard_hook),
        Box::new(mouse_hook),
        platform_gamepads(),
        Handle::current(),
    )?;

    if let Some(path) = std::env::args().nth(1) {
        let json = std::fs::read_to_string(&path).with_context(|| format!("reading profile {path}"))?;
        let profile = ProfileData::from_json(&json)?;
        manager.load_profile(&profile)?;
        println!("✓ Loaded profile '{}' from {}", profile.name, path);
    }

    manager.start()?;
    println!("Toggle key: {}. Type commands, Ctrl+C to stop.", manager.keyboard().toggle_key());

    let notifications = manager.notifications().clone();
    thread::Builder::new().name("notifications".to_string()).spawn(move || {
        for notification in notifications.iter() {
            match notification {
                Notification::Triggered { binding, .. } => println!("▶ {}", binding),
                Notification::Released { binding, .. } => println!("■ {}", binding.input),
                Notification::SourcesToggled { active } => {
                    println!("Sources {}", if active { "enabled" } else { "disabled" })
                }
            }
        }
    })?;

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    thread::Builder::new().name("console".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let delivered = match parse_line(&line) {
                Ok(ConsoleLine::Key(event)) => key_feed.send(event).is_ok(),
                Ok(ConsoleLine::Mouse(event)) => mouse_feed.send(event).is_ok(),
                Ok(ConsoleLine::Control(control)) => control_tx.send(control).is_ok(),
                Err(e) => {
                    eprintln!("{e}");
                    true
                }
            };
            if !delivered {
                break;
            }
        }
        let _ = control_tx.send(Control::Quit);
    })?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            control = control_rx.recv() => match control {
                Some(Control::Toggle) => {
                    manager.toggle_sources();
                }
                Some(Control::StopAll) => manager.stop_all(),
                Some(Control::Quit) | None => break,
            },
        }
    }

    info!("Shutting down...");
    manager.shutdown().await;
    Ok(())
}
