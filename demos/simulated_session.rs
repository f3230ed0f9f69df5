//! Simulated session
//!
//! Runs the engine against the mock device backend with scripted keyboard,
//! mouse and controller input, then prints every device command with its
//! offset from the start of the session.
//!
//! Run with: cargo run --example simulated_session

use anyhow::Context;
use haptic_bind::backend::DeviceCall;
use haptic_bind::input::ControllerInputKind;
use haptic_bind::mapping::{Config, ProfileData};
use haptic_bind::source::{ChannelHook, RawKeyEvent, RawMouseEvent};
use haptic_bind::{GamepadSnapshot, HapticManager, KeyCode, MockDeviceBackend, Notification, SimulatedGamepads};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{sleep, Instant};

const DEMO_PROFILE: &str = include_str!("../configs/profiles/demo.json");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_default().unwrap_or_default();
    let backend = Arc::new(MockDeviceBackend::with_devices(["Vibro1", "Vibro2"]));
    let (keys, keyboard_hook) = ChannelHook::new("demo-keyboard");
    let (mouse, mouse_hook) = ChannelHook::new("demo-mouse");
    let pads = SimulatedGamepads::new();
    pads.set(0, GamepadSnapshot::default());

    let mut manager = HapticManager::new(
        &config,
        backend.clone(),
        Box::new(keyboard_hook),
        Box::new(mouse_hook),
        Arc::new(pads.clone()),
        Handle::current(),
    )?;

    let profile = ProfileData::from_json(DEMO_PROFILE)?;
    manager.load_profile(&profile)?;
    for binding in manager.keyboard().list_bindings() {
        println!("  {}", binding);
    }

    let start = Instant::now();
    manager.start()?;

    println!("\n1. Space: 500ms pulse on Vibro1");
    keys.send(RawKeyEvent::Down(KeyCode::SPACE))?;
    sleep(Duration::from_millis(100)).await;
    keys.send(RawKeyEvent::Up(KeyCode::SPACE))?;
    sleep(Duration::from_millis(600)).await;

    println!("2. Hold E for 300ms: Vibro1 held, Vibro2 pulsed");
    let e = KeyCode::parse("e").context("key E")?;
    keys.send(RawKeyEvent::Down(e))?;
    sleep(Duration::from_millis(300)).await;
    keys.send(RawKeyEvent::Up(e))?;
    sleep(Duration::from_millis(100)).await;

    println!("3. Wheel up");
    mouse.send(RawMouseEvent::Wheel { delta: 120 })?;
    sleep(Duration::from_millis(200)).await;

    println!("4. Controller 1: A tap, then right trigger held");
    pads.update(0, |pad| *pad = pad.with_button(ControllerInputKind::ButtonA));
    sleep(Duration::from_millis(50)).await;
    pads.update(0, |pad| {
        pad.buttons = 0;
        pad.right_trigger = 255;
    });
    sleep(Duration::from_millis(300)).await;
    pads.update(0, |pad| pad.right_trigger = 0);
    sleep(Duration::from_millis(600)).await;

    println!("5. Toggle key turns every source off");
    keys.send(RawKeyEvent::Down(KeyCode::F8))?;
    sleep(Duration::from_millis(100)).await;

    manager.shutdown().await;

    println!("\nNotifications:");
    for notification in manager.notifications().try_iter() {
        match notification {
            Notification::Triggered { source, binding } => println!("  {source} ▶ {binding}"),
            Notification::Released { source, binding } => println!("  {source} ■ {}", binding.input),
            Notification::SourcesToggled { active } => println!("  sources active: {active}"),
        }
    }

    println!("\nDevice commands:");
    for call in backend.calls() {
        let offset = call.at().duration_since(start).as_millis();
        match call {
            DeviceCall::SetIntensity { device, intensity, .. } => {
                println!("  {offset:>5}ms  {device} → {intensity:.2}")
            }
            DeviceCall::Stop { device, .. } => println!("  {offset:>5}ms  {device} stop"),
            DeviceCall::StopAll { .. } => println!("  {offset:>5}ms  stop all"),
        }
    }

    Ok(())
}
