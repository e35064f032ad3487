use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use notify_rust::Notification;
use std::process::Command;
use std::time::Duration;

use crate::session::session::Phase;

// Alarm-clock pattern: blocks of alternating high/low tones with short
// rests, repeated with a longer rest between blocks.
const MASTER_VOLUME: f32 = 0.39;
const TONE_A_HZ: f32 = 1400.0;
const TONE_B_HZ: f32 = 1000.0;
const TONE_SECS: f32 = 0.09;
const GAP_SECS: f32 = 0.06;
const CYCLES_PER_BLOCK: usize = 4;
const BLOCKS: usize = 3;
const BLOCK_GAP_SECS: f32 = 0.25;
const ATTACK_SECS: f32 = 0.015;
const SPEECH_DELAY_MS: u64 = 1000; // announcement lands after the first alarm block

/// Fire the full completion alert: chime, spoken announcement a moment
/// later, and a desktop notification. Returns immediately; every failure is
/// swallowed and logged. The returned handle resolves once chime and speech
/// are done, for callers that exit right after a session (the daemon just
/// drops it).
pub fn notify_completion(finished: Phase) -> std::thread::JoinHandle<()> {
    let message = completion_message(finished);
    if let Err(e) = send_notification(&message) {
        log::warn!("Failed to send notification: {e}");
    }
    std::thread::spawn(|| {
        let speech = std::thread::spawn(|| {
            std::thread::sleep(Duration::from_millis(SPEECH_DELAY_MS));
            speak_finished();
        });
        if let Err(e) = play_chime_blocking() {
            log::warn!("Chime failed: {e}");
        }
        let _ = speech.join();
    })
}

fn completion_message(finished: Phase) -> String {
    match finished {
        Phase::Work => "Work session complete! Time for a break.".to_string(),
        Phase::Break => "Break is over!".to_string(),
        Phase::Stopped => "Timer complete!".to_string(),
    }
}

fn send_notification(message: &str) -> Result<(), Box<dyn std::error::Error>> {
    Notification::new()
        .summary("Focus It - Timer Alert")
        .body(message)
        .timeout(0) // No auto-dismiss
        .show()?;
    Ok(())
}

fn play_chime_blocking() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("No output device found")?;
    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate() as f32;
    let channels = config.channels() as usize;

    let samples = render_alarm(sample_rate);
    let total = samples.len();

    let sample_idx = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let sample_idx_clone = sample_idx.clone();
    let samples = std::sync::Arc::new(samples);
    let samples_clone = samples.clone();

    let stream = device.build_output_stream(
        &config.into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut idx = sample_idx_clone.load(std::sync::atomic::Ordering::Relaxed);
            for frame in data.chunks_mut(channels) {
                let value = if idx < total { samples_clone[idx] } else { 0.0 };
                for sample in frame.iter_mut() {
                    *sample = value;
                }
                idx += 1;
            }
            sample_idx_clone.store(idx, std::sync::atomic::Ordering::Relaxed);
        },
        |err| log::error!("Audio output error: {err}"),
        None,
    )?;

    stream.play()?;

    // Wait for playback to finish + small buffer
    let playback_ms = (total as f32 / sample_rate * 1000.0) as u64 + 200;
    std::thread::sleep(Duration::from_millis(playback_ms));

    drop(stream);
    Ok(())
}

fn render_alarm(sample_rate: f32) -> Vec<f32> {
    let mut samples = Vec::new();
    for block in 0..BLOCKS {
        for _ in 0..CYCLES_PER_BLOCK {
            push_tone(&mut samples, sample_rate, TONE_A_HZ);
            push_tone(&mut samples, sample_rate, TONE_B_HZ);
            push_silence(&mut samples, sample_rate, GAP_SECS);
        }
        if block < BLOCKS - 1 {
            push_silence(&mut samples, sample_rate, BLOCK_GAP_SECS);
        }
    }
    samples
}

fn push_tone(samples: &mut Vec<f32>, sample_rate: f32, freq: f32) {
    let total = (sample_rate * TONE_SECS) as usize;
    let attack = ((sample_rate * ATTACK_SECS) as usize).max(1);
    for i in 0..total {
        let t = i as f32 / sample_rate;
        // Short attack ramp then exponential decay; keeps the tone from clicking.
        let envelope = if i < attack {
            i as f32 / attack as f32
        } else {
            let progress = (i - attack) as f32 / (total - attack).max(1) as f32;
            (-4.0 * progress).exp()
        };
        samples.push(triangle(freq, t) * envelope * MASTER_VOLUME);
    }
}

fn push_silence(samples: &mut Vec<f32>, sample_rate: f32, secs: f32) {
    let total = (sample_rate * secs) as usize;
    samples.extend(std::iter::repeat(0.0).take(total));
}

// Triangle wave, a little bell-like compared to a plain sine.
fn triangle(freq: f32, t: f32) -> f32 {
    let phase = (freq * t).fract();
    4.0 * (phase - 0.5).abs() - 1.0
}

/// Spoken announcement through the desktop speech dispatcher, falling back
/// to espeak when it is not installed.
fn speak_finished() {
    for command in ["spd-say", "espeak"] {
        match Command::new(command).arg("Finished").status() {
            Ok(status) if status.success() => return,
            Ok(status) => log::warn!("{command} exited with {status}"),
            Err(e) => log::debug!("{command} unavailable: {e}"),
        }
    }
    log::warn!("No speech backend available for the finish announcement");
}
