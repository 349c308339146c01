use std::time::{Duration, Instant};

use shadervst_engine::bridge::{AudioBridge, BlockClock, FrameSnapshot};
use shadervst_engine::history::margin_samples;
use shadervst_engine::midi::{BlockMidi, MidiMessage};
use shadervst_engine::timeline::RenderClock;
use shadervst_engine::DELAY_LATENCY;

#[test]
fn note_on_reaches_key_state_once_timeline_passes_it() {
    let sr = 44100.0;
    let bridge = AudioBridge::new();
    let mut blocks = BlockClock::new();
    let mut clock = RenderClock::new();
    let mut snap = FrameSnapshot::default();
    let silence = [0.0f32; 512];
    let start = Instant::now();

    // Note-on 10ms into the first block.
    let note_on = BlockMidi {
        sample_offset: 441,
        message: MidiMessage::NoteOn {
            note: 60,
            velocity: 100,
        },
    };
    let ts = blocks.next_block(sr, 512);
    bridge.handle_audio_frame(ts, sr, &[&silence], &[note_on]);

    bridge.handoff(&mut clock, start, &mut snap);
    assert!(snap.time < 0.01);
    assert_eq!(snap.midi.key_down[60], 0.0);

    let ts = blocks.next_block(sr, 512);
    bridge.handle_audio_frame(ts, sr, &[&silence], &[]);
    bridge.handoff(&mut clock, start + Duration::from_millis(100), &mut snap);
    assert!(snap.time >= 0.01);
    assert!((snap.midi.key_down[60] - 0.01).abs() < 1e-6);
    assert!((snap.midi.key_down_velocity[60] - 100.0 / 127.0).abs() < 1e-6);
    assert!(snap.midi.is_held(60));

    // Running state: stays put while nothing new arrives.
    for i in 0..5u64 {
        let ts = blocks.next_block(sr, 512);
        bridge.handle_audio_frame(ts, sr, &[&silence], &[]);
        bridge.handoff(&mut clock, start + Duration::from_millis(120 + i * 16), &mut snap);
        assert!((snap.midi.key_down[60] - 0.01).abs() < 1e-6);
        assert!(snap.midi.is_held(60));
    }

    let note_off = BlockMidi {
        sample_offset: 0,
        message: MidiMessage::NoteOff {
            note: 60,
            velocity: 0,
        },
    };
    let off_ts = blocks.next_block(sr, 512);
    bridge.handle_audio_frame(off_ts, sr, &[&silence], &[note_off]);
    bridge.handoff(&mut clock, start + Duration::from_secs(1), &mut snap);
    assert_eq!(snap.midi.key_up[60], off_ts);
    assert!((snap.midi.key_down[60] - 0.01).abs() < 1e-6);
    assert!(!snap.midi.is_held(60));
}

#[test]
fn audio_window_tracks_latest_samples_within_latency() {
    let sr = 1000.0;
    let declared = 256;
    let block_len = 100;
    let margin = margin_samples(sr);

    let bridge = AudioBridge::new();
    bridge.set_history_windows([declared, 0]);

    let mut blocks = BlockClock::new();
    let mut clock = RenderClock::new();
    let mut snap = FrameSnapshot::default();
    let start = Instant::now();
    let mut total = 0usize;

    for frame in 0..40u64 {
        // Audio arrives irregularly: two blocks, then none.
        if frame % 3 != 2 {
            let block: Vec<f32> = (total..total + block_len).map(|s| s as f32).collect();
            let ts = blocks.next_block(sr, block_len);
            bridge.handle_audio_frame(ts, sr, &[block.as_slice()], &[]);
            total += block_len;
        }

        bridge.handoff(&mut clock, start + Duration::from_millis(frame * 70), &mut snap);
        let window = snap.audio_window(0, declared).unwrap();
        assert_eq!(window.len(), declared);

        let newest_delivered = (total - 1) as f32;
        let newest_visible = window[declared - 1];
        assert!(newest_visible <= newest_delivered);
        assert!(newest_visible >= newest_delivered - margin as f32);
        assert_eq!(
            newest_visible,
            newest_delivered - (margin - snap.sample_pos) as f32
        );

        if total >= declared + margin {
            for pair in window.windows(2) {
                assert_eq!(pair[1], pair[0] + 1.0);
            }
        }

        assert!(snap.time <= snap.last_audio_timestamp);
        assert!(snap.time >= snap.last_audio_timestamp - DELAY_LATENCY);
    }
}
