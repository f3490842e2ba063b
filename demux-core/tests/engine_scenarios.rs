//! End-to-end scenarios against a real [`Engine`] driven by the [`common::ScriptedProducer`]
//! fixture and an in-memory [`std::io::Cursor`] source (covered by the blanket `Source` impl).

mod common;

use std::io::Cursor;
use std::time::Duration;

use demux_core::{Engine, EngineOptions, Packet, PacketBuilder, SeekFlags, StreamHeader, StreamKind, Timestamp};

use common::{ScriptedProducer, Step};

fn keyframe_packet(stream: u32, pts: f64, payload: &[u8]) -> Packet {
    PacketBuilder::new(stream, payload.to_vec()).pts(Timestamp::new(pts)).keyframe(true).build()
}

fn delta_packet(stream: u32, pts: f64, payload: &[u8]) -> Packet {
    PacketBuilder::new(stream, payload.to_vec()).pts(Timestamp::new(pts)).build()
}

fn open(steps: Vec<Step>, options: EngineOptions) -> (Engine, demux_core::ConsumerApi) {
    let producer = ScriptedProducer::new(steps);
    let source = Cursor::new(Vec::<u8>::new());
    Engine::open(producer, source, options).expect("engine opens")
}

#[test]
fn two_stream_read_ahead_interleaves_independently() {
    let _ = env_logger::builder().is_test(true).try_init();
    let video = StreamHeader::new(0, StreamKind::Video, "h264");
    let audio = StreamHeader::new(0, StreamKind::Audio, "opus");
    let steps = vec![
        Step::Register(video),
        Step::Register(audio),
        Step::Submit { stream: 0, packet: keyframe_packet(0, 0.0, &[1, 2, 3]) },
        Step::Submit { stream: 1, packet: keyframe_packet(1, 0.0, &[4, 5]) },
        Step::Submit { stream: 0, packet: delta_packet(0, 0.04, &[6]) },
        Step::Submit { stream: 1, packet: delta_packet(1, 0.02, &[7]) },
    ];
    let (engine, consumer) = open(steps, EngineOptions::default());

    let v0 = consumer.read(0).expect("first video packet");
    assert_eq!(v0.pts.get(), Some(0.0));
    let a0 = consumer.read(1).expect("first audio packet");
    assert_eq!(a0.pts.get(), Some(0.0));
    let v1 = consumer.read(0).expect("second video packet");
    assert_eq!(v1.pts.get(), Some(0.04));

    engine.terminate();
}

#[test]
fn overflow_halts_further_fills_without_losing_buffered_packets() {
    let _ = env_logger::builder().is_test(true).try_init();
    let video = StreamHeader::new(0, StreamKind::Video, "h264");
    let steps = vec![
        Step::Register(video),
        Step::Submit { stream: 0, packet: keyframe_packet(0, 0.0, &[0u8; 64]) },
        Step::Submit { stream: 0, packet: delta_packet(0, 0.04, &[0u8; 64]) },
        Step::Submit { stream: 0, packet: delta_packet(0, 0.08, &[0u8; 64]) },
    ];
    let mut options = EngineOptions::default();
    options.max_bytes = 100; // smaller than even one packet's estimated size (64 + overhead)
    let (engine, consumer) = open(steps, options);

    // The first packet that fit is still readable even though the script had more queued.
    let v0 = consumer.read(0).expect("first packet survives overflow");
    assert_eq!(v0.pts.get(), Some(0.0));

    engine.terminate();
}

#[test]
fn mid_stream_track_enable_triggers_refresh_seek() {
    let _ = env_logger::builder().is_test(true).try_init();
    let video = StreamHeader::new(0, StreamKind::Video, "h264");
    let subtitle = StreamHeader::new(0, StreamKind::Subtitle, "webvtt");
    let steps = vec![
        Step::Register(video),
        Step::Register(subtitle),
        Step::Submit { stream: 0, packet: keyframe_packet(0, 0.0, &[1]) },
        Step::Submit { stream: 0, packet: delta_packet(0, 1.0, &[2]) },
    ];
    let mut options = EngineOptions::default();
    options.force_seekable = true;
    let (engine, consumer) = open(steps, options);

    // Registration auto-selects every stream; disable the subtitle track up front so enabling it
    // below is a genuine mid-playback change.
    consumer.select_track(1, 0.0, false).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    // Flip past `initial_state` via a real seek so that re-enabling the subtitle track is
    // recognized as "mid-stream" and requests a refresh-seek.
    assert!(consumer.seek(Timestamp::new(0.0), SeekFlags::empty()).is_ok());
    std::thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_initial_state());

    consumer.select_track(1, 0.5, true).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    engine.terminate();
}

#[test]
fn cached_seek_forward_avoids_a_producer_seek_call() {
    let _ = env_logger::builder().is_test(true).try_init();
    let video = StreamHeader::new(0, StreamKind::Video, "h264");
    let steps = vec![
        Step::Register(video),
        Step::Submit { stream: 0, packet: keyframe_packet(0, 0.0, &[1]) },
        Step::Submit { stream: 0, packet: delta_packet(0, 1.0, &[2]) },
        Step::Submit { stream: 0, packet: keyframe_packet(0, 2.0, &[3]) },
        Step::Submit { stream: 0, packet: delta_packet(0, 3.0, &[4]) },
    ];
    let mut options = EngineOptions::default();
    options.force_seekable = true;
    options.seekable_cache = true;
    // Wide enough that the reader buffers the whole scripted span (pts 0..3) instead of stopping
    // once `readahead_secs` of forward duration is reached, which the default 1.0 would do after
    // just the first two packets.
    options.readahead_secs = 10.0;
    let producer = ScriptedProducer::new(steps);
    let seeks = producer.seeks.clone();
    let source = Cursor::new(Vec::<u8>::new());
    let (engine, consumer) = Engine::open(producer, source, options).expect("engine opens");

    // `try_read` marks the stream active, which is what makes the reader buffer anything at all.
    let _ = consumer.try_read(0);
    std::thread::sleep(Duration::from_millis(50));

    assert!(consumer.seek(Timestamp::new(2.0), SeekFlags::HR).is_ok());
    assert!(seeks.lock().unwrap().is_empty(), "in-buffer seek must not reach the producer");

    engine.terminate();
}

#[test]
fn terminate_wakes_a_consumer_blocked_with_no_packets() {
    let _ = env_logger::builder().is_test(true).try_init();
    let video = StreamHeader::new(0, StreamKind::Video, "h264");
    let steps = vec![Step::Register(video)];
    let (engine, consumer) = open(steps, EngineOptions::default());

    std::thread::sleep(Duration::from_millis(20));

    let blocked = std::thread::spawn(move || consumer.read(0));

    std::thread::sleep(Duration::from_millis(20));
    engine.terminate();

    let result = blocked.join().expect("reader thread panicked");
    assert!(result.is_none(), "terminate must surface as end-of-stream, not a hang");
}

#[test]
fn repeated_reads_prune_back_buffer_to_budget() {
    let _ = env_logger::builder().is_test(true).try_init();
    let video = StreamHeader::new(0, StreamKind::Video, "h264");
    let mut steps = vec![Step::Register(video)];
    for i in 0..24 {
        let pts = i as f64 * 0.1;
        let packet = if i % 4 == 0 {
            keyframe_packet(0, pts, &[0u8; 64])
        }
        else {
            delta_packet(0, pts, &[0u8; 64])
        };
        steps.push(Step::Submit { stream: 0, packet });
    }
    let mut options = EngineOptions::default();
    // Wide enough that the reader buffers the whole scripted span ahead of consumption instead of
    // pacing itself to the default 1.0s readahead target.
    options.readahead_secs = 10.0;
    // At least one keyframe-range's worth of bytes (4 packets * (64 + overhead) each): the most
    // recently dequeued range can never be pruned below its own size, since eviction only frees a
    // range once a *subsequent* keyframe closes it (§4.C).
    options.max_bytes_bw = 600;
    let (engine, consumer) = open(steps, options);

    for _ in 0..24 {
        if consumer.read(0).is_none() {
            break;
        }
    }

    assert!(consumer.back_buffer_bytes() <= 600);

    engine.terminate();
}
