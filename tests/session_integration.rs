// tests/session_integration.rs
//! End-to-end live session behaviour across transports

use nxbci_core::codec::{encode_i24, FrameLayout};
use nxbci_core::session::{ByteSource, LiveSession, Pull, ReaderSource, SessionState, StopReason, StopSignal};
use nxbci_core::{IngestError, SessionConfig};
use std::io::{self, Cursor, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

fn raw_frames(frames: usize, channels: usize) -> Vec<u8> {
    (0..frames)
        .flat_map(|f| (0..channels).flat_map(move |c| encode_i24((f * channels + c) as i32)))
        .collect()
}

fn wait_for_state(session: &LiveSession, state: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.state() != state {
        assert!(Instant::now() < deadline, "session never reached {}", state);
        thread::sleep(Duration::from_millis(5));
    }
}

/// Reader that fails with a hard error once its data is exhausted
struct FailingReader {
    data: Cursor<Vec<u8>>,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "link dropped")),
            n => Ok(n),
        }
    }
}

#[test]
fn test_window_holds_last_capacity_frames() {
    let config = SessionConfig::new(16, 500, 4);
    let scale = config.millivolts_per_count();
    let mut session = LiveSession::new(config).unwrap();
    let feeder = session.start_channel().unwrap();

    let stream = raw_frames(2500, 16);
    for chunk in stream.chunks(1000) {
        feeder.feed(chunk).unwrap();
    }
    feeder.flush().unwrap();

    let snapshot = session.get_data().unwrap();
    assert_eq!(snapshot.frames_ingested, 2500);
    assert_eq!(snapshot.len(), 2000);
    for (c, channel) in snapshot.channels.iter().enumerate() {
        assert!((channel[0] - (500 * 16 + c) as f64 * scale).abs() < 1e-9);
        assert!((channel[1999] - (2499 * 16 + c) as f64 * scale).abs() < 1e-9);
    }

    session.stop();
    assert!(matches!(session.get_data(), Err(IngestError::Unavailable(SessionState::Stopped))));
}

#[test]
fn test_reader_end_of_stream_stops_session() {
    let mut stream = raw_frames(300, 4);
    stream.extend([0xAB, 0xCD]);

    let mut session = LiveSession::new(SessionConfig::new(4, 250, 1)).unwrap();
    session.start_reader(Cursor::new(stream)).unwrap();
    wait_for_state(&session, SessionState::Stopped);

    let status = session.status();
    assert_eq!(status.stop_reason, Some(StopReason::SourceClosed));
    assert_eq!(status.frames_ingested, 300);
    assert_eq!(status.codec.truncated_tail_bytes, 2);
    assert!(!status.receiving);

    // the close reason survives an explicit stop
    assert_eq!(session.stop(), StopReason::SourceClosed);
}

#[test]
fn test_reader_error_is_fatal() {
    let reader = FailingReader {
        data: Cursor::new(raw_frames(10, 2)),
    };
    let mut session = LiveSession::new(SessionConfig::new(2, 250, 1)).unwrap();
    session.start_reader(reader).unwrap();
    wait_for_state(&session, SessionState::Stopped);

    match session.status().stop_reason {
        Some(StopReason::Fatal(message)) => assert!(message.contains("link dropped")),
        other => panic!("unexpected stop reason {:?}", other),
    }
    assert_eq!(session.status().frames_ingested, 10);
}

#[test]
fn test_panicking_source_is_contained() {
    let mut calls = 0;
    let source = move |buf: &mut Vec<u8>, _stop: &StopSignal| -> io::Result<Pull> {
        calls += 1;
        if calls > 2 {
            panic!("decoder board on fire");
        }
        buf.extend(raw_frames(1, 1));
        Ok(Pull::Data)
    };

    let mut session = LiveSession::new(SessionConfig::new(1, 250, 1)).unwrap();
    session.start(source).unwrap();
    wait_for_state(&session, SessionState::Stopped);

    match session.stop() {
        StopReason::Fatal(message) => assert!(message.contains("decoder board on fire")),
        other => panic!("unexpected stop reason {:?}", other),
    }
}

#[test]
fn test_idle_source_stops_promptly() {
    struct Silent;
    impl ByteSource for Silent {
        fn pull(&mut self, _buf: &mut Vec<u8>, stop: &StopSignal) -> io::Result<Pull> {
            stop.wait_timeout(Duration::from_millis(20));
            Ok(Pull::Idle)
        }
    }

    let mut session = LiveSession::new(SessionConfig::default()).unwrap();
    session.start(Silent).unwrap();
    assert!(session.is_running());

    let started = Instant::now();
    assert_eq!(session.stop(), StopReason::Requested);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!session.status().receiving);
}

#[test]
fn test_reader_handle_observes_other_thread() {
    let mut session = LiveSession::new(SessionConfig::new(2, 250, 2)).unwrap();
    let reader = session.reader();
    let feeder = session.start_channel().unwrap();

    let observer = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = reader.get_data().unwrap();
            if snapshot.frames_ingested == 100 {
                return snapshot.len();
            }
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
    });

    feeder.feed(&raw_frames(100, 2)).unwrap();
    assert_eq!(observer.join().unwrap(), 100);
}

#[test]
fn test_telemetry_fills_after_buffer_size_readings() {
    let config = SessionConfig::new(2, 250, 1)
        .with_layout(FrameLayout::telemetry())
        .with_telemetry_buffer(5);
    let mut session = LiveSession::new(config).unwrap();
    let feeder = session.start_channel().unwrap();

    let frame = |present: bool| {
        let mut bytes = raw_frames(1, 2);
        if present {
            bytes.extend([0xFF, 0xFF]);
            // accel x = 1 g, temperature offset only
            bytes.extend((8192i16).to_be_bytes());
            bytes.extend([0u8; 12]);
        } else {
            bytes.extend([0u8; 16]);
        }
        bytes
    };

    for i in 0..8 {
        feeder.feed(&frame(i % 2 == 0)).unwrap();
    }
    feeder.flush().unwrap();
    assert!(matches!(
        session.telemetry().snapshot(),
        Err(IngestError::TelemetryNotReady { have: 4, need: 5 })
    ));

    feeder.feed(&frame(true)).unwrap();
    feeder.flush().unwrap();
    let snapshot = session.telemetry().snapshot().unwrap();
    assert_eq!(snapshot.len(), 5);
    assert!(snapshot.accel_x.iter().all(|&g| (g - 1.0).abs() < 1e-12));
    assert!(snapshot.temperature.iter().all(|&t| (t - 21.0).abs() < 1e-12));
    assert_eq!(session.get_data().unwrap().frames_ingested, 9);
}

#[test]
fn test_extended_layout_records_motion() {
    let config = SessionConfig::new(1, 250, 1).with_layout(FrameLayout::extended());
    let mut session = LiveSession::new(config).unwrap();
    let feeder = session.start_channel().unwrap();

    let mut bytes = Vec::new();
    for _ in 0..3 {
        bytes.extend(raw_frames(1, 1));
        let mut block = [0u8; 18];
        block[0] = 0x59;
        block[1..5].copy_from_slice(&4807.038f32.to_be_bytes());
        block[5] = b'N';
        block[6..10].copy_from_slice(&1131.0f32.to_be_bytes());
        block[10] = b'W';
        block[11] = 0x59;
        block[16..18].copy_from_slice(&(-8192i16).to_le_bytes());
        bytes.extend(block);
    }
    feeder.feed(&bytes).unwrap();
    feeder.flush().unwrap();

    let motion = session.motion();
    assert_eq!(motion.attitude.len(), 3);
    assert!((motion.attitude[2].yaw + 45.0).abs() < 1e-9);
    let fix = motion.gps.last().copied().unwrap();
    assert!((fix.latitude - (48.0 + 7.038 / 60.0)).abs() < 1e-4);
    assert!(fix.signed_longitude() < 0.0);
}

#[test]
fn test_tcp_stream_ingest() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let sender = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let stream = raw_frames(400, 8);
        for chunk in stream.chunks(777) {
            socket.write_all(chunk).unwrap();
        }
    });

    let stream = std::net::TcpStream::connect(addr).unwrap();
    let mut session = LiveSession::new(SessionConfig::new(8, 250, 1)).unwrap();
    session.set_connected(true);
    session.start(ReaderSource::tcp(stream).unwrap()).unwrap();

    sender.join().unwrap();
    wait_for_state(&session, SessionState::Stopped);
    let status = session.status();
    assert_eq!(status.stop_reason, Some(StopReason::SourceClosed));
    assert_eq!(status.frames_ingested, 400);
}

#[tokio::test]
async fn test_async_pump_feeds_session() {
    let mut session = LiveSession::new(SessionConfig::new(4, 250, 2)).unwrap();
    let feeder = session.start_channel().unwrap();

    let stream = raw_frames(450, 4);
    let forwarded = nxbci_core::session::pump_async(&stream[..], feeder).await.unwrap();
    assert_eq!(forwarded, stream.len() as u64);

    wait_for_state(&session, SessionState::Stopped);
    let status = session.status();
    assert_eq!(status.stop_reason, Some(StopReason::SourceClosed));
    assert_eq!(status.frames_ingested, 450);
    assert!(!status.connected);
}
