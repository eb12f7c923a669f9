mod common;

use std::time::Duration;

use bcmxcp::command::{ID_BLOCK_REQ, METER_BLOCK_REQ};
use bcmxcp::frame::{encode_read, FrameError, FRAME_OVERHEAD};
use bcmxcp::transport::{Transport, TransportError};
use bcmxcp::{CommError, Master, Session};
use common::*;

#[test]
fn test_frames_share_a_packet() {
    init_logging();
    let mut ups = reference_ups();
    ups.fragment_len = 8;
    let ups = ups.shared();
    let mut master = Master::new(usb_transport(&ups));

    assert_eq!(
        master.read(METER_BLOCK_REQ).unwrap(),
        meter_block(230.0, 600, 50.0, 1500)
    );
    assert_eq!(master.transport().buffered(), 0);
}

#[test]
fn test_frame_split_across_packets() {
    let mut ups = reference_ups();
    ups.usb_packet = 5;
    let ups = ups.shared();
    let mut master = Master::new(usb_transport(&ups));

    assert_eq!(
        master.read(ID_BLOCK_REQ).unwrap(),
        id_block(&meter_formats(), &alarm_bitmap(), 5)
    );
}

#[test]
fn test_resync_after_noise() {
    let ups = reference_ups().shared();
    ups.lock().unwrap().faults.push_back(Fault::Noise);
    let mut master = Master::new(usb_transport(&ups));

    assert!(master.read(METER_BLOCK_REQ).is_ok());
    assert_eq!(ups.lock().unwrap().count(METER_BLOCK_REQ), 1);
}

#[test]
fn test_empty_transfers() {
    let ups = reference_ups().shared();
    ups.lock().unwrap().empty_reads = 3;
    let mut master = Master::new(usb_transport(&ups));

    assert!(master.read(METER_BLOCK_REQ).is_ok());
    assert_eq!(ups.lock().unwrap().count(METER_BLOCK_REQ), 1);
}

#[test]
fn test_read_timeout_clears_halt() {
    let ups = SimulatedUps::new().shared();
    let mut master = Master::new(usb_transport(&ups));

    assert!(matches!(
        master.read(METER_BLOCK_REQ),
        Err(CommError::Exhausted { attempts: 5, .. })
    ));
    assert_eq!(ups.lock().unwrap().clear_halts, 5);
}

#[test]
fn test_bad_length_clears_buffer() {
    let ups = SimulatedUps::new().shared();
    let mut transport = usb_transport(&ups);
    let frames = ups.lock().unwrap().frames(0x33, &[0x50, 0x00]);
    {
        let mut ups = ups.lock().unwrap();
        ups.inject(&[0xAB, 0x03, 0x00, 0x81]);
        ups.inject(&frames[0]);
    }

    assert!(matches!(
        transport.recv_frame(),
        Err(TransportError::Framing {
            source: FrameError::BadLength { length: 0 }
        })
    ));
    assert_eq!(transport.buffered(), 0);
    assert!(matches!(transport.recv_frame(), Err(TransportError::Timeout)));
}

#[test]
fn test_deadline_covers_whole_response() {
    let mut ups = reference_ups();
    ups.usb_packet = 16;
    ups.read_delay = Duration::from_millis(25);
    let ups = ups.shared();
    let mut transport = usb_transport(&ups);

    // two packets fit easily
    transport.send(&encode_read(METER_BLOCK_REQ)).unwrap();
    assert_eq!(transport.recv_frame().unwrap().len(), 16 + FRAME_OVERHEAD);

    // five fragments in ten packets do not, although each fragment would
    transport.send(&encode_read(ID_BLOCK_REQ)).unwrap();
    let mut frames = 0;
    let err = loop {
        match transport.recv_frame() {
            Ok(_) => frames += 1,
            Err(err) => break err,
        }
    };
    assert!(matches!(err, TransportError::Timeout));
    assert!(frames < 5, "got {} frames", frames);
}

#[test]
fn test_reconnect_drops_buffer() {
    let ups = reference_ups().shared();
    ups.lock().unwrap().faults.push_back(Fault::BrokenPipe);
    let mut master = Master::new(usb_transport(&ups));

    assert!(master.read(METER_BLOCK_REQ).is_ok());
    assert_eq!(ups.lock().unwrap().connects, 2);
}

#[test]
fn test_session_over_usb() {
    let ups = reference_ups().shared();
    let master = Master::new(usb_transport(&ups));
    let mut session = Session::establish(master, fast_settings()).unwrap();

    session.refresh_meters().unwrap();
    assert_eq!(session.load_percent(), Some(40.0));
}
