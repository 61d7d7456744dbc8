//! Integration tests for the bounded frame pool

use camrec_core::capture::{ImageReader, PoolPolicy};
use camrec_core::synthetic::test_pattern;
use camrec_core::types::PixelFormat;
use camrec_core::CamrecError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn reader(capacity: usize, policy: PoolPolicy) -> ImageReader {
    ImageReader::new(16, 8, PixelFormat::Yuv420, capacity, policy).unwrap()
}

fn frame(n: u64) -> camrec_core::types::Image {
    test_pattern(16, 8, PixelFormat::Yuv420, n, n * 1_000)
}

#[test]
fn test_sixth_lease_exhausts_pool() {
    let reader = reader(5, PoolPolicy::Reject);
    let writer = reader.writer();

    let mut leases = Vec::new();
    for n in 0..5 {
        writer.queue_image(frame(n)).unwrap();
        leases.push(reader.acquire_next_image().unwrap().unwrap());
    }
    assert_eq!(reader.stats().acquired, 5);

    // No room for a sixth frame, and nothing more to lease
    assert!(matches!(
        writer.queue_image(frame(5)),
        Err(CamrecError::PoolExhausted { capacity: 5 })
    ));
    assert!(matches!(
        reader.acquire_latest_image(),
        Err(CamrecError::PoolExhausted { capacity: 5 })
    ));
    assert_eq!(reader.stats().frames_rejected, 1);

    // One release makes room again
    leases.pop().unwrap().release();
    writer.queue_image(frame(6)).unwrap();
    let lease = reader.acquire_latest_image().unwrap().unwrap();
    assert_eq!(lease.timestamp_ns(), 6_000);
}

#[test]
fn test_leases_arrive_in_order() {
    let reader = reader(5, PoolPolicy::Reject);
    let writer = reader.writer();
    for n in 0..3 {
        writer.queue_image(frame(n)).unwrap();
    }

    let stamps: Vec<u64> = (0..3)
        .map(|_| {
            let lease = reader.acquire_next_image().unwrap().unwrap();
            let ts = lease.timestamp_ns();
            lease.release();
            ts
        })
        .collect();
    assert_eq!(stamps, vec![0, 1_000, 2_000]);
    assert!(reader.acquire_next_image().unwrap().is_none());
}

#[test]
fn test_listener_runs_on_writer_thread() {
    let reader = reader(2, PoolPolicy::Reject);
    let seen = Arc::new(AtomicUsize::new(0));
    let listener_seen = Arc::clone(&seen);
    let writer_thread = Arc::new(parking_lot::Mutex::new(None));
    let listener_thread = Arc::clone(&writer_thread);

    reader.set_on_image_available(move |consumer| {
        *listener_thread.lock() = Some(std::thread::current().id());
        if let Ok(Some(lease)) = consumer.acquire_latest_image() {
            listener_seen.fetch_add(1, Ordering::SeqCst);
            lease.release();
        }
    });

    let writer = reader.writer();
    let producer = std::thread::spawn(move || {
        for n in 0..20 {
            writer.queue_image(frame(n)).unwrap();
        }
        std::thread::current().id()
    });
    let producer_id = producer.join().unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 20);
    assert_eq!(*writer_thread.lock(), Some(producer_id));
    assert_eq!(reader.stats().acquired, 0);
}

#[test]
fn test_blocking_writer_resumes_after_release() {
    let reader = reader(1, PoolPolicy::Block);
    let writer = reader.writer();

    writer.queue_image(frame(0)).unwrap();
    let lease = reader.acquire_next_image().unwrap().unwrap();

    let blocked_writer = writer.clone();
    let producer = std::thread::spawn(move || blocked_writer.queue_image(frame(1)));

    std::thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished());

    lease.release();
    producer.join().unwrap().unwrap();
    let lease = reader.acquire_next_image().unwrap().unwrap();
    assert_eq!(lease.timestamp_ns(), 1_000);
}

#[test]
fn test_close_is_idempotent() {
    let reader = reader(3, PoolPolicy::Reject);
    let writer = reader.writer();
    writer.queue_image(frame(0)).unwrap();
    let lease = reader.acquire_next_image().unwrap().unwrap();

    reader.close();
    reader.close();
    assert!(writer.is_closed());
    assert!(writer.queue_image(frame(1)).is_err());

    // Outstanding leases can still be returned
    lease.release();
}
