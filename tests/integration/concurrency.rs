use crate::*;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use shard_core::Unchunker;

#[test]
fn concurrent_senders_and_gc_lose_nothing() {
    const SENDERS: u32 = 8;
    const MESSAGES_PER_SENDER: u32 = 50;

    let unchunker = Arc::new(Unchunker::new());
    let delivered: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    unchunker.on_message(move |message| sink.lock().unwrap().push(message));

    let mut handles = Vec::new();
    for sender in 0..SENDERS {
        let unchunker = unchunker.clone();
        handles.push(std::thread::spawn(move || {
            for n in 0..MESSAGES_PER_SENDER {
                let id = sender * MESSAGES_PER_SENDER + n;
                // Payload encodes the id so delivery can be verified.
                let message = id.to_be_bytes().repeat(5);
                for buf in chunks(id, &message, 3) {
                    unchunker.add(buf).expect("well-formed chunk rejected");
                }
            }
        }));
    }

    // A sweeper runs alongside the senders. The age bound is far above
    // anything reachable in this test, so it must never evict live state.
    let sweeper = {
        let unchunker = unchunker.clone();
        std::thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(unchunker.gc(Duration::from_secs(60)), 0);
                std::thread::yield_now();
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    sweeper.join().unwrap();

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), (SENDERS * MESSAGES_PER_SENDER) as usize);
    assert_eq!(unchunker.pending_messages(), 0);

    // Each message arrived intact, exactly once.
    let mut seen: HashMap<u32, usize> = HashMap::new();
    for message in delivered.iter() {
        let id = u32::from_be_bytes(message[..4].try_into().unwrap());
        assert_eq!(message.as_ref(), id.to_be_bytes().repeat(5));
        *seen.entry(id).or_default() += 1;
    }
    assert!(seen.values().all(|&count| count == 1));
    assert_eq!(seen.len(), (SENDERS * MESSAGES_PER_SENDER) as usize);
}

#[test]
fn unchunker_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Unchunker>();
}
