use crate::*;

use std::time::Duration;

use anyhow::Result;

#[test]
fn abandoned_transfer_is_reclaimed() -> Result<()> {
    let collector = Collector::new();

    // Feed all but the final chunk, then abandon the transfer.
    let mut bufs = chunks(1, &[7u8; 40], 4);
    let last = bufs.pop().unwrap();
    let kept = bufs.len();
    for buf in bufs {
        collector.unchunker.add(buf)?;
    }

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(collector.unchunker.gc(Duration::from_millis(5)), kept);
    assert_eq!(collector.unchunker.pending_messages(), 0);

    // The straggler now starts a fresh (and incomplete) message.
    collector.unchunker.add(last)?;
    assert!(collector.messages().is_empty());
    assert_eq!(collector.unchunker.pending_messages(), 1);
    Ok(())
}

#[test]
fn completed_messages_are_not_subject_to_gc() -> Result<()> {
    let collector = Collector::new();
    for buf in chunks(1, b"done before the sweep", 5) {
        collector.unchunker.add(buf)?;
    }
    assert_eq!(collector.messages().len(), 1);

    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(collector.unchunker.gc(Duration::ZERO), 0);
    assert_eq!(collector.messages().len(), 1);
    Ok(())
}

#[test]
fn gc_only_sweeps_messages_past_max_age() -> Result<()> {
    let collector = Collector::new();

    let stale = chunks(1, &[1u8; 9], 3);
    for buf in &stale[..2] {
        collector.unchunker.add(buf.clone())?;
    }
    std::thread::sleep(Duration::from_millis(30));

    let fresh = chunks(2, &[2u8; 9], 3);
    collector.unchunker.add(fresh[0].clone())?;

    // Only id 1 is older than 15ms; its two fragments are discarded.
    assert_eq!(collector.unchunker.gc(Duration::from_millis(15)), 2);
    assert_eq!(collector.unchunker.pending_messages(), 1);

    // Id 2 can still complete.
    for buf in &fresh[1..] {
        collector.unchunker.add(buf.clone())?;
    }
    let messages = collector.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].as_ref(), &[2u8; 9]);
    Ok(())
}
