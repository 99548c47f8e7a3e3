//! Assertions shared across integration tests

use wavy_history::{Collection, Listen, ListenId, TaskSnapshot, TaskState};

/// Assert the collection holds exactly listens `0..total` of the fixture history
pub fn assert_complete_history(collection: &Collection<Listen>, total: u64) {
    assert_eq!(collection.len() as u64, total, "unique listens");
    for i in 0..total {
        assert!(
            collection.contains(&ListenId(format!("listen-{i}"))),
            "listen-{i} missing"
        );
    }
}

/// Assert a snapshot describes a completed task with progress at its total
pub fn assert_completed_at(snapshot: &TaskSnapshot, total: u64) {
    assert_eq!(snapshot.state, TaskState::Completed);
    assert_eq!(snapshot.required, Some(total));
    assert_eq!(snapshot.current, total);
}
