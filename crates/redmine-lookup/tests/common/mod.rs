//! Common fixtures shared across integration tests.

#![allow(dead_code)]

use redmine_lookup::model::JournalDetail;
use redmine_lookup::transport::in_memory::InMemoryTracker;
use redmine_lookup::{Integration, LookupOptions, Transport};
use std::path::PathBuf;
use std::sync::Arc;

/// Key accepted for searches, reads and writes.
pub const USER_KEY: &str = "user-key";

/// Key accepted for the admin-only endpoints.
pub const ADMIN_KEY: &str = "admin-key";

/// Options authenticated with both keys.
pub fn options() -> LookupOptions {
    LookupOptions::new("https://redmine.test")
        .with_api_key(USER_KEY)
        .with_admin_api_key(ADMIN_KEY)
}

/// A status-change journal detail.
pub fn status_change(from: u64, to: u64) -> JournalDetail {
    JournalDetail {
        property: "attr".to_string(),
        name: "status_id".to_string(),
        old_value: Some(from.to_string()),
        new_value: Some(to.to_string()),
    }
}

/// A tracker with issues 101 and 205 mentioning `8.8.8.8`.
///
/// Issue 101 has two notes and one pure status-change journal; issue 205 has
/// only a pure status-change journal and is assigned to Grace Hopper.
pub fn seeded_tracker() -> InMemoryTracker {
    let tracker = InMemoryTracker::new();
    tracker.add_status(1, "New", false);
    tracker.add_status(2, "In Progress", false);
    tracker.add_status(5, "Closed", true);
    tracker.add_user(5, "Ada", "Lovelace");
    tracker.add_user(7, "Grace", "Hopper");

    tracker.create_issue(101, "Beaconing to 8.8.8.8", "Seen from build agents", 1);
    tracker.append_journal(101, "First sighting", Vec::new());
    tracker.append_journal(101, "", vec![status_change(2, 1)]);
    tracker.append_journal(101, "Seen again on agent-04", Vec::new());

    tracker.create_issue(205, "Phishing landing page", "Resolves to 8.8.8.8", 2);
    tracker.append_journal(205, "", vec![status_change(1, 2)]);
    tracker.assign(205, 7);

    tracker.create_issue(300, "Unrelated", "Printer on fire", 1);
    tracker
}

/// Integration over `tracker` with `options`.
pub fn integration_with(tracker: &Arc<InMemoryTracker>, options: LookupOptions) -> Integration {
    Integration::with_transport(options, Arc::clone(tracker) as Arc<dyn Transport>)
}

/// Seeded tracker plus a fully credentialed integration over it.
pub fn setup() -> (Arc<InMemoryTracker>, Integration) {
    let tracker = Arc::new(seeded_tracker());
    let integration = integration_with(&tracker, options());
    (tracker, integration)
}

/// Path of the compiled CLI binary.
pub fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_redmine-lookup"))
}
