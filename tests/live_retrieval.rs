#![cfg(feature = "live-tests")]
//! Retrieval against the real wavy.fm API
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features live-tests --test live_retrieval -- --nocapture
//! ```
//!
//! # Environment variables (.env file)
//!
//! - `WAVY_USERNAME` - Account whose public history is fetched
//! - `WAVY_API_BASE` - API base URL (optional)

mod common;

use chrono::{Duration, Utc};
use common::live_config;
use wavy_history::{Retriever, TaskState};

#[tokio::test]
async fn test_live_full_history() {
    let Some((config, username)) = live_config() else {
        eprintln!("Skipping: WAVY_USERNAME not set");
        return;
    };

    let retriever = Retriever::new(config).unwrap();
    let user = retriever.retrieve_user(&username).await.unwrap();
    let task = retriever.retrieve_all_listens(user.id.clone()).unwrap();
    let collection = task.result().await.unwrap();

    println!(
        "{}: {} listens reported, {} retrieved over {} pages",
        user.username,
        collection.reported_total(),
        collection.len(),
        collection.pages_fetched()
    );
    assert_eq!(task.state(), TaskState::Completed);
    assert_eq!(Some(task.progress()), task.required_progress());
}

#[tokio::test]
async fn test_live_recent_history() {
    let Some((config, username)) = live_config() else {
        eprintln!("Skipping: WAVY_USERNAME not set");
        return;
    };

    let retriever = Retriever::new(config).unwrap();
    let user = retriever.retrieve_user(&username).await.unwrap();
    let since = Utc::now() - Duration::days(7);
    let task = retriever.retrieve_listens_since(user.id, since).unwrap();
    let collection = task.result().await.unwrap();

    println!("{} listens in the last week", collection.len());
    assert_eq!(task.state(), TaskState::Completed);
    assert_eq!(task.required_progress(), Some(collection.reported_total()));
}
