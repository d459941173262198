/// Integration tests for the conversation store
///
/// Exercises the full persistence lifecycle against throwaway SQLite
/// databases: chronological ordering (including timestamp ties), the pinned
/// history-limit behavior, session lookback windows, retention purge, and
/// transactional rollback under a simulated write fault.
use proptest::prelude::*;
use tempfile::TempDir;
use valet_engine::db::{ConversationRepository, Database, MessageRole};

async fn setup() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("valet.db")).await.unwrap();
    (temp_dir, db)
}

#[tokio::test]
async fn test_history_is_chronological() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    for i in 0..10 {
        let role = if i % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        let agent = (role == MessageRole::Assistant).then_some("EchoAgent");
        repo.save("s1", role, &format!("message {i}"), agent)
            .await
            .unwrap();
    }

    let history = repo.history("s1", None).await.unwrap();
    assert_eq!(history.len(), 10);
    for window in history.windows(2) {
        assert!(window[0].timestamp <= window[1].timestamp);
        assert!(window[0].id < window[1].id);
    }
    for (i, message) in history.iter().enumerate() {
        assert_eq!(message.content, format!("message {i}"));
    }

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_identical_timestamps_keep_insertion_order() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    for i in 0..5 {
        repo.save("s1", MessageRole::User, &format!("m{i}"), None)
            .await
            .unwrap();
    }

    // Force every row onto the same timestamp; insertion order must break
    // the tie.
    sqlx::query("UPDATE conversations SET timestamp = 1700000000000")
        .execute(db.pool())
        .await
        .unwrap();

    let history = repo.history("s1", None).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_unicode_content_roundtrips_byte_identical() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    let content = "こんにちは 🌦️ — ¿qué tiempo hace? \u{200b}\n\ttabs and \"quotes\"";
    repo.save("s1", MessageRole::User, content, None).await.unwrap();

    let history = repo.history("s1", None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content.as_bytes(), content.as_bytes());
    assert_eq!(history[0].agent_name, None);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_history_limit_behavior_is_pinned() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    for i in 0..6 {
        repo.save("s1", MessageRole::User, &format!("m{i}"), None)
            .await
            .unwrap();
    }

    // None and 0 both mean "everything".
    assert_eq!(repo.history("s1", None).await.unwrap().len(), 6);
    assert_eq!(repo.history("s1", Some(0)).await.unwrap().len(), 6);

    // A positive limit returns the most recent N, oldest first.
    let tail = repo.history("s1", Some(3)).await.unwrap();
    let contents: Vec<&str> = tail.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m3", "m4", "m5"]);

    // A limit beyond the session size returns everything.
    assert_eq!(repo.history("s1", Some(100)).await.unwrap().len(), 6);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_recent_sessions_window_and_ordering() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    repo.save("old-session", MessageRole::User, "ancient", None)
        .await
        .unwrap();
    repo.save("busy-session", MessageRole::User, "q1", None).await.unwrap();
    repo.save("busy-session", MessageRole::Assistant, "a1", Some("EchoAgent"))
        .await
        .unwrap();
    repo.save("quiet-session", MessageRole::User, "q", None).await.unwrap();

    // Push one session entirely outside the lookback window.
    let ten_days_ago = chrono::Utc::now().timestamp_millis() - 10 * 86_400_000;
    sqlx::query("UPDATE conversations SET timestamp = ? WHERE session_id = 'old-session'")
        .bind(ten_days_ago)
        .execute(db.pool())
        .await
        .unwrap();

    // Make busy-session the most recently active, strictly newer than the
    // quiet session's rows.
    let newest = chrono::Utc::now().timestamp_millis() + 60_000;
    sqlx::query("UPDATE conversations SET timestamp = ? WHERE session_id = 'busy-session'")
        .bind(newest)
        .execute(db.pool())
        .await
        .unwrap();

    let sessions = repo.recent_sessions(7, 10).await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();

    assert_eq!(ids, vec!["busy-session", "quiet-session"]);
    assert_eq!(sessions[0].message_count, 2);
    assert!(!ids.contains(&"old-session"));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_statistics_reflect_roles_and_bounds() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    repo.save("s1", MessageRole::User, "q1", None).await.unwrap();
    repo.save("s1", MessageRole::Assistant, "a1", Some("EchoAgent"))
        .await
        .unwrap();
    repo.save("s2", MessageRole::User, "q2", None).await.unwrap();

    let stats = repo.statistics().await.unwrap();
    assert_eq!(stats.total_messages, 3);
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.user_messages, 2);
    assert_eq!(stats.assistant_messages, 1);
    assert!(stats.oldest_timestamp.unwrap() <= stats.newest_timestamp.unwrap());

    // Idempotent absent writes.
    assert_eq!(stats, repo.statistics().await.unwrap());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_purge_removes_only_old_messages() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    repo.save("s1", MessageRole::User, "old", None).await.unwrap();
    repo.save("s1", MessageRole::User, "new", None).await.unwrap();

    let forty_days_ago = chrono::Utc::now().timestamp_millis() - 40 * 86_400_000;
    sqlx::query("UPDATE conversations SET timestamp = ? WHERE content = 'old'")
        .bind(forty_days_ago)
        .execute(db.pool())
        .await
        .unwrap();

    let deleted = repo.purge_older_than(30).await.unwrap();
    assert_eq!(deleted, 1);

    let history = repo.history("s1", None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "new");

    // Nothing left to purge on a second pass.
    assert_eq!(repo.purge_older_than(30).await.unwrap(), 0);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_write_fault_rolls_back_and_surfaces_error() {
    let (_tmp, db) = setup().await;
    let repo = db.conversations();

    // Simulated write fault: the second insert trips an abort trigger.
    sqlx::raw_sql(
        "CREATE TRIGGER simulated_write_fault BEFORE INSERT ON conversations \
         WHEN NEW.content = 'boom' \
         BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;",
    )
    .execute(db.pool())
    .await
    .unwrap();

    repo.save("s1", MessageRole::User, "first", None).await.unwrap();

    let result = repo.save("s1", MessageRole::User, "boom", None).await;
    assert!(result.is_err(), "the caller must receive the storage fault");

    // The first message persisted; the failed write left nothing behind.
    let history = repo.history("s1", None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "first");

    // The store stays usable afterwards.
    repo.save("s1", MessageRole::User, "second", None).await.unwrap();
    assert_eq!(repo.history("s1", None).await.unwrap().len(), 2);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_sessions_are_disjoint() {
    let (_tmp, db) = setup().await;

    // Independent writers on disjoint sessions serialize through the pool
    // without interfering.
    let repo_a = db.conversations();
    let repo_b = db.conversations();

    let writer_a = async {
        for i in 0..10 {
            repo_a
                .save("session-a", MessageRole::User, &format!("a{i}"), None)
                .await
                .unwrap();
        }
    };
    let writer_b = async {
        for i in 0..10 {
            repo_b
                .save("session-b", MessageRole::User, &format!("b{i}"), None)
                .await
                .unwrap();
        }
    };
    tokio::join!(writer_a, writer_b);

    let a = repo_a.history("session-a", None).await.unwrap();
    let b = repo_b.history("session-b", None).await.unwrap();
    assert_eq!(a.len(), 10);
    assert_eq!(b.len(), 10);
    assert!(a.iter().all(|m| m.content.starts_with('a')));
    assert!(b.iter().all(|m| m.content.starts_with('b')));

    db.close().await.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// For any sequence of saves, history returns them in non-decreasing
    /// timestamp order with insertion order preserved.
    #[test]
    fn prop_history_preserves_save_order(
        contents in prop::collection::vec("[a-zA-Z0-9 ]{0,32}", 1..16),
        roles in prop::collection::vec(any::<bool>(), 16),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let temp_dir = TempDir::new().unwrap();
            let db = Database::new(&temp_dir.path().join("prop.db")).await.unwrap();
            let repo: ConversationRepository = db.conversations();

            for (i, content) in contents.iter().enumerate() {
                let role = if roles[i % roles.len()] {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                };
                repo.save("prop-session", role, content, None).await.unwrap();
            }

            let history = repo.history("prop-session", None).await.unwrap();
            assert_eq!(history.len(), contents.len());
            for (message, expected) in history.iter().zip(contents.iter()) {
                assert_eq!(&message.content, expected);
            }
            for window in history.windows(2) {
                assert!(window[0].timestamp <= window[1].timestamp);
            }

            db.close().await.unwrap();
        });
    }
}
