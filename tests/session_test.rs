//! Upload cache tests, including concurrent sessions

use std::sync::Arc;
use std::thread;

use alchemy_db::session::UploadCache;

fn document(generator: &str) -> Vec<u8> {
    format!(
        r#"{{"config": {{"input_expressions": {{"generator": "{generator}", "params": {{}}}}}},
            "collisions_data": {{"collision_0": {{"state": ["a"]}}}}}}"#
    )
    .into_bytes()
}

#[test]
fn test_concurrent_sessions_do_not_mix() {
    let cache = Arc::new(UploadCache::new());

    let handles: Vec<_> = ["BTree", "Fontana", "from_file", "BTree"]
        .into_iter()
        .map(|generator| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let session = cache.open_session();
                for i in 0..5 {
                    cache
                        .upload(session, &format!("{generator}-{i}.json"), &document(generator))
                        .unwrap();
                }
                (session, generator)
            })
        })
        .collect();

    let mut sessions = Vec::new();
    for handle in handles {
        let (session, generator) = handle.join().unwrap();
        let listing = cache.uploads(session).unwrap();
        assert_eq!(listing.len(), 5);
        assert_eq!(listing[4].label, format!("File 5: {generator}"));
        sessions.push(session);
    }

    sessions.sort();
    sessions.dedup();
    assert_eq!(sessions.len(), 4);
    assert_eq!(cache.session_count(), 4);

    for session in sessions {
        assert!(cache.close_session(session));
    }
    assert_eq!(cache.session_count(), 0);
}

#[test]
fn test_malformed_upload_leaves_session_unchanged() {
    let cache = UploadCache::new();
    let session = cache.open_session();

    assert!(cache.upload(session, "bad.json", b"{not json").is_err());
    assert!(cache.upload(session, "empty.json", b"{\"config\": {}}").is_err());
    assert!(cache
        .upload(session, "key.json", br#"{"collisions_data": {"collision_x": {}}}"#)
        .unwrap_err()
        .is_validation());
    assert!(cache.upload(session, "bytes.json", &[0xff, 0xfe]).unwrap_err().is_validation());

    assert!(cache.uploads(session).unwrap().is_empty());
}

#[test]
fn test_unknown_generator_label() {
    let cache = UploadCache::new();
    let session = cache.open_session();
    cache
        .upload(session, "bare.json", br#"{"collisions_data": {}}"#)
        .unwrap();
    assert_eq!(cache.uploads(session).unwrap()[0].label, "File 1: unknown");
}
