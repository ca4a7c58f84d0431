mod common;

use common::create_test_dir;
use rs_couchbase::driver::DirectoryCluster;
use rs_couchbase::{ClientError, CouchbaseClient, DirectoryDriver, PasswordAuthenticator, Role};
use serde_json::json;
use std::path::Path;

fn uri(root: &Path) -> String {
    format!("file://{}", root.display())
}

/// Initialize a store with an admin and the `travel` bucket
async fn init_store(root: &Path) {
    DirectoryDriver::new()
        .initialize(
            root,
            &PasswordAuthenticator::new("admin", "admin-pw"),
            &["travel".to_string()],
        )
        .await
        .expect("Should initialize store");
}

async fn connect(root: &Path, username: &str, password: &str) -> Result<CouchbaseClient<DirectoryCluster>, ClientError> {
    CouchbaseClient::connect(&DirectoryDriver::new(), &uri(root), username, password).await
}

#[tokio::test]
async fn test_documents_persist_across_connections() {
    let temp_dir = create_test_dir();
    init_store(temp_dir.path()).await;

    let client = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();
    client
        .import_json(&json!({"city": "Lyon", "tags": ["a"]}), "travel", "hotel::9")
        .await
        .unwrap();
    client
        .import_key("travel", "hotel::9", "stars", &json!(4))
        .await
        .unwrap();
    drop(client);

    let client = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();
    assert_eq!(
        client.export_json("travel", "hotel::9").await.unwrap(),
        json!({"city": "Lyon", "tags": ["a"], "stars": 4})
    );
    assert_eq!(
        client.export_key("travel", "hotel::9", "tags[0]").await.unwrap(),
        json!("a")
    );
}

#[tokio::test]
async fn test_file_import_and_export() {
    let temp_dir = create_test_dir();
    let store = temp_dir.path().join("store");
    init_store(&store).await;
    let client = connect(&store, "admin", "admin-pw").await.unwrap();

    let source = temp_dir.path().join("in.json");
    let target = temp_dir.path().join("out.json");
    std::fs::write(&source, "[\n  1,\n  2\n]\n").unwrap();

    client.import_json_file(&source, "travel", "list").await.unwrap();
    client.export_json_file("travel", "list", &target).await.unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "[1,2]");
}

#[tokio::test]
async fn test_missing_document_and_bucket() {
    let temp_dir = create_test_dir();
    init_store(temp_dir.path()).await;
    let client = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();

    assert!(client.export_json("travel", "ghost").await.unwrap_err().is_not_found());
    assert!(matches!(
        client.import_key("travel", "ghost", "a", &json!(1)).await,
        Err(ClientError::Store(_))
    ));
    assert!(matches!(
        client.export_json("beer", "x").await,
        Err(ClientError::Store(_))
    ));
}

#[tokio::test]
async fn test_wrong_password_and_uninitialized_store() {
    let temp_dir = create_test_dir();

    assert!(matches!(
        connect(temp_dir.path(), "admin", "admin-pw").await,
        Err(ClientError::Connection(_))
    ));

    init_store(temp_dir.path()).await;
    assert!(matches!(
        connect(temp_dir.path(), "admin", "nope").await,
        Err(ClientError::Connection(_))
    ));
}

#[tokio::test]
async fn test_created_user_persists_with_roles() {
    let temp_dir = create_test_dir();
    init_store(temp_dir.path()).await;
    let admin = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();
    admin
        .import_json(&json!({"a": 1}), "travel", "doc")
        .await
        .unwrap();

    admin
        .create_user("viewer", "viewer-pw", &[Role::scoped("data_reader", "travel")])
        .await
        .unwrap();

    let viewer = connect(temp_dir.path(), "viewer", "viewer-pw").await.unwrap();
    assert_eq!(viewer.export_json("travel", "doc").await.unwrap(), json!({"a": 1}));
    assert!(matches!(
        viewer.import_json(&json!({}), "travel", "doc").await,
        Err(ClientError::Authorization(_))
    ));
    assert!(matches!(viewer.list_users().await, Err(ClientError::Authorization(_))));

    let mut names: Vec<String> = admin
        .list_users()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.user.username)
        .collect();
    names.sort();
    assert_eq!(names, vec!["admin".to_string(), "viewer".to_string()]);

    // Password hashes are stored, never the password itself
    let users_file = std::fs::read_to_string(temp_dir.path().join("users.json")).unwrap();
    assert!(!users_file.contains("viewer-pw"));
}

#[tokio::test]
async fn test_invalid_role_is_rejected() {
    let temp_dir = create_test_dir();
    init_store(temp_dir.path()).await;
    let admin = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();

    let result = admin
        .create_user("x", "pw", &[Role::scoped("cluster_admin", "travel")])
        .await;

    assert!(matches!(result, Err(ClientError::Validation(_))));
}

#[tokio::test]
async fn test_reinitialize_keeps_documents() {
    let temp_dir = create_test_dir();
    init_store(temp_dir.path()).await;
    let client = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();
    client.import_json(&json!(1), "travel", "n").await.unwrap();

    init_store(temp_dir.path()).await;

    let client = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();
    assert_eq!(client.export_json("travel", "n").await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_long_document_id_round_trips() {
    let temp_dir = create_test_dir();
    let store = temp_dir.path().join("store");
    init_store(&store).await;
    let client = connect(&store, "admin", "admin-pw").await.unwrap();
    let id = "k".repeat(250);

    let source = temp_dir.path().join("in.json");
    let target = temp_dir.path().join("out.json");
    std::fs::write(&source, "{\"a\": 1}").unwrap();

    client.import_json_file(&source, "travel", &id).await.unwrap();
    client.export_json_file("travel", &id, &target).await.unwrap();
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"a\":1}");

    client.import_key("travel", &id, "b", &json!(2)).await.unwrap();
    assert_eq!(client.export_key("travel", &id, "b").await.unwrap(), json!(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_key_writes_from_separate_drivers() {
    let temp_dir = create_test_dir();
    init_store(temp_dir.path()).await;
    connect(temp_dir.path(), "admin", "admin-pw")
        .await
        .unwrap()
        .import_json(&json!({}), "travel", "doc")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..40 {
        let root = temp_dir.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            let client = connect(&root, "admin", "admin-pw").await?;
            client
                .import_key("travel", "doc", &format!("k{}", i), &json!(i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("Should write key");
    }

    let client = connect(temp_dir.path(), "admin", "admin-pw").await.unwrap();
    let doc = client.export_json("travel", "doc").await.unwrap();
    for i in 0..40 {
        assert_eq!(doc[format!("k{}", i)], json!(i), "key k{} missing", i);
    }
}
