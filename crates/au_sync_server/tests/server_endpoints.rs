//! End-to-end tests against a server bound to an ephemeral port.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use au_core::model::{CreateTodoParams, WorkspaceDocument};
use au_core::store::DirectoryStore;
use au_sync_server::{handlers::router, AppState};
use tokio::sync::watch;

async fn start_server(store: Arc<DirectoryStore>) -> (SocketAddr, watch::Sender<bool>) {
    let (shutdown_tx, _) = watch::channel(false);
    let state = AppState {
        store,
        shutdown: shutdown_tx.clone(),
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, shutdown_tx)
}

fn create_todo_params(title: &str) -> CreateTodoParams {
    CreateTodoParams {
        title: title.to_string(),
        description: String::new(),
        status: None,
        annotations: BTreeMap::new(),
        created_by: "Ada <ada@x>".to_string(),
    }
}

#[tokio::test]
async fn listing_and_fetching_workspaces() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryStore::open(dir.path()).unwrap());
    let meta = store.create_workspace("Served workspace").unwrap();
    let (addr, _shutdown) = start_server(store).await;

    let body = reqwest::get(format!("http://{addr}/workspaces"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let listed: serde_json::Value = serde_json::from_str(&body).unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], meta.id.as_str());
    assert_eq!(listed[0]["alias"], "Served workspace");
    assert!(listed[0]["size_in_bytes"].as_u64().unwrap() > 0);

    let response = reqwest::get(format!("http://{addr}/workspaces/{}", meta.id))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = reqwest::get(format!(
        "http://{addr}/workspaces/01HYJ4ZVXN3Y5X0GB3ZM5ZQ5RA"
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn download_returns_a_loadable_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryStore::open(dir.path()).unwrap());
    let meta = store.create_workspace("Downloadable").unwrap();
    let (addr, _shutdown) = start_server(store).await;

    let response = reqwest::get(format!("http://{addr}/workspaces/{}/download", meta.id))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/octet-stream"
    );
    let bytes = response.bytes().await.unwrap();
    let document = WorkspaceDocument::load(&bytes).unwrap();
    assert_eq!(document.alias().as_deref(), Some("Downloadable"));
}

#[tokio::test]
async fn sync_endpoint_converges_a_remote_peer() {
    let server_dir = tempfile::tempdir().unwrap();
    let server_store = Arc::new(DirectoryStore::open(server_dir.path()).unwrap());
    let meta = server_store.create_workspace("Synced over http").unwrap();

    // the server side starts with one todo
    {
        let mut handle = server_store.open_workspace(&meta.id, true).unwrap();
        handle
            .document()
            .create_todo(create_todo_params("existing on server"))
            .unwrap();
        handle.flush().unwrap();
        handle.close();
    }

    // the client peer imports the document and adds a todo of its own
    let client = {
        let reader = server_store.open_workspace(&meta.id, false).unwrap();
        WorkspaceDocument::load(&reader.document().save()).unwrap()
    };
    client
        .create_todo(create_todo_params("added by client"))
        .unwrap();

    let (addr, _shutdown) = start_server(server_store.clone()).await;
    let (_tx, shutdown_rx) = watch::channel(false);
    au_core::sync::connect_and_sync(
        &format!("http://{addr}"),
        &meta.id,
        &client,
        true,
        shutdown_rx,
    )
    .await
    .unwrap();

    assert_eq!(client.list_todos().unwrap().len(), 2);

    // the server flushes the merged state shortly after the session ends
    let mut titles = Vec::new();
    for _ in 0..50 {
        let merged = server_store.open_workspace(&meta.id, false).unwrap();
        titles = merged
            .document()
            .list_todos()
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        if titles.len() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    titles.sort();
    assert_eq!(titles, vec!["added by client", "existing on server"]);
}

#[tokio::test]
async fn sync_endpoint_conflicts_while_the_workspace_is_locked() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryStore::open(dir.path()).unwrap());
    let meta = store.create_workspace("Locked").unwrap();

    // hold the write lock so the server cannot open the workspace
    let mut held = store.open_workspace(&meta.id, true).unwrap();

    let (addr, _shutdown) = start_server(store.clone()).await;
    let client = WorkspaceDocument::load(&held.document().save()).unwrap();
    let (_tx, shutdown_rx) = watch::channel(false);
    let result = au_core::sync::connect_and_sync(
        &format!("http://{addr}"),
        &meta.id,
        &client,
        true,
        shutdown_rx,
    )
    .await;
    assert!(result.is_err(), "upgrade should be refused with a 409");

    held.close();
}
