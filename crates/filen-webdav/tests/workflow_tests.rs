//! Multi-step workflow tests for the gateway.
//!
//! These drive full CRUD cycles over HTTP the way a mounted client would:
//! create, list, modify, move, and delete across nested directories.

mod common;

use common::{
    assert_file_content, assert_not_found, multi_chunk_content, random_bytes, sha256, TestServer,
};
use reqwest::StatusCode;

#[tokio::test]
async fn test_create_populate_delete_cycle() {
    let server = TestServer::single().await;

    server.mkcol_ok("/project").await;
    server.put_ok("/project/readme.txt", b"Project README".to_vec()).await;
    server.put_ok("/project/config.json", b"{}".to_vec()).await;
    server.put_ok("/project/data.bin", random_bytes(5000)).await;

    assert_file_content(&server, "/project/readme.txt", b"Project README").await;
    assert_file_content(&server, "/project/config.json", b"{}").await;

    server.put_ok("/project/config.json", b"{\"version\": 2}".to_vec()).await;
    assert_file_content(&server, "/project/config.json", b"{\"version\": 2}").await;

    server.delete_ok("/project/data.bin").await;
    assert_not_found(&server, "/project/data.bin").await;
    assert_file_content(&server, "/project/readme.txt", b"Project README").await;
}

#[tokio::test]
async fn test_nested_directories() {
    let server = TestServer::single().await;

    server.mkcol_ok("/a").await;
    server.mkcol_ok("/a/b").await;
    server.mkcol_ok("/a/b/c").await;
    server.put_ok("/a/b/c/deep.txt", b"deep".to_vec()).await;

    assert_file_content(&server, "/a/b/c/deep.txt", b"deep").await;

    // PUT creates missing parents on its own.
    server.put_ok("/x/y/z/auto.txt", b"auto".to_vec()).await;
    assert_file_content(&server, "/x/y/z/auto.txt", b"auto").await;
}

#[tokio::test]
async fn test_large_body_roundtrip() {
    let server = TestServer::single().await;

    let content = multi_chunk_content(3);
    let hash = sha256(&content);
    server.put_ok("/large.bin", content).await;

    let retrieved = server.get_bytes("/large.bin").await.unwrap();
    assert_eq!(sha256(&retrieved), hash);

    let head = server.head("/large.bin").await;
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(
        head.headers().get("content-length").unwrap(),
        &retrieved.len().to_string()
    );
}

#[tokio::test]
async fn test_empty_put_then_write_then_read() {
    let server = TestServer::single().await;

    // Scenario: Finder opens the file before writing bytes.
    let resp = server.put("/a.txt", Vec::new()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // The placeholder is immediately visible and empty.
    let resp = server.get("/a.txt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-length").unwrap(), "0");
    assert!(resp.bytes().await.unwrap().is_empty());

    let (status, body) = server.propfind_body("/", "1").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("a.txt"));
    assert!(body.contains("<D:getcontentlength>0</D:getcontentlength>"));

    // The real write promotes the path to the store.
    server.put_ok("/a.txt", b"hello".to_vec()).await;
    let resp = server.get("/a.txt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-length").unwrap(), "5");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"hello");
    assert!(server.sdk.contains("/a.txt"));
}

#[tokio::test]
async fn test_delete_purges_every_tier() {
    let server = TestServer::single().await;

    server.put_ok("/real.txt", b"data".to_vec()).await;
    server.delete_ok("/real.txt").await;
    assert_not_found(&server, "/real.txt").await;

    // Virtual tier.
    server.put_ok("/ghost.txt", Vec::new()).await;
    server.delete_ok("/ghost.txt").await;
    assert_not_found(&server, "/ghost.txt").await;

    let resp = server.head("/ghost.txt").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let (status, _) = server.propfind_body("/ghost.txt", "0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_over_directory_is_forbidden() {
    let server = TestServer::single().await;
    server.mkcol_ok("/dir").await;

    let resp = server.put("/dir", b"nope".to_vec()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_put_under_file_parent_is_precondition_failed() {
    let server = TestServer::single().await;
    server.put_ok("/file.txt", b"x".to_vec()).await;

    let resp = server.put("/file.txt/child.txt", b"y".to_vec()).await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_mkcol_is_lenient_on_existing_directory() {
    let server = TestServer::single().await;
    server.mkcol_ok("/d").await;
    // The SDK de-duplicates; the second call succeeds the same way.
    server.mkcol_ok("/d").await;
}

#[tokio::test]
async fn test_mkcol_without_parent_fails() {
    let server = TestServer::single().await;
    let resp = server.mkcol("/missing/child").await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_options_advertises_methods() {
    let server = TestServer::single().await;
    let resp = server.req("OPTIONS", "/").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let allow = resp.headers().get("allow").unwrap().to_str().unwrap();
    for verb in ["PROPFIND", "MKCOL", "COPY", "MOVE", "PUT", "DELETE"] {
        assert!(allow.contains(verb), "Allow missing {verb}");
    }
    assert_eq!(resp.headers().get("dav").unwrap(), "1, 2");
    assert_eq!(resp.headers().get("server").unwrap(), "Filen WebDAV");
    assert_eq!(resp.headers().get("ms-author-via").unwrap(), "DAV");
}

#[tokio::test]
async fn test_percent_encoded_paths() {
    let server = TestServer::single().await;

    server.put_ok("/hello%20world.txt", b"spaced".to_vec()).await;
    assert_file_content(&server, "/hello%20world.txt", b"spaced").await;

    let (status, body) = server.propfind_body("/", "1").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("hello%20world.txt"));
}

#[tokio::test]
async fn test_full_scenario_tree_and_move() {
    let server = TestServer::single().await;

    server.mkcol_ok("/d").await;
    server.mkcol_ok("/d/e").await;
    server.put_ok("/d/e/f", b"xy".to_vec()).await;

    let (status, body) = server.propfind_body("/d", "1").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("/d/e/"));

    let resp = server.move_("/d/e/f", "/d/e/g", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_file_content(&server, "/d/e/g", b"xy").await;
    assert_not_found(&server, "/d/e/f").await;
}
