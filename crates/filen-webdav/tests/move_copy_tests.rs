//! COPY and MOVE across the three tiers.

mod common;

use common::{assert_file_content, assert_not_found, random_bytes, sha256, TestServer};
use reqwest::StatusCode;

#[tokio::test]
async fn test_move_backend_file() {
    let server = TestServer::single().await;
    server.put_ok("/src.txt", b"payload".to_vec()).await;

    let resp = server.move_("/src.txt", "/dst.txt", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert_not_found(&server, "/src.txt").await;
    assert_file_content(&server, "/dst.txt", b"payload").await;
}

#[tokio::test]
async fn test_copy_backend_file_bodies_match() {
    let server = TestServer::single().await;
    let content = random_bytes(10_000);
    let hash = sha256(&content);
    server.put_ok("/orig.bin", content).await;

    let resp = server.copy("/orig.bin", "/copy.bin", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let orig = server.get_bytes("/orig.bin").await.unwrap();
    let copy = server.get_bytes("/copy.bin").await.unwrap();
    assert_eq!(sha256(&orig), hash);
    assert_eq!(orig, copy);
}

#[tokio::test]
async fn test_existing_destination_without_overwrite_is_forbidden() {
    let server = TestServer::single().await;
    server.put_ok("/a.txt", b"a".to_vec()).await;
    server.put_ok("/b.txt", b"b".to_vec()).await;

    let resp = server.move_("/a.txt", "/b.txt", false).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    // Nothing moved.
    assert_file_content(&server, "/a.txt", b"a").await;
    assert_file_content(&server, "/b.txt", b"b").await;

    let resp = server.copy("/a.txt", "/b.txt", false).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_overwrite_move_returns_no_content() {
    let server = TestServer::single().await;
    server.put_ok("/a.txt", b"new".to_vec()).await;
    server.put_ok("/b.txt", b"old".to_vec()).await;

    let resp = server.move_("/a.txt", "/b.txt", true).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_not_found(&server, "/a.txt").await;
    assert_file_content(&server, "/b.txt", b"new").await;
}

#[tokio::test]
async fn test_move_source_missing_is_not_found() {
    let server = TestServer::single().await;
    let resp = server.move_("/nope.txt", "/dst.txt", false).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_move_to_itself_is_a_noop() {
    let server = TestServer::single().await;
    server.put_ok("/same.txt", b"stay".to_vec()).await;

    let resp = server.move_("/same.txt", "/same.txt", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_file_content(&server, "/same.txt", b"stay").await;
}

#[tokio::test]
async fn test_missing_destination_header_is_bad_request() {
    let server = TestServer::single().await;
    server.put_ok("/a.txt", b"a".to_vec()).await;

    let resp = server.req("MOVE", "/a.txt").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_destination_without_scheme_is_bad_request() {
    let server = TestServer::single().await;
    server.put_ok("/a.txt", b"a".to_vec()).await;

    let resp = server
        .req("MOVE", "/a.txt")
        .header("Destination", "/b.txt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_destination_on_foreign_host_is_bad_request() {
    let server = TestServer::single().await;
    server.put_ok("/a.txt", b"a".to_vec()).await;

    let resp = server
        .req("MOVE", "/a.txt")
        .header("Destination", "http://evil.example.com/b.txt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_move_into_own_descendant_is_forbidden() {
    let server = TestServer::single().await;
    server.mkcol_ok("/d").await;
    server.mkcol_ok("/d/sub").await;
    server.put_ok("/d/e", b"payload".to_vec()).await;

    // Existing descendant destination, with and without Overwrite.
    let resp = server.move_("/d", "/d/sub", true).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = server.move_("/d", "/d/sub", false).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // A fresh path under the source is still a descendant.
    let resp = server.move_("/d", "/d/newchild", false).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The tree is untouched.
    assert_file_content(&server, "/d/e", b"payload").await;
    let (status, body) = server.propfind_body("/d", "1").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("/d/sub/"));
    assert!(!body.contains("newchild"));
}

#[tokio::test]
async fn test_copy_into_own_descendant_is_forbidden() {
    let server = TestServer::single().await;
    server.mkcol_ok("/tree").await;
    server.put_ok("/tree/leaf.txt", b"leaf".to_vec()).await;

    let resp = server.copy("/tree", "/tree/clone", false).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = server.copy("/tree", "/tree/clone", true).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    assert_file_content(&server, "/tree/leaf.txt", b"leaf").await;
    let (_, body) = server.propfind_body("/tree", "1").await;
    assert!(!body.contains("clone"));
}

#[tokio::test]
async fn test_move_directory_with_contents() {
    let server = TestServer::single().await;
    server.mkcol_ok("/srcdir").await;
    server.put_ok("/srcdir/one.txt", b"1".to_vec()).await;
    server.put_ok("/srcdir/two.txt", b"2".to_vec()).await;

    let resp = server.move_("/srcdir", "/dstdir", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert_not_found(&server, "/srcdir/one.txt").await;
    assert_file_content(&server, "/dstdir/one.txt", b"1").await;
    assert_file_content(&server, "/dstdir/two.txt", b"2").await;
}

#[tokio::test]
async fn test_move_virtual_placeholder() {
    let server = TestServer::single().await;
    server.put_ok("/pending.txt", Vec::new()).await;

    let resp = server.move_("/pending.txt", "/renamed.txt", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert_not_found(&server, "/pending.txt").await;
    let resp = server.get("/renamed.txt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-length").unwrap(), "0");
    assert!(!server.sdk.contains("/renamed.txt"), "placeholder must stay local");
}

#[tokio::test]
async fn test_copy_virtual_placeholder_keeps_source() {
    let server = TestServer::single().await;
    server.put_ok("/pending.txt", Vec::new()).await;

    let resp = server.copy("/pending.txt", "/twin.txt", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    for path in ["/pending.txt", "/twin.txt"] {
        let resp = server.get(path).await;
        assert_eq!(resp.status(), StatusCode::OK, "GET {path}");
        assert_eq!(resp.headers().get("content-length").unwrap(), "0");
    }
}

#[tokio::test]
async fn test_move_scratch_file_renames_on_disk() {
    let server = TestServer::with_scratch_globs(&["Thumbs.db", "*.tmp"]).await;
    server.put_ok("/Thumbs.db", b"cache".to_vec()).await;

    let resp = server.move_("/Thumbs.db", "/other.tmp", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert_not_found(&server, "/Thumbs.db").await;
    assert_file_content(&server, "/other.tmp", b"cache").await;
    assert_eq!(server.sdk.upload_count(), 0);

    // Still exactly one scratch file on disk.
    let count = std::fs::read_dir(server.scratch_dir()).unwrap().count();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_copy_scratch_file_duplicates_on_disk() {
    let server = TestServer::with_scratch_globs(&["Thumbs.db", "*.tmp"]).await;
    server.put_ok("/Thumbs.db", b"cache".to_vec()).await;

    let resp = server.copy("/Thumbs.db", "/copy.tmp", false).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert_file_content(&server, "/Thumbs.db", b"cache").await;
    assert_file_content(&server, "/copy.tmp", b"cache").await;
    let count = std::fs::read_dir(server.scratch_dir()).unwrap().count();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_overwrite_virtual_destination_with_backend_source() {
    let server = TestServer::single().await;
    server.put_ok("/real.txt", b"real bytes".to_vec()).await;
    server.put_ok("/slot.txt", Vec::new()).await;

    let resp = server.move_("/real.txt", "/slot.txt", true).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_file_content(&server, "/slot.txt", b"real bytes").await;
    assert_not_found(&server, "/real.txt").await;
}

#[tokio::test]
async fn test_copy_then_modify_original_leaves_backup() {
    let server = TestServer::single().await;
    let original = random_bytes(8000);
    let original_hash = sha256(&original);
    server.put_ok("/doc.dat", original).await;

    server.copy("/doc.dat", "/doc.dat.bak", false).await;
    server.put_ok("/doc.dat", random_bytes(4000)).await;

    let backup = server.get_bytes("/doc.dat.bak").await.unwrap();
    assert_eq!(sha256(&backup), original_hash);
}
