//! Shared harness for gateway integration tests.
//!
//! Boots a real listener on an ephemeral port against the in-memory SDK and
//! exposes one helper per WebDAV verb, mirroring how OS clients drive the
//! protocol over HTTP.

#![allow(dead_code)] // Each test binary uses a subset of the harness.

use filen_webdav::sdk::memory::{MemoryClient, MemoryLogin};
use filen_webdav::{AuthMode, ServerConfig, Tenancy, WebDavServer};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tempfile::TempDir;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";

/// The in-memory SDK's upload chunk size.
pub const CHUNK_SIZE: usize = 1024 * 1024;

pub struct TestServer {
    server: Option<WebDavServer>,
    client: reqwest::Client,
    base: String,
    pub sdk: Arc<MemoryClient>,
    _config_dir: TempDir,
}

impl TestServer {
    /// Single-tenant basic-auth server with no scratch globs.
    pub async fn single() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Single-tenant server with sidecar globs routed to local disk.
    pub async fn with_scratch_globs(globs: &[&str]) -> Self {
        let globs: Vec<String> = globs.iter().map(|g| g.to_string()).collect();
        Self::with_config(move |config| {
            config.temp_files_to_store_on_disk = globs.clone();
        })
        .await
    }

    /// Single-tenant server with a tweaked config.
    pub async fn with_config(tweak: impl Fn(&mut ServerConfig)) -> Self {
        let config_dir = TempDir::new().expect("temp config dir");
        let mut config = ServerConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            config_dir: Some(config_dir.path().to_path_buf()),
            ..Default::default()
        };
        tweak(&mut config);

        let sdk = MemoryClient::new(USERNAME);
        let tenancy = Tenancy::Single {
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
            client: Arc::clone(&sdk) as Arc<dyn filen_webdav::sdk::FilenClient>,
        };
        let server = WebDavServer::start(config, tenancy)
            .await
            .expect("server start");
        let base = server.url();

        Self {
            server: Some(server),
            client: reqwest::Client::new(),
            base,
            sdk,
            _config_dir: config_dir,
        }
    }

    /// Proxy-mode server over a shared login directory.
    pub async fn proxy(login: Arc<MemoryLogin>) -> Self {
        let config_dir = TempDir::new().expect("temp config dir");
        let config = ServerConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            config_dir: Some(config_dir.path().to_path_buf()),
            ..Default::default()
        };
        let server = WebDavServer::start(config, Tenancy::Proxy { login })
            .await
            .expect("server start");
        let base = server.url();

        Self {
            server: Some(server),
            client: reqwest::Client::new(),
            base,
            // Unused in proxy mode; a placeholder keeps the struct uniform.
            sdk: MemoryClient::new("unused"),
            _config_dir: config_dir,
        }
    }

    /// Single-tenant server using digest auth.
    pub async fn digest() -> Self {
        Self::with_config(|config| {
            config.auth_mode = AuthMode::Digest;
        })
        .await
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Where this server keeps its scratch tier on disk.
    pub fn scratch_dir(&self) -> std::path::PathBuf {
        self._config_dir.path().join("tempDiskFiles")
    }

    /// A request with the default credentials attached.
    pub fn req(&self, method: &str, path: &str) -> RequestBuilder {
        self.req_as(method, path, USERNAME, PASSWORD)
    }

    /// A request with explicit credentials (proxy and auth tests).
    pub fn req_as(&self, method: &str, path: &str, user: &str, pass: &str) -> RequestBuilder {
        let method = Method::from_bytes(method.as_bytes()).expect("method");
        self.client
            .request(method, self.url(path))
            .basic_auth(user, Some(pass))
    }

    /// A request with no credentials at all.
    pub fn req_anonymous(&self, method: &str, path: &str) -> RequestBuilder {
        let method = Method::from_bytes(method.as_bytes()).expect("method");
        self.client.request(method, self.url(path))
    }

    pub async fn put(&self, path: &str, body: Vec<u8>) -> Response {
        self.req("PUT", path).body(body).send().await.expect("PUT")
    }

    pub async fn put_ok(&self, path: &str, body: Vec<u8>) {
        let resp = self.put(path, body).await;
        assert_eq!(resp.status(), StatusCode::CREATED, "PUT {path}");
    }

    pub async fn get(&self, path: &str) -> Response {
        self.req("GET", path).send().await.expect("GET")
    }

    pub async fn get_bytes(&self, path: &str) -> Option<Vec<u8>> {
        let resp = self.get(path).await;
        if !resp.status().is_success() {
            return None;
        }
        Some(resp.bytes().await.expect("body").to_vec())
    }

    pub async fn get_range(&self, path: &str, range: &str) -> Response {
        self.req("GET", path)
            .header("Range", range)
            .send()
            .await
            .expect("GET range")
    }

    pub async fn head(&self, path: &str) -> Response {
        self.req("HEAD", path).send().await.expect("HEAD")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.req("DELETE", path).send().await.expect("DELETE")
    }

    pub async fn delete_ok(&self, path: &str) {
        let resp = self.delete(path).await;
        assert_eq!(resp.status(), StatusCode::OK, "DELETE {path}");
    }

    pub async fn mkcol(&self, path: &str) -> Response {
        self.req("MKCOL", path).send().await.expect("MKCOL")
    }

    pub async fn mkcol_ok(&self, path: &str) {
        let resp = self.mkcol(path).await;
        assert_eq!(resp.status(), StatusCode::CREATED, "MKCOL {path}");
    }

    pub async fn propfind(&self, path: &str, depth: &str) -> Response {
        self.req("PROPFIND", path)
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND")
    }

    pub async fn propfind_body(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self.propfind(path, depth).await;
        let status = resp.status();
        let body = resp.text().await.expect("body");
        (status, body)
    }

    pub async fn copy(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.req("COPY", from)
            .header("Destination", self.url(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("COPY")
    }

    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.req("MOVE", from)
            .header("Destination", self.url(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("MOVE")
    }

    pub async fn proppatch(&self, path: &str, body: &str) -> Response {
        self.req("PROPPATCH", path)
            .header("Content-Type", "application/xml")
            .body(body.to_string())
            .send()
            .await
            .expect("PROPPATCH")
    }

    /// Stop the server, draining in-flight handlers.
    pub async fn shutdown(mut self) {
        if let Some(server) = self.server.take() {
            server.stop(true).await;
        }
    }
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

pub fn one_chunk_content() -> Vec<u8> {
    random_bytes(CHUNK_SIZE)
}

pub fn multi_chunk_content(chunks: usize) -> Vec<u8> {
    random_bytes(CHUNK_SIZE * chunks)
}

pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub async fn assert_file_content(server: &TestServer, path: &str, expected: &[u8]) {
    let body = server
        .get_bytes(path)
        .await
        .unwrap_or_else(|| panic!("GET {path} failed"));
    assert_eq!(body, expected, "content mismatch at {path}");
}

pub async fn assert_not_found(server: &TestServer, path: &str) {
    let resp = server.get(path).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND, "expected 404 at {path}");
}
