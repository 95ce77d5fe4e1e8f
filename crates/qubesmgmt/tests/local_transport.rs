//! Integration tests for the socket transport.
//!
//! A fake qubesd listens on a Unix socket in a temporary directory, records
//! each raw request and answers with a canned response.

use qubesmgmt::{AdminClient, ClientConfig, Error, Qubes, Wrapper};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

struct FakeQubesd {
    path: PathBuf,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    _dir: tempfile::TempDir,
}

impl FakeQubesd {
    /// Serve `responses` in order, one connection each; the last one repeats.
    fn start(responses: Vec<&'static [u8]>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("qubesd.sock");
        let listener = UnixListener::bind(&path).expect("bind fake qubesd");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = Vec::new();
                if stream.read_to_end(&mut request).await.is_err() {
                    continue;
                }
                recorded.lock().unwrap().push(request);
                let response = responses[served.min(responses.len() - 1)];
                served += 1;
                let _ = stream.write_all(response).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            path,
            requests,
            _dir: dir,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_call_frames_request_and_decodes_payload() {
    let qubesd = FakeQubesd::start(vec![&b"0\nhello"[..]]);
    let client = AdminClient::from_config(&ClientConfig::socket(qubesd.path()));

    let payload = client
        .call("work", "mgmt.vm.property.Get", Some("label"), None)
        .await
        .unwrap();
    assert_eq!(&payload[..], b"hello");
    assert_eq!(
        qubesd.requests(),
        vec![b"dom0\0mgmt.vm.property.Get\0work\0label\0".to_vec()]
    );
}

#[tokio::test]
async fn test_payload_follows_framing() {
    let qubesd = FakeQubesd::start(vec![&b"0\n"[..]]);
    let app = Qubes::new(&ClientConfig::socket(qubesd.path()));

    app.add_pool("extra", "file", [("dir_path", "/mnt/extra")])
        .await
        .unwrap();
    assert_eq!(
        qubesd.requests(),
        vec![b"dom0\0mgmt.pool.Add\0dom0\0file\0name=extra\ndir_path=/mnt/extra\n".to_vec()]
    );
}

#[tokio::test]
async fn test_source_from_config() {
    let qubesd = FakeQubesd::start(vec![&b"0\n"[..]]);
    let client =
        AdminClient::from_config(&ClientConfig::socket(qubesd.path()).with_source("sys-gui"));

    client.call("dom0", "mgmt.label.List", None, None).await.unwrap();
    assert!(qubesd.requests()[0].starts_with(b"sys-gui\0"));
}

#[tokio::test]
async fn test_remote_error_over_socket() {
    let qubesd = FakeQubesd::start(vec![&b"2\nQubesVMNotFoundError\nNo such domain: 'nope'\n"[..]]);
    let client = AdminClient::from_config(&ClientConfig::socket(qubesd.path()));

    let err = client
        .call("nope", "mgmt.vm.Start", None, None)
        .await
        .unwrap_err();
    match err {
        Error::Remote { kind, message, .. } => {
            assert_eq!(kind, "QubesVMNotFoundError");
            assert_eq!(message, "No such domain: 'nope'");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_response_is_protocol_error() {
    let qubesd = FakeQubesd::start(vec![&b""[..]]);
    let client = AdminClient::from_config(&ClientConfig::socket(qubesd.path()));

    let err = client.call("dom0", "mgmt.vm.List", None, None).await.unwrap_err();
    assert!(err.is_protocol());
}

#[tokio::test]
async fn test_unreachable_socket() {
    let dir = tempfile::tempdir().unwrap();
    let app = Qubes::new(&ClientConfig::socket(dir.path().join("absent.sock")));

    let err = app.client().call("dom0", "mgmt.vm.List", None, None).await.unwrap_err();
    assert!(err.is_connection());

    let err = app.domains.refresh(false).await.unwrap_err();
    assert!(err.is_connection());
    assert!(!app.domains.is_cached().await);
}

#[tokio::test]
async fn test_one_connection_per_call() {
    let qubesd = FakeQubesd::start(vec![
        &b"0\ndom0 class=AdminVM\nwork class=AppVM\n"[..],
        &b"0\ndom0 class=AdminVM\nwork class=TemplateVM\n"[..],
    ]);
    let app = Qubes::new(&ClientConfig::socket(qubesd.path()));

    let work = app.domains.get("work").await.unwrap();
    assert_eq!(work.class(), "AppVM");
    assert!(app.domains.contains("dom0").await.unwrap());
    assert_eq!(qubesd.requests().len(), 1);

    app.domains.refresh(true).await.unwrap();
    let again = app.domains.get("work").await.unwrap();
    assert_eq!(again.class(), "TemplateVM");
    assert!(!Arc::ptr_eq(&work, &again));
    assert_eq!(qubesd.requests().len(), 2);
}
