use logrelay::logs::{capture_output, ChannelTail, LogRelay};
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::process::Command;

#[tokio::test]
async fn test_capture_stdout_and_stderr() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("proc.log");
    let relay = Arc::new(LogRelay::new(path.to_str().unwrap()).unwrap());

    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg("echo 'stdout message' && echo 'stderr message' >&2")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let handle = capture_output(Arc::clone(&relay), &mut child).unwrap();
    let _ = child.wait().await;
    assert_eq!(handle.wait().await.unwrap(), 2);
    relay.close().unwrap();

    let history = relay.history();
    assert_eq!(history.len(), 2);
    assert!(history.contains(&"stdout message\n".to_string()));
    assert!(history.contains(&"stderr message\n".to_string()));

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(content.contains("stdout message"));
    assert!(content.contains("stderr message"));
}

#[tokio::test]
async fn test_late_tail_gets_recent_output() {
    let relay = Arc::new(LogRelay::with_factory("", 3, &logrelay::logs::FileSinkFactory::default()).unwrap());

    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg("for i in 1 2 3 4 5; do echo line-$i; done")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let handle = capture_output(Arc::clone(&relay), &mut child).unwrap();
    let _ = child.wait().await;
    handle.wait().await.unwrap();

    let (tail, mut stream) = ChannelTail::pair(8);
    relay.register("viewer", tail, 2).unwrap();

    assert_eq!(stream.next().await.unwrap().line, "line-4\n");
    assert_eq!(stream.next().await.unwrap().line, "line-5\n");
    assert!(stream.try_next().is_none());
}
