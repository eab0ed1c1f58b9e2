use std::{io::Write, net::SocketAddr, path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn stdin_lines_reach_connected_client() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("stream_fanout");

    let mut server = spawn_server(binary, &[]).await?;
    let addr = read_listen_addr(&mut server.stdout).await?;

    let mut client = TcpStream::connect(addr).await?;
    wait_for_log(&mut server.stdout, "client connected").await?;

    let mut stdin = server.child.stdin.take().context("server stdin missing")?;
    stdin.write_all(b"a\nb\nc\n").await?;
    stdin.flush().await?;

    let mut received = [0u8; 6];
    timeout(READ_TIMEOUT, client.read_exact(&mut received)).await??;
    assert_eq!(&received, b"a\nb\nc\n");

    // Closing stdin exhausts the input; the server keeps running.
    drop(stdin);
    wait_for_log(&mut server.stdout, "input exhausted").await?;

    let mut late = TcpStream::connect(addr).await?;
    wait_for_log(&mut server.stdout, "client connected").await?;
    let mut buf = [0u8; 1];
    assert!(
        timeout(Duration::from_millis(200), late.read(&mut buf))
            .await
            .is_err(),
        "late client should receive nothing and stay connected"
    );
    assert!(server.child.try_wait()?.is_none(), "server should still run");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn input_file_is_read_and_server_keeps_serving() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("stream_fanout");

    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(b"alpha\nbeta\n")?;
    file.flush()?;
    let path = file.path().to_str().context("temp path is not utf-8")?;

    let mut server = spawn_server(binary, &["--fn", path, "--debug"]).await?;
    let addr = read_listen_addr(&mut server.stdout).await?;

    // Nobody is connected yet, so the file's lines are read and discarded.
    wait_for_log(&mut server.stdout, "no clients are connected").await?;
    wait_for_log(&mut server.stdout, "input exhausted").await?;

    let mut client = TcpStream::connect(addr).await?;
    wait_for_log(&mut server.stdout, "client connected").await?;
    let mut buf = [0u8; 1];
    assert!(
        timeout(Duration::from_millis(200), client.read(&mut buf))
            .await
            .is_err(),
        "no history is replayed to new clients"
    );
    assert!(server.child.try_wait()?.is_none(), "server should still run");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn missing_input_file_is_fatal() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("stream_fanout");
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nope.txt");

    let output = timeout(
        READ_TIMEOUT,
        Command::new(binary)
            .arg("--port")
            .arg("0")
            .arg("--fn")
            .arg(&missing)
            .stdin(Stdio::null())
            .output(),
    )
    .await??;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.txt"), "stderr was: {stderr}");
    Ok(())
}

struct ServerProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
}

impl ServerProcess {
    async fn stop(mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

async fn spawn_server(binary: &Path, extra_args: &[&str]) -> Result<ServerProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("--port")
        .arg("0")
        .args(extra_args)
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok(ServerProcess {
        child,
        stdout: BufReader::new(stdout),
    })
}

async fn read_listen_addr(reader: &mut BufReader<ChildStdout>) -> Result<SocketAddr> {
    let line = wait_for_log(reader, "listening on").await?;
    let token = line
        .split_whitespace()
        .last()
        .context("unexpected listen banner format")?;
    let bound: SocketAddr = token
        .parse()
        .with_context(|| format!("listen banner missing socket: {line}"))?;
    Ok(SocketAddr::from(([127, 0, 0, 1], bound.port())))
}

/// Reads log lines until one contains `needle`, returning that line.
async fn wait_for_log(reader: &mut BufReader<ChildStdout>, needle: &str) -> Result<String> {
    loop {
        match read_line(reader).await {
            Ok(Some(line)) if line.contains(needle) => return Ok(line),
            Ok(Some(_)) => continue,
            Ok(None) => return Err(anyhow!("waiting for '{needle}': stream closed")),
            Err(err) => return Err(err.context(format!("waiting for '{needle}'"))),
        }
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let read_future = reader.read_line(&mut line);
    let bytes_io = match timeout(READ_TIMEOUT, read_future).await {
        Ok(result) => result,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    let byte_count = bytes_io?;
    if byte_count == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
