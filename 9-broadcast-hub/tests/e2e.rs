use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("broadcast_hub");

    let (mut hub_child, mut hub_stdout) = spawn_hub(&binary).await?;
    let addr = read_hub_addr(&mut hub_stdout).await?;

    // Keep draining hub logs so the pipe never fills.
    let hub_log_task = tokio::spawn(async move {
        drain_stdout(hub_stdout).await;
    });

    let mut alice = spawn_client(&binary, &addr).await?;
    let alice_membership = read_line_expect(&mut alice.stdout, "alice membership").await?;
    assert_eq!(
        alice_membership,
        format!(
            "The number of current clients: 1,  List of Current clients: {}",
            alice.id
        )
    );

    let mut bob = spawn_client(&binary, &addr).await?;
    let bob_membership = read_line_expect(&mut bob.stdout, "bob membership").await?;
    assert!(bob_membership.starts_with("The number of current clients: 2,"));
    assert!(bob_membership.contains(&alice.id));
    assert!(bob_membership.contains(&bob.id));

    let alice_sees_bob = read_line_expect(&mut alice.stdout, "alice sees bob arrive").await?;
    assert_eq!(alice_sees_bob, format!("{} has arrived", bob.id));

    alice.send_line("Hello from Alice").await?;
    let expected = format!("{}: Hello from Alice", alice.id);
    assert_eq!(
        read_line_expect(&mut bob.stdout, "bob hears alice").await?,
        expected
    );
    assert_eq!(
        read_line_expect(&mut alice.stdout, "alice echo").await?,
        expected
    );

    alice.send_line("/quit").await?;
    ensure_success(&mut alice.child, "alice client").await?;
    assert_eq!(
        read_line_expect(&mut bob.stdout, "bob sees alice leave").await?,
        format!("{} has left", alice.id)
    );

    bob.send_line("/quit").await?;
    ensure_success(&mut bob.child, "bob client").await?;

    // The hub keeps running after clients leave; stop it by hand.
    let _ = hub_child.kill().await;
    let _ = hub_child.wait().await;
    let _ = hub_log_task.await;

    Ok(())
}

struct ClientProcess {
    id: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

async fn spawn_hub(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("serve")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn hub")?;
    let stdout = child
        .stdout
        .take()
        .context("hub stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_hub_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_line(reader)
        .await?
        .context("hub did not emit listening address")?;
    let trimmed = line.trim();
    if !trimmed.contains("hub listening on") {
        return Err(anyhow!("unexpected hub banner: {trimmed}"));
    }
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected hub banner format")?;
    Ok(addr.to_string())
}

async fn spawn_client(binary: &Path, addr: &str) -> Result<ClientProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("connect")
        .arg("--server")
        .arg(addr)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn client")?;
    let stdin = child
        .stdin
        .take()
        .context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;
    let mut stdout = BufReader::new(stdout);

    let greeting = read_line_expect(&mut stdout, "waiting for greeting").await?;
    let id = greeting
        .strip_prefix("You are ")
        .ok_or_else(|| anyhow!("expected greeting, got '{greeting}'"))?
        .to_string();

    Ok(ClientProcess {
        id,
        child,
        stdin,
        stdout,
    })
}

async fn ensure_success(child: &mut Child, description: &str) -> Result<()> {
    let status = timeout(READ_TIMEOUT, child.wait())
        .await
        .map_err(|_| anyhow!("{description}: timed out waiting for exit"))??;
    if !status.success() {
        return Err(anyhow!("{description} exited with {status}"));
    }
    Ok(())
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("{description}: stream closed")),
        Err(err) => Err(err.context(format!("{description}: failed to read line"))),
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let bytes = timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| anyhow!("timed out waiting for line"))??;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| bytes > 0)
        .unwrap_or(false)
    {
        buffer.clear();
    }
}
