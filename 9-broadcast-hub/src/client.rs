use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{cli::ConnectArgs, protocol::write_line};

const QUIT_COMMAND: &str = "/quit";

pub async fn run(args: ConnectArgs) -> Result<()> {
    let (reader, mut writer) = establish_connection(&args).await?;

    // `Lines::next_line` is cancel safe, so neither side loses a partial line in `select!`.
    let mut server_lines = reader.lines();
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    run_client_loop(&mut server_lines, &mut writer, &mut stdin_lines).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(
    args: &ConnectArgs,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn run_client_loop(
    server_lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    stdin_lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    loop {
        select! {
            server_line = server_lines.next_line() => {
                if !handle_server_line(server_line).await? {
                    break;
                }
            }
            input = stdin_lines.next_line() => {
                if !handle_stdin_input(input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_line(line: io::Result<Option<String>>) -> Result<bool> {
    match line? {
        Some(line) => {
            write_stdout(&line).await?;
            Ok(true)
        }
        None => {
            write_stderr("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(
    input: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let Some(text) = input? else {
        return Ok(false);
    };

    if text.trim().eq_ignore_ascii_case(QUIT_COMMAND) {
        write_stderr("*** leaving").await?;
        return Ok(false);
    }

    write_line(writer, &text).await?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    write_line(&mut tokio::io::stdout(), line).await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    write_line(&mut tokio::io::stderr(), line).await
}
