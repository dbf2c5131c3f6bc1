//! Server binary: stdio transport plus the dispatcher loop.
//!
//! Logging goes to stderr — stdout belongs to the protocol.

use anyhow::Result;
use crossbeam_channel::unbounded;
use girder_bsp::{read_message, write_message, Message, MAX_MESSAGE_BYTES_DEFAULT};
use girder_server::{BuildClient, Dispatcher};
use std::io::{self, BufReader, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GIRDER_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!(version = girder_core::GIRDER_VERSION, "girder starting");

    let (incoming_tx, incoming_rx) = unbounded::<Message>();
    let (outgoing_tx, outgoing_rx) = unbounded::<Message>();

    // Reader: stdin -> dispatcher. Dropping the sender on EOF ends the
    // dispatcher loop if the client never sent build/exit.
    let reader = std::thread::Builder::new()
        .name("girder-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let mut reader = BufReader::new(stdin.lock());
            loop {
                match read_message(&mut reader, MAX_MESSAGE_BYTES_DEFAULT) {
                    Ok(Some(message)) => {
                        if incoming_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to read client message");
                        break;
                    }
                }
            }
        })?;

    // Writer: dispatcher -> stdout.
    let writer = std::thread::Builder::new()
        .name("girder-stdout".to_string())
        .spawn(move || {
            let stdout = io::stdout();
            let mut stdout = stdout.lock();
            for message in outgoing_rx.iter() {
                if let Err(err) = write_message(&mut stdout, &message) {
                    tracing::error!(error = %err, "failed to write to client");
                    break;
                }
            }
            let _ = stdout.flush();
        })?;

    let client = BuildClient::new(outgoing_tx);
    let dispatcher = Dispatcher::new(client);
    let exit_code = dispatcher.run(incoming_rx);

    // The dispatcher dropped its channel ends; let the I/O threads drain.
    drop(dispatcher);
    let _ = writer.join();
    drop(reader);

    tracing::info!(exit_code, "girder exiting");
    std::process::exit(exit_code);
}
