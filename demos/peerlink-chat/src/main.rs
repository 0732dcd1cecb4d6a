use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use peerlink::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Chat and share files directly with another peer.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, env = "PEERLINK_LISTEN", default_value = "127.0.0.1:9000")]
    listen: String,

    /// Identifier to announce instead of a random one.
    #[arg(long, env = "PEERLINK_ID")]
    id: Option<String>,

    /// A known peer as `id=addr`. May be repeated.
    #[arg(short, long = "peer", value_parser = parse_peer)]
    peers: Vec<(String, SocketAddr)>,

    /// Directory received files are saved into.
    #[arg(short, long, env = "PEERLINK_DOWNLOADS", default_value = ".")]
    downloads: PathBuf,
}

fn parse_peer(s: &str) -> Result<(String, SocketAddr), String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("expected id=addr, got {s}"))?;
    let addr = addr
        .parse()
        .map_err(|e| format!("bad address {addr}: {e}"))?;
    Ok((id.to_string(), addr))
}

const HELP: &str = "\
commands:
  /connect <id>        connect to a peer
  /peer <id> <addr>    remember where a peer listens
  /send <path>         send a file
  /save [id]           save a received file (the latest one by default)
  /log                 show the conversation so far
  /disconnect          close the connection
  /quit                exit
anything else is sent as a chat message";

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut builder = PeerlinkNode::builder().bind(&cli.listen);
    if let Some(id) = cli.id {
        builder = builder.peer_id(id);
    }
    for (id, addr) in cli.peers {
        builder = builder.peer(id, addr);
    }
    let node = builder.build().await?;

    println!("peer id {} listening on {}", node.id(), node.local_addr());
    println!("type /help for commands");

    let session = node.session();
    let directory = node.directory().clone();
    let mut events = session.subscribe();
    let mut connected = session.connected();
    tokio::spawn(async move {
        if let Err(e) = node.run().await {
            tracing::error!(error = %e, "node stopped");
        }
    });

    let mut chat = Chat {
        session,
        directory,
        downloads: cli.downloads,
        log: ChatLog::new(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !chat.command(line.trim()).await {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => chat.event(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "display fell behind, events skipped");
                }
                Err(RecvError::Closed) => break,
            },
            Ok(()) = connected.changed() => {
                let status = chat.session.status().borrow().clone();
                match (status.state, status.remote) {
                    (ConnectionState::Open, Some(remote)) => println!("* connected to {remote}"),
                    _ => println!("* disconnected"),
                }
            }
        }
    }

    chat.session.disconnect().await?;
    Ok(())
}

struct Chat {
    session: SessionHandle<WebSocketConnection>,
    directory: PeerDirectory,
    downloads: PathBuf,
    log: ChatLog,
}

impl Chat {
    /// Runs one line of input. Returns `false` to quit.
    async fn command(&mut self, line: &str) -> bool {
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        let result = match cmd {
            "" => Ok(()),
            "/quit" => return false,
            "/help" => {
                println!("{HELP}");
                Ok(())
            }
            "/connect" if !arg.is_empty() => self.session.connect(arg).await,
            "/disconnect" => self.session.disconnect().await,
            "/peer" => match arg.split_once(' ') {
                Some((id, addr)) => match addr.trim().parse() {
                    Ok(addr) => {
                        self.directory.insert(id, addr);
                        Ok(())
                    }
                    Err(e) => {
                        println!("! bad address {addr}: {e}");
                        Ok(())
                    }
                },
                None => {
                    println!("! usage: /peer <id> <addr>");
                    Ok(())
                }
            },
            "/send" if !arg.is_empty() => match FileSource::open(arg).await {
                Ok(file) => self.session.send_file(file).await.map(|_| ()),
                Err(e) => {
                    println!("! cannot open {arg}: {e}");
                    Ok(())
                }
            },
            "/save" => {
                self.save(arg).await;
                Ok(())
            }
            "/log" => {
                for msg in self.log.iter() {
                    print_message(msg);
                }
                Ok(())
            }
            _ if cmd.starts_with('/') => {
                println!("! unknown command, try /help");
                Ok(())
            }
            _ => self.session.send_message(line).await.map(|_| ()),
        };

        if let Err(e) = result {
            println!("! {e}");
        }
        true
    }

    fn event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Message(msg) => {
                print_message(&msg);
                if msg.origin == Origin::Remote && msg.kind() == MessageKind::File {
                    println!("  (/save {} to keep it)", msg.id);
                }
                self.log.push(msg);
            }
            SessionEvent::TransferStarted { metadata, .. } => {
                println!("* receiving {} ({} bytes)", metadata.name, metadata.size);
            }
            SessionEvent::TransferAborted { transfer_id, reason } => {
                println!("! transfer {transfer_id} aborted: {reason}");
            }
            SessionEvent::ConnectionReplaced {
                previous,
                replacement,
            } => {
                println!("* {replacement} took over the connection from {previous}");
            }
        }
    }

    async fn save(&self, id: &str) {
        let found = if id.is_empty() {
            self.log.iter().rev().find_map(ChatMessage::download)
        } else {
            self.log.get(id).and_then(ChatMessage::download)
        };
        let Some(download) = found else {
            println!("! no received file to save");
            return;
        };

        match download.save_in(&self.downloads).await {
            Ok(path) => println!("* saved {}", path.display()),
            Err(e) => println!("! could not save {}: {e}", download.file_name),
        }
    }
}

fn print_message(msg: &ChatMessage) {
    let who = match msg.origin {
        Origin::Local => "you",
        Origin::Remote => "peer",
    };
    println!(
        "[{}] {who}: {}",
        msg.timestamp.format("%H:%M:%S"),
        msg.summary()
    );
}
