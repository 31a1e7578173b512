//! Command-line driver for loopback connection sessions on the simulated transport.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, unbounded, Receiver};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};
use xpc_connection::{Connection, ConnectionOptions, ReplyError, XpcError, IDENTITY_KEY};
use xpc_transport::{Event, Fault, Message};
use xpc_transport_sim::{Listener, ListenerConfig, SimTransport};

const SETTLE: Duration = Duration::from_secs(2);

/// Text rendering helpers used by the CLI commands.
mod render {
    use std::fmt::Write;
    use xpc_connection::{ConnectionProperties, ReplyError, XpcError};

    /// Format the error kinds the handler registry reported, in arrival order.
    pub fn kinds(observed: &[XpcError]) -> String {
        if observed.is_empty() {
            return "handlers: none\n".to_owned();
        }
        let codes: Vec<_> = observed.iter().map(|k| k.code()).collect();
        format!("handlers: {}\n", codes.join(", "))
    }

    /// Format one echoed request.
    pub fn echo_line(seq: i64, reply: &Result<i64, ReplyError>) -> String {
        match reply {
            Ok(value) => format!("request {seq}: reply seq={value}\n"),
            Err(err) => format!("request {seq}: {err}\n"),
        }
    }

    /// Format the peer credentials of a connection.
    pub fn peer(name: &str, props: Option<ConnectionProperties>) -> String {
        let mut out = String::new();
        let name = if name.is_empty() { "<anonymous>" } else { name };
        write!(out, "peer {name}").expect("write name");
        match props {
            Some(p) => writeln!(
                out,
                ": uid={} gid={} pid={} asid={}",
                p.effective_uid, p.effective_gid, p.pid, p.audit_session_id
            )
            .expect("write props"),
            None => writeln!(out, ": unbound").expect("write unbound"),
        }
        out
    }
}

/// Drive loopback sessions against an in-process simulated IPC host.
#[derive(Parser, Debug)]
#[command(author, version, about = "Exercise connection lifecycles on a simulated transport", long_about = None)]
struct Cli {
    /// TOML file with connection options.
    #[arg(long, value_name = "FILE", global = true)]
    options: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send numbered requests to an echo service and print the replies.
    Echo {
        #[arg(long, default_value = "com.example.echo")]
        service: String,
        #[arg(long, value_enum, default_value_t = DomainArg::Local)]
        domain: DomainArg,
        /// Number of requests to send.
        #[arg(short, long, default_value_t = 3)]
        count: u32,
        /// Also send a request for an identity the service does not route.
        #[arg(long)]
        unrouted: bool,
    },
    /// Have the service interrupt, announce termination and shut down.
    Faults {
        #[arg(long, default_value = "com.example.faults")]
        service: String,
        #[arg(long, value_enum, default_value_t = DomainArg::Local)]
        domain: DomainArg,
    },
    /// Connect to a service nobody registered.
    Missing {
        #[arg(long, default_value = "com.example.missing")]
        service: String,
        #[arg(long, value_enum, default_value_t = DomainArg::Local)]
        domain: DomainArg,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DomainArg {
    /// Caller's local domain.
    Local,
    /// Global mach service.
    Mach,
    /// Global mach service behind the privileged lookup.
    Privileged,
}

impl DomainArg {
    fn listener_config(self) -> ListenerConfig {
        match self {
            DomainArg::Local => ListenerConfig::local(),
            DomainArg::Mach => ListenerConfig::mach(),
            DomainArg::Privileged => ListenerConfig::privileged_mach(),
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let options = load_options(cli.options.as_deref())?;
    let sim = SimTransport::new();

    let output = match cli.command {
        Command::Echo {
            service,
            domain,
            count,
            unrouted,
        } => run_echo(&sim, &service, domain, count, unrouted, options)?,
        Command::Faults { service, domain } => run_faults(&sim, &service, domain, options)?,
        Command::Missing { service, domain } => run_missing(&sim, &service, domain, options)?,
    };
    print!("{output}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_options(path: Option<&Path>) -> Result<ConnectionOptions> {
    let Some(path) = path else {
        return Ok(ConnectionOptions::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read options {path:?}"))?;
    toml::from_str(&text).with_context(|| format!("invalid options in {path:?}"))
}

/// Connects to `service` and starts delivery once every kind is being watched.
fn connect(
    sim: &SimTransport,
    service: &str,
    domain: DomainArg,
    options: ConnectionOptions,
) -> Result<(Connection, Receiver<XpcError>)> {
    if !options.activate {
        debug!("activate = false ignored; sessions always activate after watching");
    }
    let options = options.activate(false);
    let conn = match domain {
        DomainArg::Local => Connection::local_service(sim, service, options),
        DomainArg::Mach => Connection::mach_service(sim, service, options),
        DomainArg::Privileged => Connection::privileged_mach_service(sim, service, options),
    }
    .with_context(|| format!("failed to create connection to {service}"))?;
    let observed = watch_all(&conn);
    conn.set_active(true);
    Ok((conn, observed))
}

fn watch_all(conn: &Connection) -> Receiver<XpcError> {
    let (tx, rx) = unbounded();
    for kind in XpcError::ALL {
        let tx = tx.clone();
        conn.handle(kind, move || {
            let _ = tx.send(kind);
        });
    }
    rx
}

/// Accepts the next client and answers `echo` requests with their body.
fn serve(listener: &Listener, options: &ConnectionOptions) -> Result<Connection> {
    let Some(peer) = listener.accept_timeout(SETTLE) else {
        bail!("no client connected to {}", listener.name());
    };
    let server = Connection::from_handle(peer, options.clone())?;
    server.route("echo", |msg| Ok(Some(msg.clone())));
    server.bootstrap()?;
    info!(service = listener.name(), "client accepted");
    Ok(server)
}

/// Waits until everything already queued on `conn` has been delivered.
fn settle(conn: &Connection) -> Result<()> {
    let (tx, rx) = bounded(1);
    conn.perform_with_barrier(move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(SETTLE)
        .context("connection did not reach a barrier")
}

fn run_echo(
    sim: &SimTransport,
    service: &str,
    domain: DomainArg,
    count: u32,
    unrouted: bool,
    options: ConnectionOptions,
) -> Result<String> {
    let listener = sim.listen(service, domain.listener_config())?;
    let (client, observed) = connect(sim, service, domain, options.clone())?;
    let _server = serve(&listener, &options)?;

    let (tx, rx) = unbounded();
    let mut requests = Vec::new();
    for seq in 1..=i64::from(count) {
        requests.push((seq, "echo"));
    }
    if unrouted {
        requests.push((i64::from(count) + 1, "unrouted"));
    }
    for (seq, identity) in &requests {
        let tx = tx.clone();
        let seq = *seq;
        client.send_with_reply(
            Message::new().with(IDENTITY_KEY, *identity).with("seq", seq),
            move |reply| {
                let result = reply.get_i64("seq");
                let _ = tx.send((seq, result.clone()));
                match result {
                    Err(ReplyError::Remote(_)) => Ok(()),
                    other => other.map(|_| ()),
                }
            },
        );
    }

    let mut out = render::peer(&client.name(), client.properties());
    for _ in &requests {
        let (seq, reply) = rx
            .recv_timeout(SETTLE)
            .context("timed out waiting for a reply")?;
        out.push_str(&render::echo_line(seq, &reply));
    }
    settle(&client)?;
    let kinds: Vec<_> = observed.try_iter().collect();
    out.push_str(&render::kinds(&kinds));
    Ok(out)
}

fn run_faults(
    sim: &SimTransport,
    service: &str,
    domain: DomainArg,
    options: ConnectionOptions,
) -> Result<String> {
    let listener = sim.listen(service, domain.listener_config())?;
    let (client, observed) = connect(sim, service, domain, options.clone())?;
    let _server = serve(&listener, &options)?;

    listener.interrupt_clients();
    listener.announce_termination();
    if let Some(handle) = client.raw_handle() {
        sim.inject(handle, Event::Fault(Fault::other("Unexpected host fault")));
    }
    listener.shutdown();
    settle(&client)?;

    let kinds: Vec<_> = observed.try_iter().collect();
    Ok(render::kinds(&kinds))
}

fn run_missing(
    sim: &SimTransport,
    service: &str,
    domain: DomainArg,
    options: ConnectionOptions,
) -> Result<String> {
    let (client, observed) = connect(sim, service, domain, options)?;
    settle(&client)?;
    let kinds: Vec<_> = observed.try_iter().collect();
    Ok(render::kinds(&kinds))
}
