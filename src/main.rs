use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;
use nix::sys::ptrace;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use qdumper::config::DumperConfig;
use qdumper::dumper::memory::TraceeMemory;
use qdumper::dumper::request::InspectionRequest;
use qdumper::dumper::Dumper;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a configuration file, `~/.config/qdumper/config.toml` by default
    #[arg(long, env = "QDUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Framework namespace, overrides configuration
    #[arg(long)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the catalog of supported types
    Catalog,
    /// Dump a value of a running process
    Dump(DumpArgs),
}

#[derive(Args, Debug)]
struct DumpArgs {
    /// Process to attach to
    #[arg(long)]
    pid: i32,

    /// Declared type of a value
    #[arg(long = "type")]
    type_name: String,

    /// Display path of a value
    #[arg(long, default_value_t = String::from("local.value"))]
    iname: String,

    /// Address of a value (hex)
    #[arg(long, value_parser = parse_hex)]
    addr: usize,

    /// Template parameters separated by `@`
    #[arg(long, default_value_t = String::new())]
    inner: String,

    /// Size or offset hint, up to four
    #[arg(long = "hint", allow_negative_numbers = true)]
    hints: Vec<i64>,

    /// Expand children
    #[arg(long)]
    children: bool,
}

fn parse_hex(s: &str) -> Result<usize, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    usize::from_str_radix(digits, 16).map_err(|e| format!("invalid address `{s}`: {e}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = DumperConfig::load(cli.config.as_deref());
    if let Some(ns) = cli.namespace {
        config = config.with_namespace(ns);
    }
    config.apply_log_switch();
    let dumper = Dumper::new(config);

    match cli.command {
        Command::Catalog => println!("{}", dumper.catalog()),
        Command::Dump(args) => {
            let reply = dump(&dumper, args)?;
            println!("{reply}");
        }
    }
    Ok(())
}

fn dump(dumper: &Dumper, args: DumpArgs) -> anyhow::Result<qdumper::dumper::wire::Reply> {
    if args.hints.len() > 4 {
        bail!("at most 4 hints expected, got {}", args.hints.len());
    }
    let mut hints = [0; 4];
    hints[..args.hints.len()].copy_from_slice(&args.hints);

    let request = InspectionRequest::new(args.type_name, args.iname)
        .with_address(args.addr)
        .with_inner(args.inner)
        .with_hints(hints)
        .with_children(args.children);

    let pid = Pid::from_raw(args.pid);
    ptrace::attach(pid).with_context(|| format!("attach to {pid}"))?;
    waitpid(pid, None).with_context(|| format!("wait for {pid}"))?;
    info!(target: "qdump", "attached to {pid}");

    let reply = dumper.dump_guarded(&request, &TraceeMemory::new(pid));

    ptrace::detach(pid, None).with_context(|| format!("detach from {pid}"))?;
    Ok(reply)
}
